pub mod commands;
pub mod config;
pub mod controller;
pub mod core;
pub mod db;
pub mod drivers;
pub mod error;
pub mod network;
pub mod notify;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::core::{MemoryRepository, ProfileRepository};
use crate::db::{Database, SettingsStore, StaticSettings};

/// Install the panic hook and the `tracing` subscriber.
///
/// `RUST_LOG` overrides the default `tunnelswitch=info` filter.
pub fn init_logging() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC in tunnelswitch: {info}");
        default_hook(info);
    }));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tunnelswitch=info".into()),
        )
        .init();
}

/// Profile and settings storage for one session.
pub struct Storage {
    pub repository: Arc<dyn ProfileRepository>,
    pub settings: Arc<dyn SettingsStore>,
}

impl Storage {
    /// SQLite database at `path`, creating parent directories as needed.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let database = Arc::new(
            Database::open(path)
                .with_context(|| format!("failed to open database {}", path.display()))?,
        );
        tracing::info!("Database opened at {}", path.display());
        Ok(Self {
            repository: database.clone(),
            settings: database,
        })
    }

    /// Nothing is persisted.
    pub fn in_memory() -> Self {
        Self {
            repository: Arc::new(MemoryRepository::new()),
            settings: Arc::new(StaticSettings::default()),
        }
    }
}

/// Default database location inside the platform data directory, or the
/// working directory when none can be determined.
pub fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "tunnelswitch")
        .map(|dirs| dirs.data_dir().join(config::DATABASE_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(config::DATABASE_FILE_NAME))
}
