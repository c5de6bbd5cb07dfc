//! Tunnel drivers: one-way, best-effort commands to external tunnel software.
//!
//! A driver never reports whether the tunnel actually came up; `Ok` only means
//! the command was handed off.
//!
//! - `command`: spawns the provider's CLI as a detached child process

pub mod command;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;

use crate::core::profile::{Profile, Provider};
use crate::error::AppError;

pub use command::{CommandDriver, CommandTemplate};

/// A single up/down request for one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TunnelCommand {
    pub provider: Provider,
    pub tunnel_name: String,
    pub up: bool,
}

impl TunnelCommand {
    pub fn start(profile: &Profile) -> Self {
        Self {
            provider: profile.provider,
            tunnel_name: profile.tunnel_name.clone(),
            up: true,
        }
    }

    pub fn stop(profile: &Profile) -> Self {
        Self {
            provider: profile.provider,
            tunnel_name: profile.tunnel_name.clone(),
            up: false,
        }
    }
}

/// Section OpenVPN Connect files the tunnel under: `PC` for imported
/// profiles, `AS` for Access Server profiles. Drivers that address tunnels
/// by section get it through the `{section}` placeholder.
pub fn section_label(provider: Provider) -> Option<&'static str> {
    match provider {
        Provider::OpenVpnProfile => Some("PC"),
        Provider::OpenVpnAccessServer => Some("AS"),
        Provider::WireguardLike | Provider::IcsOpenVpn => None,
    }
}

#[async_trait]
pub trait TunnelDriver: Send + Sync {
    async fn set_state(&self, command: &TunnelCommand) -> Result<(), AppError>;
}

/// Maps each provider to the driver that handles it.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<Provider, Arc<dyn TunnelDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the default command-line driver for every provider.
    pub fn with_command_drivers() -> Self {
        let mut registry = Self::new();
        for provider in Provider::ALL {
            registry.register(provider, Arc::new(CommandDriver::for_provider(provider)));
        }
        registry
    }

    /// Registry routing every provider to the same driver.
    pub fn uniform(driver: Arc<dyn TunnelDriver>) -> Self {
        let mut registry = Self::new();
        for provider in Provider::ALL {
            registry.register(provider, Arc::clone(&driver));
        }
        registry
    }

    pub fn register(&mut self, provider: Provider, driver: Arc<dyn TunnelDriver>) {
        self.drivers.insert(provider, driver);
    }

    pub async fn dispatch(&self, command: &TunnelCommand) -> Result<(), AppError> {
        let driver = self.drivers.get(&command.provider).ok_or_else(|| {
            AppError::ProviderUnavailable(format!("no driver registered for {}", command.provider))
        })?;
        driver.set_state(command).await
    }
}

/// Driver that only records what it was asked to do. Backs dry runs.
#[derive(Debug, Default)]
pub struct RecordingDriver {
    commands: Mutex<Vec<TunnelCommand>>,
}

impl RecordingDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> Vec<TunnelCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl TunnelDriver for RecordingDriver {
    async fn set_state(&self, command: &TunnelCommand) -> Result<(), AppError> {
        tracing::debug!(
            "Recorded {} {} '{}'",
            if command.up { "start" } else { "stop" },
            command.provider,
            command.tunnel_name
        );
        self.commands.lock().unwrap().push(command.clone());
        Ok(())
    }
}
