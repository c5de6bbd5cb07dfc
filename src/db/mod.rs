//! SQLite persistence layer for profiles and settings.
//!
//! Uses `rusqlite` with bundled SQLite. Handles:
//! - Profile definitions and their runtime state (`profiles`)
//! - User settings as key/value pairs (`settings`)

mod profiles;
mod settings;

use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use rusqlite::Connection;

use crate::core::profile::{Profile, ProfileKey, ProfileMap};
use crate::core::repository::ProfileRepository;
use crate::error::AppError;

pub use settings::{Settings, SettingsStore, StaticSettings};

/// Manages the SQLite database backing the profile repository.
pub struct Database {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        provider TEXT NOT NULL,
        tunnel_name TEXT NOT NULL,
        wifi_rule TEXT NOT NULL DEFAULT 'none',
        mobile_rule TEXT NOT NULL DEFAULT 'none',
        ssid_include TEXT NOT NULL DEFAULT '[]',
        ssid_exclude TEXT NOT NULL DEFAULT '[]',
        carrier_include TEXT NOT NULL DEFAULT '[]',
        carrier_exclude TEXT NOT NULL DEFAULT '[]',
        priority INTEGER NOT NULL DEFAULT 1,
        enabled INTEGER NOT NULL DEFAULT 1,
        last_activated_at INTEGER
    );

    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

impl Database {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        // Enable WAL mode for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database. Used for dry runs and tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ProfileRepository for Database {
    fn get(&self) -> Result<ProfileMap, AppError> {
        Ok(self.load_profiles()?)
    }

    fn put(&self, key: ProfileKey, profile: &Profile) -> Result<(), AppError> {
        Ok(self.save_profile(key, profile)?)
    }

    fn delete(&self, key: ProfileKey) -> Result<(), AppError> {
        self.delete_profile(key)?;
        Ok(())
    }

    fn insert(&self, profile: &Profile) -> Result<ProfileKey, AppError> {
        Ok(self.insert_profile(profile)?)
    }

    fn touch(&self, key: ProfileKey, activated_at: i64) -> Result<(), AppError> {
        self.touch_profile(key, activated_at)?;
        Ok(())
    }

    fn find(&self, key: ProfileKey) -> Result<Option<Profile>, AppError> {
        Ok(self.load_profile(key)?)
    }
}

/// Current Unix timestamp in seconds.
pub fn chrono_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
