//! Key/value settings table.

use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

use crate::config;
use crate::error::AppError;

use super::Database;

/// User settings that affect controller behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub show_toggle_notification: bool,
    pub settle_delay_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_toggle_notification: false,
            settle_delay_ms: config::SETTLE_DELAY_MS,
        }
    }
}

/// Where the controller reads settings from on every reload.
pub trait SettingsStore: Send + Sync {
    fn load_settings(&self) -> Result<Settings, AppError>;
    fn save_settings(&self, settings: &Settings) -> Result<(), AppError>;
}

impl Database {
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Read all settings, falling back to defaults for missing keys.
    pub fn read_settings(&self) -> Result<Settings> {
        let defaults = Settings::default();
        let show_toggle_notification = match self.get_setting(config::SETTING_SHOW_TOGGLE_NOTIFICATION)? {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid {}: {v}", config::SETTING_SHOW_TOGGLE_NOTIFICATION))?,
            None => defaults.show_toggle_notification,
        };
        let settle_delay_ms = match self.get_setting(config::SETTING_SETTLE_DELAY_MS)? {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid {}: {v}", config::SETTING_SETTLE_DELAY_MS))?,
            None => defaults.settle_delay_ms,
        };
        Ok(Settings {
            show_toggle_notification,
            settle_delay_ms,
        })
    }
}

impl SettingsStore for Database {
    fn load_settings(&self) -> Result<Settings, AppError> {
        Ok(self.read_settings()?)
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), AppError> {
        self.set_setting(
            config::SETTING_SHOW_TOGGLE_NOTIFICATION,
            &settings.show_toggle_notification.to_string(),
        )?;
        self.set_setting(
            config::SETTING_SETTLE_DELAY_MS,
            &settings.settle_delay_ms.to_string(),
        )?;
        Ok(())
    }
}

/// Settings held in memory only.
#[derive(Debug, Default)]
pub struct StaticSettings {
    settings: Mutex<Settings>,
}

impl StaticSettings {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }
}

impl SettingsStore for StaticSettings {
    fn load_settings(&self) -> Result<Settings, AppError> {
        Ok(self.settings.lock().unwrap().clone())
    }

    fn save_settings(&self, settings: &Settings) -> Result<(), AppError> {
        *self.settings.lock().unwrap() = settings.clone();
        Ok(())
    }
}
