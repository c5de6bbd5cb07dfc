//! Profile table CRUD operations.

use std::collections::BTreeSet;

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, OptionalExtension};

use crate::core::profile::{Profile, ProfileKey, ProfileMap, Provider, RuleMode};

use super::Database;

const SELECT_COLUMNS: &str = "SELECT id, name, provider, tunnel_name, wifi_rule, mobile_rule,
        ssid_include, ssid_exclude, carrier_include, carrier_exclude,
        priority, enabled, last_activated_at
     FROM profiles";

/// A profile row as stored, before the enum/set columns are decoded.
struct ProfileRow {
    id: ProfileKey,
    name: String,
    provider: String,
    tunnel_name: String,
    wifi_rule: String,
    mobile_rule: String,
    ssid_include: String,
    ssid_exclude: String,
    carrier_include: String,
    carrier_exclude: String,
    priority: i64,
    enabled: bool,
    last_activated_at: Option<i64>,
}

impl ProfileRow {
    fn into_profile(self) -> Result<(ProfileKey, Profile)> {
        let id = self.id;
        let profile = Profile {
            name: self.name,
            provider: self.provider.parse::<Provider>().map_err(|e| anyhow!(e))?,
            tunnel_name: self.tunnel_name,
            wifi_rule: self.wifi_rule.parse::<RuleMode>().map_err(|e| anyhow!(e))?,
            mobile_rule: self.mobile_rule.parse::<RuleMode>().map_err(|e| anyhow!(e))?,
            ssid_include: decode_set(&self.ssid_include)?,
            ssid_exclude: decode_set(&self.ssid_exclude)?,
            carrier_include: decode_set(&self.carrier_include)?,
            carrier_exclude: decode_set(&self.carrier_exclude)?,
            priority: self.priority,
            enabled: self.enabled,
            last_activated_at: self.last_activated_at,
        };
        Ok((id, profile))
    }
}

impl Database {
    /// Load every profile, ascending by id.
    pub fn load_profiles(&self) -> Result<ProfileMap> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!("{SELECT_COLUMNS} ORDER BY id"))?;
        let rows = stmt.query_map([], map_profile_row)?;

        let mut profiles = ProfileMap::new();
        for row in rows {
            let (id, profile) = row?
                .into_profile()
                .context("corrupt profile row")?;
            profiles.insert(id, profile);
        }
        Ok(profiles)
    }

    /// Load a single profile.
    pub fn load_profile(&self, id: ProfileKey) -> Result<Option<Profile>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
        let row = stmt.query_row(params![id], map_profile_row).optional()?;
        row.map(|r| r.into_profile().map(|(_, p)| p)).transpose()
    }

    /// Insert a new profile and return its id.
    pub fn insert_profile(&self, profile: &Profile) -> Result<ProfileKey> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO profiles (name, provider, tunnel_name, wifi_rule, mobile_rule,
                ssid_include, ssid_exclude, carrier_include, carrier_exclude,
                priority, enabled, last_activated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                profile.name,
                profile.provider.as_str(),
                profile.tunnel_name,
                profile.wifi_rule.as_str(),
                profile.mobile_rule.as_str(),
                encode_set(&profile.ssid_include)?,
                encode_set(&profile.ssid_exclude)?,
                encode_set(&profile.carrier_include)?,
                encode_set(&profile.carrier_exclude)?,
                profile.priority,
                profile.enabled as i32,
                profile.last_activated_at,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Create or replace the profile stored under `id`.
    pub fn save_profile(&self, id: ProfileKey, profile: &Profile) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO profiles (id, name, provider, tunnel_name, wifi_rule, mobile_rule,
                ssid_include, ssid_exclude, carrier_include, carrier_exclude,
                priority, enabled, last_activated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                id,
                profile.name,
                profile.provider.as_str(),
                profile.tunnel_name,
                profile.wifi_rule.as_str(),
                profile.mobile_rule.as_str(),
                encode_set(&profile.ssid_include)?,
                encode_set(&profile.ssid_exclude)?,
                encode_set(&profile.carrier_include)?,
                encode_set(&profile.carrier_exclude)?,
                profile.priority,
                profile.enabled as i32,
                profile.last_activated_at,
            ],
        )?;
        Ok(())
    }

    /// Record an activation without touching the rest of the row. Returns the
    /// number of rows updated (0 if the profile was deleted meanwhile).
    pub fn touch_profile(&self, id: ProfileKey, activated_at: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE profiles SET last_activated_at = ?1 WHERE id = ?2",
            params![activated_at, id],
        )?;
        Ok(updated)
    }

    /// Delete a profile. Returns the number of rows removed.
    pub fn delete_profile(&self, id: ProfileKey) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM profiles WHERE id = ?1", params![id])?;
        Ok(deleted)
    }
}

fn map_profile_row(row: &rusqlite::Row) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        name: row.get(1)?,
        provider: row.get(2)?,
        tunnel_name: row.get(3)?,
        wifi_rule: row.get(4)?,
        mobile_rule: row.get(5)?,
        ssid_include: row.get(6)?,
        ssid_exclude: row.get(7)?,
        carrier_include: row.get(8)?,
        carrier_exclude: row.get(9)?,
        priority: row.get(10)?,
        enabled: row.get::<_, i32>(11)? != 0,
        last_activated_at: row.get(12)?,
    })
}

fn encode_set(set: &BTreeSet<String>) -> Result<String> {
    Ok(serde_json::to_string(set)?)
}

fn decode_set(raw: &str) -> Result<BTreeSet<String>> {
    serde_json::from_str(raw).with_context(|| format!("invalid name list: {raw}"))
}
