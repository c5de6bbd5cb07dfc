//! Pure business logic behind the profile and settings commands.
//!
//! These functions take plain values (no `AppState`) and can be unit-tested
//! without a repository or controller.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::core::{Profile, ProfileKey, ProfileMap, RuleMode};
use crate::error::AppError;

/// A stored profile together with its key, as shown in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileEntry {
    pub key: ProfileKey,
    #[serde(flatten)]
    pub profile: Profile,
}

/// Listing order: enabled profiles first, then newest (highest key) first.
pub fn listing_order(profiles: ProfileMap) -> Vec<ProfileEntry> {
    let mut entries: Vec<ProfileEntry> = profiles
        .into_iter()
        .map(|(key, profile)| ProfileEntry { key, profile })
        .collect();
    entries.sort_by(|a, b| {
        b.profile
            .enabled
            .cmp(&a.profile.enabled)
            .then(b.key.cmp(&a.key))
    });
    entries
}

/// Reject definitions the controller could never act on.
pub fn validate_profile(profile: &Profile) -> Result<(), AppError> {
    if profile.name.trim().is_empty() {
        return Err(AppError::InvalidInput("Profile name must not be empty".into()));
    }
    if profile.tunnel_name.trim().is_empty() {
        return Err(AppError::InvalidInput("Tunnel name must not be empty".into()));
    }
    for (label, set) in [
        ("SSID include", &profile.ssid_include),
        ("SSID exclude", &profile.ssid_exclude),
        ("carrier include", &profile.carrier_include),
        ("carrier exclude", &profile.carrier_exclude),
    ] {
        if set.iter().any(|name| name.is_empty()) {
            return Err(AppError::InvalidInput(format!(
                "{label} list contains an empty name"
            )));
        }
    }
    if profile.wifi_rule == RuleMode::Some && profile.ssid_include.is_empty() {
        tracing::warn!(
            "Profile '{}' uses Wi-Fi rule 'some' with no SSIDs and will never match Wi-Fi",
            profile.name
        );
    }
    if profile.priority <= 0 {
        tracing::warn!(
            "Profile '{}' has priority {} and will never be selected",
            profile.name,
            profile.priority
        );
    }
    Ok(())
}

/// Parse a comma separated name list. Blank entries are dropped and
/// surrounding whitespace trimmed.
pub fn parse_name_list(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `on`/`off` style switches.
pub fn parse_switch(raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        other => Err(AppError::InvalidInput(format!(
            "Expected on/off, got '{other}'"
        ))),
    }
}
