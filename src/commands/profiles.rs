//! Profile management commands. Every successful change queues a reload.

use crate::core::{Profile, ProfileKey};
use crate::error::AppError;

use super::logic::{listing_order, validate_profile, ProfileEntry};
use super::state::AppState;

pub fn list_profiles(state: &AppState) -> Result<Vec<ProfileEntry>, AppError> {
    Ok(listing_order(state.repository.get()?))
}

pub fn get_profile(state: &AppState, key: ProfileKey) -> Result<Profile, AppError> {
    state
        .repository
        .find(key)?
        .ok_or_else(|| AppError::NotFound(format!("No profile with id {key}")))
}

/// Store a profile definition. With a key, the stored profile is replaced
/// but keeps its `enabled` flag and last activation time; without one a new
/// enabled profile is created.
pub fn save_profile(
    state: &AppState,
    key: Option<ProfileKey>,
    mut profile: Profile,
) -> Result<ProfileKey, AppError> {
    validate_profile(&profile)?;

    let key = match key {
        Some(key) => {
            let previous = get_profile(state, key)?;
            profile.carry_over_from(Some(&previous));
            state.repository.put(key, &profile)?;
            tracing::info!("Updated profile #{key} '{}'", profile.name);
            key
        }
        None => {
            profile.carry_over_from(None);
            let key = state.repository.insert(&profile)?;
            tracing::info!("Created profile #{key} '{}'", profile.name);
            key
        }
    };

    state.notify_changed();
    Ok(key)
}

pub fn delete_profile(state: &AppState, key: ProfileKey) -> Result<(), AppError> {
    let profile = get_profile(state, key)?;
    state.repository.delete(key)?;
    tracing::info!("Deleted profile #{key} '{}'", profile.name);
    state.notify_changed();
    Ok(())
}

/// Flip the `enabled` flag. Returns the new value.
pub fn toggle_profile_enabled(state: &AppState, key: ProfileKey) -> Result<bool, AppError> {
    let mut profile = get_profile(state, key)?;
    profile.enabled = !profile.enabled;
    state.repository.put(key, &profile)?;
    tracing::info!(
        "Profile #{key} '{}' {}",
        profile.name,
        if profile.enabled { "enabled" } else { "disabled" }
    );
    state.notify_changed();
    Ok(profile.enabled)
}
