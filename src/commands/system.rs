//! Settings, manual checks, and the notification toggle.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::controller::CycleOutcome;
use crate::core::{matcher, MemoryRepository, ProfileRepository, TunnelOrchestrator};
use crate::db::Settings;
use crate::drivers::{DriverRegistry, RecordingDriver, TunnelCommand};
use crate::error::AppError;
use crate::network::{read_or_offline, NetworkSnapshot};
use crate::notify::RecordingNotifier;

use super::logic::ProfileEntry;
use super::state::{await_outcome, AppState};

// ---- Settings ----

pub fn get_settings(state: &AppState) -> Result<Settings, AppError> {
    state.settings.load_settings()
}

/// Show or hide the toggle notification. Takes effect through a reload.
pub fn set_show_toggle_notification(state: &AppState, enabled: bool) -> Result<(), AppError> {
    let mut settings = state.settings.load_settings()?;
    if settings.show_toggle_notification == enabled {
        return Ok(());
    }
    settings.show_toggle_notification = enabled;
    state.settings.save_settings(&settings)?;
    tracing::info!("Toggle notification {}", if enabled { "enabled" } else { "disabled" });
    state.notify_changed();
    Ok(())
}

pub fn set_settle_delay(state: &AppState, delay_ms: u64) -> Result<(), AppError> {
    let mut settings = state.settings.load_settings()?;
    settings.settle_delay_ms = delay_ms;
    state.settings.save_settings(&settings)?;
    tracing::info!("Settle delay set to {delay_ms} ms");
    state.notify_changed();
    Ok(())
}

// ---- Controller triggers ----

/// Reload and wait for the resulting cycle.
pub async fn check_now(state: &AppState) -> Result<CycleOutcome, AppError> {
    await_outcome(state.controller()?.reload()).await
}

/// Press the notification's toggle action and wait for the result.
pub async fn toggle_override(state: &AppState) -> Result<CycleOutcome, AppError> {
    await_outcome(state.controller()?.manual_toggle()).await
}

// ---- Dry run ----

/// What a check would do right now, without touching any tunnel.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub snapshot: NetworkSnapshot,
    pub selected: Option<ProfileEntry>,
    /// Commands a real cycle would send, in order.
    pub commands: Vec<TunnelCommand>,
}

pub async fn dry_run_check(state: &AppState) -> Result<CheckReport, AppError> {
    let profiles = state.repository.get()?;
    let snapshot = read_or_offline(state.source.as_ref());
    let selection = matcher::select(&profiles, &snapshot);

    // Scratch copy so the recorded activation time is not persisted.
    let scratch = Arc::new(MemoryRepository::new());
    for (key, profile) in &profiles {
        scratch.put(*key, profile)?;
    }
    let driver = Arc::new(RecordingDriver::new());
    let orchestrator = TunnelOrchestrator::new(
        scratch,
        DriverRegistry::uniform(driver.clone()),
        Arc::new(RecordingNotifier::new()),
        Duration::ZERO,
    );
    orchestrator.apply(&profiles, selection).await?;

    Ok(CheckReport {
        selected: selection.map(|(key, profile)| ProfileEntry {
            key,
            profile: profile.clone(),
        }),
        snapshot,
        commands: driver.commands(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Profile, Provider, RuleMode};
    use crate::db::StaticSettings;
    use crate::network::StaticSource;

    fn state(snapshot: NetworkSnapshot) -> AppState {
        AppState {
            repository: Arc::new(MemoryRepository::new()),
            settings: Arc::new(StaticSettings::default()),
            source: Arc::new(StaticSource::new(snapshot)),
            controller: None,
        }
    }

    #[test]
    fn test_set_show_toggle_notification_persists() {
        let state = state(NetworkSnapshot::offline());
        set_show_toggle_notification(&state, true).unwrap();
        assert!(get_settings(&state).unwrap().show_toggle_notification);
        set_show_toggle_notification(&state, false).unwrap();
        assert!(!get_settings(&state).unwrap().show_toggle_notification);
    }

    #[test]
    fn test_set_settle_delay() {
        let state = state(NetworkSnapshot::offline());
        set_settle_delay(&state, 250).unwrap();
        assert_eq!(get_settings(&state).unwrap().settle_delay_ms, 250);
    }

    #[tokio::test]
    async fn test_triggers_need_running_controller() {
        let state = state(NetworkSnapshot::offline());
        assert_eq!(check_now(&state).await.unwrap_err().kind(), "InvalidInput");
        assert_eq!(toggle_override(&state).await.unwrap_err().kind(), "InvalidInput");
    }

    #[tokio::test]
    async fn test_dry_run_reports_commands_without_persisting() {
        let state = state(NetworkSnapshot::wifi("\"Home\""));
        let mut home = Profile::new("home", Provider::OpenVpnProfile, "home");
        home.wifi_rule = RuleMode::Some;
        home.ssid_include = ["Home".to_string()].into();
        let home_key = state.repository.insert(&home).unwrap();
        state
            .repository
            .insert(&Profile::new("wg", Provider::WireguardLike, "wg0"))
            .unwrap();

        let report = dry_run_check(&state).await.unwrap();

        assert_eq!(report.selected.as_ref().map(|e| e.key), Some(home_key));
        assert_eq!(report.snapshot.wifi_ssid, "Home");
        assert_eq!(
            report.commands,
            vec![
                TunnelCommand {
                    provider: Provider::WireguardLike,
                    tunnel_name: "wg0".into(),
                    up: false
                },
                TunnelCommand {
                    provider: Provider::OpenVpnProfile,
                    tunnel_name: "home".into(),
                    up: true
                },
            ]
        );
        let stored = state.repository.find(home_key).unwrap().unwrap();
        assert_eq!(stored.last_activated_at, None);
    }

    #[tokio::test]
    async fn test_dry_run_offline_selects_nothing() {
        let state = state(NetworkSnapshot::offline());
        let report = dry_run_check(&state).await.unwrap();
        assert!(report.selected.is_none());
        assert!(report.commands.is_empty());
    }
}
