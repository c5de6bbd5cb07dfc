//! Tunnel orchestration: stop every other tunnel, let the providers settle,
//! then start the selected one.
//!
//! One cycle walks `Idle → ShuttingDown → (Settling) → Activating → Idle`.
//! Settling is skipped when nothing was stopped. Stop commands are sent at
//! most once per [`ProviderFamily`] per cycle, since overlapping commands to
//! the same provider app are unsafe. Driver failures are logged and swallowed;
//! every phase still runs.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::db;
use crate::drivers::{DriverRegistry, TunnelCommand};
use crate::error::AppError;
use crate::notify::NotificationSink;

use super::profile::{Profile, ProfileKey, ProfileMap, ProviderFamily};
use super::repository::ProfileRepository;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CyclePhase {
    Idle,
    ShuttingDown,
    Settling,
    Activating,
}

/// What one orchestration cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Families a stop command was sent to, in send order.
    pub stopped: Vec<ProviderFamily>,
    pub settled: bool,
    /// Profile whose start command was handed to its driver.
    pub activated: Option<ProfileKey>,
}

pub struct TunnelOrchestrator {
    repository: Arc<dyn ProfileRepository>,
    drivers: DriverRegistry,
    notifier: Arc<dyn NotificationSink>,
    settle_delay: Duration,
    phase: Mutex<CyclePhase>,
}

impl TunnelOrchestrator {
    pub fn new(
        repository: Arc<dyn ProfileRepository>,
        drivers: DriverRegistry,
        notifier: Arc<dyn NotificationSink>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            repository,
            drivers,
            notifier,
            settle_delay,
            phase: Mutex::new(CyclePhase::Idle),
        }
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.lock().unwrap()
    }

    pub fn set_settle_delay(&mut self, delay: Duration) {
        self.settle_delay = delay;
    }

    fn enter(&self, phase: CyclePhase) {
        tracing::debug!("Orchestrator phase -> {phase:?}");
        *self.phase.lock().unwrap() = phase;
    }

    /// Run one full cycle for `selection` (or tear everything down for `None`).
    ///
    /// A repository failure while recording the activation is returned, but
    /// only after all tunnel commands were dispatched.
    pub async fn apply(
        &self,
        profiles: &ProfileMap,
        selection: Option<(ProfileKey, &Profile)>,
    ) -> Result<CycleReport, AppError> {
        let mut report = CycleReport {
            stopped: self.shutdown_tunnels(profiles, selection.map(|(key, _)| key)).await,
            ..CycleReport::default()
        };

        if !report.stopped.is_empty() && selection.is_some() {
            self.enter(CyclePhase::Settling);
            tokio::time::sleep(self.settle_delay).await;
            report.settled = true;
        }

        let Some((key, profile)) = selection else {
            self.enter(CyclePhase::Idle);
            tracing::info!("No profile selected, {} provider(s) stopped", report.stopped.len());
            self.notifier.clear();
            return Ok(report);
        };

        self.enter(CyclePhase::Activating);
        let result = self.drivers.dispatch(&TunnelCommand::start(profile)).await;
        self.enter(CyclePhase::Idle);

        if let Err(e) = result {
            tracing::warn!(
                "Failed to activate '{}' via {}: {e}",
                profile.name,
                profile.provider
            );
            self.notifier.clear();
            return Ok(report);
        }

        report.activated = Some(key);
        tracing::info!(
            "Activated profile '{}' (tunnel '{}' via {})",
            profile.name,
            profile.tunnel_name,
            profile.provider
        );
        self.notifier
            .show_connected(profile.provider.label(), &profile.tunnel_name);

        self.repository.touch(key, db::chrono_timestamp())?;

        Ok(report)
    }

    /// Send a stop command for every profile except `except`, once per
    /// provider family. Returns the families that were sent a stop.
    pub async fn shutdown_tunnels(
        &self,
        profiles: &ProfileMap,
        except: Option<ProfileKey>,
    ) -> Vec<ProviderFamily> {
        self.enter(CyclePhase::ShuttingDown);

        let mut sent: HashSet<ProviderFamily> = HashSet::new();
        let mut stopped = Vec::new();

        for (key, profile) in profiles {
            if Some(*key) == except {
                continue;
            }
            let family = profile.provider.family();
            if !sent.insert(family) {
                continue;
            }

            if let Err(e) = self.drivers.dispatch(&TunnelCommand::stop(profile)).await {
                tracing::warn!("Failed to stop {} tunnel '{}': {e}", profile.provider, profile.tunnel_name);
            }
            stopped.push(family);
        }

        self.enter(CyclePhase::Idle);
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::profile::Provider;
    use crate::core::repository::MemoryRepository;
    use crate::drivers::RecordingDriver;
    use crate::notify::{NotificationState, RecordingNotifier};

    struct Harness {
        repo: Arc<MemoryRepository>,
        driver: Arc<RecordingDriver>,
        notifier: Arc<RecordingNotifier>,
        orchestrator: TunnelOrchestrator,
    }

    fn harness() -> Harness {
        let repo = Arc::new(MemoryRepository::new());
        let driver = Arc::new(RecordingDriver::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let orchestrator = TunnelOrchestrator::new(
            repo.clone(),
            DriverRegistry::uniform(driver.clone()),
            notifier.clone(),
            Duration::from_millis(crate::config::SETTLE_DELAY_MS),
        );
        Harness {
            repo,
            driver,
            notifier,
            orchestrator,
        }
    }

    fn store(h: &Harness, name: &str, provider: Provider) -> ProfileKey {
        h.repo.insert(&Profile::new(name, provider, name)).unwrap()
    }

    #[tokio::test]
    async fn test_shutdown_dedups_per_family() {
        let h = harness();
        store(&h, "ics-a", Provider::IcsOpenVpn);
        store(&h, "ics-b", Provider::IcsOpenVpn);
        store(&h, "pc", Provider::OpenVpnProfile);
        store(&h, "as", Provider::OpenVpnAccessServer);
        store(&h, "wg-a", Provider::WireguardLike);
        store(&h, "wg-b", Provider::WireguardLike);

        let profiles = h.repo.get().unwrap();
        let stopped = h.orchestrator.shutdown_tunnels(&profiles, None).await;

        assert_eq!(
            stopped,
            vec![
                ProviderFamily::IcsOpenVpn,
                ProviderFamily::OpenVpnConnect,
                ProviderFamily::Wireguard
            ]
        );
        let commands = h.driver.commands();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0].tunnel_name, "ics-a");
        assert_eq!(commands[1].tunnel_name, "pc");
        assert_eq!(commands[2].tunnel_name, "wg-a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_family_selection_stops_other_then_settles() {
        let h = harness();
        let a = store(&h, "a", Provider::IcsOpenVpn);
        store(&h, "b", Provider::IcsOpenVpn);
        let profiles = h.repo.get().unwrap();
        let selected = (a, profiles.get(&a).unwrap());

        let started = tokio::time::Instant::now();
        let report = h.orchestrator.apply(&profiles, Some(selected)).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(1500));
        assert!(report.settled);
        assert_eq!(report.activated, Some(a));
        let commands = h.driver.commands();
        assert_eq!(commands.len(), 2);
        assert!(!commands[0].up);
        assert_eq!(commands[0].tunnel_name, "b");
        assert!(commands[1].up);
        assert_eq!(commands[1].tunnel_name, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_settle_when_nothing_stopped() {
        let h = harness();
        let only = store(&h, "only", Provider::WireguardLike);
        let profiles = h.repo.get().unwrap();

        let started = tokio::time::Instant::now();
        let report = h
            .orchestrator
            .apply(&profiles, Some((only, profiles.get(&only).unwrap())))
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert!(!report.settled);
        assert!(report.stopped.is_empty());
        assert_eq!(h.driver.commands().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_selection_only_shuts_down_and_clears() {
        let h = harness();
        store(&h, "wg", Provider::WireguardLike);
        store(&h, "ics", Provider::IcsOpenVpn);
        let profiles = h.repo.get().unwrap();

        let report = h.orchestrator.apply(&profiles, None).await.unwrap();

        assert_eq!(report.stopped.len(), 2);
        assert!(!report.settled);
        assert_eq!(report.activated, None);
        assert!(h.driver.commands().iter().all(|c| !c.up));
        assert_eq!(h.notifier.last(), Some(NotificationState::Cleared));
    }

    #[tokio::test]
    async fn test_activation_records_timestamp_and_notifies() {
        let h = harness();
        let key = store(&h, "home", Provider::WireguardLike);
        let profiles = h.repo.get().unwrap();

        h.orchestrator
            .apply(&profiles, Some((key, profiles.get(&key).unwrap())))
            .await
            .unwrap();

        assert!(h.repo.find(key).unwrap().unwrap().last_activated_at.is_some());
        assert_eq!(
            h.notifier.last(),
            Some(NotificationState::Connected {
                provider: "WireGuard".into(),
                tunnel: "home".into()
            })
        );
        assert_eq!(h.orchestrator.phase(), CyclePhase::Idle);
    }

    #[tokio::test]
    async fn test_missing_driver_does_not_block_activation() {
        let repo = Arc::new(MemoryRepository::new());
        let driver = Arc::new(RecordingDriver::new());
        let mut drivers = DriverRegistry::new();
        drivers.register(Provider::WireguardLike, driver.clone());
        let orchestrator = TunnelOrchestrator::new(
            repo.clone(),
            drivers,
            Arc::new(RecordingNotifier::new()),
            Duration::ZERO,
        );

        repo.insert(&Profile::new("ics", Provider::IcsOpenVpn, "ics")).unwrap();
        let wg = repo.insert(&Profile::new("wg", Provider::WireguardLike, "wg")).unwrap();
        let profiles = repo.get().unwrap();

        let report = orchestrator
            .apply(&profiles, Some((wg, profiles.get(&wg).unwrap())))
            .await
            .unwrap();

        assert_eq!(report.stopped, vec![ProviderFamily::IcsOpenVpn]);
        assert_eq!(report.activated, Some(wg));
        assert_eq!(driver.commands().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_activation_is_swallowed_without_timestamp() {
        let repo = Arc::new(MemoryRepository::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let orchestrator = TunnelOrchestrator::new(
            repo.clone(),
            DriverRegistry::new(),
            notifier.clone(),
            Duration::ZERO,
        );
        let key = repo.insert(&Profile::new("wg", Provider::WireguardLike, "wg")).unwrap();
        let profiles = repo.get().unwrap();

        let report = orchestrator
            .apply(&profiles, Some((key, profiles.get(&key).unwrap())))
            .await
            .unwrap();

        assert_eq!(report.activated, None);
        assert!(repo.find(key).unwrap().unwrap().last_activated_at.is_none());
        assert_eq!(notifier.last(), Some(NotificationState::Cleared));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wireguard_stop_covers_every_tunnel_of_the_family() {
        let h = harness();
        store(&h, "wg-a", Provider::WireguardLike);
        let b = store(&h, "wg-b", Provider::WireguardLike);
        // Previously active tunnel, last in key order.
        store(&h, "wg-c", Provider::WireguardLike);
        let profiles = h.repo.get().unwrap();

        let report = h
            .orchestrator
            .apply(&profiles, Some((b, profiles.get(&b).unwrap())))
            .await
            .unwrap();

        assert_eq!(report.stopped, vec![ProviderFamily::Wireguard]);
        let commands = h.driver.commands();
        let stops: Vec<_> = commands.iter().filter(|c| !c.up).collect();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].tunnel_name, "wg-a");
        assert_eq!(commands.last().map(|c| (c.up, c.tunnel_name.as_str())), Some((true, "wg-b")));

        // The single stop must not be bound to wg-a, or wg-c stays up.
        let (_, down) = crate::config::default_provider_commands(Provider::WireguardLike);
        assert!(down.is_provider_wide());
        assert!(down.render(stops[0]).iter().all(|a| !a.contains("wg-a")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_deleted_while_settling_stays_deleted() {
        let h = harness();
        let a = store(&h, "a", Provider::WireguardLike);
        store(&h, "b", Provider::IcsOpenVpn);
        let profiles = h.repo.get().unwrap();
        let selected = (a, profiles.get(&a).unwrap());

        let (report, _) = tokio::join!(h.orchestrator.apply(&profiles, Some(selected)), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            h.repo.delete(a).unwrap();
        });

        let report = report.unwrap();
        assert!(report.settled);
        assert_eq!(report.activated, Some(a));
        assert!(h.driver.commands().iter().any(|c| c.up && c.tunnel_name == "a"));
        assert!(h.repo.find(a).unwrap().is_none());
        assert_eq!(h.repo.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_edited_while_settling_keeps_edit() {
        let h = harness();
        let a = store(&h, "a", Provider::WireguardLike);
        store(&h, "b", Provider::IcsOpenVpn);
        let profiles = h.repo.get().unwrap();
        let selected = (a, profiles.get(&a).unwrap());

        let (report, _) = tokio::join!(h.orchestrator.apply(&profiles, Some(selected)), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let mut edited = Profile::new("a (edited)", Provider::WireguardLike, "wg9");
            edited.enabled = false;
            h.repo.put(a, &edited).unwrap();
        });

        report.unwrap();
        let stored = h.repo.find(a).unwrap().unwrap();
        assert_eq!(stored.name, "a (edited)");
        assert_eq!(stored.tunnel_name, "wg9");
        assert!(!stored.enabled);
        assert!(stored.last_activated_at.is_some());
    }

    /// Reads work, every write fails.
    struct ReadOnlyRepository(MemoryRepository);

    impl ProfileRepository for ReadOnlyRepository {
        fn get(&self) -> Result<ProfileMap, AppError> {
            self.0.get()
        }
        fn put(&self, _: ProfileKey, _: &Profile) -> Result<(), AppError> {
            Err(AppError::Repository("database is locked".into()))
        }
        fn delete(&self, _: ProfileKey) -> Result<(), AppError> {
            Err(AppError::Repository("database is locked".into()))
        }
        fn insert(&self, _: &Profile) -> Result<ProfileKey, AppError> {
            Err(AppError::Repository("database is locked".into()))
        }
        fn touch(&self, _: ProfileKey, _: i64) -> Result<(), AppError> {
            Err(AppError::Repository("database is locked".into()))
        }
    }

    #[tokio::test]
    async fn test_timestamp_write_failure_after_dispatch_is_returned() {
        let memory = MemoryRepository::new();
        let key = memory.insert(&Profile::new("home", Provider::WireguardLike, "wg0")).unwrap();
        let repo = Arc::new(ReadOnlyRepository(memory));
        let driver = Arc::new(RecordingDriver::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let orchestrator = TunnelOrchestrator::new(
            repo.clone(),
            DriverRegistry::uniform(driver.clone()),
            notifier.clone(),
            Duration::ZERO,
        );
        let profiles = repo.get().unwrap();

        let err = orchestrator
            .apply(&profiles, Some((key, profiles.get(&key).unwrap())))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "Repository");
        let commands = driver.commands();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].up);
        assert_eq!(commands[0].tunnel_name, "wg0");
        assert_eq!(
            notifier.last(),
            Some(NotificationState::Connected {
                provider: "WireGuard".into(),
                tunnel: "wg0".into()
            })
        );
        assert_eq!(orchestrator.phase(), CyclePhase::Idle);
    }
}
