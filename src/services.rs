//! Background service lifecycle management.
//!
//! `BackgroundServices` owns everything spawned for a `run` session,
//! starting it in dependency order and providing clean shutdown:
//! 1. Controller worker (drains the trigger queue)
//! 2. Initial reload (the first check after start-up)
//! 3. Network observer thread (feeds network changes to the worker)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use crate::controller::{self, Controller, ControllerHandle};
use crate::network::{NetworkObserver, SnapshotSource};

pub struct BackgroundServices {
    handle: ControllerHandle,
    worker: tokio::task::JoinHandle<()>,
    observer: NetworkObserver,
}

impl BackgroundServices {
    /// Start all background services. Must be called inside a tokio runtime.
    pub fn start(
        controller: Controller,
        source: Arc<dyn SnapshotSource>,
        poll_interval: Duration,
    ) -> Result<Self> {
        let (handle, worker) = controller::spawn(controller);

        drop(handle.reload());

        let observer_handle = handle.clone();
        let observer = NetworkObserver::start(source, poll_interval, move |event| {
            observer_handle.network_changed(event)
        })?;

        tracing::info!("Background services started");
        Ok(Self {
            handle,
            worker,
            observer,
        })
    }

    pub fn handle(&self) -> &ControllerHandle {
        &self.handle
    }

    /// Stop observing, let the worker finish queued triggers, and wait for it.
    pub async fn shutdown(self) {
        let Self {
            handle,
            worker,
            observer,
        } = self;
        drop(observer);
        handle.shutdown();
        if let Err(e) = worker.await {
            tracing::warn!("Controller worker ended abnormally: {e}");
        }
        tracing::info!("Background services stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MemoryRepository, Profile, ProfileRepository, Provider, RuleMode};
    use crate::db::{Settings, StaticSettings};
    use crate::drivers::{DriverRegistry, RecordingDriver};
    use crate::network::{NetworkSnapshot, StaticSource};
    use crate::notify::RecordingNotifier;

    async fn wait_for(driver: &RecordingDriver, count: usize) {
        for _ in 0..200 {
            if driver.commands().len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} commands, got {:?}", driver.commands());
    }

    #[tokio::test]
    async fn test_observer_changes_drive_the_controller() {
        let repo = Arc::new(MemoryRepository::new());
        let mut office = Profile::new("office", Provider::WireguardLike, "wg-office");
        office.wifi_rule = RuleMode::Some;
        office.ssid_include = ["Office".to_string()].into();
        repo.insert(&office).unwrap();

        let source = Arc::new(StaticSource::new(NetworkSnapshot::offline()));
        let driver = Arc::new(RecordingDriver::new());
        let controller = Controller::new(
            repo.clone(),
            Arc::new(StaticSettings::new(Settings {
                show_toggle_notification: false,
                settle_delay_ms: 0,
            })),
            source.clone(),
            DriverRegistry::uniform(driver.clone()),
            Arc::new(RecordingNotifier::new()),
        );

        let services =
            BackgroundServices::start(controller, source.clone(), Duration::from_millis(10))
                .unwrap();

        // Initial reload while offline stops the only tunnel.
        wait_for(&driver, 1).await;
        assert!(!driver.commands()[0].up);

        source.set(NetworkSnapshot::wifi("Office"));
        wait_for(&driver, 2).await;
        let last = driver.commands().last().cloned().unwrap();
        assert!(last.up);
        assert_eq!(last.tunnel_name, "wg-office");

        services.shutdown().await;
    }
}
