//! Network attachment detection.
//!
//! A [`SnapshotSource`] reads the current attachment (Wi-Fi SSID, carrier,
//! whether any non-VPN network is up). The [`NetworkObserver`] polls a source
//! on a background thread and reports changes as [`NetworkEvent`]s. Consumers
//! always re-read a fresh snapshot instead of trusting the event payload.
//!
//! - `nmcli`: NetworkManager-backed source (Linux)

pub mod nmcli;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

use crate::error::AppError;

pub use nmcli::NmcliSource;

/// Point-in-time read of current connectivity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkSnapshot {
    pub any_non_vpn_network_up: bool,
    pub wifi_connected: bool,
    pub wifi_ssid: String,
    pub carrier_name: String,
}

impl NetworkSnapshot {
    /// No usable network at all.
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn wifi(ssid: impl Into<String>) -> Self {
        Self {
            any_non_vpn_network_up: true,
            wifi_connected: true,
            wifi_ssid: normalize_ssid(&ssid.into()),
            carrier_name: String::new(),
        }
    }

    pub fn mobile(carrier: impl Into<String>) -> Self {
        Self {
            any_non_vpn_network_up: true,
            wifi_connected: false,
            wifi_ssid: String::new(),
            carrier_name: carrier.into(),
        }
    }

    /// Reject internally inconsistent observer state.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.wifi_connected && self.wifi_ssid.is_empty() {
            return Err(AppError::MalformedSnapshot(
                "Wi-Fi reported connected without an SSID".into(),
            ));
        }
        if self.wifi_connected && !self.any_non_vpn_network_up {
            return Err(AppError::MalformedSnapshot(
                "Wi-Fi reported connected while no network is up".into(),
            ));
        }
        Ok(())
    }
}

/// Connectivity change reported by the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkEvent {
    Available,
    Lost,
}

/// Anything that can report the current network attachment.
pub trait SnapshotSource: Send + Sync {
    fn read(&self) -> anyhow::Result<NetworkSnapshot>;
}

/// Source with a snapshot set by hand. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct StaticSource {
    snapshot: Mutex<NetworkSnapshot>,
}

impl StaticSource {
    pub fn new(snapshot: NetworkSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
        }
    }

    pub fn set(&self, snapshot: NetworkSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }
}

impl SnapshotSource for StaticSource {
    fn read(&self) -> anyhow::Result<NetworkSnapshot> {
        Ok(self.snapshot.lock().unwrap().clone())
    }
}

/// Strip the double quotes some platforms wrap SSIDs in.
pub fn normalize_ssid(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_prefix = trimmed.strip_prefix('"').unwrap_or(trimmed);
    without_prefix
        .strip_suffix('"')
        .unwrap_or(without_prefix)
        .to_string()
}

/// Classify the change between two consecutive snapshots, if any.
pub fn classify_change(previous: &NetworkSnapshot, current: &NetworkSnapshot) -> Option<NetworkEvent> {
    if previous == current {
        return None;
    }
    if previous.any_non_vpn_network_up && !current.any_non_vpn_network_up {
        Some(NetworkEvent::Lost)
    } else {
        Some(NetworkEvent::Available)
    }
}

/// Polls a [`SnapshotSource`] on a background thread and forwards changes.
/// The thread stops when the observer is dropped.
pub struct NetworkObserver {
    shutdown: Arc<AtomicBool>,
    _poll_thread: Option<std::thread::JoinHandle<()>>,
}

impl NetworkObserver {
    pub fn start<F>(
        source: Arc<dyn SnapshotSource>,
        interval: Duration,
        on_change: F,
    ) -> anyhow::Result<Self>
    where
        F: Fn(NetworkEvent) + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);

        let thread = std::thread::Builder::new()
            .name("network-observer".into())
            .spawn(move || {
                let mut previous = read_or_offline(source.as_ref());
                while !shutdown_clone.load(Ordering::Relaxed) {
                    std::thread::sleep(interval);
                    let current = read_or_offline(source.as_ref());
                    if let Some(event) = classify_change(&previous, &current) {
                        tracing::info!(
                            "Network {event:?}: wifi={} ssid='{}' carrier='{}'",
                            current.wifi_connected,
                            current.wifi_ssid,
                            current.carrier_name
                        );
                        on_change(event);
                    }
                    previous = current;
                }
                tracing::debug!("Network observer stopped");
            })?;

        tracing::info!("Network observer started ({}ms poll)", interval.as_millis());
        Ok(Self {
            shutdown,
            _poll_thread: Some(thread),
        })
    }
}

impl Drop for NetworkObserver {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

/// Read a snapshot; a failing source counts as "offline".
pub fn read_or_offline(source: &dyn SnapshotSource) -> NetworkSnapshot {
    match source.read() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!("Failed to read network state: {e:#}");
            NetworkSnapshot::offline()
        }
    }
}
