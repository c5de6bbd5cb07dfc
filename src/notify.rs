//! Notification sink: the persistent "connected via ..." notification with its
//! toggle action.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;

pub trait NotificationSink: Send + Sync {
    fn show_connected(&self, provider_label: &str, tunnel_name: &str);
    /// Shown while tunnels are manually suppressed.
    fn show_disconnected(&self);
    fn clear(&self);
}

/// Sink that reports state through `tracing`.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn show_connected(&self, provider_label: &str, tunnel_name: &str) {
        tracing::info!("[notification] VPN connected via {provider_label} ({tunnel_name})");
    }

    fn show_disconnected(&self) {
        tracing::info!("[notification] VPN disconnected (toggle to resume)");
    }

    fn clear(&self) {
        tracing::debug!("[notification] cleared");
    }
}

/// Forwards to an inner sink only while the toggle notification is enabled.
/// `clear` always passes through so a stale notification never lingers.
pub struct NotificationGate {
    inner: Arc<dyn NotificationSink>,
    enabled: AtomicBool,
}

impl NotificationGate {
    pub fn new(inner: Arc<dyn NotificationSink>, enabled: bool) -> Self {
        Self {
            inner,
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }
}

impl NotificationSink for NotificationGate {
    fn show_connected(&self, provider_label: &str, tunnel_name: &str) {
        if self.is_enabled() {
            self.inner.show_connected(provider_label, tunnel_name);
        }
    }

    fn show_disconnected(&self) {
        if self.is_enabled() {
            self.inner.show_disconnected();
        }
    }

    fn clear(&self) {
        self.inner.clear();
    }
}

/// What a sink was asked to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum NotificationState {
    Connected { provider: String, tunnel: String },
    Disconnected,
    Cleared,
}

/// Sink that keeps every request, newest last.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    history: Mutex<Vec<NotificationState>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<NotificationState> {
        self.history.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<NotificationState> {
        self.history.lock().unwrap().last().cloned()
    }
}

impl NotificationSink for RecordingNotifier {
    fn show_connected(&self, provider_label: &str, tunnel_name: &str) {
        self.history.lock().unwrap().push(NotificationState::Connected {
            provider: provider_label.to_string(),
            tunnel: tunnel_name.to_string(),
        });
    }

    fn show_disconnected(&self) {
        self.history
            .lock()
            .unwrap()
            .push(NotificationState::Disconnected);
    }

    fn clear(&self) {
        self.history.lock().unwrap().push(NotificationState::Cleared);
    }
}
