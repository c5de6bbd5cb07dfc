//! Reload/Check controller.
//!
//! Every trigger (network change, reload, notification toggle) is pushed onto
//! a [`TriggerQueue`] and handled by a single worker task, so at most one
//! orchestration cycle runs at a time. While a cycle is settling the queue
//! keeps accepting triggers; network changes coalesce because each cycle
//! re-reads a fresh snapshot anyway.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{oneshot, Notify};

use crate::config;
use crate::core::{
    matcher, CycleReport, OverrideMode, OverrideState, ProfileKey, ProfileRepository,
    ProviderFamily, TunnelOrchestrator,
};
use crate::db::SettingsStore;
use crate::drivers::DriverRegistry;
use crate::error::AppError;
use crate::network::{read_or_offline, NetworkEvent, SnapshotSource};
use crate::notify::{NotificationGate, NotificationSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Trigger {
    NetworkChanged(NetworkEvent),
    /// The profile list or settings changed.
    Reload,
    /// The toggle action on the notification was pressed.
    NotificationToggle,
}

/// Result of handling one trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CycleOutcome {
    /// The matcher ran and the orchestrator applied its selection.
    Evaluated {
        selected: Option<ProfileKey>,
        report: CycleReport,
    },
    /// Toggled into suppression: every tunnel was stopped.
    Suppressed { stopped: Vec<ProviderFamily> },
    /// Network change while suppressed; nothing was sent.
    Ignored,
}

pub type Reply = oneshot::Sender<Result<CycleOutcome, AppError>>;

struct Pending {
    trigger: Trigger,
    /// Everyone waiting on this trigger's outcome.
    replies: Vec<Reply>,
}

/// Pending triggers for the worker, with coalescing:
/// - a network change is dropped when the newest pending trigger already
///   evaluates (another network change or a reload);
/// - a reload supersedes every pending network change.
///
/// When full, the oldest network change is evicted to make room. A reload
/// with no such room replaces the oldest pending reload and inherits its
/// callers. Only a toggle can be refused.
pub struct TriggerQueue {
    pending: Mutex<VecDeque<Pending>>,
    capacity: usize,
    notify: Notify,
    closed: AtomicBool,
}

impl TriggerQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            capacity,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue a trigger. A closed queue, or a full one with nothing to evict,
    /// answers `reply` with an error.
    pub fn push(&self, trigger: Trigger, reply: Option<Reply>) {
        if self.closed.load(Ordering::Acquire) {
            reject(reply, "controller is shut down");
            return;
        }

        let mut pending = self.pending.lock().unwrap();
        match trigger {
            Trigger::NetworkChanged(_) => {
                let covered = matches!(
                    pending.back().map(|p| p.trigger),
                    Some(Trigger::NetworkChanged(_)) | Some(Trigger::Reload)
                );
                if covered {
                    tracing::debug!("Coalesced {trigger:?} into pending evaluation");
                    return;
                }
            }
            Trigger::Reload => {
                pending.retain(|p| !matches!(p.trigger, Trigger::NetworkChanged(_)));
            }
            Trigger::NotificationToggle => {}
        }

        let mut replies: Vec<Reply> = reply.into_iter().collect();
        if pending.len() >= self.capacity {
            match evict(&mut pending, trigger) {
                Some(evicted) => {
                    tracing::debug!(
                        "Trigger queue full, evicted {:?} for {trigger:?}",
                        evicted.trigger
                    );
                    if matches!(evicted.trigger, Trigger::Reload) {
                        replies.splice(0..0, evicted.replies);
                    } else {
                        reject(evicted.replies, "superseded by a newer trigger");
                    }
                }
                None => {
                    drop(pending);
                    tracing::warn!("Trigger queue full, dropping {trigger:?}");
                    reject(replies, "trigger queue full");
                    return;
                }
            }
        }

        pending.push_back(Pending { trigger, replies });
        drop(pending);
        self.notify.notify_one();
    }

    /// Stop accepting triggers. Already queued ones are still handed out.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    async fn pop(&self) -> Option<Pending> {
        loop {
            let notified = self.notify.notified();
            if let Some(next) = self.pending.lock().unwrap().pop_front() {
                return Some(next);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }

    #[cfg(test)]
    fn triggers(&self) -> Vec<Trigger> {
        self.pending.lock().unwrap().iter().map(|p| p.trigger).collect()
    }
}

/// Remove the oldest entry `incoming` can stand in for: a network change
/// (any later cycle re-reads the network), or for a reload, an earlier reload.
fn evict(pending: &mut VecDeque<Pending>, incoming: Trigger) -> Option<Pending> {
    let position = pending
        .iter()
        .position(|p| matches!(p.trigger, Trigger::NetworkChanged(_)))
        .or_else(|| match incoming {
            Trigger::Reload => pending.iter().position(|p| p.trigger == Trigger::Reload),
            _ => None,
        })?;
    pending.remove(position)
}

fn reject(replies: impl IntoIterator<Item = Reply>, reason: &str) {
    for reply in replies {
        let _ = reply.send(Err(AppError::InvalidInput(reason.to_string())));
    }
}

/// Runs the matcher/orchestrator sequence appropriate for each trigger.
pub struct Controller {
    repository: Arc<dyn ProfileRepository>,
    settings: Arc<dyn SettingsStore>,
    source: Arc<dyn SnapshotSource>,
    orchestrator: TunnelOrchestrator,
    notifier: Arc<NotificationGate>,
    override_state: OverrideState,
}

impl Controller {
    pub fn new(
        repository: Arc<dyn ProfileRepository>,
        settings: Arc<dyn SettingsStore>,
        source: Arc<dyn SnapshotSource>,
        drivers: DriverRegistry,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let current = settings.load_settings().unwrap_or_else(|e| {
            tracing::warn!("Failed to load settings, using defaults: {e}");
            Default::default()
        });
        let notifier = Arc::new(NotificationGate::new(sink, current.show_toggle_notification));
        let orchestrator = TunnelOrchestrator::new(
            Arc::clone(&repository),
            drivers,
            notifier.clone(),
            Duration::from_millis(current.settle_delay_ms),
        );
        Self {
            repository,
            settings,
            source,
            orchestrator,
            notifier,
            override_state: OverrideState::new(),
        }
    }

    pub fn override_mode(&self) -> OverrideMode {
        self.override_state.mode()
    }

    pub async fn handle(&mut self, trigger: Trigger) -> Result<CycleOutcome, AppError> {
        tracing::info!("Handling {trigger:?} (mode {:?})", self.override_state.mode());
        match trigger {
            Trigger::NetworkChanged(_) => {
                if self.override_state.is_suppressed() {
                    self.notifier.show_disconnected();
                    return Ok(CycleOutcome::Ignored);
                }
                self.check().await
            }
            Trigger::Reload => {
                self.reload_settings();
                if self.override_state.reset() {
                    tracing::info!("Reload cleared manual suppression");
                }
                self.notifier.clear();
                self.check().await
            }
            Trigger::NotificationToggle => match self.override_state.toggle() {
                OverrideMode::Suppressed => {
                    let profiles = self.repository.get()?;
                    let stopped = self.orchestrator.shutdown_tunnels(&profiles, None).await;
                    self.notifier.show_disconnected();
                    Ok(CycleOutcome::Suppressed { stopped })
                }
                OverrideMode::Auto => self.check().await,
            },
        }
    }

    fn reload_settings(&mut self) {
        match self.settings.load_settings() {
            Ok(settings) => {
                self.notifier.set_enabled(settings.show_toggle_notification);
                self.orchestrator
                    .set_settle_delay(Duration::from_millis(settings.settle_delay_ms));
            }
            Err(e) => tracing::warn!("Failed to reload settings, keeping current: {e}"),
        }
    }

    /// Read a fresh snapshot, select a profile, and apply it.
    async fn check(&self) -> Result<CycleOutcome, AppError> {
        let profiles = self.repository.get()?;
        let snapshot = read_or_offline(self.source.as_ref());
        let selection = matcher::select(&profiles, &snapshot);

        match selection {
            Some((key, profile)) => tracing::info!(
                "Profile check: matched #{key} '{}' (tunnel '{}')",
                profile.name,
                profile.tunnel_name
            ),
            None => tracing::info!(
                "Profile check: no match (network up: {}, wifi: '{}', carrier: '{}')",
                snapshot.any_non_vpn_network_up,
                snapshot.wifi_ssid,
                snapshot.carrier_name
            ),
        }

        let report = self.orchestrator.apply(&profiles, selection).await?;
        Ok(CycleOutcome::Evaluated {
            selected: selection.map(|(key, _)| key),
            report,
        })
    }
}

/// Cheap, cloneable entry point for everything that produces triggers.
#[derive(Clone)]
pub struct ControllerHandle {
    queue: Arc<TriggerQueue>,
}

impl ControllerHandle {
    pub fn network_changed(&self, event: NetworkEvent) {
        self.queue.push(Trigger::NetworkChanged(event), None);
    }

    /// Queue a reload. The receiver resolves once the resulting cycle ends;
    /// dropping it makes the call fire-and-forget.
    pub fn reload(&self) -> oneshot::Receiver<Result<CycleOutcome, AppError>> {
        self.request(Trigger::Reload)
    }

    pub fn manual_toggle(&self) -> oneshot::Receiver<Result<CycleOutcome, AppError>> {
        self.request(Trigger::NotificationToggle)
    }

    pub fn shutdown(&self) {
        self.queue.close();
    }

    fn request(&self, trigger: Trigger) -> oneshot::Receiver<Result<CycleOutcome, AppError>> {
        let (tx, rx) = oneshot::channel();
        self.queue.push(trigger, Some(tx));
        rx
    }
}

/// Spawn the single worker that owns `controller` and drains its queue.
pub fn spawn(mut controller: Controller) -> (ControllerHandle, tokio::task::JoinHandle<()>) {
    let queue = Arc::new(TriggerQueue::new(config::TRIGGER_QUEUE_CAPACITY));
    let worker_queue = Arc::clone(&queue);

    let worker = tokio::spawn(async move {
        while let Some(Pending { trigger, replies }) = worker_queue.pop().await {
            let result = controller.handle(trigger).await;
            if let Err(e) = &result {
                tracing::warn!("{trigger:?} failed: {e}");
            }
            for reply in replies {
                let _ = reply.send(result.clone());
            }
        }
        tracing::info!("Controller worker stopped");
    });

    (ControllerHandle { queue }, worker)
}
