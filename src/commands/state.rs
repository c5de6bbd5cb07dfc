//! Shared application state handed to every command.

use std::sync::Arc;

use crate::controller::{CycleOutcome, ControllerHandle};
use crate::core::ProfileRepository;
use crate::db::SettingsStore;
use crate::error::AppError;
use crate::network::SnapshotSource;

pub struct AppState {
    pub repository: Arc<dyn ProfileRepository>,
    pub settings: Arc<dyn SettingsStore>,
    pub source: Arc<dyn SnapshotSource>,
    /// Present while the controller worker is running.
    pub controller: Option<ControllerHandle>,
}

impl AppState {
    /// Queue a reload without waiting for it.
    pub(crate) fn notify_changed(&self) {
        if let Some(controller) = &self.controller {
            drop(controller.reload());
        }
    }

    pub(crate) fn controller(&self) -> Result<&ControllerHandle, AppError> {
        self.controller
            .as_ref()
            .ok_or_else(|| AppError::InvalidInput("Controller is not running".into()))
    }
}

pub(crate) async fn await_outcome(
    reply: tokio::sync::oneshot::Receiver<Result<CycleOutcome, AppError>>,
) -> Result<CycleOutcome, AppError> {
    reply
        .await
        .map_err(|_| AppError::InvalidInput("Controller stopped before replying".into()))?
}
