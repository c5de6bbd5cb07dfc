//! Core logic: profile model, selection policy, tunnel orchestration.
//!
//! - [`Profile`] / [`Provider`] / [`RuleMode`] — match criteria and runtime state
//! - [`matcher::select`] — pure profile selection for a network snapshot
//! - [`TunnelOrchestrator`] — shutdown → settle → activate cycles
//! - [`OverrideState`] — manual suppression from the notification toggle
//! - [`ProfileRepository`] — storage interface (+ in-memory implementation)

pub mod matcher;
pub mod orchestrator;
pub mod override_state;
pub mod profile;
pub mod repository;

pub use matcher::select;
pub use orchestrator::{CyclePhase, CycleReport, TunnelOrchestrator};
pub use override_state::{OverrideMode, OverrideState};
pub use profile::{Profile, ProfileKey, ProfileMap, Provider, ProviderFamily, RuleMode};
pub use repository::{MemoryRepository, ProfileRepository};
