//! Command handlers behind the CLI, organized by functional domain.
//!
//! - `profiles`: profile CRUD and the enabled toggle
//! - `system`: settings, manual checks, the notification toggle, dry runs
//! - `logic`: Pure business logic functions (unit-testable)
//! - `state`: Shared `AppState` definition

pub(crate) mod logic;
pub mod profiles;
mod state;
pub mod system;

pub use logic::{parse_name_list, parse_switch, ProfileEntry};
pub use state::AppState;
pub use system::CheckReport;
