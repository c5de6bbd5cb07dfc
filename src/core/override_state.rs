//! Manual override toggled from the notification action.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum OverrideMode {
    /// Automatic policy drives tunnel state.
    #[default]
    Auto,
    /// The user forced all tunnels down; network changes are ignored.
    Suppressed,
}

#[derive(Debug, Default)]
pub struct OverrideState {
    mode: OverrideMode,
}

impl OverrideState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> OverrideMode {
        self.mode
    }

    pub fn is_suppressed(&self) -> bool {
        self.mode == OverrideMode::Suppressed
    }

    /// Flip between `Auto` and `Suppressed`, returning the new mode.
    pub fn toggle(&mut self) -> OverrideMode {
        self.mode = match self.mode {
            OverrideMode::Auto => OverrideMode::Suppressed,
            OverrideMode::Suppressed => OverrideMode::Auto,
        };
        tracing::info!("Override mode -> {:?}", self.mode);
        self.mode
    }

    /// Back to `Auto`. Returns whether a suppression was cleared.
    pub fn reset(&mut self) -> bool {
        let was_suppressed = self.is_suppressed();
        self.mode = OverrideMode::Auto;
        was_suppressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_in_auto() {
        assert_eq!(OverrideState::new().mode(), OverrideMode::Auto);
    }

    #[test]
    fn test_toggle_alternates() {
        let mut state = OverrideState::new();
        assert_eq!(state.toggle(), OverrideMode::Suppressed);
        assert!(state.is_suppressed());
        assert_eq!(state.toggle(), OverrideMode::Auto);
        assert!(!state.is_suppressed());
    }

    #[test]
    fn test_reset_clears_suppression() {
        let mut state = OverrideState::new();
        assert!(!state.reset());
        state.toggle();
        assert!(state.reset());
        assert_eq!(state.mode(), OverrideMode::Auto);
    }
}
