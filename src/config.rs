//! Centralized runtime constants for tunnelswitch.
//!
//! All tunable intervals, bounds, default provider command lines, and settings
//! keys are collected here so they can be found and adjusted in a single place
//! rather than scattered across modules.

use crate::core::profile::Provider;
use crate::drivers::CommandTemplate;

/// Grace period between stopping tunnels and starting the selected one, so the
/// provider can release its interface first (milliseconds).
pub const SETTLE_DELAY_MS: u64 = 1500;

/// Interval at which the network observer re-reads connectivity (milliseconds).
pub const NETWORK_POLL_INTERVAL_MS: u64 = 2000;

/// Maximum number of pending controller triggers. Network changes coalesce, so
/// only user actions can fill this.
pub const TRIGGER_QUEUE_CAPACITY: usize = 32;

/// File name of the SQLite database inside the data directory.
pub const DATABASE_FILE_NAME: &str = "tunnelswitch.db";

/// Settings key: show the connected/suppressed notification with its toggle action.
pub const SETTING_SHOW_TOGGLE_NOTIFICATION: &str = "show_toggle_notification";

/// Settings key: override of [`SETTLE_DELAY_MS`].
pub const SETTING_SETTLE_DELAY_MS: &str = "settle_delay_ms";

/// Shell loop taking down every WireGuard interface that is up.
const WIREGUARD_DOWN_ALL: &str =
    "for iface in $(wg show interfaces); do wg-quick down \"$iface\"; done";

/// Default (up, down) command lines for a provider. `{tunnel}` is replaced
/// with the tunnel name. Stop commands are provider-wide, since shutdown sends
/// one stop per provider family.
pub fn default_provider_commands(provider: Provider) -> (CommandTemplate, CommandTemplate) {
    match provider {
        Provider::WireguardLike => (
            CommandTemplate::new("wg-quick", &["up", "{tunnel}"]),
            CommandTemplate::new("sh", &["-c", WIREGUARD_DOWN_ALL]),
        ),
        Provider::OpenVpnProfile | Provider::OpenVpnAccessServer => (
            CommandTemplate::new("openvpn3", &["session-start", "--config", "{tunnel}"]),
            CommandTemplate::new("pkill", &["-TERM", "-f", "openvpn3-service-client"]),
        ),
        Provider::IcsOpenVpn => (
            CommandTemplate::new("openvpn", &["--daemon", "--config", "{tunnel}"]),
            CommandTemplate::new("pkill", &["-TERM", "-x", "openvpn"]),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time sanity: all constants are positive.
    #[test]
    fn test_all_intervals_positive() {
        const _: () = assert!(SETTLE_DELAY_MS > 0);
        const _: () = assert!(NETWORK_POLL_INTERVAL_MS > 0);
        const _: () = assert!(TRIGGER_QUEUE_CAPACITY > 0);
    }

    #[test]
    fn test_shared_family_shares_stop_command() {
        let (_, profile_down) = default_provider_commands(Provider::OpenVpnProfile);
        let (_, as_down) = default_provider_commands(Provider::OpenVpnAccessServer);
        assert_eq!(profile_down, as_down);
    }

    #[test]
    fn test_stop_commands_are_provider_wide() {
        for provider in Provider::ALL {
            let (_, down) = default_provider_commands(provider);
            assert!(
                down.is_provider_wide(),
                "{provider} stop command must not depend on one tunnel"
            );
        }
    }

    #[test]
    fn test_start_commands_name_the_tunnel() {
        for provider in Provider::ALL {
            let (up, _) = default_provider_commands(provider);
            assert!(
                up.args.iter().any(|a| a.contains("{tunnel}")),
                "{provider} start command must reference the tunnel"
            );
        }
    }
}
