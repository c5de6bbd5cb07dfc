//! Profile selection: a single linear pass picking the highest-priority
//! enabled profile whose rule matches the current network.

use crate::network::NetworkSnapshot;

use super::profile::{Profile, ProfileKey, ProfileMap};

/// Pick the profile that should be active for `snapshot`, if any.
///
/// A profile replaces the running best only on strictly greater priority, so
/// among equal priorities the first one in iteration order wins. Profiles with
/// a priority of zero or below can never be selected.
pub fn select<'a>(
    profiles: &'a ProfileMap,
    snapshot: &NetworkSnapshot,
) -> Option<(ProfileKey, &'a Profile)> {
    if !snapshot.any_non_vpn_network_up {
        return None;
    }
    if let Err(e) = snapshot.validate() {
        tracing::warn!("Ignoring network snapshot: {e}");
        return None;
    }

    let mut best: Option<(ProfileKey, &Profile)> = None;
    let mut best_priority = 0;

    for (key, profile) in profiles {
        if !profile.enabled || profile.priority <= best_priority {
            continue;
        }

        let matched = if snapshot.wifi_connected {
            profile.matches_wifi(&snapshot.wifi_ssid)
        } else {
            profile.matches_carrier(&snapshot.carrier_name)
        };

        if matched {
            best = Some((*key, profile));
            best_priority = profile.priority;
        }
    }

    best
}
