//! Profile data model: match criteria plus the small amount of runtime state
//! (enabled flag, last activation time) that the controller mutates.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable storage key of a profile. Survives edits.
pub type ProfileKey = i64;

/// Profiles keyed by storage key. Iteration order (ascending key) is the
/// order the matcher scans in, so it decides priority ties.
pub type ProfileMap = BTreeMap<ProfileKey, Profile>;

/// External tunnel software responsible for a profile's tunnel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    WireguardLike,
    OpenVpnProfile,
    OpenVpnAccessServer,
    IcsOpenVpn,
}

/// Deduplication bucket for stop commands. Both OpenVPN-Connect variants are
/// the same app, so they share a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ProviderFamily {
    Wireguard,
    OpenVpnConnect,
    IcsOpenVpn,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::WireguardLike,
        Provider::OpenVpnProfile,
        Provider::OpenVpnAccessServer,
        Provider::IcsOpenVpn,
    ];

    pub fn family(self) -> ProviderFamily {
        match self {
            Provider::WireguardLike => ProviderFamily::Wireguard,
            Provider::OpenVpnProfile | Provider::OpenVpnAccessServer => {
                ProviderFamily::OpenVpnConnect
            }
            Provider::IcsOpenVpn => ProviderFamily::IcsOpenVpn,
        }
    }

    /// Human-readable label used in the "connected via" notification.
    pub fn label(self) -> &'static str {
        match self {
            Provider::WireguardLike => "WireGuard",
            Provider::OpenVpnProfile => "OpenVPN Connect",
            Provider::OpenVpnAccessServer => "OpenVPN Connect (AS)",
            Provider::IcsOpenVpn => "OpenVPN for Android",
        }
    }

    /// Identifier used for storage and on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::WireguardLike => "wireguard",
            Provider::OpenVpnProfile => "openvpn-profile",
            Provider::OpenVpnAccessServer => "openvpn-as",
            Provider::IcsOpenVpn => "ics-openvpn",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown provider '{s}'"))
    }
}

/// Matching mode for one network type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMode {
    /// Never matches.
    #[default]
    None,
    /// Matches every network not in the exclude list.
    All,
    /// Matches only networks in the include list.
    Some,
}

impl RuleMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleMode::None => "none",
            RuleMode::All => "all",
            RuleMode::Some => "some",
        }
    }

    /// Evaluate the rule against a network name. Include/exclude lists that do
    /// not belong to the active mode are ignored.
    pub fn matches(self, name: &str, include: &BTreeSet<String>, exclude: &BTreeSet<String>) -> bool {
        match self {
            RuleMode::None => false,
            RuleMode::All => !exclude.contains(name),
            RuleMode::Some => include.contains(name),
        }
    }
}

impl fmt::Display for RuleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(RuleMode::None),
            "all" => Ok(RuleMode::All),
            "some" => Ok(RuleMode::Some),
            other => Err(format!("unknown rule mode '{other}'")),
        }
    }
}

/// A named rule set mapping network conditions to a tunnel activation target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub provider: Provider,
    /// Opaque to us; handed to the tunnel driver as-is.
    pub tunnel_name: String,
    pub wifi_rule: RuleMode,
    pub mobile_rule: RuleMode,
    pub ssid_include: BTreeSet<String>,
    pub ssid_exclude: BTreeSet<String>,
    pub carrier_include: BTreeSet<String>,
    pub carrier_exclude: BTreeSet<String>,
    /// Higher wins. Not required to be unique.
    pub priority: i64,
    pub enabled: bool,
    /// Unix timestamp (seconds) of the last activation.
    pub last_activated_at: Option<i64>,
}

impl Profile {
    /// A new, enabled profile with both rules set to `None`.
    pub fn new(name: impl Into<String>, provider: Provider, tunnel_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider,
            tunnel_name: tunnel_name.into(),
            wifi_rule: RuleMode::None,
            mobile_rule: RuleMode::None,
            ssid_include: BTreeSet::new(),
            ssid_exclude: BTreeSet::new(),
            carrier_include: BTreeSet::new(),
            carrier_exclude: BTreeSet::new(),
            priority: 1,
            enabled: true,
            last_activated_at: None,
        }
    }

    pub fn matches_wifi(&self, ssid: &str) -> bool {
        self.wifi_rule
            .matches(ssid, &self.ssid_include, &self.ssid_exclude)
    }

    pub fn matches_carrier(&self, carrier: &str) -> bool {
        self.mobile_rule
            .matches(carrier, &self.carrier_include, &self.carrier_exclude)
    }

    /// Copy the runtime state of the stored version onto an edited
    /// definition. Without a previous version the profile starts enabled and
    /// never activated.
    pub fn carry_over_from(&mut self, previous: Option<&Profile>) {
        self.enabled = previous.map(|p| p.enabled).unwrap_or(true);
        self.last_activated_at = previous.and_then(|p| p.last_activated_at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_openvpn_connect_variants_share_a_family() {
        assert_eq!(
            Provider::OpenVpnProfile.family(),
            Provider::OpenVpnAccessServer.family()
        );
        assert_ne!(Provider::WireguardLike.family(), Provider::IcsOpenVpn.family());
    }

    #[test]
    fn test_provider_parse_roundtrips_through_as_str() {
        for p in Provider::ALL {
            assert_eq!(p.as_str().parse::<Provider>().unwrap(), p);
        }
        assert!("strongswan".parse::<Provider>().is_err());
    }

    #[test]
    fn test_rule_mode_all_respects_exclude_only() {
        let include = set(&["Office"]);
        let exclude = set(&["Cafe"]);
        assert!(RuleMode::All.matches("Home", &include, &exclude));
        assert!(!RuleMode::All.matches("Cafe", &include, &exclude));
    }

    #[test]
    fn test_rule_mode_some_respects_include_only() {
        let include = set(&["Office"]);
        let exclude = set(&["Office"]);
        assert!(RuleMode::Some.matches("Office", &include, &exclude));
        assert!(!RuleMode::Some.matches("Home", &include, &exclude));
    }

    #[test]
    fn test_rule_mode_none_never_matches() {
        assert!(!RuleMode::None.matches("Home", &set(&["Home"]), &BTreeSet::new()));
        assert!(!RuleMode::None.matches("", &BTreeSet::new(), &BTreeSet::new()));
    }

    #[test]
    fn test_carry_over_keeps_previous_runtime_state() {
        let mut previous = Profile::new("old", Provider::WireguardLike, "wg0");
        previous.enabled = false;
        previous.last_activated_at = Some(1_700_000_000);

        let mut edited = Profile::new("new", Provider::IcsOpenVpn, "office");
        edited.carry_over_from(Some(&previous));
        assert!(!edited.enabled);
        assert_eq!(edited.last_activated_at, Some(1_700_000_000));
        assert_eq!(edited.name, "new");
    }

    #[test]
    fn test_carry_over_without_previous_resets_to_defaults() {
        let mut edited = Profile::new("new", Provider::IcsOpenVpn, "office");
        edited.enabled = false;
        edited.last_activated_at = Some(5);
        edited.carry_over_from(None);
        assert!(edited.enabled);
        assert_eq!(edited.last_activated_at, None);
    }
}
