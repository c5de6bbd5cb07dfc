//! NetworkManager snapshot source.
//!
//! Runs `nmcli -t -f TYPE,STATE,CONNECTION device status` and folds the device
//! table into a [`NetworkSnapshot`]. The CONNECTION column is a profile name,
//! so when Wi-Fi is up the SSID is read from the active access point.

use anyhow::{bail, Context, Result};

use super::{normalize_ssid, NetworkSnapshot, SnapshotSource};

/// Device types that are tunnels themselves and never count as "a network
/// worth routing".
const TUNNEL_DEVICE_TYPES: &[&str] = &["wireguard", "tun", "tap", "vpn", "ip-tunnel"];

/// Device types that never carry user traffic.
const IGNORED_DEVICE_TYPES: &[&str] = &["loopback", "bridge", "wifi-p2p"];

const MOBILE_DEVICE_TYPES: &[&str] = &["gsm", "cdma", "modem"];

#[derive(Debug, Clone)]
pub struct NmcliSource {
    program: String,
}

impl NmcliSource {
    pub fn new() -> Self {
        Self {
            program: "nmcli".into(),
        }
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for NmcliSource {
    fn default() -> Self {
        Self::new()
    }
}

impl NmcliSource {
    fn run(&self, args: &[&str]) -> Result<String> {
        let output = std::process::Command::new(&self.program)
            .args(args)
            .output()
            .with_context(|| format!("failed to run {}", self.program))?;
        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn active_ssid(&self) -> Result<Option<String>> {
        let out = self.run(&[
            "-t", "-f", "ACTIVE,SSID", "device", "wifi", "list", "--rescan", "no",
        ])?;
        Ok(parse_active_ssid(&out))
    }
}

impl SnapshotSource for NmcliSource {
    fn read(&self) -> Result<NetworkSnapshot> {
        let status = self.run(&["-t", "-f", "TYPE,STATE,CONNECTION", "device", "status"])?;
        let mut snapshot = parse_device_status(&status);

        if snapshot.wifi_connected {
            match self.active_ssid() {
                Ok(Some(ssid)) => snapshot.wifi_ssid = ssid,
                Ok(None) => tracing::debug!(
                    "No active access point listed, using connection name '{}'",
                    snapshot.wifi_ssid
                ),
                Err(e) => tracing::debug!("SSID lookup failed, using connection name: {e:#}"),
            }
        }
        Ok(snapshot)
    }
}

/// SSID of the access point marked active in
/// `nmcli -t -f ACTIVE,SSID device wifi list` output.
pub fn parse_active_ssid(output: &str) -> Option<String> {
    output
        .lines()
        .map(split_terse)
        .find(|fields| fields.first().map(String::as_str) == Some("yes"))
        .and_then(|fields| fields.get(1).map(|ssid| normalize_ssid(ssid)))
        .filter(|ssid| !ssid.is_empty())
}

/// Fold `nmcli -t` device rows into a snapshot. The Wi-Fi SSID is taken from
/// the connection name; [`NmcliSource`] replaces it with the real one.
pub fn parse_device_status(output: &str) -> NetworkSnapshot {
    let mut snapshot = NetworkSnapshot::offline();

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let fields = split_terse(line);
        let (Some(kind), Some(state)) = (fields.first(), fields.get(1)) else {
            continue;
        };
        let connection = fields.get(2).map(String::as_str).unwrap_or("");
        let kind = kind.as_str();

        if TUNNEL_DEVICE_TYPES.contains(&kind) || IGNORED_DEVICE_TYPES.contains(&kind) {
            continue;
        }

        let connected = state.starts_with("connected");
        if connected || state.starts_with("connecting") {
            snapshot.any_non_vpn_network_up = true;
        }
        if !connected {
            continue;
        }

        if kind == "wifi" && !snapshot.wifi_connected {
            snapshot.wifi_connected = true;
            snapshot.wifi_ssid = normalize_ssid(connection);
        } else if MOBILE_DEVICE_TYPES.contains(&kind) && snapshot.carrier_name.is_empty() {
            snapshot.carrier_name = connection.to_string();
        }
    }

    snapshot
}

/// Split one terse-mode line on unescaped `:`; `\:` and `\\` are unescaped.
fn split_terse(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ':' => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
