// Copyright (C) 2025 Joseph Sacchini
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU Affero General Public License as published by the Free
// Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU Affero General Public License for more
// details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Relay and city catalog payloads.

use serde::{Deserialize, Serialize};

/// One entry of `GET /cities/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    /// `"{country}-{city}"` code.
    pub code: String,
    /// Human readable city name.
    pub name: String,
}

/// One entry of `GET /relays/{kind}/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relay {
    /// Short hostname, without the `.mullvad.net` suffix.
    pub hostname: String,
    /// ISO3166-1 alpha-2 country code.
    #[serde(default)]
    pub country_code: String,
    /// Country name.
    #[serde(default)]
    pub country_name: String,
    /// Mullvad's city code.
    #[serde(default)]
    pub city_code: String,
    /// City name.
    #[serde(default)]
    pub city_name: String,
    /// Whether the relay is presently active.
    #[serde(rename = "active", default)]
    pub is_active: bool,
    /// Whether Mullvad owns the hardware.
    #[serde(rename = "owned", default)]
    pub is_owned: bool,
    /// Hosting provider.
    #[serde(default)]
    pub provider: String,
    /// Inbound IPv4 address.
    #[serde(rename = "ipv4_addr_in", default)]
    pub ipv4_address: String,
    /// Inbound IPv6 address.
    #[serde(rename = "ipv6_addr_in", default)]
    pub ipv6_address: String,
    /// `"wireguard"`, `"openvpn"`, `"bridge"`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Operator status notes.
    #[serde(default)]
    pub status_messages: Vec<String>,
    /// WireGuard public key (WireGuard relays only).
    #[serde(default)]
    pub pubkey: Option<String>,
    /// Multihop port (WireGuard relays only).
    #[serde(default)]
    pub multihop_port: Option<u16>,
    /// SOCKS5 proxy name (WireGuard relays only).
    #[serde(default)]
    pub socks_name: Option<String>,
    /// SSH host key fingerprint (bridges only).
    #[serde(default)]
    pub ssh_fingerprint_sha256: Option<String>,
    /// SSH host key fingerprint (bridges only).
    #[serde(default)]
    pub ssh_fingerprint_md5: Option<String>,
}

impl Relay {
    /// Fully qualified hostname.
    pub fn fqdn(&self) -> String {
        format!("{}.mullvad.net", self.hostname)
    }
}
