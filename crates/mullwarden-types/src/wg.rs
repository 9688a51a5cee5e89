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

//! WireGuard key and forwarding port payloads.

use serde::{Deserialize, Serialize};

/// Body of `POST /wg-pubkeys/add/` and `POST /wg-pubkeys/revoke/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRequest {
    /// Base64 WireGuard public key.
    pub pubkey: String,
}

/// A key pair as echoed by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyPair {
    /// Base64 WireGuard public key.
    pub public: String,
    /// Only present in the response to the request that created the key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<String>,
}

/// A registered WireGuard key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyResponse {
    /// The key itself.
    pub key: KeyPair,
    /// When the key was registered.
    #[serde(default)]
    pub created: String,
    /// Tunnel IPv4 address assigned to the peer.
    #[serde(default)]
    pub ipv4_address: String,
    /// Tunnel IPv6 address assigned to the peer.
    #[serde(default)]
    pub ipv6_address: String,
    /// Ports forwarded to this peer.
    #[serde(default)]
    pub ports: Vec<u16>,
    /// Whether another port may be bound to this peer.
    #[serde(default)]
    pub can_add_ports: bool,
    /// Whether the key was registered by the Mullvad app.
    #[serde(rename = "app", default)]
    pub was_app_registered: bool,
}

/// Body of `GET /wg-pubkeys/list/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyListResponse {
    /// All registered keys.
    #[serde(default)]
    pub keys: Vec<KeyResponse>,
    /// Maximum number of ports on the account.
    #[serde(default)]
    pub max_ports: u32,
    /// Every port on the account, assigned or not.
    #[serde(default)]
    pub ports: Vec<u16>,
    /// How many ports are not bound to any peer.
    #[serde(default)]
    pub unassigned_ports: u32,
}

/// A registered peer as embedded in the account snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireGuardPeer {
    /// The peer's key.
    pub key: KeyPair,
    /// When the key was registered.
    #[serde(default)]
    pub created: String,
    /// Tunnel IPv4 address.
    #[serde(default)]
    pub ipv4_address: String,
    /// Tunnel IPv6 address.
    #[serde(default)]
    pub ipv6_address: String,
    /// Ports forwarded to this peer.
    #[serde(default)]
    pub ports: Vec<u16>,
    /// Ports forwarded to this peer, with their partitions.
    #[serde(default)]
    pub city_ports: Vec<ForwardingPort>,
}

/// Body of `POST /ports/add/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortAddRequest {
    /// Peer to bind the new port to. Unbound when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
    /// Partition to allocate from.
    pub city_code: String,
}

/// Body of `POST /ports/remove/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortRemoveRequest {
    /// Partition the port belongs to.
    pub city_code: String,
    /// The port to remove.
    pub port: u16,
    /// With a peer, only that binding is removed. Without, the port is deleted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
}

/// Body of a successful `POST /ports/add/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortResponse {
    /// The port the server picked.
    pub port: u16,
}

/// A forwarding port in the account snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardingPort {
    /// Partition the port belongs to.
    pub city_code: String,
    /// The port number.
    pub port: u16,
    /// Public key of the bound peer; empty or null when unbound.
    #[serde(default)]
    pub wgkey: Option<String>,
}

impl ForwardingPort {
    /// The bound peer, if any.
    pub fn peer(&self) -> Option<&str> {
        self.wgkey.as_deref().filter(|k| !k.is_empty())
    }
}
