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

//! mullwarden-types: wire payloads of the Mullvad account control plane.
//!
//! Every request and response body is its own flat structure. Nothing here
//! talks to the network; the `mullwarden` crate does that.

#![warn(missing_docs)]

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod relay;
pub mod wg;

use crate::wg::{ForwardingPort, WireGuardPeer};

/// A Mullvad account as reported by login, account creation and `/me/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// The secret 16 digit account number.
    pub token: String,
    /// The account number formatted for humans.
    #[serde(default)]
    pub pretty_token: String,
    /// Whether the account currently has time left.
    #[serde(rename = "active", default)]
    pub is_active: bool,
    /// When the account runs out of time.
    #[serde(rename = "expires", default)]
    pub expiry_date: Option<DateTime<Utc>>,
    /// Same instant as `expiry_date`, as a unix timestamp.
    #[serde(default)]
    pub expiry_unix: i64,
    /// Every forwarding port on the account, with its partition and peer.
    #[serde(rename = "city_ports", default)]
    pub forwarding_ports: Vec<ForwardingPort>,
    /// Maximum number of forwarding ports.
    #[serde(rename = "max_ports", default)]
    pub max_forwarding_ports: u32,
    /// Whether another port may be added right now.
    #[serde(default)]
    pub can_add_ports: bool,
    /// Maximum number of registered WireGuard keys.
    #[serde(rename = "max_wg_peers", default)]
    pub max_wireguard_peers: u32,
    /// Registered WireGuard peers.
    #[serde(rename = "wg_peers", default)]
    pub wireguard_peers: Vec<WireGuardPeer>,
    /// Whether another WireGuard key may be registered right now.
    #[serde(default)]
    pub can_add_wg_peers: bool,
    /// Recurring payment, if one is set up.
    #[serde(default)]
    pub subscription: Option<Subscription>,
}

impl Account {
    /// An account without a subscription counts as unpaid.
    pub fn is_subscription_unpaid(&self) -> bool {
        self.subscription.as_ref().is_none_or(|s| s.is_unpaid)
    }
}

/// Recurring payment details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    /// Payment method, e.g. `"paypal"`.
    #[serde(rename = "method", default)]
    pub payment_method: String,
    /// Whether payment is due.
    #[serde(rename = "unpaid", default)]
    pub is_unpaid: bool,
}

/// Body of `GET /accounts/{token}/` and `POST /accounts/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginResponse {
    /// The account the token belongs to.
    #[serde(flatten)]
    pub account: Account,
    /// Session token for the `Authorization: Token ...` header.
    pub auth_token: String,
}

/// Body of `GET /me/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeResponse {
    /// The authenticated account.
    pub account: Account,
}

/// The `"{country}-{city}"` code that scopes relay locations and port pools.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Partition {
    /// ISO3166-1 alpha-2 country code, e.g. `"se"`.
    pub country_code: String,
    /// Mullvad's city code, e.g. `"got"`.
    pub city_code: String,
}

impl Partition {
    /// Build a partition from its two halves.
    pub fn new(country_code: impl Into<String>, city_code: impl Into<String>) -> Self {
        Self {
            country_code: country_code.into(),
            city_code: city_code.into(),
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.country_code, self.city_code)
    }
}

/// A country-city code that is not exactly two non-empty halves.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected `country-city`, got {0:?}")]
pub struct PartitionParseError(pub String);

impl FromStr for Partition {
    type Err = PartitionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split('-').collect::<Vec<_>>().as_slice() {
            [country, city] if !country.is_empty() && !city.is_empty() => {
                Ok(Self::new(*country, *city))
            }
            _ => Err(PartitionParseError(s.to_string())),
        }
    }
}
