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

use mullwarden_types::relay::{City, Relay};
use mullwarden_types::wg::{ForwardingPort, KeyListResponse, KeyResponse};
use mullwarden_types::Partition;
use tracing::debug;

use crate::api::ApiClient;
use crate::error::ApiError;
use crate::transport::Transport;

/// Relay kind that covers every relay.
pub const ALL_RELAYS: &str = "all";

/// Read-only view of the account. Every call fetches a fresh snapshot.
pub struct Inventory<'a, T> {
    api: &'a ApiClient<T>,
}

impl<'a, T: Transport> Inventory<'a, T> {
    pub fn new(api: &'a ApiClient<T>) -> Self {
        Self { api }
    }

    pub async fn list_wireguard_keys(&self) -> Result<KeyListResponse, ApiError> {
        self.api.list_wireguard_keys().await
    }

    pub async fn get_wireguard_key(&self, public_key: &str) -> Result<KeyResponse, ApiError> {
        let list = self.list_wireguard_keys().await?;
        find_key(list.keys, public_key)
    }

    pub async fn list_forwarding_ports(&self) -> Result<Vec<ForwardingPort>, ApiError> {
        Ok(self.api.get_account().await?.forwarding_ports)
    }

    pub async fn get_forwarding_port(
        &self,
        partition: &Partition,
        port: u16,
    ) -> Result<ForwardingPort, ApiError> {
        let ports = self.list_forwarding_ports().await?;
        find_port(ports, partition, port)
    }

    pub async fn list_cities(&self) -> Result<Vec<City>, ApiError> {
        self.api.list_cities().await
    }

    /// Look a city up by its exact name.
    pub async fn find_city(&self, name: &str) -> Result<(City, Partition), ApiError> {
        let city = self
            .list_cities()
            .await?
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| ApiError::CityNotFound(name.to_string()))?;
        let partition = city.code.parse()?;
        Ok((city, partition))
    }

    pub async fn list_relays(&self, filter: &RelayFilter) -> Result<Vec<Relay>, ApiError> {
        let relays = self.api.list_relays(filter.kind()).await?;
        let total = relays.len();
        let matched: Vec<Relay> = relays.into_iter().filter(|r| filter.matches(r)).collect();
        debug!(total, matched = matched.len(), "filtered relays");
        Ok(matched)
    }
}

fn find_key(keys: Vec<KeyResponse>, public_key: &str) -> Result<KeyResponse, ApiError> {
    keys.into_iter()
        .find(|k| k.key.public == public_key)
        .ok_or_else(|| ApiError::KeyNotFound(public_key.to_string()))
}

fn find_port(
    ports: Vec<ForwardingPort>,
    partition: &Partition,
    port: u16,
) -> Result<ForwardingPort, ApiError> {
    let code = partition.to_string();
    ports
        .into_iter()
        .find(|p| p.city_code == code && p.port == port)
        .ok_or(ApiError::PortNotFound {
            partition: code,
            port,
        })
}

/// Narrows the relay catalog. Unset or empty fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayFilter {
    pub kind: Option<String>,
    pub country_code: Option<String>,
    pub city_name: Option<String>,
}

impl RelayFilter {
    pub fn kind(&self) -> &str {
        self.kind
            .as_deref()
            .filter(|k| !k.is_empty())
            .unwrap_or(ALL_RELAYS)
    }

    pub fn matches(&self, relay: &Relay) -> bool {
        fn field(want: Option<&String>, have: &str) -> bool {
            want.is_none_or(|w| w.is_empty() || w == have)
        }
        field(self.country_code.as_ref(), &relay.country_code)
            && field(self.city_name.as_ref(), &relay.city_name)
    }
}
