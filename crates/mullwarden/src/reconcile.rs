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

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mullwarden_types::wg::KeyResponse;
use mullwarden_types::{Account, Partition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::allocator::{PortAllocator, PortBindPolicy};
use crate::api::{ApiClient, RemoveOutcome};
use crate::error::ApiError;
use crate::inventory::Inventory;
use crate::transport::Transport;

/// Sentinel port for a tracked port the remote no longer reports.
pub const MISSING_PORT: u16 = 0;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{resource} cannot change `{attribute}` in place, replace it instead")]
    ReplaceRequired {
        resource: &'static str,
        attribute: &'static str,
    },
}

impl ReconcileError {
    pub fn is_drift(&self) -> bool {
        matches!(self, Self::Api(e) if e.is_drift())
    }
}

type Result<T> = std::result::Result<T, ReconcileError>;

/// Result of reading back a tracked resource.
#[derive(Debug, Clone, PartialEq)]
pub enum Observed<S> {
    Present(S),
    /// Removed out-of-band. Drop it from tracked state.
    Gone,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Deleted {
    Removed,
    /// Nothing existed remotely, or nothing can be deleted remotely.
    Forgotten,
}

// ---------------------------------------------------------------------------
// Tracked state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountState {
    pub id: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_subscription_unpaid: bool,
    pub max_forwarding_ports: u32,
    pub max_wireguard_peers: u32,
    pub subscription_method: Option<String>,
}

impl From<&Account> for AccountState {
    fn from(account: &Account) -> Self {
        Self {
            id: account.token.clone(),
            expires_at: account.expiry_date,
            is_active: account.is_active,
            is_subscription_unpaid: account.is_subscription_unpaid(),
            max_forwarding_ports: account.max_forwarding_ports,
            max_wireguard_peers: account.max_wireguard_peers,
            subscription_method: account
                .subscription
                .as_ref()
                .map(|s| s.payment_method.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerState {
    pub public_key: String,
    pub created: String,
    pub ipv4_address: String,
    pub ipv6_address: String,
    pub ports: Vec<u16>,
}

impl From<KeyResponse> for PeerState {
    fn from(key: KeyResponse) -> Self {
        Self {
            public_key: key.key.public,
            created: key.created,
            ipv4_address: key.ipv4_address,
            ipv6_address: key.ipv6_address,
            ports: key.ports,
        }
    }
}

/// Desired inputs of a port forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForwardSpec {
    pub country_code: String,
    pub city_code: String,
    pub peer: Option<String>,
}

impl PortForwardSpec {
    pub fn partition(&self) -> Partition {
        Partition::new(&self.country_code, &self.city_code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForwardState {
    pub country_code: String,
    pub city_code: String,
    pub peer: Option<String>,
    /// The port's value is its identity. [`MISSING_PORT`] when AWOL.
    pub port: u16,
    pub assigned: bool,
}

impl PortForwardState {
    pub fn partition(&self) -> Partition {
        Partition::new(&self.country_code, &self.city_code)
    }

    pub fn is_awol(&self) -> bool {
        self.port == MISSING_PORT
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortForwardPlan {
    Unchanged,
    /// Only the peer binding differs; the port keeps its value.
    RelinkPeer,
    /// Partition changed, or the port is AWOL and must be allocated again.
    Replace,
}

pub fn plan_port_forward(state: &PortForwardState, desired: &PortForwardSpec) -> PortForwardPlan {
    if state.is_awol()
        || state.country_code != desired.country_code
        || state.city_code != desired.city_code
    {
        PortForwardPlan::Replace
    } else if state.peer != desired.peer {
        PortForwardPlan::RelinkPeer
    } else {
        PortForwardPlan::Unchanged
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Lifecycle operations for accounts, WireGuard peers and port forwards.
///
/// Cloning is cheap; every clone shares one session.
pub struct Reconciler<T> {
    api: Arc<ApiClient<T>>,
    bind_policy: PortBindPolicy,
}

impl<T> Clone for Reconciler<T> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            bind_policy: self.bind_policy.clone(),
        }
    }
}

impl<T: Transport> Reconciler<T> {
    pub fn new(api: Arc<ApiClient<T>>, bind_policy: PortBindPolicy) -> Self {
        Self { api, bind_policy }
    }

    pub fn with_bind_policy(mut self, bind_policy: PortBindPolicy) -> Self {
        self.bind_policy = bind_policy;
        self
    }

    pub fn api(&self) -> &ApiClient<T> {
        &self.api
    }

    fn inventory(&self) -> Inventory<'_, T> {
        Inventory::new(&self.api)
    }

    fn allocator(&self) -> PortAllocator<'_, T> {
        PortAllocator::new(&self.api)
    }

    // -- Account -------------------------------------------------------------

    #[tracing::instrument(skip_all)]
    pub async fn create_account(&self) -> Result<AccountState> {
        let login = self.api.create_account().await?;
        info!(account = %redact(&login.account.token), "created account");
        Ok(AccountState::from(&login.account))
    }

    #[tracing::instrument(skip_all)]
    pub async fn read_account(&self, state: &AccountState) -> Result<AccountState> {
        self.api.gate().set_account_token(&state.id);
        let login = self.api.login().await?;
        debug!(account = %redact(&login.account.token), "read account");
        Ok(AccountState::from(&login.account))
    }

    pub async fn import_account(&self, id: &str) -> Result<AccountState> {
        self.api.gate().set_account_token(id);
        let login = self.api.login().await?;
        Ok(AccountState::from(&login.account))
    }

    pub fn update_account(&self, _state: &AccountState) -> Result<AccountState> {
        Err(ReconcileError::ReplaceRequired {
            resource: "account",
            attribute: "id",
        })
    }

    /// There is no remote delete. The account keeps existing with any
    /// remaining credit; only local state is dropped.
    pub fn delete_account(&self, state: &AccountState) -> Deleted {
        warn!(
            account = %redact(&state.id),
            "accounts cannot be deleted remotely, forgetting it locally"
        );
        Deleted::Forgotten
    }

    // -- WireGuard peer ------------------------------------------------------

    #[tracing::instrument(skip(self))]
    pub async fn create_peer(&self, public_key: &str) -> Result<PeerState> {
        let key = self.api.add_wireguard_key(public_key).await?;
        info!(public_key, "registered WireGuard peer");
        Ok(PeerState::from(key))
    }

    #[tracing::instrument(skip_all, fields(public_key = %state.public_key))]
    pub async fn read_peer(&self, state: &PeerState) -> Result<Observed<PeerState>> {
        match self.inventory().get_wireguard_key(&state.public_key).await {
            Ok(key) => Ok(Observed::Present(PeerState::from(key))),
            Err(ApiError::KeyNotFound(_)) => {
                warn!("key has been revoked outside of tracked state");
                Ok(Observed::Gone)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn import_peer(&self, public_key: &str) -> Result<PeerState> {
        let key = self.inventory().get_wireguard_key(public_key).await?;
        Ok(PeerState::from(key))
    }

    /// The public key is the identity, so nothing changes in place.
    pub fn update_peer(&self, _state: &PeerState) -> Result<PeerState> {
        Err(ReconcileError::ReplaceRequired {
            resource: "wireguard peer",
            attribute: "public_key",
        })
    }

    #[tracing::instrument(skip_all, fields(public_key = %state.public_key))]
    pub async fn delete_peer(&self, state: &PeerState) -> Result<Deleted> {
        self.api.revoke_wireguard_key(&state.public_key).await?;
        info!("revoked WireGuard peer");
        Ok(Deleted::Removed)
    }

    // -- Port forward --------------------------------------------------------

    #[tracing::instrument(skip_all, fields(partition = %spec.partition()))]
    pub async fn create_port_forward(&self, spec: &PortForwardSpec) -> Result<PortForwardState> {
        let port = self
            .allocator()
            .allocate_any(spec.peer.as_deref(), &spec.partition())
            .await?;

        Ok(PortForwardState {
            country_code: spec.country_code.clone(),
            city_code: spec.city_code.clone(),
            peer: spec.peer.clone(),
            port,
            assigned: spec.peer.is_some(),
        })
    }

    #[tracing::instrument(skip_all, fields(partition = %state.partition(), port = state.port))]
    pub async fn read_port_forward(&self, state: &PortForwardState) -> Result<PortForwardState> {
        if state.is_awol() {
            return Ok(state.clone());
        }

        match self
            .inventory()
            .get_forwarding_port(&state.partition(), state.port)
            .await
        {
            Ok(found) => {
                let peer = found.peer().map(str::to_string);
                Ok(PortForwardState {
                    assigned: peer.is_some(),
                    peer,
                    ..state.clone()
                })
            }
            Err(ApiError::PortNotFound { .. }) => {
                warn!("port has been removed outside of tracked state");
                Ok(PortForwardState {
                    port: MISSING_PORT,
                    assigned: false,
                    peer: None,
                    ..state.clone()
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Move the port between peers without changing its value. Anything
    /// other than the peer needs a replacement.
    #[tracing::instrument(skip_all, fields(partition = %state.partition(), port = state.port))]
    pub async fn update_port_forward(
        &self,
        state: &PortForwardState,
        desired: &PortForwardSpec,
    ) -> Result<PortForwardState> {
        match plan_port_forward(state, desired) {
            PortForwardPlan::Unchanged => return Ok(state.clone()),
            PortForwardPlan::Replace if state.is_awol() => {
                return Err(ReconcileError::ReplaceRequired {
                    resource: "port forward",
                    attribute: "port",
                });
            }
            PortForwardPlan::Replace => {
                let attribute = if state.country_code == desired.country_code {
                    "city_code"
                } else {
                    "country_code"
                };
                return Err(ReconcileError::ReplaceRequired {
                    resource: "port forward",
                    attribute,
                });
            }
            PortForwardPlan::RelinkPeer => {}
        }

        let partition = state.partition();
        let allocator = self.allocator();

        if let Some(old) = state.peer.as_deref() {
            if allocator.unlink(old, &partition, state.port).await? == RemoveOutcome::AlreadyGone {
                debug!(peer = old, "port was already unlinked from old peer");
            }
        }

        if let Some(new) = desired.peer.as_deref() {
            let report = allocator
                .bind_port(new, &partition, state.port, &self.bind_policy)
                .await?;
            debug!(
                peer = new,
                attempts = report.attempts,
                bound_elsewhere = report.bound_elsewhere,
                "relinked port"
            );
        }

        Ok(PortForwardState {
            peer: desired.peer.clone(),
            assigned: desired.peer.is_some(),
            ..state.clone()
        })
    }

    #[tracing::instrument(skip_all, fields(partition = %state.partition(), port = state.port))]
    pub async fn delete_port_forward(&self, state: &PortForwardState) -> Result<Deleted> {
        if state.is_awol() {
            debug!("port is AWOL, nothing to delete");
            return Ok(Deleted::Forgotten);
        }

        // No peer here: that would only unlink, not delete.
        match self.allocator().release(&state.partition(), state.port).await? {
            RemoveOutcome::Removed => Ok(Deleted::Removed),
            RemoveOutcome::AlreadyGone => Ok(Deleted::Forgotten),
        }
    }
}

/// Keep the last four characters of a secret for log lines.
fn redact(secret: &str) -> String {
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("…{tail}")
}
