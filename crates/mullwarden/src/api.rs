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
use mullwarden_types::wg::{
    KeyListResponse, KeyRequest, KeyResponse, PortAddRequest, PortRemoveRequest, PortResponse,
};
use mullwarden_types::{Account, LoginResponse, MeResponse, Partition};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};

use crate::error::ApiError;
use crate::session::AuthGate;
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Outcome of `POST /ports/remove/`. Both count as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    AlreadyGone,
}

/// Exchange an account token for a session. Unauthenticated.
#[tracing::instrument(skip_all)]
pub async fn login<T: Transport>(
    transport: &T,
    account_token: &str,
) -> Result<LoginResponse, ApiError> {
    let resp = transport
        .send(ApiRequest::get(format!("/accounts/{account_token}/")))
        .await?;

    match resp.status {
        200 => Ok(resp.json()?),
        status => {
            error!(status, body = %resp.body, "login rejected");
            Err(ApiError::AuthenticationFailed {
                status: Some(status),
                body: resp.body,
            })
        }
    }
}

fn decode<T: DeserializeOwned>(resp: &ApiResponse) -> Result<T, ApiError> {
    resp.json().map_err(|e| {
        warn!(status = resp.status, body = %resp.body, "undecodable API response");
        ApiError::Decode(e)
    })
}

fn expect_read<R: DeserializeOwned>(
    resp: ApiResponse,
    what: &'static str,
) -> Result<R, ApiError> {
    match resp.status {
        200 => decode(&resp),
        status => {
            error!(status, body = %resp.body, what, "read failed");
            Err(ApiError::InventoryReadFailed {
                what,
                status,
                body: resp.body,
            })
        }
    }
}

/// Typed control-plane calls on top of a [`Transport`], authenticated
/// through the shared [`AuthGate`].
pub struct ApiClient<T> {
    transport: T,
    gate: AuthGate,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T, gate: AuthGate) -> Self {
        Self { transport, gate }
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn send_authed(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let token = self.gate.ensure_session(&self.transport).await?;
        Ok(self.transport.send(request.with_auth(token)).await?)
    }

    #[tracing::instrument(skip_all)]
    pub async fn create_account(&self) -> Result<LoginResponse, ApiError> {
        let resp = self.transport.send(ApiRequest::post("/accounts/", None)).await?;

        match resp.status {
            201 => {
                let login: LoginResponse = decode(&resp)?;
                self.gate.adopt(&login);
                info!("created account");
                Ok(login)
            }
            status => {
                error!(status, body = %resp.body, "account creation failed");
                Err(ApiError::UnexpectedStatus {
                    status,
                    body: resp.body,
                })
            }
        }
    }

    /// Log in with the session's account token, waiting for it if needed.
    /// Always hits the network; the account snapshot is never cached.
    pub async fn login(&self) -> Result<LoginResponse, ApiError> {
        self.gate.login(&self.transport).await
    }

    #[tracing::instrument(skip_all)]
    pub async fn get_account(&self) -> Result<Account, ApiError> {
        let resp = self.send_authed(ApiRequest::get("/me/")).await?;
        let me: MeResponse = expect_read(resp, "account")?;
        Ok(me.account)
    }

    #[tracing::instrument(skip_all)]
    pub async fn list_cities(&self) -> Result<Vec<City>, ApiError> {
        let resp = self.send_authed(ApiRequest::get("/cities/")).await?;
        expect_read(resp, "cities")
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_relays(&self, kind: &str) -> Result<Vec<Relay>, ApiError> {
        let resp = self
            .send_authed(ApiRequest::get(format!("/relays/{kind}/")))
            .await?;
        expect_read(resp, "relays")
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_wireguard_key(&self, public_key: &str) -> Result<KeyResponse, ApiError> {
        let body = serde_json::to_value(KeyRequest {
            pubkey: public_key.to_string(),
        })?;
        let resp = self
            .send_authed(ApiRequest::post("/wg-pubkeys/add/", Some(body)))
            .await?;

        match resp.status {
            201 => {
                let key: KeyResponse = decode(&resp)?;
                debug!(public_key = %key.key.public, "registered key");
                Ok(key)
            }
            status => {
                error!(status, body = %resp.body, "failed to register public key");
                Err(ApiError::KeyRegistrationFailed {
                    status,
                    body: resp.body,
                })
            }
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn list_wireguard_keys(&self) -> Result<KeyListResponse, ApiError> {
        let resp = self.send_authed(ApiRequest::get("/wg-pubkeys/list/")).await?;
        expect_read(resp, "registered keys")
    }

    #[tracing::instrument(skip(self))]
    pub async fn revoke_wireguard_key(&self, public_key: &str) -> Result<(), ApiError> {
        let body = serde_json::to_value(KeyRequest {
            pubkey: public_key.to_string(),
        })?;
        let resp = self
            .send_authed(ApiRequest::post("/wg-pubkeys/revoke/", Some(body)))
            .await?;

        match resp.status {
            204 => Ok(()),
            status => {
                error!(status, body = %resp.body, "failed to revoke key");
                Err(ApiError::KeyRevocationFailed {
                    status,
                    body: resp.body,
                })
            }
        }
    }

    /// Ask for a port from the partition's pool. The server picks which.
    #[tracing::instrument(skip(self), fields(partition = %partition))]
    pub async fn add_port(
        &self,
        peer: Option<&str>,
        partition: &Partition,
    ) -> Result<u16, ApiError> {
        let body = serde_json::to_value(PortAddRequest {
            pubkey: peer.map(str::to_string),
            city_code: partition.to_string(),
        })?;
        let resp = self
            .send_authed(ApiRequest::post("/ports/add/", Some(body)))
            .await?;

        match resp.status {
            201 => {
                let added: PortResponse = decode(&resp)?;
                debug!(port = added.port, "server allocated port");
                Ok(added.port)
            }
            status => {
                error!(status, body = %resp.body, "failed to add port");
                Err(ApiError::PortAllocationFailed {
                    status,
                    body: resp.body,
                })
            }
        }
    }

    /// With `peer`, unlink the port from that peer. Without, delete the port.
    #[tracing::instrument(skip(self), fields(partition = %partition))]
    pub async fn remove_port(
        &self,
        peer: Option<&str>,
        partition: &Partition,
        port: u16,
    ) -> Result<RemoveOutcome, ApiError> {
        let body = serde_json::to_value(PortRemoveRequest {
            city_code: partition.to_string(),
            port,
            pubkey: peer.map(str::to_string),
        })?;
        let resp = self
            .send_authed(ApiRequest::post("/ports/remove/", Some(body)))
            .await?;

        match resp.status {
            204 => Ok(RemoveOutcome::Removed),
            404 => {
                debug!(port, "port already gone");
                Ok(RemoveOutcome::AlreadyGone)
            }
            status => {
                error!(status, body = %resp.body, "failed to remove port");
                Err(ApiError::PortRemovalFailed {
                    status,
                    body: resp.body,
                })
            }
        }
    }
}
