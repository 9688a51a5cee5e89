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

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use mullwarden_types::LoginResponse;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::api;
use crate::error::ApiError;
use crate::transport::{Transport, TransportError};

/// Outcome of a failed login, replayed to the callers queued behind it.
#[derive(Debug, Clone)]
enum LoginFailure {
    Rejected { status: Option<u16>, body: String },
    Transport(TransportError),
    Decode(String),
}

impl From<&ApiError> for LoginFailure {
    fn from(e: &ApiError) -> Self {
        match e {
            ApiError::AuthenticationFailed { status, body } => Self::Rejected {
                status: *status,
                body: body.clone(),
            },
            ApiError::Transport(e) => Self::Transport(e.clone()),
            ApiError::Decode(e) => Self::Decode(e.to_string()),
            other => Self::Rejected {
                status: None,
                body: other.to_string(),
            },
        }
    }
}

impl From<LoginFailure> for ApiError {
    fn from(failure: LoginFailure) -> Self {
        match failure {
            LoginFailure::Rejected { status, body } => ApiError::AuthenticationFailed { status, body },
            LoginFailure::Transport(e) => ApiError::Transport(e),
            LoginFailure::Decode(msg) => {
                ApiError::Decode(<serde_json::Error as serde::de::Error>::custom(msg))
            }
        }
    }
}

#[derive(Debug)]
pub struct AuthGate {
    account: watch::Sender<Option<String>>,
    auth_token: OnceLock<String>,
    login_lock: Mutex<Option<LoginFailure>>,
    completed_logins: AtomicU64,
    account_wait: Duration,
}

impl AuthGate {
    pub fn new(account_token: Option<String>, account_wait: Duration) -> Self {
        let (account, _) = watch::channel(account_token);
        Self {
            account,
            auth_token: OnceLock::new(),
            login_lock: Mutex::new(None),
            completed_logins: AtomicU64::new(0),
            account_wait,
        }
    }

    pub fn account_token(&self) -> Option<String> {
        self.account.borrow().clone()
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.auth_token.get().map(String::as_str)
    }

    /// Supply the account token and wake anything waiting for it. Returns
    /// false if a token was already set; the first one wins.
    pub fn set_account_token(&self, token: &str) -> bool {
        let changed = self.account.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(token.to_string());
            true
        });
        if changed {
            debug!("account token supplied");
        } else if self.account_token().as_deref() != Some(token) {
            warn!("ignoring a second, different account token for this session");
        }
        changed
    }

    /// Take over the session from a login or account creation response.
    pub fn adopt(&self, login: &LoginResponse) {
        self.set_account_token(&login.account.token);
        if self.auth_token.set(login.auth_token.clone()).is_ok() {
            debug!("auth token cached");
        }
    }

    #[tracing::instrument(skip_all)]
    pub async fn ensure_session<T: Transport>(&self, transport: &T) -> Result<String, ApiError> {
        if let Some(token) = self.auth_token.get() {
            return Ok(token.clone());
        }

        let account_token = self.wait_for_account().await?;

        let seen = self.completed_logins.load(Ordering::Acquire);
        let mut last_failure = self.login_lock.lock().await;

        if let Some(token) = self.auth_token.get() {
            return Ok(token.clone());
        }
        if self.completed_logins.load(Ordering::Acquire) != seen {
            if let Some(failure) = last_failure.clone() {
                debug!("sharing failure of the login we queued behind");
                return Err(failure.into());
            }
        }

        self.login_locked(&mut last_failure, transport, &account_token)
            .await
            .map(|login| login.auth_token)
    }

    /// Log in even if a session already exists, for callers that need a
    /// fresh account snapshot. Shares the lock with [`Self::ensure_session`],
    /// so at most one login is in flight.
    #[tracing::instrument(skip_all)]
    pub async fn login<T: Transport>(&self, transport: &T) -> Result<LoginResponse, ApiError> {
        let account_token = self.wait_for_account().await?;
        let mut last_failure = self.login_lock.lock().await;
        self.login_locked(&mut last_failure, transport, &account_token).await
    }

    async fn login_locked<T: Transport>(
        &self,
        last_failure: &mut Option<LoginFailure>,
        transport: &T,
        account_token: &str,
    ) -> Result<LoginResponse, ApiError> {
        let result = api::login(transport, account_token).await;
        self.completed_logins.fetch_add(1, Ordering::AcqRel);

        match result {
            Ok(login) => {
                *last_failure = None;
                self.adopt(&login);
                info!("logged in");
                Ok(login)
            }
            Err(e) => {
                warn!(error = %e, "login failed");
                *last_failure = Some(LoginFailure::from(&e));
                Err(e)
            }
        }
    }

    async fn wait_for_account(&self) -> Result<String, ApiError> {
        let mut rx = self.account.subscribe();
        let wait = async { rx.wait_for(Option::is_some).await.ok().and_then(|t| t.clone()) };

        match tokio::time::timeout(self.account_wait, wait).await {
            Ok(Some(token)) => Ok(token),
            _ => {
                warn!(waited = ?self.account_wait, "no account token available");
                Err(ApiError::AccountTokenMissing(self.account_wait))
            }
        }
    }
}
