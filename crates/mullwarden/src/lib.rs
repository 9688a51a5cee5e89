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

//! mullwarden: bookkeeping for Mullvad accounts, WireGuard keys and
//! forwarded ports.
//!
//! [`session::AuthGate`] owns the session, [`inventory::Inventory`] reads
//! snapshots, [`allocator::PortAllocator`] gets specific ports out of an API
//! that only hands out random ones, and [`reconcile::Reconciler`] exposes the
//! create/read/update/delete lifecycle of each resource.

pub mod allocator;
pub mod api;
pub mod config;
pub mod error;
pub mod inventory;
pub mod reconcile;
pub mod session;
pub mod transport;

use std::sync::Arc;

pub use crate::api::ApiClient;
pub use crate::error::ApiError;
pub use crate::reconcile::Reconciler;
pub use crate::session::AuthGate;

use crate::config::Settings;
use crate::transport::{HttpTransport, TransportError};

/// Wire up an HTTP-backed reconciler from settings.
pub fn connect(settings: &Settings) -> Result<Reconciler<HttpTransport>, TransportError> {
    let transport = HttpTransport::new(&settings.api_url, settings.request_timeout())?;
    let gate = AuthGate::new(settings.account_id.clone(), settings.account_wait());
    let api = Arc::new(ApiClient::new(transport, gate));
    Ok(Reconciler::new(api, settings.bind_policy()))
}
