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

use std::time::Duration;

use mullwarden_types::PartitionParseError;
use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("authentication failed ({status:?}), check account ID")]
    AuthenticationFailed { status: Option<u16>, body: String },

    #[error("no account token became available within {0:?}")]
    AccountTokenMissing(Duration),

    #[error("failed to read {what} ({status}): {body}")]
    InventoryReadFailed {
        what: &'static str,
        status: u16,
        body: String,
    },

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("failed to register public key ({status}): {body}")]
    KeyRegistrationFailed { status: u16, body: String },

    #[error("failed to revoke key ({status}): {body}")]
    KeyRevocationFailed { status: u16, body: String },

    #[error("failed to add port ({status}): {body}")]
    PortAllocationFailed { status: u16, body: String },

    #[error("failed to remove port ({status}): {body}")]
    PortRemovalFailed { status: u16, body: String },

    #[error("port {port} not found in {partition}")]
    PortNotFound { partition: String, port: u16 },

    #[error("gave up binding port {port} after {attempts} attempts")]
    PortAllocationTimeout { port: u16, attempts: u32 },

    #[error("binding port {port} was cancelled")]
    PortAllocationCancelled { port: u16 },

    #[error("city not found: {0}")]
    CityNotFound(String),

    #[error(transparent)]
    InvalidPartition(#[from] PartitionParseError),

    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

impl ApiError {
    /// The resource is missing remotely. Callers clear tracked state rather
    /// than fail.
    pub fn is_drift(&self) -> bool {
        matches!(self, Self::KeyNotFound(_) | Self::PortNotFound { .. })
    }
}
