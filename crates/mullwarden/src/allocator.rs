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

//! Port allocation against an API that only hands out random ports.
//!
//! The control plane offers `add` (server picks a port from the partition's
//! unassigned pool) and `remove` (by value). Binding one specific port to a
//! peer is done by adding, diffing the peer's port set, and handing back
//! anything that is not the target until the server picks it.

use std::collections::BTreeSet;
use std::time::Duration;

use mullwarden_types::Partition;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, RemoveOutcome};
use crate::error::ApiError;
use crate::inventory::Inventory;
use crate::transport::Transport;

/// Bounds on the retry-until-match loop.
#[derive(Debug, Clone)]
pub struct PortBindPolicy {
    pub max_attempts: u32,
    pub timeout: Duration,
    pub cancel: Option<CancellationToken>,
}

impl Default for PortBindPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 32,
            timeout: Duration::from_secs(120),
            cancel: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindReport {
    pub attempts: u32,
    /// Ports that came back from the pool but were not the target.
    pub returned: Vec<u16>,
    /// The target turned up on the peer without this call being handed it,
    /// so some other operation bound it.
    pub bound_elsewhere: bool,
}

/// How one add-and-diff round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Bound,
    AlreadyHeld,
    BoundElsewhere,
    Missed,
}

/// Ports present in `after` but not in `before`.
pub fn determine_added_ports(after: &BTreeSet<u16>, before: &BTreeSet<u16>) -> BTreeSet<u16> {
    after.difference(before).copied().collect()
}

pub struct PortAllocator<'a, T> {
    api: &'a ApiClient<T>,
    inventory: Inventory<'a, T>,
}

impl<'a, T: Transport> PortAllocator<'a, T> {
    pub fn new(api: &'a ApiClient<T>) -> Self {
        Self {
            api,
            inventory: Inventory::new(api),
        }
    }

    /// Take whatever port the server picks, optionally bound to `peer`.
    #[tracing::instrument(skip(self), fields(partition = %partition))]
    pub async fn allocate_any(
        &self,
        peer: Option<&str>,
        partition: &Partition,
    ) -> Result<u16, ApiError> {
        let port = self.api.add_port(peer, partition).await?;
        info!(port, "allocated port");
        Ok(port)
    }

    /// Unlink `port` from `peer`; it goes back to the partition's pool.
    pub async fn unlink(
        &self,
        peer: &str,
        partition: &Partition,
        port: u16,
    ) -> Result<RemoveOutcome, ApiError> {
        self.api.remove_port(Some(peer), partition, port).await
    }

    /// Delete `port` from the account.
    pub async fn release(&self, partition: &Partition, port: u16) -> Result<RemoveOutcome, ApiError> {
        self.api.remove_port(None, partition, port).await
    }

    pub async fn peer_ports(&self, peer: &str) -> Result<BTreeSet<u16>, ApiError> {
        let key = self.inventory.get_wireguard_key(peer).await?;
        Ok(key.ports.into_iter().collect())
    }

    /// Bind the already-known `target` port to `peer`, keeping its value.
    ///
    /// Terminates in one attempt unless the partition has several unassigned
    /// ports. Tolerates sibling operations touching other peers, but not heavy
    /// concurrent churn on the same peer.
    ///
    /// The deadline and cancellation are checked between attempts. An attempt
    /// in progress always finishes handing back wrong picks, so no stray port
    /// stays on the peer; each request is bounded by the transport's timeout.
    #[tracing::instrument(skip(self, policy), fields(partition = %partition))]
    pub async fn bind_port(
        &self,
        peer: &str,
        partition: &Partition,
        target: u16,
        policy: &PortBindPolicy,
    ) -> Result<BindReport, ApiError> {
        let deadline = Instant::now() + policy.timeout;
        let mut report = BindReport {
            attempts: 0,
            returned: Vec::new(),
            bound_elsewhere: false,
        };

        loop {
            if policy.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
                warn!(target, attempts = report.attempts, "port bind cancelled");
                return Err(ApiError::PortAllocationCancelled { port: target });
            }
            if report.attempts >= policy.max_attempts {
                warn!(target, attempts = report.attempts, "port bind attempts exhausted");
                return Err(ApiError::PortAllocationTimeout {
                    port: target,
                    attempts: report.attempts,
                });
            }
            if report.attempts > 0 && Instant::now() >= deadline {
                warn!(target, attempts = report.attempts, "port bind deadline passed");
                return Err(ApiError::PortAllocationTimeout {
                    port: target,
                    attempts: report.attempts,
                });
            }
            report.attempts += 1;

            match self
                .bind_attempt(peer, partition, target, &mut report.returned)
                .await?
            {
                Attempt::Missed => {}
                Attempt::Bound | Attempt::AlreadyHeld => {
                    info!(target, attempts = report.attempts, "port bound to peer");
                    return Ok(report);
                }
                Attempt::BoundElsewhere => {
                    warn!(
                        target,
                        attempts = report.attempts,
                        "port was bound to peer by another operation"
                    );
                    report.bound_elsewhere = true;
                    return Ok(report);
                }
            }
        }
    }

    async fn bind_attempt(
        &self,
        peer: &str,
        partition: &Partition,
        target: u16,
        returned: &mut Vec<u16>,
    ) -> Result<Attempt, ApiError> {
        let before = self.peer_ports(peer).await?;
        if before.contains(&target) {
            debug!(target, "peer already holds the port");
            return Ok(Attempt::AlreadyHeld);
        }

        let candidate = self.api.add_port(Some(peer), partition).await?;
        let after = self.peer_ports(peer).await?;
        let mut delta = determine_added_ports(&after, &before);
        debug!(candidate, ?delta, "server picked a port");

        if candidate == target {
            return Ok(Attempt::Bound);
        }

        delta.insert(candidate);
        for port in delta.into_iter().filter(|p| *p != target) {
            self.unlink(peer, partition, port).await?;
            returned.push(port);
        }

        if after.contains(&target) {
            Ok(Attempt::BoundElsewhere)
        } else {
            Ok(Attempt::Missed)
        }
    }
}
