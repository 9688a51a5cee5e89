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

//! In-memory stand-in for the control plane: just enough bookkeeping of
//! keys and ports to exercise the reconciler end to end.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{Value, json};

use mullwarden::allocator::PortBindPolicy;
use mullwarden::transport::{ApiRequest, ApiResponse, Method, Transport, TransportError};
use mullwarden::{ApiClient, AuthGate, Reconciler};

pub const ACCOUNT: &str = "1234567890123456";
pub const AUTH_TOKEN: &str = "tok-A";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    pub city_code: String,
    pub peer: Option<String>,
}

#[derive(Debug)]
pub struct FakeState {
    pub account: String,
    pub login_status: u16,
    pub login_calls: usize,
    pub add_calls: usize,
    pub removals: Vec<(Option<String>, u16)>,
    pub keys: BTreeMap<String, BTreeSet<u16>>,
    pub ports: BTreeMap<u16, PortEntry>,
    /// Ports `/ports/add/` hands out, in order, before falling back.
    pub picks: VecDeque<u16>,
    /// When set, `/ports/add/` always offers this port first.
    pub stubborn_pick: Option<u16>,
    /// Bound to the same peer during the next `/ports/add/`, as if by a
    /// sibling operation.
    pub sibling_bind: Option<u16>,
    pub requests: Vec<ApiRequest>,
}

pub struct FakeMullvad {
    state: Mutex<FakeState>,
    login_delay: Duration,
    add_delay: Duration,
}

fn reply(status: u16, body: Value) -> ApiResponse {
    ApiResponse {
        status,
        body: if body.is_null() {
            String::new()
        } else {
            body.to_string()
        },
    }
}

impl FakeMullvad {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                account: ACCOUNT.to_string(),
                login_status: 200,
                login_calls: 0,
                add_calls: 0,
                removals: Vec::new(),
                keys: BTreeMap::new(),
                ports: BTreeMap::new(),
                picks: VecDeque::new(),
                stubborn_pick: None,
                sibling_bind: None,
                requests: Vec::new(),
            }),
            login_delay: Duration::from_millis(50),
            add_delay: Duration::ZERO,
        }
    }

    pub fn with_key(self, public_key: &str, ports: &[u16], city_code: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .keys
                .insert(public_key.to_string(), ports.iter().copied().collect());
            for port in ports {
                state.ports.insert(
                    *port,
                    PortEntry {
                        city_code: city_code.to_string(),
                        peer: Some(public_key.to_string()),
                    },
                );
            }
        }
        self
    }

    pub fn with_unassigned(self, city_code: &str, ports: &[u16]) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            for port in ports {
                state.ports.insert(
                    *port,
                    PortEntry {
                        city_code: city_code.to_string(),
                        peer: None,
                    },
                );
            }
        }
        self
    }

    pub fn with_picks(self, picks: &[u16]) -> Self {
        self.state.lock().unwrap().picks = picks.iter().copied().collect();
        self
    }

    pub fn with_login_status(self, status: u16) -> Self {
        self.state.lock().unwrap().login_status = status;
        self
    }

    pub fn with_add_delay(mut self, delay: Duration) -> Self {
        self.add_delay = delay;
        self
    }

    pub fn with_sibling_bind(self, port: u16) -> Self {
        self.state.lock().unwrap().sibling_bind = Some(port);
        self
    }

    pub fn set_stubborn_pick(&self, port: u16) {
        self.state.lock().unwrap().stubborn_pick = Some(port);
    }

    pub fn inspect<R>(&self, f: impl FnOnce(&FakeState) -> R) -> R {
        f(&self.state.lock().unwrap())
    }

    pub fn peer_ports(&self, public_key: &str) -> Vec<u16> {
        self.inspect(|s| {
            s.keys
                .get(public_key)
                .map(|p| p.iter().copied().collect())
                .unwrap_or_default()
        })
    }

    pub fn revoke_out_of_band(&self, public_key: &str) {
        let mut state = self.state.lock().unwrap();
        state.keys.remove(public_key);
    }

    pub fn remove_port_out_of_band(&self, port: u16) {
        let mut state = self.state.lock().unwrap();
        state.ports.remove(&port);
        for ports in state.keys.values_mut() {
            ports.remove(&port);
        }
    }

    fn login_body(account: &str) -> Value {
        json!({
            "token": account,
            "pretty_token": account,
            "active": true,
            "expires": "2026-12-31T00:00:00+00:00",
            "expiry_unix": 1_798_675_200,
            "max_ports": 5,
            "can_add_ports": true,
            "max_wg_peers": 5,
            "can_add_wg_peers": true,
            "subscription": null,
            "auth_token": AUTH_TOKEN,
        })
    }

    fn key_body(public_key: &str, ports: &BTreeSet<u16>) -> Value {
        json!({
            "key": { "public": public_key, "private": null },
            "created": "2025-06-01T00:00:00+00:00",
            "ipv4_address": "10.64.0.2/32",
            "ipv6_address": "fc00:bbbb:bbbb:bb01::2/128",
            "ports": ports,
            "can_add_ports": true,
            "app": false,
        })
    }

    fn handle(&self, state: &mut FakeState, req: &ApiRequest) -> ApiResponse {
        let body = req.body.clone().unwrap_or(Value::Null);
        let authorized = req.auth_token.as_deref() == Some(AUTH_TOKEN);

        match (req.method, req.path.as_str()) {
            (Method::Post, "/accounts/") => {
                state.account = "9999888877776666".to_string();
                reply(201, Self::login_body(&state.account))
            }
            (Method::Get, path) if path.starts_with("/accounts/") => {
                state.login_calls += 1;
                let token = path.trim_start_matches("/accounts/").trim_end_matches('/');
                if state.login_status == 200 && token == state.account {
                    reply(200, Self::login_body(token))
                } else {
                    reply(state.login_status.max(400), json!({ "code": "INVALID_ACCOUNT" }))
                }
            }
            _ if !authorized => reply(401, json!({ "code": "INVALID_AUTH" })),
            (Method::Get, "/me/") => {
                let city_ports: Vec<Value> = state
                    .ports
                    .iter()
                    .map(|(port, e)| json!({ "city_code": e.city_code, "port": port, "wgkey": e.peer }))
                    .collect();
                reply(
                    200,
                    json!({ "account": { "token": state.account, "city_ports": city_ports } }),
                )
            }
            (Method::Get, "/wg-pubkeys/list/") => {
                let keys: Vec<Value> = state
                    .keys
                    .iter()
                    .map(|(k, ports)| Self::key_body(k, ports))
                    .collect();
                let all: Vec<u16> = state.ports.keys().copied().collect();
                let unassigned = state.ports.values().filter(|e| e.peer.is_none()).count();
                reply(
                    200,
                    json!({ "keys": keys, "max_ports": 5, "ports": all, "unassigned_ports": unassigned }),
                )
            }
            (Method::Post, "/wg-pubkeys/add/") => {
                let public_key = body["pubkey"].as_str().unwrap_or_default().to_string();
                if public_key.is_empty() || state.keys.contains_key(&public_key) {
                    return reply(400, json!({ "code": "PUBKEY_EXISTS" }));
                }
                state.keys.insert(public_key.clone(), BTreeSet::new());
                reply(201, Self::key_body(&public_key, &BTreeSet::new()))
            }
            (Method::Post, "/wg-pubkeys/revoke/") => {
                let public_key = body["pubkey"].as_str().unwrap_or_default();
                match state.keys.remove(public_key) {
                    Some(_) => reply(204, Value::Null),
                    None => reply(404, json!({ "code": "PUBKEY_NOT_FOUND" })),
                }
            }
            (Method::Post, "/ports/add/") => self.add_port(state, &body),
            (Method::Post, "/ports/remove/") => self.remove_port(state, &body),
            _ => reply(404, Value::Null),
        }
    }

    fn add_port(&self, state: &mut FakeState, body: &Value) -> ApiResponse {
        state.add_calls += 1;
        let city_code = body["city_code"].as_str().unwrap_or_default().to_string();
        let peer = body["pubkey"].as_str().map(str::to_string);
        if let Some(peer) = &peer {
            if !state.keys.contains_key(peer) {
                return reply(400, json!({ "code": "PUBKEY_NOT_FOUND" }));
            }
        }

        let pick = state
            .stubborn_pick
            .or_else(|| state.picks.pop_front())
            .or_else(|| {
                state
                    .ports
                    .iter()
                    .find(|(_, e)| e.peer.is_none() && e.city_code == city_code)
                    .map(|(p, _)| *p)
            })
            .unwrap_or_else(|| state.ports.keys().last().map_or(10_000, |p| p + 1));

        state.ports.insert(
            pick,
            PortEntry {
                city_code,
                peer: peer.clone(),
            },
        );
        if let Some(peer) = peer {
            if let Some(sibling) = state.sibling_bind.take() {
                if let Some(entry) = state.ports.get_mut(&sibling) {
                    entry.peer = Some(peer.clone());
                }
                state.keys.entry(peer.clone()).or_default().insert(sibling);
            }
            state.keys.entry(peer).or_default().insert(pick);
        }
        reply(201, json!({ "port": pick }))
    }

    fn remove_port(&self, state: &mut FakeState, body: &Value) -> ApiResponse {
        let city_code = body["city_code"].as_str().unwrap_or_default();
        let port = body["port"].as_u64().unwrap_or_default() as u16;
        let peer = body["pubkey"].as_str().map(str::to_string);
        state.removals.push((peer.clone(), port));

        let Some(entry) = state.ports.get(&port).cloned() else {
            return reply(404, json!({ "code": "PORT_NOT_FOUND" }));
        };
        if entry.city_code != city_code {
            return reply(404, json!({ "code": "PORT_NOT_FOUND" }));
        }

        match peer {
            Some(peer) => {
                if entry.peer.as_deref() != Some(peer.as_str()) {
                    return reply(404, json!({ "code": "PORT_NOT_FOUND" }));
                }
                state.ports.insert(
                    port,
                    PortEntry {
                        city_code: entry.city_code,
                        peer: None,
                    },
                );
                if let Some(ports) = state.keys.get_mut(&peer) {
                    ports.remove(&port);
                }
            }
            None => {
                state.ports.remove(&port);
                for ports in state.keys.values_mut() {
                    ports.remove(&port);
                }
            }
        }
        reply(204, Value::Null)
    }
}

impl Transport for FakeMullvad {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let is_login = request.method == Method::Get && request.path.starts_with("/accounts/");
        if is_login {
            tokio::time::sleep(self.login_delay).await;
        } else if request.path == "/ports/add/" && !self.add_delay.is_zero() {
            tokio::time::sleep(self.add_delay).await;
        }

        let mut state = self.state.lock().unwrap();
        state.requests.push(request.clone());
        Ok(self.handle(&mut state, &request))
    }
}

pub fn reconciler(fake: FakeMullvad, account: Option<&str>) -> Reconciler<FakeMullvad> {
    let gate = AuthGate::new(account.map(str::to_string), Duration::from_secs(2));
    let api = Arc::new(ApiClient::new(fake, gate));
    Reconciler::new(
        api,
        PortBindPolicy {
            max_attempts: 8,
            timeout: Duration::from_secs(5),
            cancel: None,
        },
    )
}

pub fn fake(reconciler: &Reconciler<FakeMullvad>) -> &FakeMullvad {
    reconciler.api().transport()
}
