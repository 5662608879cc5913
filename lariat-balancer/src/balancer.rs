// SPDX-FileCopyrightText: © 2025 Huawei Cloud Computing Technologies Co., Ltd
// SPDX-License-Identifier: Apache-2.0
//
// Copyright 2025 Huawei Cloud Computing Technologies Co., Ltd
//
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
//

//! The balancer state machine: consumes address-set updates and per-backend
//! connectivity transitions from the runtime, keeps the hashring in lockstep
//! with the live backend set, and publishes a picker over it.
//!
//! The runtime serializes all entry points on a single logical executor, so
//! the balancer holds no lock of its own; only the ring it owns is
//! independently thread-safe, because pickers read it from arbitrary call
//! sites.

use std::sync::Arc;

use lariat_configuration::{BalancerConfig, ConfigError, DEFAULT_SPREAD, POLICY_NAME};
use lariat_hashring::{HashFn, Ring, RingError};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info, warn};

use crate::{
    channel::{Address, ClientConn, ClientConnState, LbState, SharedError, SubConn, SubConnMember, SubConnOptions,
        SubConnState},
    connectivity::{ConnectivityState, ConnectivityStateEvaluator},
    picker::{ErrPicker, HashringPicker, LastErrors, Picker, PickerError},
};

#[derive(Debug, thiserror::Error)]
pub enum BalancerError {
    /// No service config carrying balancer settings has ever been delivered.
    #[error("no hashring configured")]
    MissingConfig,
    /// The resolver produced an unusable state; the runtime should
    /// re-resolve.
    #[error("resolver produced a bad state")]
    BadResolverState,
    #[error("couldn't update hashring membership")]
    Ring(#[from] RingError),
}

#[derive(Debug, thiserror::Error)]
#[error("produced zero addresses")]
struct ZeroAddresses;

/// Builds [`HashringBalancer`]s for a channel, all sharing one hash
/// function. Also parses this policy's service-config blob.
pub struct HashringBuilder {
    hashfn: HashFn,
    config: Mutex<Option<BalancerConfig>>,
}

impl HashringBuilder {
    /// `hashfn` drives every ring built by balancers from this builder;
    /// [`lariat_hashring::xxhash64`] is the recommended choice.
    pub fn new(hashfn: HashFn) -> Self {
        Self { hashfn, config: Mutex::new(None) }
    }

    /// The name identifying this policy on the wire.
    pub fn name(&self) -> &'static str {
        POLICY_NAME
    }

    /// A fresh balancer with no backends: aggregate `CONNECTING` and a
    /// picker that fails until the first resolver update lands.
    pub fn build<CC: ClientConn>(&self, client_conn: CC) -> HashringBalancer<CC> {
        HashringBalancer {
            client_conn,
            state: ConnectivityState::Connecting,
            picker: Arc::new(ErrPicker::new(PickerError::NoSubConnAvailable)),
            evaluator: ConnectivityStateEvaluator::default(),
            backends: FxHashMap::default(),
            backend_states: FxHashMap::default(),
            config: None,
            ring: None,
            hashfn: self.hashfn,
            resolver_err: None,
            conn_err: None,
        }
    }

    /// Parses this policy's service-config blob, applying defaults to
    /// omitted or zero fields, and keeps a copy of the result.
    pub fn parse_config(&self, raw: &str) -> Result<BalancerConfig, ConfigError> {
        let config = BalancerConfig::from_json(raw)?;
        info!(replication_factor = config.replication_factor, spread = config.spread, "parsed balancer config");
        *self.config.lock() = Some(config);
        Ok(config)
    }

    /// The most recently parsed config, if any.
    pub fn config(&self) -> Option<BalancerConfig> {
        *self.config.lock()
    }
}

/// Routes calls over a consistent hashring of the resolved backends.
///
/// Driven exclusively through the serialized entry points below; after every
/// state-relevant event it publishes an `{aggregate, picker}` pair through
/// the [`ClientConn`].
pub struct HashringBalancer<CC: ClientConn> {
    client_conn: CC,
    state: ConnectivityState,
    picker: Arc<dyn Picker<CC::SubConn>>,
    evaluator: ConnectivityStateEvaluator,
    backends: FxHashMap<Address, CC::SubConn>,
    backend_states: FxHashMap<CC::SubConn, ConnectivityState>,
    config: Option<BalancerConfig>,
    ring: Option<Arc<Ring<SubConnMember<CC::SubConn>>>>,
    hashfn: HashFn,
    /// The last error reported by the resolver; cleared on successful
    /// resolution.
    resolver_err: Option<SharedError>,
    /// The last connection error; replaced when a backend enters
    /// `TRANSIENT_FAILURE`.
    conn_err: Option<SharedError>,
}

impl<CC: ClientConn> HashringBalancer<CC> {
    /// Records a resolver failure.
    ///
    /// With no backends left the balancer floors to `TRANSIENT_FAILURE` and
    /// publishes an error picker carrying the stored errors; while healthy
    /// backends remain the current picker stays valid and nothing is
    /// published.
    pub fn resolver_error(&mut self, error: SharedError) {
        self.resolver_err = Some(error);
        if self.backends.is_empty() {
            self.state = ConnectivityState::TransientFailure;
            self.picker = Arc::new(ErrPicker::new(self.last_errors()));
        }

        if self.state != ConnectivityState::TransientFailure {
            return;
        }

        self.publish();
    }

    /// Reacts to a fresh address set or balancer config from the resolver.
    ///
    /// The hashring membership is reconciled against the address set and a
    /// new picker over the ring is published.
    pub fn update_client_conn_state(&mut self, update: ClientConnState) -> Result<(), BalancerError> {
        debug!(addresses = update.resolver_state.addresses.len(), "received client conn state");

        // Successful resolution clears the stored resolver error.
        self.resolver_err = None;

        if let Some(new_config) = update.balancer_config {
            let rebuild =
                self.config.map_or(true, |current| current.replication_factor != new_config.replication_factor);
            if rebuild {
                self.ring = Some(Arc::new(Ring::new(self.hashfn, new_config.replication_factor)?));
                // Members don't carry across a replication factor change:
                // the existing sub-connections are torn down here and
                // recreated from the address list below, which re-adds every
                // backend to the fresh ring.
                for (_, sub_conn) in self.backends.drain() {
                    self.client_conn.remove_sub_conn(&sub_conn);
                }
            }
            self.config = Some(new_config);
        }

        // Without a ring no service config with balancer settings has ever
        // arrived, and there is nothing to route over.
        let Some(ring) = self.ring.clone() else {
            self.picker = Arc::new(ErrPicker::new(self.last_errors()));
            self.publish();
            return Err(BalancerError::MissingConfig);
        };

        // Open a sub-connection and a ring slot for every address the
        // resolver added.
        for address in &update.resolver_state.addresses {
            if self.backends.contains_key(address) {
                continue;
            }

            let options = SubConnOptions { health_check_enabled: false };
            let sub_conn = match self.client_conn.new_sub_conn(std::slice::from_ref(address), options) {
                Ok(sub_conn) => sub_conn,
                Err(error) => {
                    warn!(addr = %address.addr, "failed to create sub-connection: {error}");
                    continue;
                },
            };

            self.backends.insert(address.clone(), sub_conn.clone());
            self.backend_states.insert(sub_conn.clone(), ConnectivityState::Idle);
            self.evaluator.record_transition(ConnectivityState::Shutdown, ConnectivityState::Idle);
            sub_conn.connect();

            ring.add(SubConnMember::new(sub_conn, address.ring_key()))?;
        }

        // Drop every backend the resolver no longer lists.
        let live: FxHashSet<&Address> = update.resolver_state.addresses.iter().collect();
        let stale: Vec<Address> = self.backends.keys().filter(|address| !live.contains(*address)).cloned().collect();
        for address in stale {
            if let Some(sub_conn) = self.backends.remove(&address) {
                self.client_conn.remove_sub_conn(&sub_conn);
                // The backend_states entry stays until the runtime reports
                // SHUTDOWN for this sub-connection.
                ring.remove(&SubConnMember::new(sub_conn, address.ring_key()))?;
            }
        }

        debug!(members = ring.len(), "hashring membership reconciled");

        // An empty address set can't route anything; surface it as a
        // resolver error so the runtime re-resolves.
        if update.resolver_state.addresses.is_empty() {
            self.resolver_error(Arc::new(ZeroAddresses));
            return Err(BalancerError::BadResolverState);
        }

        self.picker = if self.state == ConnectivityState::TransientFailure {
            Arc::new(ErrPicker::new(self.last_errors()))
        } else {
            let spread = self.config.map_or(DEFAULT_SPREAD, |config| config.spread);
            Arc::new(HashringPicker::new(ring, spread))
        };

        self.publish();

        Ok(())
    }

    /// Reacts to a sub-connection transition reported by the runtime, and
    /// reconnects idle sub-connections.
    pub fn update_sub_conn_state(&mut self, sub_conn: &CC::SubConn, update: SubConnState) {
        let new_state = update.state;

        let Some(&old_state) = self.backend_states.get(sub_conn) else {
            debug!(state = %new_state, "state change for unknown sub-connection {sub_conn:?}");
            return;
        };
        debug!(old = %old_state, new = %new_state, "sub-connection state change for {sub_conn:?}");

        if old_state == ConnectivityState::TransientFailure
            && matches!(new_state, ConnectivityState::Connecting | ConnectivityState::Idle)
        {
            // Once a backend enters TRANSIENT_FAILURE, its later IDLE and
            // CONNECTING transitions are ignored; otherwise a pool of dead
            // backends cycling through reconnects would hold the aggregate
            // at CONNECTING and mask the failure from callers.
            if new_state == ConnectivityState::Idle {
                sub_conn.connect();
            }
            return;
        }

        self.backend_states.insert(sub_conn.clone(), new_state);
        match new_state {
            ConnectivityState::Idle => sub_conn.connect(),
            ConnectivityState::Shutdown => {
                // The removal path keeps the entry alive until the runtime
                // confirms the teardown; this is that confirmation.
                self.backend_states.remove(sub_conn);
            },
            ConnectivityState::TransientFailure => {
                self.conn_err = update.connection_error;
            },
            _ => {},
        }

        self.state = self.evaluator.record_transition(old_state, new_state);
        self.publish();
    }

    /// Balancer shutdown. The runtime tears down the sub-connections it
    /// vended, so there is nothing to release here.
    pub fn close(&mut self) {}

    /// Idle exits need no extra work: idle sub-connections are reconnected
    /// as their transitions are reported.
    pub fn exit_idle(&mut self) {}

    fn last_errors(&self) -> PickerError {
        if self.conn_err.is_none() && self.resolver_err.is_none() {
            return PickerError::NoSubConnAvailable;
        }
        PickerError::Unavailable(LastErrors { connection: self.conn_err.clone(), resolver: self.resolver_err.clone() })
    }

    fn publish(&self) {
        self.client_conn.update_state(LbState { connectivity: self.state, picker: Arc::clone(&self.picker) });
    }
}
