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

//! Thin facades over the RPC runtime's channel layer: the client connection
//! the balancer drives, the per-backend sub-connections it is handed, and
//! the state messages that flow between them.

use std::{fmt, fmt::Debug, hash::Hash, sync::Arc};

use compact_str::CompactString;
use lariat_configuration::BalancerConfig;
use lariat_hashring::Member;

use crate::{connectivity::ConnectivityState, picker::Picker};

/// Errors handed across the runtime boundary. Cloned rather than copied so
/// the same error instance can be stored and folded into pickers.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A handle to a single backend's transport, vended by the runtime.
///
/// Handles are compared by identity: two clones of the same handle must be
/// equal and hash identically.
pub trait SubConn: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    /// Begins connecting asynchronously. Completion is reported back through
    /// [`HashringBalancer::update_sub_conn_state`].
    ///
    /// [`HashringBalancer::update_sub_conn_state`]: crate::balancer::HashringBalancer::update_sub_conn_state
    fn connect(&self);
}

/// The runtime-side surface the balancer calls out through.
pub trait ClientConn {
    type SubConn: SubConn;

    /// Creates a sub-connection for the given addresses. The connection is
    /// not established until [`SubConn::connect`] is called.
    fn new_sub_conn(&self, addresses: &[Address], options: SubConnOptions) -> Result<Self::SubConn, SharedError>;

    /// Asks the runtime to tear a sub-connection down. The runtime reports
    /// the final `SHUTDOWN` transition asynchronously.
    fn remove_sub_conn(&self, sub_conn: &Self::SubConn);

    /// Publishes a new aggregate state and picker snapshot.
    fn update_state(&self, state: LbState<Self::SubConn>);
}

/// A resolved backend address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    pub addr: CompactString,
    pub server_name: CompactString,
}

impl Address {
    pub fn new(server_name: impl Into<CompactString>, addr: impl Into<CompactString>) -> Self {
        Self { addr: addr.into(), server_name: server_name.into() }
    }

    /// The identity this address takes on the hashring.
    pub fn ring_key(&self) -> CompactString {
        let mut key = self.server_name.clone();
        key.push_str(&self.addr);
        key
    }
}

/// The address set produced by the name resolver.
#[derive(Debug, Clone, Default)]
pub struct ResolverState {
    pub addresses: Vec<Address>,
}

/// A resolver delivery: the fresh address set plus, when it changed, a fresh
/// balancer configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientConnState {
    pub resolver_state: ResolverState,
    pub balancer_config: Option<BalancerConfig>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubConnOptions {
    pub health_check_enabled: bool,
}

/// A sub-connection transition reported by the runtime.
#[derive(Debug, Clone)]
pub struct SubConnState {
    pub state: ConnectivityState,
    /// Set when `state` is `TRANSIENT_FAILURE`.
    pub connection_error: Option<SharedError>,
}

/// The `{aggregate, picker}` pair the balancer publishes after every
/// state-relevant event.
pub struct LbState<S> {
    pub connectivity: ConnectivityState,
    pub picker: Arc<dyn Picker<S>>,
}

impl<S> Clone for LbState<S> {
    fn clone(&self) -> Self {
        Self { connectivity: self.connectivity, picker: Arc::clone(&self.picker) }
    }
}

impl<S> Debug for LbState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LbState").field("connectivity", &self.connectivity).finish_non_exhaustive()
    }
}

/// The hashring member wrapping a backend: keyed by the resolved address,
/// carrying the sub-connection handle picks resolve to.
#[derive(Debug, Clone)]
pub struct SubConnMember<S> {
    sub_conn: S,
    key: CompactString,
}

impl<S> SubConnMember<S> {
    pub fn new(sub_conn: S, key: CompactString) -> Self {
        Self { sub_conn, key }
    }

    pub fn sub_conn(&self) -> &S {
        &self.sub_conn
    }

    pub fn into_sub_conn(self) -> S {
        self.sub_conn
    }
}

impl<S> Member for SubConnMember<S> {
    fn key(&self) -> &str {
        &self.key
    }
}
