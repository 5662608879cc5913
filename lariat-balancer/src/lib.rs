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

//! A client-side RPC load-balancing policy that routes calls over a
//! consistent hashring of the resolved backends.
//!
//! Identical routing keys land on the same backend for as long as the
//! membership is unchanged, and membership changes remap only a small
//! fraction of keys. A `spread` above one widens the candidate set per key,
//! trading strict affinity for resilience to a single backend going away.
//!
//! The policy is wired up through a [`HashringBuilder`] registered with the
//! RPC runtime under the [`POLICY_NAME`] and selected through the service
//! config (see [`lariat_configuration`]). Each call must carry its routing
//! key in the call context under [`REQUEST_KEY`].

pub mod balancer;
pub mod channel;
pub mod connectivity;
pub mod context;
pub mod picker;

pub use lariat_configuration::{
    default_service_config_json, BalancerConfig, ConfigError, DEFAULT_REPLICATION_FACTOR, DEFAULT_SPREAD, POLICY_NAME,
};
pub use lariat_hashring as hashring;

pub use crate::{
    balancer::{BalancerError, HashringBalancer, HashringBuilder},
    channel::{
        Address, ClientConn, ClientConnState, LbState, ResolverState, SharedError, SubConn, SubConnMember,
        SubConnOptions, SubConnState,
    },
    connectivity::{ConnectivityState, ConnectivityStateEvaluator},
    context::{Context, REQUEST_KEY},
    picker::{ErrPicker, HashringPicker, LastErrors, PickInfo, PickResult, Picker, PickerError},
};
