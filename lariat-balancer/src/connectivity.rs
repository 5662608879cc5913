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

use std::fmt;

/// The connectivity of a single sub-connection, or the aggregate over all
/// of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectivityState {
    Idle,
    Connecting,
    Ready,
    TransientFailure,
    Shutdown,
}

impl ConnectivityState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Connecting => "CONNECTING",
            Self::Ready => "READY",
            Self::TransientFailure => "TRANSIENT_FAILURE",
            Self::Shutdown => "SHUTDOWN",
        }
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregates per-backend transitions into a single channel state.
///
/// Occupancy counters are kept per state (`SHUTDOWN` excluded, as shut-down
/// connections no longer exist); the aggregate is the most optimistic state
/// any live backend is in, with `TRANSIENT_FAILURE` as the floor.
#[derive(Debug, Default)]
pub struct ConnectivityStateEvaluator {
    num_ready: i64,
    num_connecting: i64,
    num_idle: i64,
    num_transient_failure: i64,
}

impl ConnectivityStateEvaluator {
    /// Moves one backend from `old` to `new` and returns the aggregate.
    pub fn record_transition(&mut self, old: ConnectivityState, new: ConnectivityState) -> ConnectivityState {
        for (state, delta) in [(old, -1), (new, 1)] {
            match state {
                ConnectivityState::Ready => self.num_ready += delta,
                ConnectivityState::Connecting => self.num_connecting += delta,
                ConnectivityState::Idle => self.num_idle += delta,
                ConnectivityState::TransientFailure => self.num_transient_failure += delta,
                ConnectivityState::Shutdown => {},
            }
        }

        self.current_state()
    }

    /// The aggregate for the transitions recorded so far.
    pub fn current_state(&self) -> ConnectivityState {
        if self.num_ready > 0 {
            return ConnectivityState::Ready;
        }
        if self.num_connecting > 0 {
            return ConnectivityState::Connecting;
        }
        if self.num_idle > 0 {
            return ConnectivityState::Idle;
        }
        ConnectivityState::TransientFailure
    }
}
