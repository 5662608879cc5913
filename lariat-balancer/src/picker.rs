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

use std::{fmt, sync::Arc};

use lariat_hashring::{Ring, RingError};
use rand::Rng;

use crate::{
    channel::{SharedError, SubConn, SubConnMember},
    context::{Context, REQUEST_KEY},
};

/// Maps one call to one backend. Pickers are immutable snapshots; the
/// balancer publishes a fresh one after every membership or state change.
pub trait Picker<S>: Send + Sync {
    fn pick(&self, info: &PickInfo) -> Result<PickResult<S>, PickerError>;
}

/// The information a picker has about a call.
#[derive(Debug, Default)]
pub struct PickInfo {
    pub context: Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickResult<S> {
    pub sub_conn: S,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PickerError {
    #[error("no sub-connection is available")]
    NoSubConnAvailable,
    #[error(transparent)]
    Ring(#[from] RingError),
    #[error("{0}")]
    Unavailable(LastErrors),
}

/// The most recent connection and resolver errors, folded together for
/// surfacing through an [`ErrPicker`].
#[derive(Debug, Clone, Default)]
pub struct LastErrors {
    pub connection: Option<SharedError>,
    pub resolver: Option<SharedError>,
}

impl fmt::Display for LastErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.connection, &self.resolver) {
            (Some(connection), Some(resolver)) => write!(f, "{connection}; {resolver}"),
            (Some(connection), None) => write!(f, "{connection}"),
            (None, Some(resolver)) => write!(f, "{resolver}"),
            (None, None) => f.write_str("no error recorded"),
        }
    }
}

/// A picker that fails every pick with a fixed error.
#[derive(Debug, Clone)]
pub struct ErrPicker {
    error: PickerError,
}

impl ErrPicker {
    pub fn new(error: PickerError) -> Self {
        Self { error }
    }
}

impl<S> Picker<S> for ErrPicker {
    fn pick(&self, _info: &PickInfo) -> Result<PickResult<S>, PickerError> {
        Err(self.error.clone())
    }
}

/// Routes calls through a live hashring.
///
/// The routing key is read from the call context's [`REQUEST_KEY`] entry and
/// hashed onto the ring; with a spread above one, one of the first `spread`
/// distinct backends after that position is chosen at random. There is no
/// fallback if the chosen backend is unavailable: affinity is the point, and
/// the resolver removing a backend is the only channel by which
/// unavailability affects routing.
///
/// Picks panic if the calling code did not set a `Vec<u8>` routing key under
/// [`REQUEST_KEY`].
pub struct HashringPicker<S> {
    ring: Arc<Ring<SubConnMember<S>>>,
    spread: u8,
    intn: fn(u8) -> usize,
}

/// A non-negative pseudo-random number in `[0, n)` from the thread-local
/// generator, which is cheap and safe to hit from every call site at once.
fn thread_rng_intn(n: u8) -> usize {
    rand::thread_rng().gen_range(0..usize::from(n))
}

impl<S: SubConn> HashringPicker<S> {
    pub fn new(ring: Arc<Ring<SubConnMember<S>>>, spread: u8) -> Self {
        Self { ring, spread, intn: thread_rng_intn }
    }

    #[cfg(test)]
    pub(crate) fn with_intn(ring: Arc<Ring<SubConnMember<S>>>, spread: u8, intn: fn(u8) -> usize) -> Self {
        Self { ring, spread, intn }
    }
}

impl<S: SubConn> Picker<S> for HashringPicker<S> {
    #[allow(clippy::expect_used)]
    fn pick(&self, info: &PickInfo) -> Result<PickResult<S>, PickerError> {
        let key: &Vec<u8> =
            info.context.value(REQUEST_KEY).expect("no requestKey routing value set on the call context");

        let mut members = self.ring.find_n(key, self.spread)?;

        let index = if self.spread > 1 { (self.intn)(self.spread) } else { 0 };

        Ok(PickResult { sub_conn: members.swap_remove(index).into_sub_conn() })
    }
}
