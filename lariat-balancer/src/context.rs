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

use std::{any::Any, fmt};

use rustc_hash::FxHashMap;

/// The context entry holding the routing key for a call.
///
/// The stored value must be a `Vec<u8>`; it is hashed to place the call on
/// the ring. Callers that route through this balancer must set it on every
/// call.
pub const REQUEST_KEY: &str = "requestKey";

/// Per-call metadata, carried from the call site into the picker.
///
/// A string-keyed map of type-erased values, mirroring the request context
/// the RPC runtime threads through a call.
#[derive(Default)]
pub struct Context {
    values: FxHashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the context with `value` stored under `key`, replacing any
    /// previous entry.
    #[must_use]
    pub fn with_value<T: Any + Send + Sync>(mut self, key: &'static str, value: T) -> Self {
        self.values.insert(key, Box::new(value));
        self
    }

    /// The value stored under `key`, if present and of type `T`.
    pub fn value<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|value| value.downcast_ref())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{Context, REQUEST_KEY};

    #[test]
    fn stores_and_retrieves_typed_values() {
        let context = Context::new().with_value(REQUEST_KEY, b"tenant-42".to_vec()).with_value("attempt", 3u32);

        assert_eq!(context.value::<Vec<u8>>(REQUEST_KEY).unwrap(), b"tenant-42");
        assert_eq!(context.value::<u32>("attempt"), Some(&3));
        assert_eq!(context.value::<u32>("missing"), None);
        // A wrong-typed read misses rather than coercing.
        assert_eq!(context.value::<String>(REQUEST_KEY), None);
    }

    #[test]
    fn later_values_replace_earlier_ones() {
        let context = Context::new().with_value(REQUEST_KEY, b"a".to_vec()).with_value(REQUEST_KEY, b"b".to_vec());
        assert_eq!(context.value::<Vec<u8>>(REQUEST_KEY).unwrap(), b"b");
    }
}
