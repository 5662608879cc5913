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

use std::sync::Arc;

use compact_str::CompactString;

/// A member's placement data. One record exists per distinct member and is
/// never mutated after construction, so every virtual node can hold a cheap
/// snapshot of its owner through an [`Arc`].
#[derive(Debug)]
pub(crate) struct NodeRecord<M> {
    pub key: CompactString,
    pub key_hash: u64,
    pub member: M,
    /// The `R` vnode positions of this record, in derivation order.
    pub vnode_hashes: Vec<u64>,
}

/// A single point on the ring.
#[derive(Debug)]
pub(crate) struct VirtualNode<M> {
    pub hash: u64,
    pub owner: Arc<NodeRecord<M>>,
}

impl<M> VirtualNode<M> {
    /// The total order of the ring: position first, then the owner's key hash,
    /// then the owner's key bytes. Deterministic regardless of insertion
    /// order, which removal relies on for its binary searches.
    pub fn sort_key(&self) -> (u64, u64, &str) {
        (self.hash, self.owner.key_hash, self.owner.key.as_str())
    }
}

impl<M> Clone for VirtualNode<M> {
    fn clone(&self) -> Self {
        Self { hash: self.hash, owner: Arc::clone(&self.owner) }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{NodeRecord, VirtualNode};

    fn vnode(hash: u64, key_hash: u64, key: &str) -> VirtualNode<()> {
        VirtualNode {
            hash,
            owner: Arc::new(NodeRecord { key: key.into(), key_hash, member: (), vnode_hashes: Vec::new() }),
        }
    }

    #[test]
    fn sort_order_breaks_ties_on_owner() {
        let mut vnodes =
            vec![vnode(7, 2, "b"), vnode(7, 2, "a"), vnode(7, 1, "z"), vnode(3, 9, "x"), vnode(9, 0, "y")];

        vnodes.sort_unstable_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let order: Vec<_> = vnodes.iter().map(|v| (v.hash, v.owner.key_hash, v.owner.key.as_str())).collect();
        assert_eq!(order, [(3, 9, "x"), (7, 1, "z"), (7, 2, "a"), (7, 2, "b"), (9, 0, "y")]);
    }

    #[test]
    fn sort_order_is_insertion_order_independent() {
        let forward = vec![vnode(1, 1, "a"), vnode(1, 2, "b"), vnode(2, 1, "c")];
        let mut reversed: Vec<_> = forward.iter().rev().cloned().collect();
        let mut forward = forward;

        forward.sort_unstable_by(|a, b| a.sort_key().cmp(&b.sort_key()));
        reversed.sort_unstable_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let keys = |vnodes: &[VirtualNode<()>]| vnodes.iter().map(|v| v.sort_key().0).collect::<Vec<_>>();
        assert_eq!(keys(&forward), keys(&reversed));
    }
}
