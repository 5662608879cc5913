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

//! Distribution and consistency properties of the ring, checked over large
//! key sets and randomized membership changes.

use std::collections::HashMap;

use lariat_hashring::{xxhash64, Member, Ring};
use rand::{rngs::SmallRng, Rng, SeedableRng};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TestMember {
    key: String,
}

impl TestMember {
    fn new(id: u32) -> Self {
        Self { key: format!("member-{id}") }
    }
}

impl Member for TestMember {
    fn key(&self) -> &str {
        &self.key
    }
}

const NUM_DISTRIBUTION_KEYS: usize = 1_000_000;

#[test]
fn keys_distribute_evenly_across_members() {
    for num_members in [1usize, 2, 3, 5, 10, 100] {
        let ring = Ring::new(xxhash64, 100).unwrap();

        let mut counts: HashMap<TestMember, u64> = HashMap::new();
        for id in 0..num_members {
            let member = TestMember::new(u32::try_from(id).unwrap());
            ring.add(member.clone()).unwrap();
            counts.insert(member, 0);
        }
        assert_eq!(ring.len(), num_members);

        for i in 0..NUM_DISTRIBUTION_KEYS {
            let key = i.to_string();
            let found = ring.find_n(key.as_bytes(), 1).unwrap();
            assert_eq!(found.len(), 1);
            *counts.get_mut(&found[0]).unwrap() += 1;
        }

        let total: u64 = counts.values().sum();
        assert_eq!(total, NUM_DISTRIBUTION_KEYS as u64);

        let mean = NUM_DISTRIBUTION_KEYS as f64 / num_members as f64;
        let variance =
            counts.values().map(|&count| (count as f64 - mean).powi(2)).sum::<f64>() / num_members as f64;
        let stddev = variance.sqrt();

        // With 100 vnodes per member the relative deviation stays under 10%.
        assert!(
            stddev < mean * 0.1,
            "stddev {stddev:.1} exceeds 10% of mean {mean:.1} with {num_members} members"
        );
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Perturbation {
    Add,
    Remove,
}

/// Records the mapping of every key, then randomly adds or removes a single
/// member. Returns the pre-change mapping and what changed.
fn perturb(
    ring: &Ring<TestMember>,
    spread: u8,
    num_keys: usize,
    rng: &mut SmallRng,
) -> (Vec<Vec<TestMember>>, Perturbation, TestMember) {
    let mut before = Vec::with_capacity(num_keys);
    for i in 0..num_keys {
        let key = i.to_string();
        let found = ring.find_n(key.as_bytes(), spread).unwrap();
        assert_eq!(found.len(), usize::from(spread));
        before.push(found);
    }

    let mut perturbation = if rng.gen_range(0..2) == 0 { Perturbation::Add } else { Perturbation::Remove };
    // Don't let the membership dip below the spread.
    if ring.len() == usize::from(spread) {
        perturbation = Perturbation::Add;
    }

    let affected = match perturbation {
        Perturbation::Add => loop {
            let candidate = TestMember::new(rng.gen());
            if ring.add(candidate.clone()).is_ok() {
                break candidate;
            }
        },
        Perturbation::Remove => {
            let members = ring.members();
            let affected = members[rng.gen_range(0..members.len())].clone();
            ring.remove(&affected).unwrap();
            affected
        },
    };

    (before, perturbation, affected)
}

/// Asserts the keys were remapped correctly for the change `perturb` made.
fn verify(
    ring: &Ring<TestMember>,
    before: &[Vec<TestMember>],
    perturbation: Perturbation,
    affected: &TestMember,
    spread: u8,
) {
    for (i, previous) in before.iter().enumerate() {
        let key = i.to_string();
        let found = ring.find_n(key.as_bytes(), spread).unwrap();
        assert_eq!(found.len(), usize::from(spread));

        match perturbation {
            Perturbation::Remove => {
                // Every previous candidate other than the removed member
                // keeps its slot.
                for member in previous {
                    if member == affected {
                        continue;
                    }
                    assert!(found.contains(member), "key {key} lost member {member:?} on unrelated removal");
                }
            },
            Perturbation::Add => {
                // At most one candidate changed, and only to the new member.
                let survivors: Vec<_> = found.iter().filter(|member| *member != affected).collect();
                assert!(found.len() - survivors.len() <= 1);
                for member in &survivors {
                    assert!(previous.contains(*member), "key {key} gained unexpected member {member:?}");
                }
                if survivors.len() == found.len() {
                    assert_eq!(&found, previous, "key {key} reordered without the new member");
                }
            },
        }
    }
}

#[test]
fn membership_changes_remap_minimally() {
    let ring = Ring::new(xxhash64, 100).unwrap();
    for id in 0..5 {
        ring.add(TestMember::new(id)).unwrap();
    }

    let spread = 3;
    let num_keys = 1000;
    let mut rng = SmallRng::seed_from_u64(1);
    for _ in 0..10 {
        let (before, perturbation, affected) = perturb(&ring, spread, num_keys, &mut rng);
        verify(&ring, &before, perturbation, &affected, spread);
    }
}
