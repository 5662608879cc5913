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

//! Configuration for the consistent-hashring load-balancing policy, and its
//! service-config JSON wire form:
//!
//! ```json
//! {"loadBalancingConfig":[{"consistent-hashring":{"replicationFactor":100,"spread":1}}]}
//! ```
//!
//! Zero-valued fields are omitted on encode and replaced by the defaults on
//! parse.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The name identifying this policy on the wire.
pub const POLICY_NAME: &str = "consistent-hashring";

/// Used when a service config provides no replication factor.
pub const DEFAULT_REPLICATION_FACTOR: u16 = 100;

/// Used when a service config provides no spread.
pub const DEFAULT_SPREAD: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unable to parse load-balancing policy config: {raw}")]
    Parse {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unable to encode service config")]
    Encode(#[source] serde_json::Error),
}

/// The configurable aspects of the balancer.
///
/// `replication_factor` is the number of virtual nodes each backend occupies
/// on the hashring; `spread` is the number of candidate backends considered
/// per routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancerConfig {
    #[serde(default, skip_serializing_if = "is_zero_u16")]
    pub replication_factor: u16,
    #[serde(default, skip_serializing_if = "is_zero_u8")]
    pub spread: u8,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_u16(value: &u16) -> bool {
    *value == 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero_u8(value: &u8) -> bool {
    *value == 0
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self { replication_factor: DEFAULT_REPLICATION_FACTOR, spread: DEFAULT_SPREAD }
    }
}

impl BalancerConfig {
    /// Parses a raw policy blob (the object nested under the policy name in
    /// a service config). Omitted or zero fields take their defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let mut config: Self =
            serde_json::from_str(raw).map_err(|source| ConfigError::Parse { raw: raw.to_owned(), source })?;

        if config.replication_factor == 0 {
            config.replication_factor = DEFAULT_REPLICATION_FACTOR;
        }
        if config.spread == 0 {
            config.spread = DEFAULT_SPREAD;
        }

        Ok(config)
    }

    /// Encodes this config into the service-config JSON format.
    pub fn service_config_json(&self) -> Result<String, ConfigError> {
        #[derive(Serialize)]
        struct ServiceConfig<'a> {
            #[serde(rename = "loadBalancingConfig")]
            load_balancing_config: [BTreeMap<&'static str, &'a BalancerConfig>; 1],
        }

        let wrapper = ServiceConfig { load_balancing_config: [BTreeMap::from([(POLICY_NAME, self)])] };
        serde_json::to_string(&wrapper).map_err(ConfigError::Encode)
    }

    /// Like [`BalancerConfig::service_config_json`].
    ///
    /// # Panics
    ///
    /// Panics if the config cannot be encoded, which cannot happen for any
    /// value of this type.
    #[allow(clippy::expect_used)]
    pub fn must_service_config_json(&self) -> String {
        self.service_config_json().expect("a balancer config is always encodable")
    }
}

/// The canonical service config selecting this policy with its defaults,
/// ready to hand to the channel at dial time.
pub fn default_service_config_json() -> String {
    BalancerConfig::default().must_service_config_json()
}

#[cfg(test)]
mod tests {
    use super::{default_service_config_json, BalancerConfig, ConfigError};

    #[test]
    fn encodes_service_config_json() {
        let cases = [
            (
                BalancerConfig { replication_factor: 300, spread: 2 },
                r#"{"loadBalancingConfig":[{"consistent-hashring":{"replicationFactor":300,"spread":2}}]}"#,
            ),
            (
                BalancerConfig { replication_factor: 300, spread: 0 },
                r#"{"loadBalancingConfig":[{"consistent-hashring":{"replicationFactor":300}}]}"#,
            ),
            (
                BalancerConfig { replication_factor: 0, spread: 1 },
                r#"{"loadBalancingConfig":[{"consistent-hashring":{"spread":1}}]}"#,
            ),
        ];

        for (config, expected) in cases {
            assert_eq!(config.service_config_json().unwrap(), expected);
            assert_eq!(config.must_service_config_json(), expected);
        }
    }

    #[test]
    fn default_service_config_carries_the_defaults() {
        assert_eq!(
            default_service_config_json(),
            r#"{"loadBalancingConfig":[{"consistent-hashring":{"replicationFactor":100,"spread":1}}]}"#
        );
    }

    #[test]
    fn parse_applies_defaults_to_missing_and_zero_fields() {
        assert_eq!(BalancerConfig::from_json("{}").unwrap(), BalancerConfig::default());
        assert_eq!(
            BalancerConfig::from_json(r#"{"replicationFactor":0,"spread":0}"#).unwrap(),
            BalancerConfig::default()
        );
        assert_eq!(
            BalancerConfig::from_json(r#"{"replicationFactor":300}"#).unwrap(),
            BalancerConfig { replication_factor: 300, spread: 1 }
        );
        assert_eq!(
            BalancerConfig::from_json(r#"{"spread":2}"#).unwrap(),
            BalancerConfig { replication_factor: 100, spread: 2 }
        );
    }

    #[test]
    fn parse_rejects_invalid_json() {
        let err = BalancerConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("not json"));
    }

    #[test]
    fn round_trips_non_zero_fields() {
        let config = BalancerConfig { replication_factor: 512, spread: 3 };
        let encoded = serde_json::to_string(&config).unwrap();
        assert_eq!(BalancerConfig::from_json(&encoded).unwrap(), config);

        // A fully zero config encodes to an empty object and parses back to
        // the defaults.
        let zero = BalancerConfig { replication_factor: 0, spread: 0 };
        assert_eq!(serde_json::to_string(&zero).unwrap(), "{}");
        assert_eq!(BalancerConfig::from_json("{}").unwrap(), BalancerConfig::default());
    }
}
