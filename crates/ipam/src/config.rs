/*
 * SPDX-FileCopyrightText: Copyright (c) 2021-2023 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

use std::path::{Path, PathBuf};

use ipam_network::{IpAddressFamily, IpPrefix, Ipv4Prefix, Ipv6Prefix};
use serde::{Deserialize, Serialize};

use crate::manager::NodeAddressing;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/node-ipam/config.toml";

/// Interface carrying the allocator's own traffic. Routes through it are
/// never treated as conflicts.
const DEFAULT_HOST_DEVICE: &str = "ipam_host";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Couldn't read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid IPAM config toml data: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Describes the format of the node IPAM configuration file.
///
/// This is what we READ from /etc/node-ipam/config.toml. Only the `[node]`
/// allocation prefixes are required in practice; everything else defaults.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpamConfig {
    #[serde(default)]
    pub ipam: Configuration,
    #[serde(default)]
    pub node: NodeAddressingConfig,
}

impl IpamConfig {
    /// Loads the configuration file in toml format from the given path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        Self::from_toml(&data)
    }

    pub fn from_toml(data: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(data)?)
    }
}

/// Which address families the node allocates from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    #[serde(default = "default_enable_ipv4")]
    pub enable_ipv4: bool,
    #[serde(default)]
    pub enable_ipv6: bool,
    #[serde(default = "default_host_device")]
    pub host_device: String,
}

// Called if no `[ipam]` is provided at all.
// The serde defaults above are called if one or more fields are missing.
impl Default for Configuration {
    fn default() -> Self {
        Self {
            enable_ipv4: default_enable_ipv4(),
            enable_ipv6: false,
            host_device: default_host_device(),
        }
    }
}

impl Configuration {
    pub fn is_enabled(&self, family: IpAddressFamily) -> bool {
        match family {
            IpAddressFamily::Ipv4 => self.enable_ipv4,
            IpAddressFamily::Ipv6 => self.enable_ipv6,
        }
    }
}

fn default_enable_ipv4() -> bool {
    true
}

pub fn default_host_device() -> String {
    DEFAULT_HOST_DEVICE.to_string()
}

/// The node's allocation prefixes, one per family.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeAddressingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv4_allocation_cidr: Option<Ipv4Prefix>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipv6_allocation_cidr: Option<Ipv6Prefix>,
}

impl NodeAddressing for NodeAddressingConfig {
    fn allocation_cidr(&self, family: IpAddressFamily) -> Option<IpPrefix> {
        match family {
            IpAddressFamily::Ipv4 => self.ipv4_allocation_cidr.map(IpPrefix::V4),
            IpAddressFamily::Ipv6 => self.ipv6_allocation_cidr.map(IpPrefix::V6),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::str::FromStr;

    use super::*;

    #[test]
    fn test_full_config() {
        let config = IpamConfig::from_toml(
            r#"
            [ipam]
            enable-ipv4 = true
            enable-ipv6 = true
            host-device = "ipam_host0"

            [node]
            ipv4-allocation-cidr = "10.0.0.0/24"
            ipv6-allocation-cidr = "fd00::/112"
            "#,
        )
        .unwrap();

        assert!(config.ipam.is_enabled(IpAddressFamily::Ipv4));
        assert!(config.ipam.is_enabled(IpAddressFamily::Ipv6));
        assert_eq!(config.ipam.host_device, "ipam_host0");
        assert_eq!(
            config.node.allocation_cidr(IpAddressFamily::Ipv4),
            Some(IpPrefix::from_str("10.0.0.0/24").unwrap())
        );
        assert_eq!(
            config.node.allocation_cidr(IpAddressFamily::Ipv6),
            Some(IpPrefix::from_str("fd00::/112").unwrap())
        );
    }

    #[test]
    fn test_defaults() {
        let config = IpamConfig::from_toml(
            r#"
            [node]
            ipv4-allocation-cidr = "10.0.0.0/24"
            "#,
        )
        .unwrap();
        assert_eq!(config.ipam, Configuration::default());
        assert!(config.ipam.enable_ipv4);
        assert!(!config.ipam.enable_ipv6);
        assert_eq!(config.ipam.host_device, DEFAULT_HOST_DEVICE);
        assert_eq!(config.node.allocation_cidr(IpAddressFamily::Ipv6), None);

        let config = IpamConfig::from_toml("").unwrap();
        assert_eq!(config, IpamConfig::default());
    }

    #[test]
    fn test_rejects_non_canonical_prefix() {
        let result = IpamConfig::from_toml(
            r#"
            [node]
            ipv4-allocation-cidr = "10.0.0.1/24"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_rejects_wrong_family_prefix() {
        let result = IpamConfig::from_toml(
            r#"
            [node]
            ipv4-allocation-cidr = "fd00::/112"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[ipam]\nenable-ipv6 = true\n\n[node]\nipv6-allocation-cidr = \"fd00::/120\""
        )
        .unwrap();

        let config = IpamConfig::load_from(file.path()).unwrap();
        assert!(config.ipam.enable_ipv6);
        assert_eq!(
            config.node.ipv6_allocation_cidr,
            Some(Ipv6Prefix::from_str("fd00::/120").unwrap())
        );

        let missing = IpamConfig::load_from(Path::new("/nonexistent/node-ipam.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = IpamConfig {
            ipam: Configuration::default(),
            node: NodeAddressingConfig {
                ipv4_allocation_cidr: Some(Ipv4Prefix::from_str("10.0.0.0/24").unwrap()),
                ipv6_allocation_cidr: None,
            },
        };
        let data = toml::to_string(&config).unwrap();
        assert_eq!(IpamConfig::from_toml(&data).unwrap(), config);
    }
}
