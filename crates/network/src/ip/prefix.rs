/*
 * SPDX-FileCopyrightText: Copyright (c) 2021-2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */
use std::fmt::Display;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::{AddrParseError, IpNet, Ipv4Net, Ipv6Net, PrefixLenError};
use serde_with::{DeserializeFromStr, SerializeDisplay};

use super::address::next_address;
use super::address_family::{IdentifyAddressFamily, IpAddressFamily};

/// An allocation prefix: a block of addresses sharing their leading bits.
/// Unlike a plain `IpNet`, all bits after the prefix length must be zero, so
/// an interface address written in CIDR notation (`10.0.0.1/24`) is rejected
/// rather than silently masked.
#[derive(Clone, Copy, Debug, Eq, PartialEq, DeserializeFromStr, SerializeDisplay)]
pub enum IpPrefix {
    V4(Ipv4Prefix),
    V6(Ipv6Prefix),
}

/// A canonical IPv4 prefix.
#[derive(Clone, Copy, Debug, Eq, PartialEq, DeserializeFromStr, SerializeDisplay)]
pub struct Ipv4Prefix(Ipv4Net);

/// A canonical IPv6 prefix.
#[derive(Clone, Copy, Debug, Eq, PartialEq, DeserializeFromStr, SerializeDisplay)]
pub struct Ipv6Prefix(Ipv6Net);

#[derive(Debug, thiserror::Error)]
pub enum PrefixError {
    #[error(
        "Prefix not in canonical representation (address bits after prefix must be set to zero)"
    )]
    NonCanonicalRepresentation,

    #[error("Parse error: {0}")]
    ParseError(#[from] AddrParseError),

    #[error("Prefix length error: {0}")]
    BadPrefixLength(#[from] PrefixLenError),
}

/// Values that can be viewed as a prefix. An address becomes a host prefix
/// (/32 or /128).
pub trait ToPrefix {
    fn to_prefix(&self) -> IpPrefix;
}

impl IpPrefix {
    fn as_net(&self) -> IpNet {
        match self {
            IpPrefix::V4(Ipv4Prefix(net)) => IpNet::V4(*net),
            IpPrefix::V6(Ipv6Prefix(net)) => IpNet::V6(*net),
        }
    }

    /// Whether `other` (an address, or another prefix) lies entirely within
    /// this prefix. Values of the other address family are never contained.
    pub fn contains<P: ToPrefix>(&self, other: P) -> bool {
        self.as_net().contains(&other.to_prefix().as_net())
    }

    /// The first (all host bits zero) address of the prefix.
    pub fn network(&self) -> IpAddr {
        self.as_net().network()
    }

    fn prefix_len(&self) -> u8 {
        self.as_net().prefix_len()
    }

    /// Number of addresses covered by the prefix. An IPv6 /0 saturates at
    /// `u128::MAX`.
    pub fn address_count(&self) -> u128 {
        let host_bits = self.address_family().max_prefix_length() - self.prefix_len();
        1u128.checked_shl(u32::from(host_bits)).unwrap_or(u128::MAX)
    }

    /// Iterate over every address of the prefix in ascending order, network
    /// and last address included.
    pub fn addresses(&self) -> PrefixAddresses {
        PrefixAddresses {
            prefix: *self,
            next: Some(self.network()),
        }
    }
}

impl IdentifyAddressFamily for IpPrefix {
    fn address_family(&self) -> IpAddressFamily {
        match self {
            IpPrefix::V4(_) => IpAddressFamily::Ipv4,
            IpPrefix::V6(_) => IpAddressFamily::Ipv6,
        }
    }
}

/// Iterator over the addresses of an [`IpPrefix`], see [`IpPrefix::addresses`].
#[derive(Clone, Debug)]
pub struct PrefixAddresses {
    prefix: IpPrefix,
    next: Option<IpAddr>,
}

impl Iterator for PrefixAddresses {
    type Item = IpAddr;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        let following = next_address(current);
        // Stepping off the end of the prefix (including wrapping around the
        // top of the address space) ends the walk.
        self.next = self.prefix.contains(following).then_some(following);
        Some(current)
    }
}

impl ToPrefix for IpPrefix {
    fn to_prefix(&self) -> IpPrefix {
        *self
    }
}

impl ToPrefix for IpAddr {
    fn to_prefix(&self) -> IpPrefix {
        match self {
            IpAddr::V4(v4) => IpPrefix::V4(Ipv4Prefix(Ipv4Net::from(*v4))),
            IpAddr::V6(v6) => IpPrefix::V6(Ipv6Prefix(Ipv6Net::from(*v6))),
        }
    }
}

impl TryFrom<IpNet> for IpPrefix {
    type Error = PrefixError;

    fn try_from(value: IpNet) -> Result<Self, Self::Error> {
        match value {
            IpNet::V4(net) => Ipv4Prefix::try_from(net).map(Self::V4),
            IpNet::V6(net) => Ipv6Prefix::try_from(net).map(Self::V6),
        }
    }
}

impl TryFrom<Ipv4Net> for Ipv4Prefix {
    type Error = PrefixError;

    fn try_from(value: Ipv4Net) -> Result<Self, Self::Error> {
        match value == value.trunc() {
            true => Ok(Self(value)),
            false => Err(PrefixError::NonCanonicalRepresentation),
        }
    }
}

impl TryFrom<Ipv6Net> for Ipv6Prefix {
    type Error = PrefixError;

    fn try_from(value: Ipv6Net) -> Result<Self, Self::Error> {
        match value == value.trunc() {
            true => Ok(Self(value)),
            false => Err(PrefixError::NonCanonicalRepresentation),
        }
    }
}

impl FromStr for IpPrefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(IpNet::from_str(s)?)
    }
}

impl FromStr for Ipv4Prefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(Ipv4Net::from_str(s)?)
    }
}

impl FromStr for Ipv6Prefix {
    type Err = PrefixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(Ipv6Net::from_str(s)?)
    }
}

impl Display for IpPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.as_net().fmt(f)
    }
}

impl Display for Ipv4Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl Display for Ipv6Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
