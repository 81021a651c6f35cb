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

//! Common address handling for the node IPAM: address families, canonical
//! prefixes and fixed-width address arithmetic.

pub mod ip;

pub use ip::address::{increment, next_address};
pub use ip::address_family::{IdentifyAddressFamily, IpAddressFamily};
pub use ip::prefix::{IpPrefix, Ipv4Prefix, Ipv6Prefix, PrefixAddresses, PrefixError, ToPrefix};
