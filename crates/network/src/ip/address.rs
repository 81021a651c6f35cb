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
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Advance a big-endian address buffer to its numeric successor, in place.
///
/// The last byte is the least significant one. Each byte is bumped by one and
/// the carry moves to the next more significant byte only when the byte wraps
/// to zero. Carrying past the first byte leaves the all-zero address: callers
/// that walk a range must bound the walk themselves (typically with a
/// containment check against the prefix being walked).
pub fn increment<const N: usize>(octets: &mut [u8; N]) {
    for octet in octets.iter_mut().rev() {
        *octet = octet.wrapping_add(1);
        if *octet != 0 {
            break;
        }
    }
}

/// The address numerically following `addr` in the same family.
pub fn next_address(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => IpAddr::V4(next_ipv4_address(v4)),
        IpAddr::V6(v6) => IpAddr::V6(next_ipv6_address(v6)),
    }
}

pub fn next_ipv4_address(addr: Ipv4Addr) -> Ipv4Addr {
    let mut octets = addr.octets();
    increment(&mut octets);
    Ipv4Addr::from(octets)
}

pub fn next_ipv6_address(addr: Ipv6Addr) -> Ipv6Addr {
    let mut octets = addr.octets();
    increment(&mut octets);
    Ipv6Addr::from(octets)
}
