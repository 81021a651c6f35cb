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

use ipam_network::{IpPrefix, next_address};

use crate::allocator::{AllocationError, Allocator};
use crate::route::CandidateRoute;

/// Counters from one conflict reservation pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReservationSummary {
    pub routes_considered: usize,
    pub overlapping_routes: usize,
    pub reserved: u128,
    pub already_reserved: u128,
    pub out_of_range: u128,
    pub failed: u128,
}

/// Reserve, in `allocator`, every address of `allocation_prefix` that one of
/// the `candidates` already routes somewhere else.
///
/// A route overlaps when the allocation prefix contains its destination
/// address. Its addresses are then walked from the masked destination network
/// upwards, one at a time, until the walk leaves the route's destination (or
/// the allocation prefix, for routes wider than it). Every visited address is
/// reserved, network and broadcast addresses included. Reservation failures
/// are logged and skipped, so running the pass again only reports addresses
/// as already reserved.
pub fn reserve_conflicts<'a, I>(
    allocation_prefix: &IpPrefix,
    allocator: &dyn Allocator,
    candidates: I,
) -> ReservationSummary
where
    I: IntoIterator<Item = CandidateRoute<'a>>,
{
    let mut summary = ReservationSummary::default();

    for CandidateRoute { destination, .. } in candidates {
        summary.routes_considered += 1;

        if !allocation_prefix.contains(destination.addr()) {
            continue;
        }
        summary.overlapping_routes += 1;

        tracing::info!(
            route = %destination,
            prefix = %allocation_prefix,
            "Marking local route as no-alloc in node allocation prefix"
        );

        let mut address = destination.network();
        if !allocation_prefix.contains(address) {
            // The route is wider than the allocation prefix; only the prefix
            // itself can overlap.
            address = allocation_prefix.network();
        }

        while destination.contains(&address) && allocation_prefix.contains(address) {
            match allocator.allocate(address) {
                Ok(()) => summary.reserved += 1,
                Err(e @ AllocationError::AlreadyReserved(_)) => {
                    tracing::debug!(route = %destination, "Skipping address: {e}");
                    summary.already_reserved += 1;
                }
                Err(e @ AllocationError::OutOfRange { .. }) => {
                    tracing::warn!(route = %destination, "Unable to reserve address: {e}");
                    summary.out_of_range += 1;
                }
                Err(e) => {
                    tracing::warn!(route = %destination, "Unable to reserve address: {e}");
                    summary.failed += 1;
                }
            }
            address = next_address(address);
        }
    }

    summary
}
