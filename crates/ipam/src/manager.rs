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

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use ipam_network::{IdentifyAddressFamily, IpAddressFamily, IpPrefix};

use crate::allocator::{AllocationError, Allocator, RangeAllocator};
use crate::config::Configuration;
use crate::conflict::{ReservationSummary, reserve_conflicts};
use crate::route::{RouteSource, candidate_routes};

/// Source of the node's per-family allocation prefixes.
pub trait NodeAddressing: Send + Sync {
    fn allocation_cidr(&self, family: IpAddressFamily) -> Option<IpPrefix>;
}

#[derive(thiserror::Error, Debug)]
pub enum IpamError {
    #[error("{0} is enabled but the node has no {0} allocation prefix")]
    MissingAllocationPrefix(IpAddressFamily),

    #[error("{family} allocator was given {prefix}, which is not an {family} prefix")]
    WrongAddressFamily {
        family: IpAddressFamily,
        prefix: IpPrefix,
    },

    #[error("{0} address allocation is not enabled")]
    FamilyNotEnabled(IpAddressFamily),

    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// The node's IP address manager. It owns one allocator per enabled address
/// family for the lifetime of the process; families that aren't enabled have
/// none.
pub struct Ipam {
    config: Configuration,
    ipv4_allocator: Option<Arc<dyn Allocator>>,
    ipv6_allocator: Option<Arc<dyn Allocator>>,
}

impl Ipam {
    /// Create the manager, with a fresh [`RangeAllocator`] over the node's
    /// allocation prefix for every family enabled in `config`.
    pub fn new(
        node_addressing: &dyn NodeAddressing,
        config: Configuration,
    ) -> Result<Self, IpamError> {
        let allocator_for = |family: IpAddressFamily| -> Result<_, IpamError> {
            if !config.is_enabled(family) {
                return Ok(None);
            }
            let prefix = node_addressing
                .allocation_cidr(family)
                .ok_or(IpamError::MissingAllocationPrefix(family))?;
            tracing::info!(%prefix, "Allocating {family} addresses from node allocation prefix");
            let allocator: Arc<dyn Allocator> = Arc::new(RangeAllocator::new(prefix));
            Ok(Some(allocator))
        };

        let ipv4_allocator = allocator_for(IpAddressFamily::Ipv4)?;
        let ipv6_allocator = allocator_for(IpAddressFamily::Ipv6)?;
        Self::with_allocators(config, ipv4_allocator, ipv6_allocator)
    }

    /// Create the manager around existing allocators. `config`'s family
    /// switches are not consulted; a family is enabled exactly when it has an
    /// allocator. Each allocator's prefix must belong to the family of the
    /// slot it is passed in.
    pub fn with_allocators(
        config: Configuration,
        ipv4_allocator: Option<Arc<dyn Allocator>>,
        ipv6_allocator: Option<Arc<dyn Allocator>>,
    ) -> Result<Self, IpamError> {
        for (family, allocator) in [
            (IpAddressFamily::Ipv4, &ipv4_allocator),
            (IpAddressFamily::Ipv6, &ipv6_allocator),
        ] {
            if let Some(allocator) = allocator {
                let prefix = allocator.prefix();
                if !prefix.is_address_family(family) {
                    return Err(IpamError::WrongAddressFamily { family, prefix });
                }
            }
        }

        Ok(Self {
            config,
            ipv4_allocator,
            ipv6_allocator,
        })
    }

    pub fn allocator(&self, family: IpAddressFamily) -> Option<&Arc<dyn Allocator>> {
        match family {
            IpAddressFamily::Ipv4 => self.ipv4_allocator.as_ref(),
            IpAddressFamily::Ipv6 => self.ipv6_allocator.as_ref(),
        }
    }

    pub fn allocation_prefix(&self, family: IpAddressFamily) -> Option<IpPrefix> {
        self.allocator(family).map(|allocator| allocator.prefix())
    }

    fn enabled_allocator(
        &self,
        family: IpAddressFamily,
    ) -> Result<&Arc<dyn Allocator>, IpamError> {
        self.allocator(family).ok_or(IpamError::FamilyNotEnabled(family))
    }

    /// Reserve a specific address in the allocator of its family.
    pub fn allocate_ip(&self, address: IpAddr) -> Result<(), IpamError> {
        self.enabled_allocator(address.address_family())?.allocate(address)?;
        Ok(())
    }

    /// Reserve the lowest free address of `family`.
    pub fn allocate_next(&self, family: IpAddressFamily) -> Result<IpAddr, IpamError> {
        Ok(self.enabled_allocator(family)?.allocate_next()?)
    }

    /// Return an address to its family's pool. Does nothing if the family
    /// isn't enabled.
    pub fn release_ip(&self, address: IpAddr) -> Result<(), IpamError> {
        match self.allocator(address.address_family()) {
            Some(allocator) => Ok(allocator.release(address)?),
            None => Ok(()),
        }
    }

    /// Reserved addresses of every enabled family.
    pub fn dump(&self) -> BTreeMap<IpAddressFamily, Vec<IpAddr>> {
        IpAddressFamily::ALL
            .into_iter()
            .filter_map(|family| self.allocator(family).map(|a| (family, a.reserved())))
            .collect()
    }

    /// Walk the host's IPv4 routes and reserve every address of the node
    /// allocation prefix that is already routed elsewhere, so it is never
    /// handed out to a workload.
    ///
    /// Meant to run once during node initialization. Returns `None` when IPv4
    /// isn't enabled or when the host device or the route table can't be
    /// read; allocation still works in that case, it just isn't protected
    /// against conflicts with existing routes.
    pub async fn reserve_local_routes(
        &self,
        route_source: &dyn RouteSource,
    ) -> Option<ReservationSummary> {
        // Only IPv4 routes are checked for conflicts.
        let allocator = self.ipv4_allocator.as_deref()?;

        tracing::debug!("Checking local routes for conflicts...");

        let host_device = &self.config.host_device;
        let host_link_index = match route_source.link_index(host_device).await {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!("Unable to find net_device {host_device}: {e}");
                return None;
            }
        };

        let routes = match route_source.list_routes(IpAddressFamily::Ipv4).await {
            Ok(routes) => routes,
            Err(e) => {
                tracing::warn!("Unable to retrieve local routes: {e}");
                return None;
            }
        };

        let allocation_prefix = allocator.prefix();
        let summary = reserve_conflicts(
            &allocation_prefix,
            allocator,
            candidate_routes(&routes, host_link_index),
        );

        tracing::info!(
            prefix = %allocation_prefix,
            routes = routes.len(),
            overlapping = summary.overlapping_routes,
            reserved = summary.reserved,
            already_reserved = summary.already_reserved,
            out_of_range = summary.out_of_range,
            failed = summary.failed,
            "Finished reserving local routes"
        );
        Some(summary)
    }
}
