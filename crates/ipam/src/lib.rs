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

//! node-ipam manages the addresses a node hands out to its local workloads.
//!
//! Each enabled address family gets one allocator over the node's allocation
//! prefix. At startup the host's routing table is scanned and every address
//! of the allocation prefix that an existing route already covers is
//! reserved, so the allocator never hands it out.

use eyre::WrapErr;
use ipam_network::IpAddressFamily;

pub use crate::allocator::{AllocationError, Allocator, RangeAllocator};
pub use crate::command_line::Options;
pub use crate::config::{Configuration, IpamConfig, NodeAddressingConfig};
pub use crate::conflict::{ReservationSummary, reserve_conflicts};
pub use crate::manager::{Ipam, IpamError, NodeAddressing};
pub use crate::netlink::NetlinkRouteSource;
pub use crate::route::{
    CandidateRoute, LinkIndex, Route, RouteSource, RouteSourceError, candidate_routes,
};

pub mod allocator;
mod command_line;
pub mod config;
pub mod conflict;
pub mod logging;
pub mod manager;
pub mod netlink;
pub mod route;

/// Load the configuration, build the node's allocators and run the local
/// route reservation pass.
pub async fn start(options: Options) -> eyre::Result<()> {
    let config = IpamConfig::load_from(&options.config)
        .wrap_err_with(|| format!("Failed loading {}", options.config.display()))?;

    let ipam = Ipam::new(&config.node, config.ipam.clone())
        .wrap_err("Failed initializing node address allocators")?;

    reserve_local_routes(&ipam, &NetlinkRouteSource).await;

    for family in IpAddressFamily::ALL {
        let Some(allocator) = ipam.allocator(family) else {
            tracing::debug!("{family} allocation is disabled");
            continue;
        };
        tracing::info!(
            prefix = %allocator.prefix(),
            free = %allocator.free_count(),
            "{family} allocator ready"
        );
    }

    if options.dump {
        for (family, reserved) in ipam.dump() {
            println!("{family}:");
            for address in reserved {
                println!("  {address}");
            }
        }
    }

    Ok(())
}

/// Run the local route reservation pass. Returns whether it ran; when it
/// didn't, allocation proceeds without protection against existing routes.
async fn reserve_local_routes(ipam: &Ipam, route_source: &dyn RouteSource) -> bool {
    match ipam.reserve_local_routes(route_source).await {
        Some(summary) => {
            tracing::debug!(?summary, "Local route reservation complete");
            true
        }
        None => {
            tracing::warn!(
                "Local route reservation skipped; allocated addresses may overlap existing routes"
            );
            false
        }
    }
}
