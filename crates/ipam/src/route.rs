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

use async_trait::async_trait;
use ipam_network::IpAddressFamily;
use ipnet::IpNet;
use mockall::automock;

/// Kernel index of a network interface.
pub type LinkIndex = u32;

/// A route from the host's routing table, reduced to what conflict
/// reservation looks at.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Route {
    /// Destination network. Absent for default routes. May carry host bits
    /// (e.g. `10.0.0.70/28`), in which case the route covers the masked
    /// network.
    pub destination: Option<IpNet>,
    /// Egress interface, if the route names one.
    pub link_index: Option<LinkIndex>,
}

impl Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.destination {
            Some(destination) => write!(f, "{destination}")?,
            None => write!(f, "default")?,
        }
        match self.link_index {
            Some(link_index) => write!(f, " dev-index {link_index}"),
            None => Ok(()),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RouteSourceError {
    #[error("couldn't open netlink connection: {0}")]
    Connection(#[source] std::io::Error),

    #[error("couldn't look up network interface {name}: {source}")]
    InterfaceLookup {
        name: String,
        #[source]
        source: rtnetlink::Error,
    },

    #[error("network interface {0} not found")]
    InterfaceNotFound(String),

    #[error("couldn't list routes: {0}")]
    Communication(#[source] rtnetlink::Error),
}

/// Where the host's routes and interface identities come from.
#[automock]
#[async_trait]
pub trait RouteSource: Send + Sync {
    /// Resolve an interface name to its kernel index.
    async fn link_index(&self, name: &str) -> Result<LinkIndex, RouteSourceError>;

    /// List the host's routes for one address family.
    async fn list_routes(&self, family: IpAddressFamily) -> Result<Vec<Route>, RouteSourceError>;
}

/// A route that passed [`candidate_routes`]; its destination is known to be
/// present.
#[derive(Clone, Copy, Debug)]
pub struct CandidateRoute<'a> {
    pub route: &'a Route,
    pub destination: IpNet,
}

/// Yield the routes that may conflict with local allocations, in their
/// original order. Routes through the host device are the allocator's own
/// and are skipped, as are routes without a destination.
pub fn candidate_routes(
    routes: &[Route],
    host_link_index: LinkIndex,
) -> impl Iterator<Item = CandidateRoute<'_>> {
    routes.iter().filter_map(move |route| {
        if route.link_index == Some(host_link_index) {
            tracing::debug!(%route, "Ignoring route: points to host device");
            return None;
        }

        let Some(destination) = route.destination else {
            tracing::debug!(%route, "Ignoring route: no destination address");
            return None;
        };

        tracing::debug!(%route, "Considering route");
        Some(CandidateRoute { route, destination })
    })
}
