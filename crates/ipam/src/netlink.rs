/*
 * SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

use std::net::IpAddr;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use ipam_network::IpAddressFamily;
use ipnet::IpNet;
use netlink_packet_route::route::{RouteAddress, RouteAttribute, RouteMessage};
use rtnetlink::IpVersion;

use crate::route::{LinkIndex, Route, RouteSource, RouteSourceError};

// Only the main table is scanned, matching what `ip route show` prints by
// default.
const RT_TABLE_MAIN: u32 = 254;

/// Reads routes and interfaces from the kernel over rtnetlink. Each call opens
/// its own connection, which is fine for a pass that runs once at startup.
#[derive(Clone, Copy, Debug, Default)]
pub struct NetlinkRouteSource;

#[async_trait]
impl RouteSource for NetlinkRouteSource {
    async fn link_index(&self, name: &str) -> Result<LinkIndex, RouteSourceError> {
        let (netlink_connection, rtnetlink_handle, _receiver) =
            rtnetlink::new_connection().map_err(RouteSourceError::Connection)?;

        // The connection runs in the background and owns the socket. It exits
        // once both `rtnetlink_handle` and `_receiver` go out of scope.
        tokio::spawn(netlink_connection);

        let link = rtnetlink_handle
            .link()
            .get()
            .match_name(name.to_owned())
            .execute()
            .try_next()
            .await
            .map_err(|source| RouteSourceError::InterfaceLookup {
                name: name.to_owned(),
                source,
            })?;

        link.map(|link_message| link_message.header.index)
            .ok_or_else(|| RouteSourceError::InterfaceNotFound(name.to_owned()))
    }

    async fn list_routes(&self, family: IpAddressFamily) -> Result<Vec<Route>, RouteSourceError> {
        let (netlink_connection, rtnetlink_handle, _receiver) =
            rtnetlink::new_connection().map_err(RouteSourceError::Connection)?;
        tokio::spawn(netlink_connection);

        let ip_version = match family {
            IpAddressFamily::Ipv4 => IpVersion::V4,
            IpAddressFamily::Ipv6 => IpVersion::V6,
        };

        rtnetlink_handle
            .route()
            .get(ip_version)
            .execute()
            .try_filter_map(|route_message| async move {
                let route = (route_table(&route_message) == RT_TABLE_MAIN)
                    .then(|| Route::from(route_message));
                Ok(route)
            })
            .try_collect()
            .await
            .map_err(RouteSourceError::Communication)
    }
}

// Table ids above 255 only fit in the RTA_TABLE attribute; the header field
// is the fallback.
fn route_table(route_message: &RouteMessage) -> u32 {
    route_message
        .attributes
        .iter()
        .find_map(|attribute| match attribute {
            RouteAttribute::Table(table) => Some(*table),
            _ => None,
        })
        .unwrap_or(u32::from(route_message.header.table))
}

impl From<RouteMessage> for Route {
    fn from(route_message: RouteMessage) -> Self {
        let prefix_length = route_message.header.destination_prefix_length;
        let destination = route_message
            .attributes
            .iter()
            .find_map(|attribute| match attribute {
                RouteAttribute::Destination(RouteAddress::Inet(v4)) => Some(IpAddr::V4(*v4)),
                RouteAttribute::Destination(RouteAddress::Inet6(v6)) => Some(IpAddr::V6(*v6)),
                _ => None,
            })
            .and_then(|address| match IpNet::new(address, prefix_length) {
                Ok(destination) => Some(destination),
                Err(e) => {
                    tracing::warn!("Route to {address} has invalid prefix length: {e}");
                    None
                }
            });
        let link_index = route_message
            .attributes
            .iter()
            .find_map(|attribute| match attribute {
                RouteAttribute::Oif(index) => Some(*index),
                _ => None,
            });

        Route {
            destination,
            link_index,
        }
    }
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    use super::*;

    fn route_message(attributes: Vec<RouteAttribute>, prefix_length: u8) -> RouteMessage {
        let mut route_message = RouteMessage::default();
        route_message.header.destination_prefix_length = prefix_length;
        route_message.header.table = RT_TABLE_MAIN as u8;
        route_message.attributes = attributes;
        route_message
    }

    #[test]
    fn test_route_from_message() {
        let message = route_message(
            vec![
                RouteAttribute::Destination(RouteAddress::Inet(Ipv4Addr::new(10, 0, 0, 64))),
                RouteAttribute::Oif(3),
            ],
            28,
        );
        let route = Route::from(message);
        assert_eq!(
            route.destination,
            Some(IpNet::from_str("10.0.0.64/28").unwrap())
        );
        assert_eq!(route.link_index, Some(3));
    }

    #[test]
    fn test_default_route_has_no_destination() {
        let message = route_message(vec![RouteAttribute::Oif(2)], 0);
        let route = Route::from(message);
        assert_eq!(route.destination, None);
        assert_eq!(route.link_index, Some(2));
    }

    #[test]
    fn test_route_table() {
        let mut message = route_message(vec![], 0);
        assert_eq!(route_table(&message), RT_TABLE_MAIN);

        message.attributes.push(RouteAttribute::Table(1000));
        assert_eq!(route_table(&message), 1000);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_loopback_link_index() {
        let index = NetlinkRouteSource
            .link_index("lo")
            .await
            .expect("link_index() returned an error for the 'lo' interface");
        assert!(index > 0);
    }
}
