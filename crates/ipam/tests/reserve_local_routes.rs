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
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use ipam_network::{IpAddressFamily, IpPrefix};
use ipnet::IpNet;
use node_ipam::{
    Allocator, Ipam, IpamConfig, LinkIndex, Route, RouteSource, RouteSourceError,
};

const HOST_DEVICE: &str = "ipam_host";
const HOST_LINK: LinkIndex = 42;
const UPLINK: LinkIndex = 2;

/// A fixed routing table, as the kernel would report it.
struct StaticRoutes {
    routes: Vec<Route>,
    list_calls: AtomicUsize,
}

impl StaticRoutes {
    fn new(routes: &[(Option<&str>, LinkIndex)]) -> Self {
        let routes = routes
            .iter()
            .map(|(destination, link_index)| Route {
                destination: destination.map(|d| IpNet::from_str(d).unwrap()),
                link_index: Some(*link_index),
            })
            .collect();
        Self {
            routes,
            list_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RouteSource for StaticRoutes {
    async fn link_index(&self, name: &str) -> Result<LinkIndex, RouteSourceError> {
        match name {
            HOST_DEVICE => Ok(HOST_LINK),
            _ => Err(RouteSourceError::InterfaceNotFound(name.to_owned())),
        }
    }

    async fn list_routes(&self, family: IpAddressFamily) -> Result<Vec<Route>, RouteSourceError> {
        assert_eq!(family, IpAddressFamily::Ipv4);
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.routes.clone())
    }
}

fn load_config(data: &str) -> IpamConfig {
    IpamConfig::from_toml(data).expect("Couldn't parse test config")
}

fn ipv4_reserved(ipam: &Ipam) -> Vec<IpAddr> {
    ipam.dump()
        .remove(&IpAddressFamily::Ipv4)
        .expect("IPv4 allocation should be enabled")
}

#[tokio::test]
async fn test_reserve_local_routes_end_to_end() -> Result<(), eyre::Report> {
    let config = load_config(
        r#"
        [node]
        ipv4-allocation-cidr = "10.0.0.0/24"
        "#,
    );
    let ipam = Ipam::new(&config.node, config.ipam.clone())?;
    let routes = StaticRoutes::new(&[
        (None, UPLINK),
        (Some("10.0.0.64/28"), UPLINK),
        (Some("10.0.0.200/30"), HOST_LINK),
        (Some("172.16.0.0/12"), UPLINK),
    ]);

    let summary = ipam
        .reserve_local_routes(&routes)
        .await
        .expect("reservation pass should run");

    let expected: Vec<IpAddr> = (64..=79)
        .map(|host| IpAddr::from([10, 0, 0, host]))
        .collect();
    assert_eq!(ipv4_reserved(&ipam), expected);
    assert_eq!(summary.reserved, 16);
    assert_eq!(summary.routes_considered, 2);

    // Addresses handed out afterwards steer around the reserved block.
    let allocator = ipam
        .allocator(IpAddressFamily::Ipv4)
        .expect("IPv4 allocation should be enabled");
    assert_eq!(allocator.free_count(), 240);
    for address in IpPrefix::from_str("10.0.0.0/24")?.addresses() {
        let result = ipam.allocate_ip(address);
        assert_eq!(result.is_ok(), !expected.contains(&address), "{address}");
    }
    assert_eq!(allocator.free_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_rerun_keeps_reserved_set() -> Result<(), eyre::Report> {
    let config = load_config(
        r#"
        [node]
        ipv4-allocation-cidr = "192.168.100.0/24"
        "#,
    );
    let ipam = Ipam::new(&config.node, config.ipam.clone())?;
    let routes = StaticRoutes::new(&[
        (Some("192.168.100.128/26"), UPLINK),
        (Some("192.168.100.160/27"), UPLINK),
        (Some("192.168.0.0/16"), UPLINK),
    ]);

    let first = ipam.reserve_local_routes(&routes).await.unwrap();
    let reserved = ipv4_reserved(&ipam);
    let second = ipam.reserve_local_routes(&routes).await.unwrap();

    assert_eq!(ipv4_reserved(&ipam), reserved);
    assert_eq!(routes.list_calls.load(Ordering::SeqCst), 2);
    // 192.168.0.0/16 has its destination address outside the allocation
    // prefix, so it never counts as overlapping.
    assert_eq!(first.overlapping_routes, 2);
    assert_eq!(first.reserved, 64);
    assert_eq!(second.reserved, 0);
    assert_eq!(second.already_reserved, 64 + 32);
    Ok(())
}

#[tokio::test]
async fn test_wrong_host_device_leaves_pool_untouched() -> Result<(), eyre::Report> {
    let config = load_config(
        r#"
        [ipam]
        host-device = "missing0"

        [node]
        ipv4-allocation-cidr = "10.0.0.0/24"
        "#,
    );
    let ipam = Ipam::new(&config.node, config.ipam.clone())?;
    let routes = StaticRoutes::new(&[(Some("10.0.0.64/28"), UPLINK)]);

    assert!(ipam.reserve_local_routes(&routes).await.is_none());
    assert_eq!(routes.list_calls.load(Ordering::SeqCst), 0);
    assert!(ipv4_reserved(&ipam).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_shared_allocator_sees_reservations() -> Result<(), eyre::Report> {
    let prefix = IpPrefix::from_str("10.9.0.0/29")?;
    let allocator: Arc<dyn Allocator> = Arc::new(node_ipam::RangeAllocator::new(prefix));
    let config = load_config("");
    let ipam = Ipam::with_allocators(config.ipam, Some(allocator.clone()), None)?;
    let routes = StaticRoutes::new(&[(Some("10.9.0.0/30"), UPLINK)]);

    ipam.reserve_local_routes(&routes).await.unwrap();

    assert_eq!(allocator.allocate_next()?, IpAddr::from([10, 9, 0, 4]));
    Ok(())
}

#[test]
fn test_allocator_in_wrong_family_slot_is_rejected() -> Result<(), eyre::Report> {
    let allocator: Arc<dyn Allocator> = Arc::new(node_ipam::RangeAllocator::new(
        IpPrefix::from_str("fd00::/112")?,
    ));
    let config = load_config("");

    let result = Ipam::with_allocators(config.ipam, Some(allocator.clone()), None);

    assert!(matches!(
        result,
        Err(node_ipam::IpamError::WrongAddressFamily {
            family: IpAddressFamily::Ipv4,
            ..
        })
    ));
    assert!(allocator.reserved().is_empty());
    Ok(())
}
