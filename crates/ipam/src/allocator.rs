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

use std::collections::BTreeSet;
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use ipam_network::IpPrefix;
use mockall::automock;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("Address {0} is already reserved")]
    AlreadyReserved(IpAddr),

    #[error("Address {address} is not in the allocation range {range}")]
    OutOfRange { address: IpAddr, range: IpPrefix },

    #[error("Allocation range {0} has exhausted all address space")]
    Exhausted(IpPrefix),
}

/// An Allocator tracks which addresses of one allocation prefix are free and
/// which are reserved. There is exactly one per enabled address family, and
/// it is shared between the conflict reservation pass and whatever hands
/// addresses out to workloads, so implementations synchronize internally.
#[automock]
pub trait Allocator: Send + Sync {
    /// The allocation prefix this allocator hands out addresses from.
    fn prefix(&self) -> IpPrefix;

    /// Reserve a specific address.
    fn allocate(&self, address: IpAddr) -> Result<(), AllocationError>;

    /// Reserve the lowest free address of the range.
    fn allocate_next(&self) -> Result<IpAddr, AllocationError>;

    /// Return an address to the free pool. Releasing a free address is a
    /// no-op.
    fn release(&self, address: IpAddr) -> Result<(), AllocationError>;

    fn is_reserved(&self, address: IpAddr) -> bool;

    fn free_count(&self) -> u128;

    /// All reserved addresses, in ascending order.
    fn reserved(&self) -> Vec<IpAddr>;
}

/// RangeAllocator hands out addresses from a single prefix. Every address of
/// the prefix is allocatable, the network and last addresses included.
#[derive(Debug)]
pub struct RangeAllocator {
    prefix: IpPrefix,
    reserved: Mutex<BTreeSet<IpAddr>>,
}

impl RangeAllocator {
    pub fn new(prefix: IpPrefix) -> Self {
        Self {
            prefix,
            reserved: Mutex::new(BTreeSet::new()),
        }
    }

    // The set is only ever mutated by single inserts/removes, so a panic in
    // another holder can't leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, BTreeSet<IpAddr>> {
        self.reserved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_range(&self, address: IpAddr) -> Result<(), AllocationError> {
        match self.prefix.contains(address) {
            true => Ok(()),
            false => Err(AllocationError::OutOfRange {
                address,
                range: self.prefix,
            }),
        }
    }
}

impl Allocator for RangeAllocator {
    fn prefix(&self) -> IpPrefix {
        self.prefix
    }

    fn allocate(&self, address: IpAddr) -> Result<(), AllocationError> {
        self.check_range(address)?;
        match self.lock().insert(address) {
            true => Ok(()),
            false => Err(AllocationError::AlreadyReserved(address)),
        }
    }

    fn allocate_next(&self) -> Result<IpAddr, AllocationError> {
        let mut reserved = self.lock();
        if reserved.len() as u128 >= self.prefix.address_count() {
            return Err(AllocationError::Exhausted(self.prefix));
        }

        let address = self
            .prefix
            .addresses()
            .find(|address| !reserved.contains(address))
            .ok_or(AllocationError::Exhausted(self.prefix))?;
        reserved.insert(address);
        Ok(address)
    }

    fn release(&self, address: IpAddr) -> Result<(), AllocationError> {
        self.check_range(address)?;
        self.lock().remove(&address);
        Ok(())
    }

    fn is_reserved(&self, address: IpAddr) -> bool {
        self.lock().contains(&address)
    }

    fn free_count(&self) -> u128 {
        let reserved = self.lock().len() as u128;
        self.prefix.address_count().saturating_sub(reserved)
    }

    fn reserved(&self) -> Vec<IpAddr> {
        self.lock().iter().copied().collect()
    }
}
