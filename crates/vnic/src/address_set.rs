//! Thread-safe ordered set of addresses bound to a virtual interface

use crate::error::Result;
use crate::stack::{InterfaceHandle, PacketStack};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use tracing::{debug, warn};
use vnic_types::{InterfaceAddress, MacAddress, NetworkId};

/// Addresses bound to one virtual interface
///
/// Every operation holds the set's lock for its whole duration, so callers on
/// different threads serialize and a snapshot never observes a half-applied
/// mutation.
#[derive(Debug)]
pub struct AddressSet {
    nwid: NetworkId,
    mac: MacAddress,
    ips: Mutex<BTreeSet<InterfaceAddress>>,
}

impl AddressSet {
    pub fn new(nwid: NetworkId, mac: MacAddress) -> Self {
        Self {
            nwid,
            mac,
            ips: Mutex::new(BTreeSet::new()),
        }
    }

    /// Bind `ip` with the stack, then record it. Returns the sub-interface
    /// the stack placed it on.
    ///
    /// The stack registration runs on every call, including for an address
    /// already in the set. If the stack rejects it the set is left unchanged.
    pub fn add(&self, stack: &dyn PacketStack, ip: InterfaceAddress) -> Result<InterfaceHandle> {
        let mut ips = self.ips.lock();
        let handle = stack.bind_address(self.nwid, self.mac, &ip)?;
        if ips.insert(ip) {
            debug!(nwid = %self.nwid, ip = %ip, handle = %handle, "Bound address");
        }
        Ok(handle)
    }

    /// Remove `ip`, returning whether it was present.
    ///
    /// Removing an absent address does nothing. Stack de-registration is best
    /// effort: a failure is logged and the address is still dropped locally.
    pub fn remove(&self, stack: &dyn PacketStack, ip: &InterfaceAddress) -> bool {
        let mut ips = self.ips.lock();
        if !ips.remove(ip) {
            debug!(nwid = %self.nwid, ip = %ip, "Address not bound, nothing to remove");
            return false;
        }
        if let Err(e) = stack.unbind_address(self.nwid, ip) {
            warn!(nwid = %self.nwid, ip = %ip, error = %e, "Stack de-registration failed");
        }
        debug!(nwid = %self.nwid, ip = %ip, "Removed address");
        true
    }

    /// Point-in-time copy of the bound addresses, in order
    pub fn snapshot(&self) -> Vec<InterfaceAddress> {
        self.ips.lock().iter().copied().collect()
    }

    pub fn contains(&self, ip: &InterfaceAddress) -> bool {
        self.ips.lock().contains(ip)
    }

    pub fn len(&self) -> usize {
        self.ips.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ips.lock().is_empty()
    }
}
