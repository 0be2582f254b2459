//! Multicast group identity.

use crate::{InterfaceAddress, IpAddress, MacAddress};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A multicast group: a multicast MAC plus a 32-bit additional
/// distinguishing information (ADI) field.
///
/// The ADI lets groups share a MAC. IPv4 address resolution uses it to carry
/// the IPv4 address under the broadcast MAC, so ARP for one address does not
/// reach every member of the network.
///
/// Groups order by MAC first, then ADI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MulticastGroup {
    mac: MacAddress,
    adi: u32,
}

impl MulticastGroup {
    pub const fn new(mac: MacAddress, adi: u32) -> Self {
        MulticastGroup { mac, adi }
    }

    /// Derives the group a host must subscribe to so that address resolution
    /// for `addr` reaches it.
    ///
    /// - IPv4: broadcast MAC with the address (host order) as ADI.
    /// - IPv6: solicited-node MAC `33:33:ff:xx:xx:xx` built from the last three
    ///   address bytes, ADI 0.
    ///
    /// ```
    /// use vnic_types::{InterfaceAddress, MacAddress, MulticastGroup};
    ///
    /// let addr: InterfaceAddress = "10.0.0.5/24".parse().unwrap();
    /// let group = MulticastGroup::for_address_resolution(&addr);
    /// assert_eq!(group.mac(), MacAddress::BROADCAST);
    /// assert_eq!(group.adi(), 0x0a00_0005);
    /// ```
    pub fn for_address_resolution(addr: &InterfaceAddress) -> Self {
        match addr.address() {
            IpAddress::V4(v4) => MulticastGroup::new(MacAddress::BROADCAST, v4.to_bits()),
            IpAddress::V6(v6) => {
                let [.., a, b, c] = v6.octets();
                MulticastGroup::new(MacAddress::solicited_node([a, b, c]), 0)
            }
        }
    }

    pub const fn mac(&self) -> MacAddress {
        self.mac
    }

    pub const fn adi(&self) -> u32 {
        self.adi
    }
}

impl fmt::Display for MulticastGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:08x}", self.mac, self.adi)
    }
}
