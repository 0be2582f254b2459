//! Value types shared by the virtual network interface crates.
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`IpAddress`]: IPv4 and IPv6 addresses
//! - [`InterfaceAddress`]: an address bound to an interface, with its netmask bits
//! - [`MulticastGroup`]: a multicast MAC plus additional distinguishing information
//! - [`NetworkId`]: 64-bit virtual network identifier

mod ip;
mod mac;
mod multicast;
mod network;

pub use ip::{InterfaceAddress, IpAddress, Ipv4Address, Ipv6Address};
pub use mac::MacAddress;
pub use multicast::MulticastGroup;
pub use network::NetworkId;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP address format: {0}")]
    InvalidIpAddress(String),

    #[error("invalid interface address: {0}")]
    InvalidInterfaceAddress(String),

    #[error("invalid network id: {0} (expected up to 16 hex digits)")]
    InvalidNetworkId(String),
}
