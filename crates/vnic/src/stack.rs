//! Collaborator boundary: the packet stack and the owning node's event sink
//!
//! The controller never moves frames or runs an IP stack itself. It talks to
//! the packet stack through [`PacketStack`] and reports lifecycle events to
//! the owning node through [`EventSink`]. Both are injected at join time.

use crate::error::StackError;
use std::fmt;
use std::sync::Arc;
use vnic_types::{InterfaceAddress, MacAddress, NetworkId};

/// IP family of a sub-interface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Check order used by state recognition
    pub const ALL: [IpFamily; 2] = [IpFamily::V4, IpFamily::V6];

    pub fn of(addr: &InterfaceAddress) -> Self {
        if addr.is_ipv4() {
            IpFamily::V4
        } else {
            IpFamily::V6
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IpFamily::V4 => "v4",
            IpFamily::V6 => "v6",
        }
    }
}

/// Opaque handle for a per-family sub-interface created by the packet stack
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InterfaceHandle(pub u64);

impl fmt::Display for InterfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "netif#{}", self.0)
    }
}

/// Lifecycle event posted to the owning node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NetworkEvent {
    /// Controller is being destroyed
    NetworkDown,
    /// Sub-interface came up
    InterfaceUp(IpFamily),
    /// Sub-interface went down
    InterfaceDown(IpFamily),
}

impl NetworkEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkEvent::NetworkDown => "network-down",
            NetworkEvent::InterfaceUp(IpFamily::V4) => "interface-up-v4",
            NetworkEvent::InterfaceUp(IpFamily::V6) => "interface-up-v6",
            NetworkEvent::InterfaceDown(IpFamily::V4) => "interface-down-v4",
            NetworkEvent::InterfaceDown(IpFamily::V6) => "interface-down-v6",
        }
    }
}

impl fmt::Display for NetworkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An Ethernet frame crossing the virtual interface boundary
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EthernetFrame<'a> {
    pub src: MacAddress,
    pub dst: MacAddress,
    pub ether_type: u16,
    pub payload: &'a [u8],
}

/// Callback the owning node supplies at join time. The stack hands frames
/// leaving the virtual interface to it, keyed by network.
pub type FrameHandler = Arc<dyn Fn(NetworkId, &EthernetFrame<'_>) + Send + Sync>;

/// Wrap a closure as a [`FrameHandler`]
pub fn frame_handler<F>(f: F) -> FrameHandler
where
    F: Fn(NetworkId, &EthernetFrame<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Packet stack collaborator
#[cfg_attr(test, mockall::automock)]
pub trait PacketStack: Send + Sync {
    /// Hand a frame received from the network to the stack
    fn inject_inbound_frame(
        &self,
        nwid: NetworkId,
        src: MacAddress,
        dst: MacAddress,
        ether_type: u16,
        payload: &[u8],
    );

    /// Register an address with the stack under the interface's MAC,
    /// creating the family's sub-interface if needed. Returns the handle of
    /// the sub-interface the address now lives on.
    fn bind_address(
        &self,
        nwid: NetworkId,
        mac: MacAddress,
        addr: &InterfaceAddress,
    ) -> Result<InterfaceHandle, StackError>;

    /// Remove an address from the stack
    fn unbind_address(&self, nwid: NetworkId, addr: &InterfaceAddress) -> Result<(), StackError>;

    /// Is this sub-interface currently up?
    fn is_interface_up(&self, handle: InterfaceHandle) -> bool;

    /// Tear down every OS-level interface associated with the network
    fn teardown_interfaces(&self, nwid: NetworkId) -> Result<(), StackError>;

    /// Wake any event multiplexer blocked on sockets owned by the network
    fn wake_multiplexer(&self, _nwid: NetworkId) {}
}

/// Receives lifecycle events, keyed by network id
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn post_event(&self, nwid: NetworkId, event: NetworkEvent);
}
