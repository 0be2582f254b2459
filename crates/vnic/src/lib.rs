//! Virtual network interface controller
//!
//! One [`VirtualInterfaceController`] represents this host's presence on a
//! joined virtual network. It keeps the set of bound addresses, derives the
//! multicast groups needed for address resolution, turns sampled sub-interface
//! link state into up/down events, and owns a background polling thread whose
//! shutdown is an explicit handshake.
//!
//! The controller never moves frames itself. A [`PacketStack`] does that, and
//! lifecycle events go to an [`EventSink`] owned by the node; both are
//! injected at join time.
//!
//! # Architecture
//!
//! ```text
//!  NodeDriver ──tick──▶ VirtualInterfaceController ──▶ PacketStack
//!      │                   ├── AddressSet              (bind/unbind, link state,
//!      │                   ├── MulticastGroupTracker    frame injection)
//!      │                   ├── InterfaceStateMonitor
//!      │                   └── LifecycleController ──▶ background thread
//!      └──────────────────────────────────────────────▶ EventSink
//! ```

pub mod address_set;
pub mod config_file;
pub mod controller;
pub mod error;
pub mod iface_state;
pub mod lifecycle;
pub mod multicast;
pub mod node;
pub mod sim;
pub mod stack;

pub use address_set::AddressSet;
pub use config_file::{NetworkConfig, VnicConfig};
pub use controller::{JoinParams, VirtualInterfaceController};
pub use error::{Result, StackError, VnicError};
pub use iface_state::InterfaceStateMonitor;
pub use lifecycle::{Housekeeping, LifecycleConfig, LifecycleController, ShutdownSignal};
pub use multicast::{MulticastDiff, MulticastGroupTracker};
pub use node::{NodeDriver, TickReport};
pub use sim::{LoggingEventSink, RecordingEventSink, SimulatedStack};
pub use stack::{
    EthernetFrame, EventSink, FrameHandler, InterfaceHandle, IpFamily, NetworkEvent, PacketStack,
    frame_handler,
};

pub use vnic_types::{InterfaceAddress, MacAddress, MulticastGroup, NetworkId};
