//! In-process collaborators: a simulated packet stack and event sinks
//!
//! `vnicd` runs against these when no real stack is linked in. The simulated
//! stack keeps per-network bookkeeping only; it does not route frames.

use crate::error::StackError;
use crate::stack::{EventSink, InterfaceHandle, IpFamily, NetworkEvent, PacketStack};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};
use vnic_types::{InterfaceAddress, MacAddress, NetworkId};

#[derive(Debug, Default)]
struct SimNetwork {
    mac: Option<MacAddress>,
    v4: Option<InterfaceHandle>,
    v6: Option<InterfaceHandle>,
    bound: BTreeSet<InterfaceAddress>,
    inbound_frames: u64,
}

impl SimNetwork {
    fn slot(&mut self, family: IpFamily) -> &mut Option<InterfaceHandle> {
        match family {
            IpFamily::V4 => &mut self.v4,
            IpFamily::V6 => &mut self.v6,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    next_handle: u64,
    networks: BTreeMap<NetworkId, SimNetwork>,
    link_up: HashMap<InterfaceHandle, bool>,
    teardowns: u64,
    wakeups: u64,
}

/// Packet stack that creates one sub-interface per family on first bind
#[derive(Debug)]
pub struct SimulatedStack {
    state: Mutex<SimState>,
    up_on_create: bool,
}

impl Default for SimulatedStack {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedStack {
    /// Sub-interfaces come up as soon as they are created
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            up_on_create: true,
        }
    }

    /// Sub-interfaces start down until [`set_interface_up`](Self::set_interface_up)
    pub fn with_links_down() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            up_on_create: false,
        }
    }

    /// Force the link state of a sub-interface
    pub fn set_interface_up(&self, handle: InterfaceHandle, up: bool) {
        let mut state = self.state.lock();
        if let Some(link) = state.link_up.get_mut(&handle) {
            *link = up;
            debug!(handle = %handle, up, "Simulated link state changed");
        }
    }

    pub fn interface_handle(&self, nwid: NetworkId, family: IpFamily) -> Option<InterfaceHandle> {
        let mut state = self.state.lock();
        state
            .networks
            .get_mut(&nwid)
            .and_then(|net| *net.slot(family))
    }

    pub fn bound_addresses(&self, nwid: NetworkId) -> Vec<InterfaceAddress> {
        self.state
            .lock()
            .networks
            .get(&nwid)
            .map(|net| net.bound.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn inbound_frame_count(&self, nwid: NetworkId) -> u64 {
        self.state
            .lock()
            .networks
            .get(&nwid)
            .map_or(0, |net| net.inbound_frames)
    }

    pub fn teardown_count(&self) -> u64 {
        self.state.lock().teardowns
    }

    pub fn wakeup_count(&self) -> u64 {
        self.state.lock().wakeups
    }
}

impl PacketStack for SimulatedStack {
    fn inject_inbound_frame(
        &self,
        nwid: NetworkId,
        src: MacAddress,
        dst: MacAddress,
        ether_type: u16,
        payload: &[u8],
    ) {
        let mut state = self.state.lock();
        state.networks.entry(nwid).or_default().inbound_frames += 1;
        debug!(
            nwid = %nwid,
            src = %src,
            dst = %dst,
            ether_type,
            len = payload.len(),
            "Inbound frame"
        );
    }

    fn bind_address(
        &self,
        nwid: NetworkId,
        mac: MacAddress,
        addr: &InterfaceAddress,
    ) -> Result<InterfaceHandle, StackError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let net = state.networks.entry(nwid).or_default();

        match net.mac {
            Some(existing) if existing != mac => {
                return Err(StackError::new(
                    "bind_address",
                    format!("network {} already uses mac {}", nwid, existing),
                ));
            }
            _ => net.mac = Some(mac),
        }

        let slot = net.slot(IpFamily::of(addr));
        let handle = match *slot {
            Some(handle) => handle,
            None => {
                state.next_handle += 1;
                let handle = InterfaceHandle(state.next_handle);
                *slot = Some(handle);
                state.link_up.insert(handle, self.up_on_create);
                handle
            }
        };
        net.bound.insert(*addr);
        Ok(handle)
    }

    fn unbind_address(&self, nwid: NetworkId, addr: &InterfaceAddress) -> Result<(), StackError> {
        let mut state = self.state.lock();
        let removed = state
            .networks
            .get_mut(&nwid)
            .is_some_and(|net| net.bound.remove(addr));
        if removed {
            Ok(())
        } else {
            Err(StackError::new(
                "unbind_address",
                format!("{} is not bound on {}", addr, nwid),
            ))
        }
    }

    fn is_interface_up(&self, handle: InterfaceHandle) -> bool {
        self.state
            .lock()
            .link_up
            .get(&handle)
            .copied()
            .unwrap_or(false)
    }

    fn teardown_interfaces(&self, nwid: NetworkId) -> Result<(), StackError> {
        let mut state = self.state.lock();
        state.teardowns += 1;
        let Some(net) = state.networks.remove(&nwid) else {
            return Ok(());
        };
        for handle in [net.v4, net.v6].into_iter().flatten() {
            state.link_up.remove(&handle);
        }
        debug!(nwid = %nwid, "Simulated interfaces torn down");
        Ok(())
    }

    fn wake_multiplexer(&self, _nwid: NetworkId) {
        self.state.lock().wakeups += 1;
    }
}

/// Event sink that only logs
#[derive(Debug, Default)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn post_event(&self, nwid: NetworkId, event: NetworkEvent) {
        info!(nwid = %nwid, event = %event, "Network event");
    }
}

/// Event sink that keeps every event it receives, in arrival order
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(NetworkId, NetworkEvent)>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(NetworkId, NetworkEvent)> {
        self.events.lock().clone()
    }

    pub fn events_for(&self, nwid: NetworkId) -> Vec<NetworkEvent> {
        self.events
            .lock()
            .iter()
            .filter(|(id, _)| *id == nwid)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl EventSink for RecordingEventSink {
    fn post_event(&self, nwid: NetworkId, event: NetworkEvent) {
        self.events.lock().push((nwid, event));
    }
}
