//! Virtual interface controller: one joined network's presence on this host
//!
//! Created when the node joins a network and destroyed when it leaves. The
//! controller strictly owns its address set, multicast tracker, interface
//! state monitor and background thread; none of them outlive it.

use crate::address_set::AddressSet;
use crate::error::{Result, VnicError};
use crate::iface_state::InterfaceStateMonitor;
use crate::lifecycle::{Housekeeping, LifecycleConfig, LifecycleController};
use crate::multicast::{MulticastDiff, MulticastGroupTracker};
use crate::stack::{
    EthernetFrame, EventSink, FrameHandler, InterfaceHandle, IpFamily, NetworkEvent, PacketStack,
};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tracing::{debug, info, instrument, warn};
use vnic_types::{InterfaceAddress, MacAddress, MulticastGroup, NetworkId};

/// Smallest MTU accepted (IPv6 minimum link MTU)
pub const MIN_MTU: u32 = 1280;
/// Largest MTU accepted
pub const MAX_MTU: u32 = 10000;
/// Default MTU for a virtual interface
pub const DEFAULT_MTU: u32 = 2800;
/// Default prefix of device names ("vnic" + network id in hex)
pub const DEFAULT_DEVICE_PREFIX: &str = "vnic";

/// Placeholder returned by [`VirtualInterfaceController::node_id`] when the
/// node address is not known
pub const UNKNOWN_NODE_ID: &str = "----------";

/// Per-tick work of a controller's background thread. Nothing to do yet.
#[derive(Debug, Default)]
pub struct IdleHousekeeping;

impl Housekeeping for IdleHousekeeping {
    fn housekeeping(&self) {}
}

/// Everything needed to join a network
#[derive(Clone)]
pub struct JoinParams {
    pub nwid: NetworkId,
    pub mac: MacAddress,
    pub mtu: u32,
    pub metric: u32,
    pub friendly_name: Option<String>,
    pub device_prefix: String,
    /// Address of the local node, if known
    pub node_address: Option<u64>,
    pub lifecycle: LifecycleConfig,
    /// Receives frames leaving the virtual interface
    pub frame_handler: FrameHandler,
    pub housekeeping: Arc<dyn Housekeeping>,
}

impl JoinParams {
    pub fn new(nwid: NetworkId, mac: MacAddress, frame_handler: FrameHandler) -> Self {
        Self {
            nwid,
            mac,
            mtu: DEFAULT_MTU,
            metric: 0,
            friendly_name: None,
            device_prefix: DEFAULT_DEVICE_PREFIX.to_string(),
            node_address: None,
            lifecycle: LifecycleConfig::default(),
            frame_handler,
            housekeeping: Arc::new(IdleHousekeeping),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_mtu(self.mtu)?;
        if self.device_prefix.is_empty() {
            return Err(VnicError::Config("device prefix cannot be empty".to_string()));
        }
        if self.lifecycle.poll_interval.is_zero() {
            return Err(VnicError::Config("poll interval must be > 0".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for JoinParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinParams")
            .field("nwid", &self.nwid)
            .field("mac", &self.mac)
            .field("mtu", &self.mtu)
            .field("metric", &self.metric)
            .field("friendly_name", &self.friendly_name)
            .field("device_prefix", &self.device_prefix)
            .field("node_address", &self.node_address)
            .field("lifecycle", &self.lifecycle)
            .finish_non_exhaustive()
    }
}

fn validate_mtu(mtu: u32) -> Result<()> {
    if !(MIN_MTU..=MAX_MTU).contains(&mtu) {
        return Err(VnicError::Config(format!(
            "mtu {} outside {}..={}",
            mtu, MIN_MTU, MAX_MTU
        )));
    }
    Ok(())
}

/// A joined virtual network's interface on this host
pub struct VirtualInterfaceController {
    nwid: NetworkId,
    mac: MacAddress,
    device_name: String,
    node_address: Option<u64>,
    metric: u32,
    mtu: AtomicU32,
    enabled: AtomicBool,
    friendly_name: Mutex<Option<String>>,
    last_config_update: AtomicU64,
    ips: AddressSet,
    multicast: MulticastGroupTracker,
    iface_state: InterfaceStateMonitor,
    stack: Arc<dyn PacketStack>,
    events: Arc<dyn EventSink>,
    frame_handler: FrameHandler,
    lifecycle: LifecycleController,
}

impl VirtualInterfaceController {
    /// Join a network: build every owned component, then start the
    /// background thread.
    #[instrument(skip_all, fields(nwid = %params.nwid))]
    pub fn join(
        params: JoinParams,
        stack: Arc<dyn PacketStack>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        params.validate()?;

        let device_name = format!("{}{:x}", params.device_prefix, params.nwid);
        let ips = AddressSet::new(params.nwid, params.mac);
        let multicast = MulticastGroupTracker::new();
        let iface_state = InterfaceStateMonitor::new();
        let lifecycle =
            LifecycleController::start(&device_name, params.lifecycle, params.housekeeping)?;

        info!(
            device = %device_name,
            mac = %params.mac,
            mtu = params.mtu,
            "Joined network"
        );

        Ok(Self {
            nwid: params.nwid,
            mac: params.mac,
            device_name,
            node_address: params.node_address,
            metric: params.metric,
            mtu: AtomicU32::new(params.mtu),
            enabled: AtomicBool::new(true),
            friendly_name: Mutex::new(params.friendly_name),
            last_config_update: AtomicU64::new(0),
            ips,
            multicast,
            iface_state,
            stack,
            events,
            frame_handler: params.frame_handler,
            lifecycle,
        })
    }

    pub fn network_id(&self) -> NetworkId {
        self.nwid
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Hex address of the local node, or [`UNKNOWN_NODE_ID`]
    pub fn node_id(&self) -> String {
        match self.node_address {
            Some(address) => format!("{:x}", address),
            None => UNKNOWN_NODE_ID.to_string(),
        }
    }

    pub fn metric(&self) -> u32 {
        self.metric
    }

    pub fn mtu(&self) -> u32 {
        self.mtu.load(Ordering::Relaxed)
    }

    pub fn set_mtu(&self, mtu: u32) -> Result<()> {
        validate_mtu(mtu)?;
        self.mtu.store(mtu, Ordering::Relaxed);
        debug!(nwid = %self.nwid, mtu, "MTU updated");
        Ok(())
    }

    /// Intent only: disabling neither stops the thread nor detaches interfaces.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn friendly_name(&self) -> Option<String> {
        self.friendly_name.lock().clone()
    }

    pub fn set_friendly_name(&self, name: &str) {
        info!(nwid = %self.nwid, friendly_name = name, "Friendly name set");
        *self.friendly_name.lock() = Some(name.to_string());
    }

    /// Record when the network configuration was last applied (ms since epoch)
    pub fn set_last_config_update(&self, timestamp_ms: u64) {
        self.last_config_update.store(timestamp_ms, Ordering::Relaxed);
    }

    pub fn last_config_update(&self) -> u64 {
        self.last_config_update.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    /// Bind `ip` and record it. The sub-interface the stack places it on
    /// becomes the tracked handle for the address's family.
    pub fn add_ip(&self, ip: InterfaceAddress) -> Result<()> {
        let handle = self.ips.add(self.stack.as_ref(), ip)?;
        let family = IpFamily::of(&ip);
        if self.iface_state.handle(family) != Some(handle) {
            self.attach_interface(family, handle);
        }
        Ok(())
    }

    /// Returns false if `ip` was not bound
    pub fn remove_ip(&self, ip: &InterfaceAddress) -> bool {
        self.ips.remove(self.stack.as_ref(), ip)
    }

    pub fn ips(&self) -> Vec<InterfaceAddress> {
        self.ips.snapshot()
    }

    pub fn scan_multicast_groups(&self) -> MulticastDiff {
        self.multicast.scan(&self.ips)
    }

    pub fn multicast_groups(&self) -> Vec<MulticastGroup> {
        self.multicast.current()
    }

    /// Record the sub-interface the stack created for `family`
    pub fn attach_interface(&self, family: IpFamily, handle: InterfaceHandle) {
        debug!(nwid = %self.nwid, family = family.as_str(), handle = %handle, "Sub-interface attached");
        self.iface_state.attach(family, handle);
    }

    pub fn detach_interface(&self, family: IpFamily) -> Option<InterfaceHandle> {
        self.iface_state.detach(family)
    }

    pub fn interface_handle(&self, family: IpFamily) -> Option<InterfaceHandle> {
        self.iface_state.handle(family)
    }

    pub fn is_interface_up(&self, family: IpFamily) -> bool {
        self.iface_state.is_up(family)
    }

    /// Sample the stack for `handle`, post each transition to the event sink
    /// and return them.
    pub fn recognize_interface_state_change(
        &self,
        handle: Option<InterfaceHandle>,
    ) -> Vec<NetworkEvent> {
        let events = self.iface_state.recognize(handle, self.stack.as_ref());
        for event in &events {
            info!(nwid = %self.nwid, event = %event, "Interface state changed");
            self.events.post_event(self.nwid, *event);
        }
        events
    }

    /// Hand a frame received from the network to the stack
    pub fn deliver_frame(&self, from: MacAddress, to: MacAddress, ether_type: u16, payload: &[u8]) {
        self.stack
            .inject_inbound_frame(self.nwid, from, to, ether_type, payload);
    }

    /// Hand a frame leaving the virtual interface to the owning node
    pub fn relay_outbound(&self, frame: &EthernetFrame<'_>) {
        (self.frame_handler)(self.nwid, frame);
    }

    /// Leave the network. Blocks until the background thread has exited.
    pub fn leave(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if !self.lifecycle.is_running() {
            return;
        }

        self.events.post_event(self.nwid, NetworkEvent::NetworkDown);

        let nwid = self.nwid;
        let stack = Arc::clone(&self.stack);
        self.lifecycle.shutdown(move || {
            stack.wake_multiplexer(nwid);
            if let Err(e) = stack.teardown_interfaces(nwid) {
                warn!(nwid = %nwid, error = %e, "Interface teardown failed, continuing");
            }
        });

        for family in IpFamily::ALL {
            self.iface_state.detach(family);
        }
        info!(nwid = %self.nwid, device = %self.device_name, "Left network");
    }
}

impl Drop for VirtualInterfaceController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for VirtualInterfaceController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualInterfaceController")
            .field("nwid", &self.nwid)
            .field("mac", &self.mac)
            .field("device_name", &self.device_name)
            .field("mtu", &self.mtu())
            .field("enabled", &self.enabled())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StackError;
    use crate::stack::{MockEventSink, MockPacketStack, frame_handler};
    use mockall::Sequence;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const NWID: NetworkId = NetworkId::new(0x8056_c2e2_1c00_0001);

    fn params() -> JoinParams {
        let mut params = JoinParams::new(
            NWID,
            "02:11:22:33:44:55".parse().unwrap(),
            frame_handler(|_, _| {}),
        );
        params.lifecycle.poll_interval = Duration::from_millis(5);
        params
    }

    fn quiet_stack() -> MockPacketStack {
        let mut stack = MockPacketStack::new();
        stack.expect_wake_multiplexer().returning(|_| ());
        stack.expect_teardown_interfaces().returning(|_| Ok(()));
        stack
    }

    fn quiet_sink() -> MockEventSink {
        let mut sink = MockEventSink::new();
        sink.expect_post_event().returning(|_, _| ());
        sink
    }

    #[test]
    fn test_join_sets_identity() {
        let ctl = VirtualInterfaceController::join(
            params(),
            Arc::new(quiet_stack()),
            Arc::new(quiet_sink()),
        )
        .unwrap();

        assert_eq!(ctl.network_id(), NWID);
        assert_eq!(ctl.device_name(), "vnic8056c2e21c000001");
        assert_eq!(ctl.mtu(), DEFAULT_MTU);
        assert_eq!(ctl.node_id(), UNKNOWN_NODE_ID);
        assert!(ctl.enabled());
        assert!(ctl.is_running());
    }

    #[test]
    fn test_join_rejects_bad_mtu() {
        let mut bad = params();
        bad.mtu = 100;
        let err = VirtualInterfaceController::join(
            bad,
            Arc::new(MockPacketStack::new()),
            Arc::new(MockEventSink::new()),
        )
        .unwrap_err();
        assert!(matches!(err, VnicError::Config(_)));
    }

    #[test]
    fn test_unbounded_signal_check_timeout() {
        let mut p = params();
        p.lifecycle.signal_check_timeout = Duration::MAX;
        assert!(p.validate().is_ok());

        let ctl =
            VirtualInterfaceController::join(p, Arc::new(quiet_stack()), Arc::new(quiet_sink()))
                .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(ctl.is_running());

        let start = std::time::Instant::now();
        ctl.leave();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_set_enabled_is_pure_flag() {
        let ctl = VirtualInterfaceController::join(
            params(),
            Arc::new(quiet_stack()),
            Arc::new(quiet_sink()),
        )
        .unwrap();

        ctl.set_enabled(false);
        assert!(!ctl.enabled());
        assert!(ctl.is_running());
    }

    #[test]
    fn test_set_mtu_validates() {
        let ctl = VirtualInterfaceController::join(
            params(),
            Arc::new(quiet_stack()),
            Arc::new(quiet_sink()),
        )
        .unwrap();

        assert!(ctl.set_mtu(9000).is_ok());
        assert_eq!(ctl.mtu(), 9000);
        assert!(ctl.set_mtu(20000).is_err());
        assert_eq!(ctl.mtu(), 9000);
    }

    #[test]
    fn test_node_id_formats_hex() {
        let mut p = params();
        p.node_address = Some(0x89e9_2ceb_a0);
        let ctl =
            VirtualInterfaceController::join(p, Arc::new(quiet_stack()), Arc::new(quiet_sink()))
                .unwrap();
        assert_eq!(ctl.node_id(), "89e92ceba0");
    }

    #[test]
    fn test_leave_posts_network_down_then_tears_down() {
        let mut seq = Sequence::new();
        let mut sink = MockEventSink::new();
        let mut stack = MockPacketStack::new();

        sink.expect_post_event()
            .with(eq(NWID), eq(NetworkEvent::NetworkDown))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| ());
        stack
            .expect_wake_multiplexer()
            .with(eq(NWID))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| ());
        stack
            .expect_teardown_interfaces()
            .with(eq(NWID))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let ctl = VirtualInterfaceController::join(params(), Arc::new(stack), Arc::new(sink))
            .unwrap();
        ctl.leave();
    }

    #[test]
    fn test_teardown_failure_does_not_abort_leave() {
        let mut stack = MockPacketStack::new();
        stack.expect_wake_multiplexer().returning(|_| ());
        stack
            .expect_teardown_interfaces()
            .times(1)
            .returning(|_| Err(StackError::new("teardown_interfaces", "netif busy")));

        let ctl =
            VirtualInterfaceController::join(params(), Arc::new(stack), Arc::new(quiet_sink()))
                .unwrap();
        ctl.attach_interface(IpFamily::V4, InterfaceHandle(1));
        ctl.leave();
    }

    #[test]
    fn test_state_change_is_posted_to_sink() {
        let mut stack = quiet_stack();
        stack.expect_is_interface_up().returning(|_| true);
        let mut sink = MockEventSink::new();
        sink.expect_post_event()
            .with(eq(NWID), eq(NetworkEvent::InterfaceUp(IpFamily::V6)))
            .times(1)
            .returning(|_, _| ());
        sink.expect_post_event()
            .with(eq(NWID), eq(NetworkEvent::NetworkDown))
            .times(1)
            .returning(|_, _| ());

        let ctl = VirtualInterfaceController::join(params(), Arc::new(stack), Arc::new(sink))
            .unwrap();
        ctl.attach_interface(IpFamily::V6, InterfaceHandle(6));

        let events = ctl.recognize_interface_state_change(Some(InterfaceHandle(6)));
        assert_eq!(events, vec![NetworkEvent::InterfaceUp(IpFamily::V6)]);
        assert!(ctl.recognize_interface_state_change(Some(InterfaceHandle(6))).is_empty());
    }

    #[test]
    fn test_add_ip_attaches_family_handle() {
        let mut stack = quiet_stack();
        stack
            .expect_bind_address()
            .returning(|_, _, addr| Ok(InterfaceHandle(if addr.is_ipv4() { 4 } else { 6 })));
        stack.expect_unbind_address().returning(|_, _| Ok(()));

        let ctl =
            VirtualInterfaceController::join(params(), Arc::new(stack), Arc::new(quiet_sink()))
                .unwrap();
        ctl.add_ip("10.9.0.1/24".parse().unwrap()).unwrap();
        ctl.add_ip("fd00::9/64".parse().unwrap()).unwrap();

        assert_eq!(ctl.interface_handle(IpFamily::V4), Some(InterfaceHandle(4)));
        assert_eq!(ctl.interface_handle(IpFamily::V6), Some(InterfaceHandle(6)));
        assert!(ctl.remove_ip(&"10.9.0.1/24".parse().unwrap()));
        assert!(!ctl.remove_ip(&"10.9.0.1/24".parse().unwrap()));
        assert_eq!(ctl.ips(), vec!["fd00::9/64".parse().unwrap()]);
    }

    #[test]
    fn test_deliver_frame_injects_into_stack() {
        let mut stack = quiet_stack();
        stack
            .expect_inject_inbound_frame()
            .withf(|nwid, _, dst, ether_type, payload| {
                *nwid == NWID
                    && dst.is_broadcast()
                    && *ether_type == 0x0806
                    && payload == [1u8, 2, 3].as_slice()
            })
            .times(1)
            .returning(|_, _, _, _, _| ());

        let ctl =
            VirtualInterfaceController::join(params(), Arc::new(stack), Arc::new(quiet_sink()))
                .unwrap();
        ctl.deliver_frame(
            "02:00:00:00:00:09".parse().unwrap(),
            MacAddress::BROADCAST,
            0x0806,
            &[1, 2, 3],
        );
    }

    #[test]
    fn test_relay_outbound_calls_frame_handler() {
        let seen: Arc<Mutex<Vec<(NetworkId, u16, Vec<u8>)>>> = Arc::default();
        let mut p = params();
        let sink_seen = Arc::clone(&seen);
        p.frame_handler = frame_handler(move |nwid, frame| {
            sink_seen
                .lock()
                .push((nwid, frame.ether_type, frame.payload.to_vec()));
        });

        let ctl =
            VirtualInterfaceController::join(p, Arc::new(quiet_stack()), Arc::new(quiet_sink()))
                .unwrap();
        ctl.relay_outbound(&EthernetFrame {
            src: ctl.mac(),
            dst: MacAddress::BROADCAST,
            ether_type: 0x0800,
            payload: &[9, 9],
        });

        assert_eq!(seen.lock().clone(), vec![(NWID, 0x0800, vec![9, 9])]);
    }
}
