//! Integration tests for the virtual interface controller
//!
//! Exercises the public API end to end:
//! - Address binding and multicast membership scans
//! - Interface state recognition and event delivery
//! - Leave/shutdown ordering and latency
//! - The node driver fed from a configuration file

use mockall::mock;
use mockall::predicate::eq;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::{Duration, Instant};
use vnic::{
    InterfaceAddress, InterfaceHandle, IpFamily, JoinParams, MacAddress, MulticastGroup,
    NetworkEvent, NetworkId, NodeDriver, PacketStack, RecordingEventSink, SimulatedStack,
    StackError, VirtualInterfaceController, VnicConfig, VnicError, frame_handler,
};

mock! {
    pub Stack {}

    impl PacketStack for Stack {
        fn inject_inbound_frame(
            &self,
            nwid: NetworkId,
            src: MacAddress,
            dst: MacAddress,
            ether_type: u16,
            payload: &[u8],
        );
        fn bind_address(
            &self,
            nwid: NetworkId,
            mac: MacAddress,
            addr: &InterfaceAddress,
        ) -> Result<InterfaceHandle, StackError>;
        fn unbind_address(
            &self,
            nwid: NetworkId,
            addr: &InterfaceAddress,
        ) -> Result<(), StackError>;
        fn is_interface_up(&self, handle: InterfaceHandle) -> bool;
        fn teardown_interfaces(&self, nwid: NetworkId) -> Result<(), StackError>;
    }
}

const NWID: NetworkId = NetworkId::new(0x8056_c2e2_1c00_0001);

fn addr(s: &str) -> InterfaceAddress {
    s.parse().unwrap()
}

fn params() -> JoinParams {
    let mut params = JoinParams::new(
        NWID,
        "02:11:22:33:44:55".parse().unwrap(),
        frame_handler(|_, _| {}),
    );
    params.lifecycle.poll_interval = Duration::from_millis(5);
    params
}

fn join_sim(
    stack: &Arc<SimulatedStack>,
    sink: &Arc<RecordingEventSink>,
) -> VirtualInterfaceController {
    VirtualInterfaceController::join(params(), stack.clone(), sink.clone()).unwrap()
}

#[test]
fn test_multicast_membership_follows_addresses() {
    let stack = Arc::new(SimulatedStack::new());
    let sink = Arc::new(RecordingEventSink::new());
    let ctl = join_sim(&stack, &sink);

    ctl.add_ip(addr("10.0.0.5/24")).unwrap();
    let diff = ctl.scan_multicast_groups();
    assert_eq!(
        diff.added,
        vec![MulticastGroup::new(MacAddress::BROADCAST, 0x0a00_0005)]
    );
    assert!(diff.removed.is_empty());

    ctl.add_ip(addr("10.0.0.6/24")).unwrap();
    let diff = ctl.scan_multicast_groups();
    assert_eq!(
        diff.added,
        vec![MulticastGroup::new(MacAddress::BROADCAST, 0x0a00_0006)]
    );
    assert!(diff.removed.is_empty());

    ctl.add_ip(addr("fd00::1:5/64")).unwrap();
    assert!(ctl.remove_ip(&addr("10.0.0.5/24")));
    let diff = ctl.scan_multicast_groups();
    assert_eq!(
        diff.added,
        vec![MulticastGroup::new(
            MacAddress::new([0x33, 0x33, 0xff, 0x01, 0x00, 0x05]),
            0
        )]
    );
    assert_eq!(
        diff.removed,
        vec![MulticastGroup::new(MacAddress::BROADCAST, 0x0a00_0005)]
    );
    assert_eq!(ctl.multicast_groups().len(), 2);

    assert_eq!(
        stack.bound_addresses(NWID),
        vec![addr("10.0.0.6/24"), addr("fd00::1:5/64")]
    );
}

#[test]
fn test_five_polls_emit_exactly_up_then_down() {
    let stack = Arc::new(SimulatedStack::with_links_down());
    let sink = Arc::new(RecordingEventSink::new());
    let ctl = join_sim(&stack, &sink);

    ctl.add_ip(addr("10.0.0.5/24")).unwrap();
    let handle = ctl.interface_handle(IpFamily::V4).unwrap();

    let mut events = Vec::new();
    for up in [false, false, true, true, false] {
        stack.set_interface_up(handle, up);
        events.extend(ctl.recognize_interface_state_change(Some(handle)));
    }

    let expected = vec![
        NetworkEvent::InterfaceUp(IpFamily::V4),
        NetworkEvent::InterfaceDown(IpFamily::V4),
    ];
    assert_eq!(events, expected);
    assert_eq!(sink.events_for(NWID), expected);
}

#[test]
fn test_unknown_handle_is_silent() {
    let stack = Arc::new(SimulatedStack::new());
    let sink = Arc::new(RecordingEventSink::new());
    let ctl = join_sim(&stack, &sink);
    ctl.add_ip(addr("fd00::5/64")).unwrap();

    assert!(ctl.recognize_interface_state_change(None).is_empty());
    assert!(
        ctl.recognize_interface_state_change(Some(InterfaceHandle(9999)))
            .is_empty()
    );
    assert!(sink.events().is_empty());
}

#[test]
fn test_leave_is_bounded_with_long_poll_interval() {
    let stack = Arc::new(SimulatedStack::new());
    let sink = Arc::new(RecordingEventSink::new());
    let mut p = params();
    p.lifecycle.poll_interval = Duration::from_secs(60);
    let ctl = VirtualInterfaceController::join(p, stack.clone(), sink.clone()).unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let start = Instant::now();
    ctl.leave();
    assert!(start.elapsed() < Duration::from_secs(5));

    assert_eq!(sink.events_for(NWID), vec![NetworkEvent::NetworkDown]);
    assert_eq!(stack.wakeup_count(), 1);
    assert_eq!(stack.teardown_count(), 1);
}

#[test]
fn test_drop_runs_the_same_teardown() {
    let stack = Arc::new(SimulatedStack::new());
    let sink = Arc::new(RecordingEventSink::new());
    {
        let ctl = join_sim(&stack, &sink);
        ctl.add_ip(addr("10.1.0.1/16")).unwrap();
    }
    assert_eq!(sink.events_for(NWID), vec![NetworkEvent::NetworkDown]);
    assert_eq!(stack.teardown_count(), 1);
    assert!(stack.bound_addresses(NWID).is_empty());
}

#[test]
fn test_bind_failure_propagates_and_leaves_no_address() {
    let mut stack = MockStack::new();
    stack
        .expect_bind_address()
        .with(
            eq(NWID),
            eq("02:11:22:33:44:55".parse::<MacAddress>().unwrap()),
            eq(addr("10.0.0.5/24")),
        )
        .times(1)
        .returning(|_, _, _| Err(StackError::new("bind_address", "no free netif")));
    stack.expect_teardown_interfaces().returning(|_| Ok(()));

    let sink = Arc::new(RecordingEventSink::new());
    let ctl = VirtualInterfaceController::join(params(), Arc::new(stack), sink).unwrap();

    let err = ctl.add_ip(addr("10.0.0.5/24")).unwrap_err();
    assert!(matches!(err, VnicError::Stack(ref e) if e.operation == "bind_address"));
    assert!(ctl.ips().is_empty());
    assert_eq!(ctl.interface_handle(IpFamily::V4), None);
}

#[test]
fn test_remove_unbinds_once_and_tolerates_stack_failure() {
    let mut stack = MockStack::new();
    stack
        .expect_bind_address()
        .returning(|_, _, _| Ok(InterfaceHandle(3)));
    stack
        .expect_unbind_address()
        .with(eq(NWID), eq(addr("10.0.0.5/24")))
        .times(1)
        .returning(|_, _| Err(StackError::new("unbind_address", "busy")));
    stack.expect_teardown_interfaces().returning(|_| Ok(()));

    let sink = Arc::new(RecordingEventSink::new());
    let ctl = VirtualInterfaceController::join(params(), Arc::new(stack), sink).unwrap();
    ctl.add_ip(addr("10.0.0.5/24")).unwrap();

    assert!(ctl.remove_ip(&addr("10.0.0.5/24")));
    assert!(!ctl.remove_ip(&addr("10.0.0.5/24")));
    assert!(ctl.ips().is_empty());
}

#[test]
fn test_inbound_frames_reach_stack() {
    let stack = Arc::new(SimulatedStack::new());
    let sink = Arc::new(RecordingEventSink::new());
    let ctl = join_sim(&stack, &sink);

    for _ in 0..3 {
        ctl.deliver_frame(
            "02:aa:00:00:00:01".parse().unwrap(),
            ctl.mac(),
            0x0800,
            &[0x45, 0, 0, 20],
        );
    }
    assert_eq!(stack.inbound_frame_count(NWID), 3);
}

#[tokio::test]
async fn test_node_driver_from_config() {
    let config: VnicConfig = toml::from_str(
        r#"
[lifecycle]
poll_interval_ms = 5
node_tick_ms = 10

[[networks]]
id = "8056c2e21c000001"
mac = "02:11:22:33:44:55"
addresses = ["10.0.0.5/24", "fd00::5/64"]

[[networks]]
id = "a1"
mac = "02:00:00:00:00:a1"
addresses = ["192.168.7.1/24"]
"#,
    )
    .unwrap();
    config.validate().unwrap();

    let stack = Arc::new(SimulatedStack::with_links_down());
    let sink = Arc::new(RecordingEventSink::new());
    let mut driver = NodeDriver::new(stack.clone(), sink.clone());

    for network in &config.networks {
        let ctl = driver
            .join_network(config.join_params(network, frame_handler(|_, _| {})))
            .unwrap();
        for ip in &network.addresses {
            ctl.add_ip(*ip).unwrap();
        }
    }

    let first = driver.tick();
    assert_eq!(first.groups_added.len(), 3);
    assert!(first.events.is_empty());

    let handle = stack.interface_handle(NWID, IpFamily::V6).unwrap();
    stack.set_interface_up(handle, true);
    tokio::time::sleep(config.node_tick()).await;

    let second = driver.tick();
    assert_eq!(
        second.events,
        vec![(NWID, NetworkEvent::InterfaceUp(IpFamily::V6))]
    );

    tokio::task::spawn_blocking(move || driver.leave_all())
        .await
        .unwrap();

    let downs = sink
        .events()
        .into_iter()
        .filter(|(_, e)| *e == NetworkEvent::NetworkDown)
        .count();
    assert_eq!(downs, 2);
    assert_eq!(stack.teardown_count(), 2);
}
