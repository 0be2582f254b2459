//! Owning node's side of the controller: joined networks and the periodic tick

use crate::controller::{JoinParams, VirtualInterfaceController};
use crate::error::{Result, VnicError};
use crate::stack::{EventSink, IpFamily, NetworkEvent, PacketStack};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use vnic_types::{InterfaceAddress, MulticastGroup, NetworkId};

/// What one [`NodeDriver::tick`] observed across all joined networks
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub events: Vec<(NetworkId, NetworkEvent)>,
    pub groups_added: Vec<(NetworkId, MulticastGroup)>,
    pub groups_removed: Vec<(NetworkId, MulticastGroup)>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.groups_added.is_empty() && self.groups_removed.is_empty()
    }
}

/// Joined networks of one node, keyed by network id
pub struct NodeDriver {
    stack: Arc<dyn PacketStack>,
    events: Arc<dyn EventSink>,
    controllers: BTreeMap<NetworkId, VirtualInterfaceController>,
}

impl NodeDriver {
    pub fn new(stack: Arc<dyn PacketStack>, events: Arc<dyn EventSink>) -> Self {
        Self {
            stack,
            events,
            controllers: BTreeMap::new(),
        }
    }

    /// Create a controller for `params.nwid`
    pub fn join_network(&mut self, params: JoinParams) -> Result<&VirtualInterfaceController> {
        let nwid = params.nwid;
        if self.controllers.contains_key(&nwid) {
            return Err(VnicError::NetworkAlreadyJoined(nwid));
        }
        let controller = VirtualInterfaceController::join(
            params,
            Arc::clone(&self.stack),
            Arc::clone(&self.events),
        )?;
        Ok(&*self.controllers.entry(nwid).or_insert(controller))
    }

    /// Destroy the controller for `nwid`. Returns false if not joined.
    pub fn leave_network(&mut self, nwid: NetworkId) -> bool {
        match self.controllers.remove(&nwid) {
            Some(controller) => {
                controller.leave();
                true
            }
            None => false,
        }
    }

    pub fn leave_all(&mut self) {
        let controllers = std::mem::take(&mut self.controllers);
        info!(count = controllers.len(), "Leaving all networks");
        for controller in controllers.into_values() {
            controller.leave();
        }
    }

    pub fn controller(&self, nwid: NetworkId) -> Option<&VirtualInterfaceController> {
        self.controllers.get(&nwid)
    }

    fn joined(&self, nwid: NetworkId) -> Result<&VirtualInterfaceController> {
        self.controller(nwid).ok_or(VnicError::NetworkNotFound(nwid))
    }

    pub fn network_ids(&self) -> Vec<NetworkId> {
        self.controllers.keys().copied().collect()
    }

    pub fn add_ip(&self, nwid: NetworkId, ip: InterfaceAddress) -> Result<()> {
        self.joined(nwid)?.add_ip(ip)
    }

    pub fn remove_ip(&self, nwid: NetworkId, ip: &InterfaceAddress) -> Result<bool> {
        Ok(self.joined(nwid)?.remove_ip(ip))
    }

    /// Sample every attached sub-interface, then rescan multicast membership
    #[instrument(skip(self), level = "debug")]
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        for (nwid, controller) in &self.controllers {
            let mut handles: Vec<_> = IpFamily::ALL
                .iter()
                .filter_map(|family| controller.interface_handle(*family))
                .collect();
            handles.dedup();
            for handle in handles {
                for event in controller.recognize_interface_state_change(Some(handle)) {
                    report.events.push((*nwid, event));
                }
            }

            let diff = controller.scan_multicast_groups();
            for group in &diff.added {
                info!(nwid = %nwid, group = %group, "Joined multicast group");
            }
            for group in &diff.removed {
                info!(nwid = %nwid, group = %group, "Left multicast group");
            }
            report
                .groups_added
                .extend(diff.added.into_iter().map(|g| (*nwid, g)));
            report
                .groups_removed
                .extend(diff.removed.into_iter().map(|g| (*nwid, g)));
        }

        if !report.is_empty() {
            debug!(
                events = report.events.len(),
                groups_added = report.groups_added.len(),
                groups_removed = report.groups_removed.len(),
                "Tick observed changes"
            );
        }
        report
    }
}

impl Drop for NodeDriver {
    fn drop(&mut self) {
        if !self.controllers.is_empty() {
            self.leave_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{RecordingEventSink, SimulatedStack};
    use crate::stack::frame_handler;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const NWID: NetworkId = NetworkId::new(0xa1);

    fn params(nwid: NetworkId) -> JoinParams {
        let mut params = JoinParams::new(
            nwid,
            "02:00:00:00:00:a1".parse().unwrap(),
            frame_handler(|_, _| {}),
        );
        params.lifecycle.poll_interval = Duration::from_millis(5);
        params
    }

    fn driver() -> (NodeDriver, Arc<SimulatedStack>, Arc<RecordingEventSink>) {
        let stack = Arc::new(SimulatedStack::with_links_down());
        let sink = Arc::new(RecordingEventSink::new());
        let driver = NodeDriver::new(stack.clone(), sink.clone());
        (driver, stack, sink)
    }

    #[test]
    fn test_join_twice_is_rejected() {
        let (mut driver, _, _) = driver();
        driver.join_network(params(NWID)).unwrap();
        let err = driver.join_network(params(NWID)).unwrap_err();
        assert!(matches!(err, VnicError::NetworkAlreadyJoined(id) if id == NWID));
        assert_eq!(driver.network_ids(), vec![NWID]);
    }

    #[test]
    fn test_unknown_network_is_not_found() {
        let (driver, _, _) = driver();
        let err = driver
            .add_ip(NWID, "10.0.0.1/24".parse().unwrap())
            .unwrap_err();
        assert!(matches!(err, VnicError::NetworkNotFound(_)));
    }

    #[test]
    fn test_leave_network_posts_network_down() {
        let (mut driver, stack, sink) = driver();
        driver.join_network(params(NWID)).unwrap();

        assert!(driver.leave_network(NWID));
        assert!(!driver.leave_network(NWID));
        assert_eq!(sink.events_for(NWID), vec![NetworkEvent::NetworkDown]);
        assert_eq!(stack.teardown_count(), 1);
    }

    #[test]
    fn test_tick_reports_state_and_groups() {
        let (mut driver, stack, _) = driver();
        driver.join_network(params(NWID)).unwrap();
        driver.add_ip(NWID, "10.0.0.5/24".parse().unwrap()).unwrap();

        let first = driver.tick();
        assert!(first.events.is_empty());
        assert_eq!(first.groups_added.len(), 1);

        let handle = stack.interface_handle(NWID, IpFamily::V4).unwrap();
        stack.set_interface_up(handle, true);

        let second = driver.tick();
        assert_eq!(
            second.events,
            vec![(NWID, NetworkEvent::InterfaceUp(IpFamily::V4))]
        );
        assert!(second.groups_added.is_empty());

        assert!(driver.tick().is_empty());
    }

    #[test]
    fn test_drop_leaves_every_network() {
        let (mut driver, stack, sink) = driver();
        driver.join_network(params(NetworkId::new(1))).unwrap();
        driver.join_network(params(NetworkId::new(2))).unwrap();
        drop(driver);

        assert_eq!(stack.teardown_count(), 2);
        assert_eq!(sink.events().len(), 2);
    }
}
