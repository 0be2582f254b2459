//! Up/down transition detection for the per-family sub-interfaces
//!
//! Each family is a two-state machine (Down, Up), starting Down. A sample that
//! disagrees with the stored state flips it and yields exactly one event.
//! Querying the stack and applying the answer happen under one per-family
//! lock, so answers are applied in the order the stack gave them and
//! concurrent callers cannot both report the same transition.

use crate::stack::{InterfaceHandle, IpFamily, NetworkEvent, PacketStack};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct FamilyState {
    handle: Mutex<Option<InterfaceHandle>>,
    /// Held across the stack query and the flip
    sampling: Mutex<()>,
    was_up: AtomicBool,
}

impl FamilyState {
    /// Returns the event for a transition this caller won, if any.
    fn sample(&self, family: IpFamily, is_up: bool) -> Option<NetworkEvent> {
        if is_up {
            self.was_up
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .ok()
                .map(|_| NetworkEvent::InterfaceUp(family))
        } else {
            self.was_up
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .ok()
                .map(|_| NetworkEvent::InterfaceDown(family))
        }
    }
}

/// Last observed state of the IPv4 and IPv6 sub-interfaces
#[derive(Debug, Default)]
pub struct InterfaceStateMonitor {
    v4: FamilyState,
    v6: FamilyState,
}

impl InterfaceStateMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn family(&self, family: IpFamily) -> &FamilyState {
        match family {
            IpFamily::V4 => &self.v4,
            IpFamily::V6 => &self.v6,
        }
    }

    /// Record the handle the stack created for `family`
    pub fn attach(&self, family: IpFamily, handle: InterfaceHandle) {
        *self.family(family).handle.lock() = Some(handle);
    }

    /// Forget the handle for `family`. The last observed state is kept.
    pub fn detach(&self, family: IpFamily) -> Option<InterfaceHandle> {
        self.family(family).handle.lock().take()
    }

    pub fn handle(&self, family: IpFamily) -> Option<InterfaceHandle> {
        *self.family(family).handle.lock()
    }

    pub fn is_up(&self, family: IpFamily) -> bool {
        self.family(family).was_up.load(Ordering::Acquire)
    }

    /// Sample the stack for `handle` and report transitions, IPv4 first.
    ///
    /// `None` means the handle is unknown and yields nothing regardless of the
    /// stored state. A handle matching neither family also yields nothing.
    pub fn recognize(
        &self,
        handle: Option<InterfaceHandle>,
        stack: &dyn PacketStack,
    ) -> Vec<NetworkEvent> {
        let Some(handle) = handle else {
            return Vec::new();
        };

        let mut events = Vec::new();
        for family in IpFamily::ALL {
            let state = self.family(family);
            let _sampling = state.sampling.lock();
            if *state.handle.lock() != Some(handle) {
                continue;
            }
            let is_up = stack.is_interface_up(handle);
            if let Some(event) = state.sample(family, is_up) {
                events.push(event);
            }
        }
        events
    }
}
