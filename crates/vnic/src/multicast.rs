//! Multicast group membership derived from the bound addresses
//!
//! Membership is a cached projection of the address set: each scan recomputes
//! it from a fresh snapshot and reports the difference from the previous scan.

use crate::address_set::AddressSet;
use parking_lot::Mutex;
use vnic_types::MulticastGroup;

/// Result of one membership scan. Both lists are sorted and duplicate-free.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MulticastDiff {
    /// Groups present now but not at the previous scan
    pub added: Vec<MulticastGroup>,
    /// Groups present at the previous scan but not now
    pub removed: Vec<MulticastGroup>,
}

impl MulticastDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Tracks the multicast groups last derived from an [`AddressSet`]
#[derive(Debug, Default)]
pub struct MulticastGroupTracker {
    groups: Mutex<Vec<MulticastGroup>>,
}

impl MulticastGroupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute membership from `ips` and swap it in, returning what changed.
    ///
    /// The address snapshot is taken before this tracker's lock, so the two
    /// locks are never held together.
    pub fn scan(&self, ips: &AddressSet) -> MulticastDiff {
        let mut new_groups: Vec<MulticastGroup> = ips
            .snapshot()
            .iter()
            .map(MulticastGroup::for_address_resolution)
            .collect();
        new_groups.sort_unstable();
        new_groups.dedup();

        let mut groups = self.groups.lock();
        let added = new_groups
            .iter()
            .filter(|g| groups.binary_search(g).is_err())
            .copied()
            .collect();
        let removed = groups
            .iter()
            .filter(|g| new_groups.binary_search(g).is_err())
            .copied()
            .collect();
        *groups = new_groups;

        MulticastDiff { added, removed }
    }

    /// Groups as of the last scan
    pub fn current(&self) -> Vec<MulticastGroup> {
        self.groups.lock().clone()
    }
}
