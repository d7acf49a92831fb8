//! Replication slot garbage collection, ported from `main.py::_handle_slots`.
//!
//! Every tick the primary checks who currently holds a read-lock on
//! `replication_sources/{this_host}` (i.e. who is actively replicating from
//! us). Hosts that stop holding it get a countdown; once it lapses their
//! slot is dropped so retained WAL doesn't grow unbounded for a host that
//! left the cluster.

use std::collections::{HashMap, HashSet};

use pgsentry_types::HostId;

pub struct SlotTracker {
    default_countdown: u32,
    countdown: HashMap<HostId, u32>,
}

impl SlotTracker {
    #[must_use]
    pub fn new(default_countdown: u32) -> Self {
        Self { default_countdown, countdown: HashMap::new() }
    }

    /// Given the hosts currently holding the source read-lock and the full
    /// membership list, returns the app names of slots that should be
    /// dropped this tick (countdown lapsed) and resets/arms countdowns for
    /// everyone else.
    pub fn sweep(&mut self, lock_holders: &HashSet<HostId>, all_hosts: &[HostId]) -> Vec<String> {
        let mut expired = Vec::new();
        for host in all_hosts {
            if lock_holders.contains(host) {
                self.countdown.insert(host.clone(), self.default_countdown);
                continue;
            }
            let remaining = self.countdown.entry(host.clone()).or_insert(self.default_countdown);
            if *remaining == 0 {
                expired.push(host.clone());
            } else {
                *remaining -= 1;
            }
        }
        expired.iter().map(HostId::slot_name).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_not_holding_lock_counts_down_to_expiry() {
        let mut tracker = SlotTracker::new(2);
        let host = HostId::new("db-replica-1");
        let all = vec![host.clone()];
        let holders = HashSet::new();

        assert!(tracker.sweep(&holders, &all).is_empty());
        assert!(tracker.sweep(&holders, &all).is_empty());
        assert_eq!(tracker.sweep(&holders, &all), vec![host.slot_name()]);
    }

    #[test]
    fn holding_the_lock_resets_the_countdown() {
        let mut tracker = SlotTracker::new(1);
        let host = HostId::new("db-replica-1");
        let all = vec![host.clone()];
        let mut holders = HashSet::new();
        holders.insert(host.clone());

        assert!(tracker.sweep(&holders, &all).is_empty());
        holders.clear();
        assert!(tracker.sweep(&holders, &all).is_empty());
        assert_eq!(tracker.sweep(&holders, &all), vec![host.slot_name()]);
    }
}
