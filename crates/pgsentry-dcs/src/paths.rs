//! DCS path constants and per-host path builders.
//!
//! Pinned against the "newer" contract named in spec §9's Open Questions:
//! `FAILOVER_STATE_PATH` (not `FAILOVER_INFO_PATH`), `SWITCHOVER_CANDIDATE`-style
//! switchover paths, and `election_vote/%s` per-host vote nodes, matching
//! `original_source/src/zk.py`'s newer `Zookeeper` class constants.

use pgsentry_types::HostId;

pub const PRIMARY_LOCK: &str = "leader";
pub const LAST_PRIMARY: &str = "last_leader";
pub const PRIMARY_SWITCH_LOCK: &str = "remaster";
pub const SYNC_REPLICA_LOCK: &str = "sync_replica";

pub const QUORUM: &str = "quorum";
pub const QUORUM_MEMBERS: &str = "quorum/members";

pub const REPLICS_INFO: &str = "replics_info";
pub const TIMELINE: &str = "timeline";
pub const FAILOVER_STATE: &str = "failover_state";
pub const CURRENT_PROMOTING_HOST: &str = "current_promoting_host";

pub const LAST_FAILOVER_TIME: &str = "last_failover_time";
pub const LAST_SWITCHOVER_TIME: &str = "last_switchover_time";
pub const LAST_MASTER_ACTIVITY_TIME: &str = "last_master_activity_time";

pub const SWITCHOVER_ROOT: &str = "switchover";
pub const SWITCHOVER_LOCK: &str = "switchover/lock";
pub const SWITCHOVER_MASTER: &str = "switchover/master";
pub const SWITCHOVER_STATE: &str = "switchover/state";
pub const SWITCHOVER_LSN: &str = "switchover/lsn";

pub const MAINTENANCE: &str = "maintenance";
pub const MAINTENANCE_TIME: &str = "maintenance/ts";
pub const MAINTENANCE_PRIMARY: &str = "maintenance/master";

pub const SINGLE_NODE: &str = "is_single_node";

pub const ELECTION_ENTER_LOCK: &str = "enter_election";
pub const ELECTION_MANAGER_LOCK: &str = "epoch_manager";
pub const ELECTION_WINNER: &str = "election_winner";
pub const ELECTION_STATUS: &str = "election_status";
pub const ELECTION_VOTE_ROOT: &str = "election_vote";

pub const ALL_HOSTS: &str = "all_hosts";
pub const ALIVE_ROOT: &str = "alive";
pub const REPLICATION_SOURCES_ROOT: &str = "replication_sources";

/// `maintenance/{host}`.
#[must_use]
pub fn host_maintenance(host: &HostId) -> String {
    format!("{MAINTENANCE}/{host}")
}

/// `alive/{host}`.
#[must_use]
pub fn host_alive(host: &HostId) -> String {
    format!("{ALIVE_ROOT}/{host}")
}

/// `all_hosts/{host}`.
#[must_use]
pub fn host_root(host: &HostId) -> String {
    format!("{ALL_HOSTS}/{host}")
}

/// `all_hosts/{host}/ha`.
#[must_use]
pub fn host_ha(host: &HostId) -> String {
    format!("{ALL_HOSTS}/{host}/ha")
}

/// `all_hosts/{host}/prio`.
#[must_use]
pub fn host_priority(host: &HostId) -> String {
    format!("{ALL_HOSTS}/{host}/prio")
}

/// `all_hosts/{host}/op`.
#[must_use]
pub fn host_op(host: &HostId) -> String {
    format!("{ALL_HOSTS}/{host}/op")
}

/// `all_hosts/{host}/tried_remaster`.
#[must_use]
pub fn host_tried_remaster(host: &HostId) -> String {
    format!("{ALL_HOSTS}/{host}/tried_remaster")
}

/// `all_hosts/{host}/wal_receiver`.
#[must_use]
pub fn host_wal_receiver(host: &HostId) -> String {
    format!("{ALL_HOSTS}/{host}/wal_receiver")
}

/// `quorum/members/{host}`.
#[must_use]
pub fn quorum_member(host: &HostId) -> String {
    format!("{QUORUM_MEMBERS}/{host}")
}

/// `election_vote/{host}`.
#[must_use]
pub fn election_vote(host: &HostId) -> String {
    format!("{ELECTION_VOTE_ROOT}/{host}")
}

/// `replication_sources/{host}`.
#[must_use]
pub fn replication_sources(host: &HostId) -> String {
    format!("{REPLICATION_SOURCES_ROOT}/{host}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_host_paths_are_namespaced_under_their_root() {
        let host = HostId::new("db-a.internal");
        assert_eq!(host_maintenance(&host), "maintenance/db-a.internal");
        assert_eq!(quorum_member(&host), "quorum/members/db-a.internal");
        assert_eq!(election_vote(&host), "election_vote/db-a.internal");
    }
}
