//! Replication topology types shared by the single-sync and quorum
//! replication manager variants (spec §4.4).

use serde::{Deserialize, Serialize};

use crate::host::HostId;
use crate::lsn::Lsn;

/// Which `ReplicationManager` implementation the cluster was configured
/// with at startup (spec §4.4.1 / §4.4.2). Chosen once, never switched at
/// runtime (spec §9: "select at startup").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationVariant {
    SingleSync,
    Quorum,
}

/// The replication mode the primary should run in during the current
/// tick, as decided by `_get_needed_replication_type` (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeededReplicationType {
    Async,
    Sync,
}

/// `pg_stat_replication.sync_state` as reported by PostgreSQL, mirrored
/// into the DCS `replics_info` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Async,
    Sync,
    Quorum,
    Potential,
}

/// One entry of the primary's view of a connected replica, written to
/// `replics_info` in the DCS each tick (spec §3 data model,
/// `all_hosts/{host}/replics_info`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaInfo {
    pub application_name: String,
    pub state: String,
    pub sync_state: SyncState,
    /// Milliseconds since epoch of the replica's last WAL-receiver reply.
    pub reply_time_ms: i64,
    pub write_lsn: Option<Lsn>,
    pub flush_lsn: Option<Lsn>,
    pub replay_lsn: Option<Lsn>,
}

impl ReplicaInfo {
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state == "streaming"
    }

    #[must_use]
    pub fn matches_host(&self, host: &HostId) -> bool {
        self.application_name == host.app_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replica_info_matches_host_by_app_name() {
        let host = HostId::new("db-replica-1.example.com");
        let info = ReplicaInfo {
            application_name: host.app_name(),
            state: "streaming".into(),
            sync_state: SyncState::Sync,
            reply_time_ms: 0,
            write_lsn: None,
            flush_lsn: None,
            replay_lsn: None,
        };
        assert!(info.matches_host(&host));
        assert!(info.is_streaming());
    }
}
