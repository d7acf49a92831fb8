//! The capability contract shared by [`crate::single_sync::SingleSync`] and
//! [`crate::quorum::Quorum`] (spec §4.4: "both variants implement the same
//! seven-method surface; the Controller never branches on which one is
//! active").

use async_trait::async_trait;
use pgsentry_types::{HostId, ReplicaInfo};

use crate::decision::DecisionInputs;
use crate::error::ReplicationResult;

#[async_trait]
pub trait ReplicationManager: Send + Sync {
    /// One-time DCS setup (Quorum creates its `quorum` root; SingleSync has
    /// nothing to create).
    async fn init(&self) -> ReplicationResult<()>;

    /// Whether this host is safe to keep serving reads/writes despite
    /// having lost its DCS session (spec §4.4: "a primary that can't see
    /// at least one confirmed sync/quorum replica must close").
    async fn should_close(&self, zk_fail_since: chrono::DateTime<chrono::Utc>) -> ReplicationResult<bool>;

    /// Re-evaluates and, if needed, changes the live replication mode.
    async fn update_replication_type(
        &self,
        inputs: &DecisionInputs<'_>,
        ha_replicas: &[HostId],
    ) -> ReplicationResult<()>;

    async fn change_to_async(&self) -> ReplicationResult<bool>;

    async fn change_to_sync_host(&self, holder: &HostId) -> ReplicationResult<bool>;

    /// Called by a replica each tick to try to join (or keep) its place in
    /// the sync/quorum set.
    async fn enter_sync_group(&self, replica_infos: &[ReplicaInfo], host: &HostId) -> ReplicationResult<()>;

    async fn leave_sync_group(&self, host: &HostId) -> ReplicationResult<()>;

    /// Whether promoting a host in `candidate_group` would not violate
    /// sync-safety (spec invariant I4): the candidate must itself be (or
    /// contain) the last confirmed sync/quorum replica.
    async fn is_promote_safe(&self, candidate_group: &[HostId], replica_infos: &[ReplicaInfo]) -> ReplicationResult<bool>;

    /// The replica currently guaranteed not to have lost committed data,
    /// used to pick a safe switchover/failover destination.
    async fn get_ensured_sync_replica(&self, replica_infos: &[ReplicaInfo]) -> ReplicationResult<Option<HostId>>;
}
