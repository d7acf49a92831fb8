//! `ANY n(...)` quorum commit mode, ported from
//! `replication_manager.py::QuorumReplicationManager`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgsentry_config::PrimaryConfig;
use pgsentry_db::PgClient;
use pgsentry_dcs::{paths, Dcs, DcsJsonExt, LockRequirement};
use pgsentry_types::{HostId, NeededReplicationType, ReplicaInfo, SyncState};
use tracing::{info, warn};

use crate::decision::{needed_replication_type, DecisionInputs};
use crate::error::ReplicationResult;
use crate::manager::ReplicationManager;

pub struct Quorum {
    db: Arc<PgClient>,
    dcs: Arc<dyn Dcs>,
    config: PrimaryConfig,
    primary_unavailability_timeout: Duration,
}

impl Quorum {
    pub fn new(db: Arc<PgClient>, dcs: Arc<dyn Dcs>, config: PrimaryConfig, primary_unavailability_timeout: Duration) -> Self {
        Self { db, dcs, config, primary_unavailability_timeout }
    }

    async fn current_quorum(&self) -> ReplicationResult<Vec<HostId>> {
        let raw: Vec<String> = self.dcs.get_json(paths::QUORUM).await?.unwrap_or_default();
        Ok(raw.into_iter().map(HostId::new).collect())
    }

    async fn write_quorum(&self, hosts: &[HostId]) -> ReplicationResult<()> {
        let raw: Vec<String> = hosts.iter().map(ToString::to_string).collect();
        self.dcs.set_json(paths::QUORUM, &raw, LockRequirement::None).await?;
        Ok(())
    }
}

#[async_trait]
impl ReplicationManager for Quorum {
    async fn init(&self) -> ReplicationResult<()> {
        self.dcs.ensure_path(paths::QUORUM).await?;
        Ok(())
    }

    async fn should_close(&self, zk_fail_since: DateTime<Utc>) -> ReplicationResult<bool> {
        let role = self.db.role().await?;
        let since = zk_fail_since.timestamp_millis();

        let mut info = self.db.replics_info(role).await?;
        if info.iter().any(|r| r.reply_time_ms < since) {
            tokio::time::sleep(self.primary_unavailability_timeout).await;
            info = self.db.replics_info(role).await?;
        }

        let connected = info.iter().filter(|r| r.sync_state == SyncState::Quorum && r.reply_time_ms > since).count();
        let (kind, detail) = self.db.replication_state().await?;
        Ok(match kind {
            NeededReplicationType::Async => false,
            NeededReplicationType::Sync => {
                let expected = detail.as_deref().and_then(parse_quorum_size).unwrap_or(1);
                connected < expected
            }
        })
    }

    async fn update_replication_type(
        &self,
        inputs: &DecisionInputs<'_>,
        ha_replicas: &[HostId],
    ) -> ReplicationResult<()> {
        let needed = needed_replication_type(&self.config, inputs);
        let (current, _) = self.db.replication_state().await?;

        if matches!(needed, NeededReplicationType::Async) {
            if matches!(current, NeededReplicationType::Async) {
                return Ok(());
            }
            self.write_quorum(&[]).await?;
            self.change_to_async().await?;
            return Ok(());
        }

        if ha_replicas.is_empty() {
            warn!("no quorum hosts available, not enabling sync replication");
            return Ok(());
        }

        let existing = self.current_quorum().await?;
        let same_set: HashSet<&HostId> = existing.iter().collect();
        let wanted_set: HashSet<&HostId> = ha_replicas.iter().collect();
        if same_set == wanted_set && !matches!(current, NeededReplicationType::Async) {
            return Ok(());
        }

        let quorum_size = ha_replicas.len() / 2 + 1;
        let app_names: Vec<String> = ha_replicas.iter().map(HostId::app_name).collect();
        self.db.change_replication_to_quorum(quorum_size, &app_names).await?;
        self.write_quorum(ha_replicas).await?;
        info!(hosts = ?ha_replicas, "turned synchronous (quorum) replication on");
        Ok(())
    }

    async fn change_to_async(&self) -> ReplicationResult<bool> {
        self.write_quorum(&[]).await?;
        let ok = self.db.change_replication_to_async().await.is_ok();
        if ok {
            info!("turned synchronous (quorum) replication off");
        }
        Ok(ok)
    }

    async fn change_to_sync_host(&self, holder: &HostId) -> ReplicationResult<bool> {
        self.db.change_replication_to_quorum(1, &[holder.app_name()]).await?;
        self.write_quorum(std::slice::from_ref(holder)).await?;
        Ok(true)
    }

    async fn enter_sync_group(&self, _replica_infos: &[ReplicaInfo], host: &HostId) -> ReplicationResult<()> {
        let lock = paths::quorum_member(host);
        self.dcs.try_acquire_lock(&lock, host, Duration::from_secs(1), true).await?;
        Ok(())
    }

    async fn leave_sync_group(&self, host: &HostId) -> ReplicationResult<()> {
        self.dcs.release_lock(&paths::quorum_member(host), host).await?;
        Ok(())
    }

    async fn is_promote_safe(&self, candidate_group: &[HostId], replica_infos: &[ReplicaInfo]) -> ReplicationResult<bool> {
        let quorum = self.current_quorum().await?;
        if quorum.is_empty() {
            return Ok(true);
        }
        let candidates: HashSet<&HostId> = candidate_group.iter().collect();
        let alive_in_quorum = quorum
            .iter()
            .filter(|h| candidates.contains(h) || replica_infos.iter().any(|r| r.matches_host(h) && r.is_streaming()))
            .count();
        Ok(alive_in_quorum >= quorum.len() / 2 + 1)
    }

    async fn get_ensured_sync_replica(&self, replica_infos: &[ReplicaInfo]) -> ReplicationResult<Option<HostId>> {
        let quorum = self.current_quorum().await?;
        if quorum.is_empty() {
            return Ok(None);
        }
        let in_quorum: HashSet<String> = quorum.iter().map(HostId::app_name).collect();
        Ok(replica_infos
            .iter()
            .filter(|r| in_quorum.contains(&r.application_name))
            .min_by_key(|r| r.reply_time_ms)
            .map(|r| HostId::new(r.application_name.clone())))
    }
}

/// `synchronous_standby_names` reads back as `ANY 2(a,b,c)`; pull the
/// leading integer back out.
fn parse_quorum_size(detail: &str) -> Option<usize> {
    detail.split_whitespace().nth(1)?.split('(').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quorum_size_from_standby_names() {
        assert_eq!(parse_quorum_size("ANY 2(a,b,c)"), Some(2));
        assert_eq!(parse_quorum_size("garbage"), None);
    }
}
