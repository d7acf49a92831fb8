//! Classic one-synchronous-replica mode, ported from
//! `replication_manager.py::SingleSyncReplicationManager`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgsentry_config::PrimaryConfig;
use pgsentry_db::PgClient;
use pgsentry_dcs::{paths, Dcs, DcsJsonExt, LockRequirement};
use pgsentry_types::{HostId, NeededReplicationType, Priority, ReplicaInfo, SyncState};
use tracing::{info, warn};

use crate::decision::{needed_replication_type, DecisionInputs};
use crate::error::ReplicationResult;
use crate::manager::ReplicationManager;

pub struct SingleSync {
    db: Arc<PgClient>,
    dcs: Arc<dyn Dcs>,
    config: PrimaryConfig,
    primary_unavailability_timeout: Duration,
}

impl SingleSync {
    pub fn new(db: Arc<PgClient>, dcs: Arc<dyn Dcs>, config: PrimaryConfig, primary_unavailability_timeout: Duration) -> Self {
        Self { db, dcs, config, primary_unavailability_timeout }
    }

    async fn my_priority(&self, host: &HostId) -> Priority {
        self.dcs
            .get(&paths::host_priority(host))
            .await
            .ok()
            .flatten()
            .and_then(|v| v.parse().ok())
            .map(Priority)
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReplicationManager for SingleSync {
    async fn init(&self) -> ReplicationResult<()> {
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

        let connected = info.iter().filter(|r| r.sync_state == SyncState::Sync && r.reply_time_ms > since).count();
        let (kind, _) = self.db.replication_state().await?;
        Ok(match kind {
            NeededReplicationType::Async => false,
            NeededReplicationType::Sync => connected < 1,
        })
    }

    async fn update_replication_type(
        &self,
        inputs: &DecisionInputs<'_>,
        _ha_replicas: &[HostId],
    ) -> ReplicationResult<()> {
        let holder = self.dcs.current_lock_holder(paths::SYNC_REPLICA_LOCK).await?;
        let needed = needed_replication_type(&self.config, inputs);
        let (current, _) = self.db.replication_state().await?;

        if matches!(needed, NeededReplicationType::Async) {
            if matches!(current, NeededReplicationType::Async) {
                return Ok(());
            }
            self.change_to_async().await?;
            return Ok(());
        }

        let Some(holder) = holder else {
            warn!("sync replication requested but no one holds sync_replica lock");
            return Ok(());
        };

        if matches!(current, NeededReplicationType::Sync) {
            return Ok(());
        }
        self.change_to_sync_host(&holder).await?;
        Ok(())
    }

    async fn change_to_async(&self) -> ReplicationResult<bool> {
        reset_sync_state_to_async(self.dcs.as_ref()).await?;
        let ok = self.db.change_replication_to_async().await.is_ok();
        if ok {
            info!("turned synchronous replication off");
        }
        Ok(ok)
    }

    async fn change_to_sync_host(&self, holder: &HostId) -> ReplicationResult<bool> {
        self.db.change_replication_to_sync_host(&holder.app_name()).await?;
        info!(host = %holder, "turned synchronous replication on");
        Ok(true)
    }

    async fn enter_sync_group(&self, replica_infos: &[ReplicaInfo], host: &HostId) -> ReplicationResult<()> {
        let holder = self.dcs.current_lock_holder(paths::SYNC_REPLICA_LOCK).await?;
        let Some(holder) = holder else {
            self.dcs
                .try_acquire_lock(paths::SYNC_REPLICA_LOCK, host, Duration::from_secs(1), false)
                .await?;
            return Ok(());
        };

        if &holder == host {
            let contenders = self.dcs.lock_contenders(paths::SYNC_REPLICA_LOCK).await?;
            if contenders.len() > 1 {
                info!("higher-priority replica waiting, releasing sync_replica lock");
                self.dcs.release_lock(paths::SYNC_REPLICA_LOCK, host).await?;
            }
            return Ok(());
        }

        let am_async = replica_infos
            .iter()
            .find(|r| r.matches_host(host))
            .map_or(true, |r| r.sync_state == SyncState::Async);
        if !am_async {
            return Ok(());
        }

        let my_priority = self.my_priority(host).await;
        let holder_priority = self.my_priority(&holder).await;
        if my_priority > holder_priority {
            info!(%host, "higher priority than current sync replica, queueing for sync_replica lock");
            self.dcs.try_acquire_lock(paths::SYNC_REPLICA_LOCK, host, Duration::from_secs(1), true).await?;
        }
        Ok(())
    }

    async fn leave_sync_group(&self, host: &HostId) -> ReplicationResult<()> {
        self.dcs.release_lock(paths::SYNC_REPLICA_LOCK, host).await?;
        Ok(())
    }

    async fn is_promote_safe(&self, candidate_group: &[HostId], replica_infos: &[ReplicaInfo]) -> ReplicationResult<bool> {
        let sync_replica = self.get_ensured_sync_replica(replica_infos).await?;
        Ok(sync_replica.is_some_and(|h| candidate_group.contains(&h)))
    }

    async fn get_ensured_sync_replica(&self, replica_infos: &[ReplicaInfo]) -> ReplicationResult<Option<HostId>> {
        Ok(replica_infos
            .iter()
            .find(|r| r.sync_state == SyncState::Sync)
            .map(|r| HostId::new(r.application_name.clone())))
    }
}

async fn reset_sync_state_to_async(dcs: &dyn Dcs) -> ReplicationResult<()> {
    let mut info: Vec<ReplicaInfo> = dcs.get_json(paths::REPLICS_INFO).await?.unwrap_or_default();
    for replica in &mut info {
        if replica.sync_state == SyncState::Sync {
            replica.sync_state = SyncState::Async;
        }
    }
    dcs.set_json(paths::REPLICS_INFO, &info, LockRequirement::None).await?;
    Ok(())
}
