//! The per-host control loop, ported from `main.py::pgconsul`. One
//! `Controller` owns the local Postgres connection, the DCS session, and
//! the replication manager for the lifetime of the process; `run_iteration`
//! is the Rust shape of `run_iteration`/`primary_iter`/`replica_iter`/
//! `dead_iter`/`single_node_primary_iter`.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use pgsentry_config::PgSentryConfig;
use pgsentry_db::PgClient;
use pgsentry_dcs::{paths, retry_until, Dcs, DcsJsonExt, LockRequirement};
use pgsentry_election::FailoverElection;
use pgsentry_replication::{DecisionInputs, ReplicationManager};
use pgsentry_types::{DbLiveness, FailoverState, HostId, Priority, ReplicaInfo, Role, SwitchoverIntent, SwitchoverState};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{ControllerError, ControllerResult};
use crate::maintenance::MaintenanceTracker;
use crate::sdnotify::Notifier;
use crate::slots::SlotTracker;

/// Written to `working_dir` once `max_rewind_retries` pg_rewind attempts
/// have failed; its presence is a kill-switch against further automatic
/// rejoin attempts until an operator clears it (spec §4.3).
const REWIND_FAIL_FLAG: &str = ".pgconsul_rewind_fail.flag";

pub struct Controller {
    db: Arc<PgClient>,
    dcs: Arc<dyn Dcs>,
    replication: Arc<dyn ReplicationManager>,
    config: PgSentryConfig,
    host: HostId,
    notifier: Notifier,
    maintenance: MaintenanceTracker,
    slots: SlotTracker,
    cancel: CancellationToken,
    /// Cached across iterations so a transient DB outage doesn't erase our
    /// last known role (`re_init_db`'s "last role from cached file").
    last_known_role: Option<Role>,
    /// Consecutive simple-switch failures against the current primary,
    /// reset whenever the switch succeeds or the primary changes
    /// (`main.py::_primary_switch_checks`).
    simple_switch_failures: u32,
}

impl Controller {
    #[must_use]
    pub fn new(
        db: Arc<PgClient>,
        dcs: Arc<dyn Dcs>,
        replication: Arc<dyn ReplicationManager>,
        config: PgSentryConfig,
        host: HostId,
        cancel: CancellationToken,
    ) -> Self {
        let drop_slot_countdown = config.global.drop_slot_countdown;
        Self {
            db,
            dcs,
            replication,
            config,
            host,
            notifier: Notifier::connect(),
            maintenance: MaintenanceTracker::default(),
            slots: SlotTracker::new(drop_slot_countdown),
            cancel,
            last_known_role: None,
            simple_switch_failures: 0,
        }
    }

    /// Runs the control loop until cancelled (spec §5: single-threaded
    /// cooperative loop, `tokio::select!` over the iteration timer and
    /// SIGTERM).
    pub async fn run(&mut self) -> ControllerResult<()> {
        self.replication.init().await?;
        self.notifier.ready();

        let mut term = signal(SignalKind::terminate())?;
        let mut tick = tokio::time::interval(self.config.global.iteration_timeout);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(error) = self.run_iteration().await {
                        error!(%error, "iteration failed");
                    }
                }
                _ = term.recv() => {
                    info!("received SIGTERM, shutting down");
                    self.cancel.cancel();
                    return Ok(());
                }
                _ = self.cancel.cancelled() => {
                    return Ok(());
                }
            }
        }
    }

    async fn ha_hosts(&self) -> ControllerResult<Vec<HostId>> {
        let children = self.dcs.children(paths::ALL_HOSTS).await?;
        let mut hosts = Vec::new();
        for name in children {
            let host = HostId::new(name);
            if host == self.host {
                continue;
            }
            if self.dcs.get(&paths::host_ha(&host)).await?.as_deref() == Some("1") {
                hosts.push(host);
            }
        }
        Ok(hosts)
    }

    /// One full tick: classify liveness and role, then dispatch on the
    /// three axes `main.py::run_iteration` dispatches on (spec §4.1).
    pub async fn run_iteration(&mut self) -> ControllerResult<()> {
        info!(host = %self.host, "starting iteration");
        self.notifier.notify();

        let liveness = self.db.liveness().await;
        if liveness == DbLiveness::Transient {
            info!("database is starting up or shutting down, skipping this tick");
            return Ok(());
        }

        self.maintenance.refresh(self.dcs.as_ref()).await?;
        if self.maintenance.is_in_maintenance() {
            warn!("cluster is in maintenance mode");
            self.maintenance.advertise(self.dcs.as_ref(), &self.host).await?;
            return Ok(());
        }

        if liveness == DbLiveness::Dead {
            return self.dead_iter().await;
        }

        let role = self.db.role().await?;
        self.last_known_role = Some(role);

        match role {
            Role::Primary if self.config.global.is_single_node => self.single_node_primary_iter().await,
            Role::Primary => self.primary_iter().await,
            Role::Replica => self.replica_iter().await,
        }
    }

    /// Local PostgreSQL is not accepting connections (`main.py::dead_iter`).
    async fn dead_iter(&mut self) -> ControllerResult<()> {
        warn!("local postgresql is dead");
        let _ = self.db.cmd().stop_pooler().await;

        if self.config.global.is_single_node {
            info!("single node cluster, starting postgresql");
            self.db.cmd().start_postgresql(self.db.pgdata(), self.config.global.postgres_timeout).await?;
            return Ok(());
        }

        self.replication.leave_sync_group(&self.host).await?;
        if self.dcs.current_lock_holder(paths::PRIMARY_LOCK).await? == Some(self.host.clone()) {
            self.dcs.release_lock(paths::PRIMARY_LOCK, &self.host).await?;
        }

        let holder = self.dcs.current_lock_holder(paths::PRIMARY_LOCK).await?;
        match holder {
            Some(primary) if primary != self.host => {
                info!(%primary, "primary is alive elsewhere, rejoining as replica");
                self.attach_to_primary(&primary).await
            }
            _ => {
                warn!("no host currently holds the primary lock; attempting to start postgresql locally");
                if self.last_known_role == Some(Role::Primary) {
                    let zk_timeline = self.dcs.get(paths::TIMELINE).await?;
                    let local_timeline = self.db.control_parameter("Latest checkpoint's TimeLineID").await?;
                    if zk_timeline.is_some() && zk_timeline != local_timeline {
                        error!("was primary before, but not the last one in the cluster; refusing to start");
                        return Ok(());
                    }
                }
                self.db.stop_archiving_wal().await?;
                self.db.cmd().start_postgresql(self.db.pgdata(), self.config.global.postgres_timeout).await?;
                Ok(())
            }
        }
    }

    /// Rejoins the cluster behind `primary`, picking the simple-switch or
    /// rewind path the way `_attach_to_primary`/`_rewind_from_source` do:
    /// simple switch first, then the rewind hard path once
    /// `primary_switch_checks` consecutive simple switches have failed, and
    /// refusing to rejoin at all once the rewind kill-switch flag is set.
    async fn attach_to_primary(&mut self, primary: &HostId) -> ControllerResult<()> {
        if self.rewind_fail_flag_path().exists() {
            error!(path = ?self.rewind_fail_flag_path(), "rewind kill-switch flag present, refusing to rejoin the cluster automatically");
            return Ok(());
        }

        let tried_remaster = self.dcs.get(&paths::host_tried_remaster(&self.host)).await?.as_deref() == Some("yes");
        if tried_remaster {
            info!(%primary, "simple switch already exhausted against this primary, attempting pg_rewind");
            return self.rewind_from(primary).await;
        }

        match self.simple_switch(primary).await {
            Ok(()) => {
                self.simple_switch_failures = 0;
                Ok(())
            }
            Err(error) => {
                self.simple_switch_failures += 1;
                warn!(%error, attempts = self.simple_switch_failures, "simple switch to the new primary failed");
                if self.simple_switch_failures >= self.config.replica.primary_switch_checks {
                    self.dcs.set(&paths::host_tried_remaster(&self.host), "yes", LockRequirement::None).await?;
                }
                Ok(())
            }
        }
    }

    /// The simple-switch return-to-cluster strategy (spec §4.3): regenerate
    /// `recovery.conf` against the new primary and restart, no divergence
    /// repair attempted.
    async fn simple_switch(&self, primary: &HostId) -> ControllerResult<()> {
        if self.config.replica.primary_switch_restart {
            let _ = self.db.cmd().stop_postgresql(self.db.pgdata(), self.config.global.postgres_timeout).await;
        }
        let conf = self.db.cmd().generate_recovery_conf(self.db.pgdata(), primary.as_str()).await?;
        if !conf.success {
            return Err(ControllerError::SimpleSwitchFailed);
        }
        let start = self.db.cmd().start_postgresql(self.db.pgdata(), self.config.global.postgres_timeout).await?;
        if !start.success {
            return Err(ControllerError::SimpleSwitchFailed);
        }
        Ok(())
    }

    /// The rewind hard path (spec §4.3, invariant I5): claims `op=rewind`
    /// so a racing rewind against the same data directory is rejected,
    /// backs up `pg_replslot` around the repair, and gives up for good
    /// behind a kill-switch flag once `max_rewind_retries` is exhausted.
    async fn rewind_from(&mut self, primary: &HostId) -> ControllerResult<()> {
        self.dcs.set(&paths::host_op(&self.host), "rewind", LockRequirement::None).await?;
        let _ = self.db.cmd().stop_postgresql(self.db.pgdata(), self.config.global.postgres_timeout).await;

        let slot_backup = self.backup_replication_slots();

        let mut rewound = false;
        for attempt in 1..=self.config.global.max_rewind_retries.max(1) {
            let output = self.db.cmd().rewind(self.db.pgdata(), primary.as_str()).await?;
            if output.success {
                rewound = true;
                break;
            }
            warn!(attempt, %primary, stderr = %output.stderr, "pg_rewind attempt failed");
        }

        if let Some(backup) = &slot_backup {
            self.restore_replication_slots(backup);
        }

        if !rewound {
            error!(retries = self.config.global.max_rewind_retries, "pg_rewind exhausted its retries, giving up until an operator intervenes");
            if let Err(error) = fs::write(self.rewind_fail_flag_path(), b"") {
                error!(%error, "failed to write the rewind kill-switch flag");
            }
            let _ = self.db.cmd().stop_postgresql(self.db.pgdata(), self.config.global.postgres_timeout).await;
            return Err(ControllerError::RewindFailed);
        }

        self.dcs.delete(&paths::host_op(&self.host), false).await?;
        self.dcs.delete(&paths::host_tried_remaster(&self.host), false).await.ok();
        self.simple_switch_failures = 0;

        let conf = self.db.cmd().generate_recovery_conf(self.db.pgdata(), primary.as_str()).await?;
        if !conf.success {
            return Err(ControllerError::SimpleSwitchFailed);
        }
        self.db.cmd().start_postgresql(self.db.pgdata(), self.config.global.postgres_timeout).await?;
        self.db.checkpoint().await?;
        Ok(())
    }

    fn rewind_fail_flag_path(&self) -> PathBuf {
        self.config.global.working_dir.join(REWIND_FAIL_FLAG)
    }

    fn replslot_backup_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("pgsentry-replslot-backup-{}", self.host))
    }

    /// Backs up `pg_replslot` before a rewind so in-use slots survive it
    /// (spec §4.3: "`pg_replslot` backed up/restored around rewind when
    /// slots are in use").
    fn backup_replication_slots(&self) -> Option<PathBuf> {
        if !self.config.global.use_replication_slots {
            return None;
        }
        let src = Path::new(self.db.pgdata()).join("pg_replslot");
        let dst = self.replslot_backup_path();
        match copy_dir_recursive(&src, &dst) {
            Ok(()) => Some(dst),
            Err(error) => {
                warn!(%error, "failed to back up pg_replslot before pg_rewind");
                None
            }
        }
    }

    fn restore_replication_slots(&self, backup: &Path) {
        let dst = Path::new(self.db.pgdata()).join("pg_replslot");
        if let Err(error) = copy_dir_recursive(backup, &dst) {
            warn!(%error, "failed to restore pg_replslot after pg_rewind");
        }
        let _ = fs::remove_dir_all(backup);
    }

    /// Local PostgreSQL is primary and this is a single-node cluster
    /// (`main.py::single_node_primary_iter`): no election/replication-manager
    /// logic runs, replication is forced async.
    async fn single_node_primary_iter(&mut self) -> ControllerResult<()> {
        self.dcs.try_acquire_lock(paths::PRIMARY_LOCK, &self.host, self.config.global.election_timeout, false).await?;

        self.store_replics_info(Role::Primary).await?;
        let timeline = self.db.control_parameter("Latest checkpoint's TimeLineID").await?;
        if let Some(timeline) = timeline {
            self.dcs.set(paths::TIMELINE, &timeline, LockRequirement::None).await?;
        }

        self.db.cmd().start_pooler().await.ok();
        self.db.ensure_archive_mode().await?;

        let (current, _) = self.db.replication_state().await?;
        if current != pgsentry_types::NeededReplicationType::Async {
            self.replication.change_to_async().await?;
        }
        Ok(())
    }

    /// Local PostgreSQL is primary (`main.py::primary_iter`).
    async fn primary_iter(&mut self) -> ControllerResult<()> {
        if !self.dcs.try_acquire_lock(paths::PRIMARY_LOCK, &self.host, self.config.global.election_timeout, false).await? {
            warn!("could not acquire or retain primary lock");
            return self.resolve_lost_primary_lock().await;
        }

        self.reset_stale_promotion_marker().await?;
        self.replication.leave_sync_group(&self.host).await.ok();
        self.handle_slots().await?;
        self.store_replics_info(Role::Primary).await?;

        self.db.cmd().start_pooler().await.ok();
        self.db.ensure_archive_mode().await?;

        if self.config.primary.change_replication_type {
            let ha_replicas = self.ha_hosts().await?;
            let replics_info = self.db.replics_info(Role::Primary).await?;
            let sessions_ratio = self.db.sessions_ratio().await.ok().map(|r| r / 100.0);
            let inputs = DecisionInputs { replics_info: &replics_info, ha_replicas: &ha_replicas, sessions_ratio };
            self.replication.update_replication_type(&inputs, &ha_replicas).await?;
        }

        self.evaluate_scheduled_switchover().await
    }

    /// Clears a `current_promoting_host`/`failover_state` pair this host
    /// left behind across a restart mid-promotion (spec §4.2: "detect and
    /// reset stale failover").
    async fn reset_stale_promotion_marker(&self) -> ControllerResult<()> {
        let promoting_host = self.dcs.get(paths::CURRENT_PROMOTING_HOST).await?;
        if promoting_host.as_deref() != Some(self.host.as_str()) {
            return Ok(());
        }
        let failover_state = self.dcs.get(paths::FAILOVER_STATE).await?.and_then(|s| s.parse::<FailoverState>().ok());
        if matches!(failover_state, Some(FailoverState::Promoting | FailoverState::Checkpointing)) {
            self.dcs.set(paths::FAILOVER_STATE, &FailoverState::Finished.to_string(), LockRequirement::None).await?;
            self.dcs.delete(paths::CURRENT_PROMOTING_HOST, false).await?;
        }
        Ok(())
    }

    /// Primary-side half of the planned-switchover protocol (spec §4.6):
    /// picks up a `switchover/state = scheduled` announcement, validates the
    /// candidate, and drives the handover through `initiated` up to
    /// releasing the primary lock.
    async fn evaluate_scheduled_switchover(&mut self) -> ControllerResult<()> {
        let Some(intent): Option<SwitchoverIntent> = self.dcs.get_json(paths::SWITCHOVER_MASTER).await? else {
            return Ok(());
        };
        if intent.hostname != self.host {
            return Ok(());
        }
        let state = self.dcs.get(paths::SWITCHOVER_STATE).await?.and_then(|s| s.parse::<SwitchoverState>().ok());
        if state != Some(SwitchoverState::Scheduled) {
            return Ok(());
        }

        let local_timeline: u32 = self
            .db
            .control_parameter("Latest checkpoint's TimeLineID")
            .await?
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        if intent.timeline.0 != local_timeline {
            warn!(dcs_timeline = intent.timeline.0, local_timeline, "scheduled switchover targets a stale timeline, ignoring");
            return Ok(());
        }

        let replics_info = self.db.replics_info(Role::Primary).await?;
        let candidate = match &intent.destination {
            Some(destination) => destination.clone(),
            None => match self.replication.get_ensured_sync_replica(&replics_info).await? {
                Some(candidate) => candidate,
                None => {
                    warn!("scheduled switchover has no destination and no ensured sync replica, not proceeding");
                    return Ok(());
                }
            },
        };

        let safe = self.replication.is_promote_safe(std::slice::from_ref(&candidate), &replics_info).await?;
        if !safe && !self.config.replica.allow_potential_data_loss {
            warn!(%candidate, "switchover candidate is not safe to promote, not proceeding");
            return Ok(());
        }

        info!(%candidate, "starting scheduled switchover");
        if let Err(error) = self.do_primary_switchover(&candidate).await {
            error!(%error, "scheduled switchover failed");
            self.dcs.set(paths::SWITCHOVER_STATE, &SwitchoverState::Failed.to_string(), LockRequirement::None).await.ok();
        }
        Ok(())
    }

    /// Steps 1 and 3 of the planned-switchover protocol (spec §4.6):
    /// announce `initiated`, wait for the candidate to confirm
    /// `candidate_found`, checkpoint and stop, then publish the shutdown
    /// LSN and release the lock.
    async fn do_primary_switchover(&mut self, candidate: &HostId) -> ControllerResult<()> {
        self.dcs.set(paths::SWITCHOVER_STATE, &SwitchoverState::Initiated.to_string(), LockRequirement::None).await?;
        self.db.checkpoint().await?;
        let _ = self.db.cmd().stop_pooler().await;
        self.store_replics_info(Role::Primary).await?;
        self.dcs.set(paths::FAILOVER_STATE, &FailoverState::SwitchoverInitiated.to_string(), LockRequirement::None).await?;
        self.dcs.set(paths::CURRENT_PROMOTING_HOST, candidate.as_str(), LockRequirement::None).await?;

        let dcs = Arc::clone(&self.dcs);
        let found = retry_until(
            || {
                let dcs = Arc::clone(&dcs);
                async move {
                    let state = dcs.get(paths::SWITCHOVER_STATE).await.ok().flatten()?;
                    (state.parse::<SwitchoverState>().ok() == Some(SwitchoverState::CandidateFound)).then_some(())
                }
            },
            Some(self.config.global.switchover_catchup_timeout),
            &self.cancel,
        )
        .await;
        if found.ready().is_none() {
            return Err(ControllerError::SimpleSwitchFailed);
        }

        let stop = self.db.cmd().stop_postgresql(self.db.pgdata(), self.config.global.postgres_timeout).await?;
        if !stop.success {
            return Err(ControllerError::SimpleSwitchFailed);
        }
        if let Some(lsn) = self.db.control_parameter("REDO location").await? {
            self.dcs.set(paths::SWITCHOVER_LSN, &lsn, LockRequirement::None).await.ok();
        }
        self.dcs.set(paths::FAILOVER_STATE, &FailoverState::SwitchoverMasterShut.to_string(), LockRequirement::None).await?;
        self.dcs.release_lock(paths::PRIMARY_LOCK, &self.host).await?;
        self.dcs.set(paths::LAST_SWITCHOVER_TIME, &Utc::now().timestamp().to_string(), LockRequirement::None).await.ok();
        Ok(())
    }

    /// We held the primary lock and lost it (or never had it): someone else
    /// may already be primary, so step down and step back to a replica
    /// rather than fight over the lock (`main.py::resolve_zk_primary_lock`).
    async fn resolve_lost_primary_lock(&mut self) -> ControllerResult<()> {
        let _ = self.db.cmd().stop_pooler().await;
        let _ = self.db.stop_archiving_wal().await;

        if let Some(promoting_host) = self.dcs.get(paths::CURRENT_PROMOTING_HOST).await? {
            if promoting_host != self.host.as_str() {
                info!(%promoting_host, "another host has been elected, stepping down");
            }
        }

        if let Some(holder) = self.dcs.current_lock_holder(paths::PRIMARY_LOCK).await? {
            if holder != self.host {
                return self.attach_to_primary(&holder).await;
            }
        }
        Ok(())
    }

    /// Local PostgreSQL is a replica (`main.py::replica_iter`).
    async fn replica_iter(&mut self) -> ControllerResult<()> {
        let holder = self.dcs.current_lock_holder(paths::PRIMARY_LOCK).await?;
        let replics_info = self.db.replics_info(Role::Replica).await?;
        let streaming = replics_info.iter().any(|r| r.matches_host(&self.host) && r.is_streaming());

        if self.try_accept_switchover(holder.as_ref(), &replics_info).await?.is_some() {
            return Ok(());
        }

        let Some(holder) = holder else {
            error!("primary lock is unheld; initiating a failover election");
            return self.run_election(&replics_info).await;
        };

        if !streaming {
            warn!(%holder, "not actively streaming WAL from the primary");
            self.replication.leave_sync_group(&self.host).await.ok();
            return self.attach_to_primary(&holder).await;
        }

        self.db.cmd().start_pooler().await.ok();
        self.replication.enter_sync_group(&replics_info, &self.host).await?;
        self.handle_slots().await?;
        Ok(())
    }

    /// Candidate-side half of the planned-switchover protocol (spec §4.6,
    /// steps 2 and 4): claims the candidate slot once the primary announces
    /// `initiated`, then promotes once the old primary has shut down.
    /// Returns `Some(())` if a switchover was in flight and this tick
    /// handled it, `None` if there was nothing to do.
    async fn try_accept_switchover(
        &mut self,
        holder: Option<&HostId>,
        replics_info: &[ReplicaInfo],
    ) -> ControllerResult<Option<()>> {
        let Some(intent): Option<SwitchoverIntent> = self.dcs.get_json(paths::SWITCHOVER_MASTER).await? else {
            return Ok(None);
        };
        let Some(state) = self.dcs.get(paths::SWITCHOVER_STATE).await?.and_then(|s| s.parse::<SwitchoverState>().ok()) else {
            return Ok(None);
        };
        if !matches!(state, SwitchoverState::Initiated | SwitchoverState::CandidateFound) {
            return Ok(None);
        }

        let candidate = match &intent.destination {
            Some(destination) => Some(destination.clone()),
            None => self.replication.get_ensured_sync_replica(replics_info).await?,
        };
        if candidate.as_ref() != Some(&self.host) {
            return Ok(Some(()));
        }

        if state == SwitchoverState::Initiated {
            self.dcs.set(paths::SWITCHOVER_STATE, &SwitchoverState::CandidateFound.to_string(), LockRequirement::None).await?;
        }

        if holder.is_some() {
            let dcs = Arc::clone(&self.dcs);
            let shut = retry_until(
                || {
                    let dcs = Arc::clone(&dcs);
                    async move {
                        let state = dcs.get(paths::FAILOVER_STATE).await.ok().flatten()?;
                        (state.parse::<FailoverState>().ok() == Some(FailoverState::SwitchoverMasterShut)).then_some(())
                    }
                },
                Some(self.config.global.switchover_replica_turn_timeout),
                &self.cancel,
            )
            .await;
            if shut.ready().is_none() {
                warn!("timed out waiting for the old primary to shut down, will retry next tick");
                return Ok(Some(()));
            }
        }

        if !self.dcs.try_acquire_lock(paths::PRIMARY_LOCK, &self.host, self.config.global.election_timeout, true).await? {
            return Ok(Some(()));
        }
        self.promote().await?;
        self.cleanup_switchover().await?;
        self.dcs.set(paths::LAST_SWITCHOVER_TIME, &Utc::now().timestamp().to_string(), LockRequirement::None).await.ok();
        Ok(Some(()))
    }

    async fn cleanup_switchover(&self) -> ControllerResult<()> {
        self.dcs.delete(paths::SWITCHOVER_ROOT, true).await?;
        self.dcs.delete(paths::FAILOVER_STATE, false).await.ok();
        self.dcs.delete(paths::CURRENT_PROMOTING_HOST, false).await.ok();
        Ok(())
    }

    async fn run_election(&mut self, replics_info: &[ReplicaInfo]) -> ControllerResult<()> {
        let host_lsn = self.db.last_replay_lsn().await.unwrap_or(pgsentry_types::Lsn::ZERO);
        let quorum_size = self.ha_hosts().await?.len() / 2 + 1;
        let election = FailoverElection::new(
            Arc::clone(&self.dcs),
            Arc::clone(&self.replication),
            self.host.clone(),
            self.config.global.election_timeout,
            replics_info.to_vec(),
            self.config.replica.allow_potential_data_loss,
            Priority(self.config.global.priority),
            host_lsn,
            quorum_size.max(1),
            self.cancel.clone(),
        );
        match election.make_election().await? {
            true => {
                info!("won the failover election, promoting");
                self.dcs.set(paths::CURRENT_PROMOTING_HOST, self.host.as_str(), LockRequirement::None).await.ok();
                self.dcs.set(paths::FAILOVER_STATE, &FailoverState::Promoting.to_string(), LockRequirement::None).await.ok();
                self.promote().await?;
                self.dcs.set(paths::FAILOVER_STATE, &FailoverState::Finished.to_string(), LockRequirement::None).await.ok();
                self.dcs.delete(paths::CURRENT_PROMOTING_HOST, false).await.ok();
                self.dcs.set(paths::LAST_FAILOVER_TIME, &Utc::now().timestamp().to_string(), LockRequirement::None).await.ok();
                Ok(())
            }
            false => Ok(()),
        }
    }

    async fn promote(&mut self) -> ControllerResult<()> {
        self.db.cmd().promote(self.db.pgdata()).await?;
        Ok(())
    }

    /// `main.py::_handle_slots`: create slots for hosts currently reading
    /// from us, drop them for hosts that have been gone for
    /// `drop_slot_countdown` ticks.
    async fn handle_slots(&mut self) -> ControllerResult<()> {
        if !self.config.global.replication_slots_polling {
            return Ok(());
        }
        let source_lock = paths::replication_sources(&self.host);
        let holders: HashSet<HostId> = self.dcs.read_lock_holders(&source_lock).await?.into_iter().collect();
        let all_hosts: Vec<HostId> = self.dcs.children(paths::ALL_HOSTS).await?.into_iter().map(HostId::new).collect();

        let slot_names: Vec<String> = holders.iter().map(HostId::slot_name).collect();
        self.db.create_replication_slots(&slot_names).await?;

        let mut to_drop = self.slots.sweep(&holders, &all_hosts);
        to_drop.retain(|name| name != &self.host.slot_name());
        if !to_drop.is_empty() {
            self.db.drop_replication_slots(&to_drop).await?;
        }
        Ok(())
    }

    /// Writes the primary's view of connected replicas to `replics_info`
    /// (`main.py::_store_replics_info`).
    async fn store_replics_info(&self, role: Role) -> ControllerResult<()> {
        let info = self.db.replics_info(role).await?;
        self.dcs.set_json(paths::REPLICS_INFO, &info, LockRequirement::None).await?;
        Ok(())
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    if !src.exists() {
        return Ok(());
    }
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
