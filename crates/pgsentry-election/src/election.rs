//! The failover election itself, ported from
//! `failover_election.py::FailoverElection`. The control-flow order in
//! `make_election`/`manage_election`/`participate_in_election` is
//! load-bearing (it was tuned to avoid specific races) and is kept as-is.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pgsentry_dcs::{paths, Dcs, LockRequirement};
use pgsentry_replication::ReplicationManager;
use pgsentry_types::{ElectionVote, HostId, Lsn, Priority, ReplicaInfo};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{ElectionError, ElectionResult};
use crate::status::ElectionStatus;

pub struct FailoverElection {
    dcs: Arc<dyn Dcs>,
    replication: Arc<dyn ReplicationManager>,
    host: HostId,
    timeout: Duration,
    replica_infos: Vec<ReplicaInfo>,
    allow_data_loss: bool,
    host_priority: Priority,
    host_lsn: Lsn,
    quorum_size: usize,
    cancel: CancellationToken,
}

impl FailoverElection {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dcs: Arc<dyn Dcs>,
        replication: Arc<dyn ReplicationManager>,
        host: HostId,
        timeout: Duration,
        replica_infos: Vec<ReplicaInfo>,
        allow_data_loss: bool,
        host_priority: Priority,
        host_lsn: Lsn,
        quorum_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            dcs,
            replication,
            host,
            timeout,
            replica_infos,
            allow_data_loss,
            host_priority,
            host_lsn,
            quorum_size,
            cancel,
        }
    }

    async fn ha_hosts(&self) -> ElectionResult<Vec<HostId>> {
        Ok(self.dcs.children(paths::ALL_HOSTS).await?.into_iter().map(HostId::new).collect())
    }

    async fn get_host_vote(&self, host: &HostId) -> Option<ElectionVote> {
        let base = paths::election_vote(host);
        let lsn: Lsn = self.dcs.get(&format!("{base}/lsn")).await.ok().flatten()?.parse().ok()?;
        let priority: i32 = self.dcs.get(&format!("{base}/prio")).await.ok().flatten()?.parse().ok()?;
        Some(ElectionVote { lsn, priority: Priority(priority) })
    }

    async fn collect_votes(&self) -> ElectionResult<HashMap<HostId, ElectionVote>> {
        let ha_hosts = self.ha_hosts().await?;
        let app_name_map: HashMap<String, HostId> =
            ha_hosts.into_iter().map(|h| (h.app_name(), h)).collect();

        let mut votes = HashMap::new();
        for info in &self.replica_infos {
            let Some(replica) = app_name_map.get(&info.application_name) else { continue };
            if let Some(vote) = self.get_host_vote(replica).await {
                votes.insert(replica.clone(), vote);
            }
        }
        info!(count = votes.len(), "collected election votes");
        Ok(votes)
    }

    /// Winner is the lexicographic max of `(lsn, priority)`; a tie on both
    /// (same lsn, same priority) is broken by hostname order so the result
    /// is deterministic regardless of `HashMap` iteration order (spec
    /// property P8).
    fn determine_election_winner(votes: &HashMap<HostId, ElectionVote>) -> ElectionResult<HostId> {
        votes
            .iter()
            .max_by(|(host_a, vote_a), (host_b, vote_b)| vote_a.cmp(vote_b).then_with(|| host_a.cmp(host_b)))
            .map(|(host, _)| host.clone())
            .ok_or(ElectionError::NoWinner)
    }

    async fn vote_in_election(&self) -> ElectionResult<()> {
        debug!(lsn = %self.host_lsn, priority = self.host_priority.0, "voting in election");
        let base = paths::election_vote(&self.host);
        self.dcs.ensure_path(&base).await.map_err(|_| ElectionError::VoteFail)?;
        self.dcs
            .set(&format!("{base}/lsn"), &self.host_lsn.to_string(), LockRequirement::None)
            .await
            .map_err(|_| ElectionError::VoteFail)?;
        self.dcs
            .set(&format!("{base}/prio"), &self.host_priority.0.to_string(), LockRequirement::None)
            .await
            .map_err(|_| ElectionError::VoteFail)?;
        info!("successfully voted");
        Ok(())
    }

    async fn is_election_valid(&self, votes: &HashMap<HostId, ElectionVote>) -> ElectionResult<bool> {
        if votes.len() < self.quorum_size {
            error!("not enough votes for quorum");
            return Ok(false);
        }
        let candidates: Vec<HostId> = votes.keys().cloned().collect();
        let promote_safe = self.replication.is_promote_safe(&candidates, &self.replica_infos).await?;
        if !self.allow_data_loss && !promote_safe {
            error!("sync replica vote is required but was not found");
            return Ok(false);
        }
        Ok(true)
    }

    async fn cleanup_votes(&self) -> ElectionResult<()> {
        for host in self.ha_hosts().await? {
            self.dcs.delete(&paths::election_vote(&host), true).await.map_err(|_| ElectionError::Cleanup)?;
        }
        Ok(())
    }

    async fn await_election_status(&self, status: ElectionStatus) -> ElectionResult<()> {
        let outcome = pgsentry_dcs::retry_until(
            || async {
                let current = self.dcs.get(paths::ELECTION_STATUS).await.ok().flatten();
                if current.as_deref() == Some(status.to_string().as_str()) {
                    Some(())
                } else {
                    None
                }
            },
            Some(self.timeout),
            &self.cancel,
        )
        .await;
        outcome.ready().ok_or(ElectionError::Timeout)
    }

    async fn await_lock_holder<F>(&self, lock: &str, condition: F) -> ElectionResult<bool>
    where
        F: Fn(Option<&HostId>) -> bool,
    {
        let outcome = pgsentry_dcs::retry_until(
            || async {
                let holder = self.dcs.current_lock_holder(lock).await.ok().flatten();
                if condition(holder.as_ref()) {
                    Some(())
                } else {
                    None
                }
            },
            Some(self.timeout),
            &self.cancel,
        )
        .await;
        Ok(outcome.ready().is_some())
    }

    async fn write_election_status(&self, status: ElectionStatus) -> ElectionResult<()> {
        debug!(%status, "changing election status");
        self.dcs
            .set(paths::ELECTION_STATUS, &status.to_string(), LockRequirement::None)
            .await
            .map_err(|_| ElectionError::StatusChange)
    }

    /// Participant path: wait for registration, vote, wait for the result,
    /// and if we won, take the primary lock ourselves.
    async fn participate_in_election(&self) -> ElectionResult<bool> {
        info!("participating in election");
        self.await_election_status(ElectionStatus::Registration).await?;
        self.vote_in_election().await?;
        self.await_election_status(ElectionStatus::Done).await?;

        let winner = self.dcs.get(paths::ELECTION_WINNER).await?;
        if winner.as_deref() != Some(self.host.as_str()) {
            return Ok(false);
        }

        if !self.dcs.try_acquire_lock(paths::PRIMARY_LOCK, &self.host, self.timeout, false).await? {
            return Ok(false);
        }
        if !self.await_lock_holder(paths::ELECTION_MANAGER_LOCK, |holder| holder.is_none()).await? {
            return Err(ElectionError::Timeout);
        }
        if self.dcs.get(paths::ELECTION_STATUS).await?.as_deref() == Some(ElectionStatus::Failed.to_string().as_str()) {
            self.dcs.release_lock(paths::PRIMARY_LOCK, &self.host).await?;
            return Ok(false);
        }
        Ok(true)
    }

    /// Manager path: exactly one host per election runs this. Cleans up
    /// stale votes, opens registration, votes itself, waits half the
    /// timeout for stragglers, then tallies.
    async fn manage_election(&self) -> ElectionResult<bool> {
        info!("managing election");
        self.cleanup_votes().await?;
        self.write_election_status(ElectionStatus::Registration).await?;
        self.vote_in_election().await?;
        tokio::time::sleep(self.timeout / 2).await;
        self.write_election_status(ElectionStatus::Selection).await?;

        let votes = self.collect_votes().await?;
        if !self.is_election_valid(&votes).await? {
            return Ok(false);
        }
        let winner = Self::determine_election_winner(&votes)?;
        info!(%winner, "elected");
        self.dcs.set(paths::ELECTION_WINNER, winner.as_str(), LockRequirement::None).await?;
        self.write_election_status(ElectionStatus::Done).await?;

        if winner == self.host {
            return Ok(self.dcs.try_acquire_lock(paths::PRIMARY_LOCK, &self.host, self.timeout, false).await?);
        }
        if !self.await_lock_holder(paths::PRIMARY_LOCK, |holder| holder.is_some()).await? {
            self.write_election_status(ElectionStatus::Failed).await?;
            return Err(ElectionError::Timeout);
        }
        Ok(false)
    }

    /// Entry point: take part in the election as participant or manager.
    /// Returns `true` only if this host became the new primary.
    pub async fn make_election(&self) -> ElectionResult<bool> {
        if !self.dcs.try_acquire_lock(paths::ELECTION_ENTER_LOCK, &self.host, self.timeout, true).await? {
            return Ok(false);
        }

        if self.dcs.current_lock_holder(paths::ELECTION_MANAGER_LOCK).await?.is_some() {
            self.dcs.release_lock(paths::ELECTION_ENTER_LOCK, &self.host).await?;
            return self.participate_in_election().await;
        }

        if self.dcs.current_lock_holder(paths::PRIMARY_LOCK).await?.is_some() {
            return Ok(false);
        }

        self.write_election_status(ElectionStatus::Cleanup).await?;
        if !self.dcs.try_acquire_lock(paths::ELECTION_MANAGER_LOCK, &self.host, self.timeout, false).await? {
            return Ok(false);
        }

        let result = async {
            self.dcs.release_lock(paths::ELECTION_ENTER_LOCK, &self.host).await?;
            self.manage_election().await
        }
        .await;

        self.dcs.release_lock(paths::ELECTION_MANAGER_LOCK, &self.host).await?;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn winner_is_highest_lexicographic_lsn_then_priority() {
        let mut votes = HashMap::new();
        votes.insert(HostId::new("a"), ElectionVote { lsn: Lsn(10), priority: Priority(5) });
        votes.insert(HostId::new("b"), ElectionVote { lsn: Lsn(20), priority: Priority(0) });
        votes.insert(HostId::new("c"), ElectionVote { lsn: Lsn(20), priority: Priority(3) });
        let winner = FailoverElection::determine_election_winner(&votes).unwrap();
        assert_eq!(winner, HostId::new("c"));
    }

    #[test]
    fn tie_on_lsn_and_priority_breaks_by_hostname() {
        let mut votes = HashMap::new();
        votes.insert(HostId::new("replica-a"), ElectionVote { lsn: Lsn(10), priority: Priority(5) });
        votes.insert(HostId::new("replica-z"), ElectionVote { lsn: Lsn(10), priority: Priority(5) });
        votes.insert(HostId::new("replica-m"), ElectionVote { lsn: Lsn(10), priority: Priority(5) });
        let winner = FailoverElection::determine_election_winner(&votes).unwrap();
        assert_eq!(winner, HostId::new("replica-z"));
    }

    #[test]
    fn no_votes_is_an_error() {
        let votes = HashMap::new();
        assert!(matches!(FailoverElection::determine_election_winner(&votes), Err(ElectionError::NoWinner)));
    }
}
