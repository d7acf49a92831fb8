//! Connection pool and the basic liveness/role/LSN queries every other
//! module in this crate builds on. Grounded on `pg.py`'s `Postgres` class:
//! same queries, same defaults, ported from a reconnect-on-error cursor
//! wrapper to a pooled async client.

use std::time::Duration;

use pgsentry_cmd::CommandRunner;
use pgsentry_types::{DbLiveness, Lsn, Role};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Row};
use tracing::{info, warn};

use crate::error::{DbError, DbResult};

/// Archive command value that disables WAL archiving outright, used by the
/// Controller to pause a replica's archiving during rewind (spec §4.3).
pub const DISABLED_ARCHIVE_COMMAND: &str = "/bin/false";

pub struct PgClient {
    pool: PgPool,
    cmd: CommandRunner,
    pgdata: String,
}

impl PgClient {
    /// Opens a small pool against the local instance. pgsentry always talks
    /// to the Postgres it co-locates with, so a pool of more than a
    /// handful of connections would only mask a stuck backend.
    pub async fn connect(options: PgConnectOptions, cmd: CommandRunner, pgdata: impl Into<String>) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(5))
            .test_before_acquire(true)
            .connect_with(options)
            .await
            .map_err(DbError::Connect)?;
        info!("connected to local postgresql instance");
        Ok(Self { pool, cmd, pgdata: pgdata.into() })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Access to the underlying Command Runner, for operations (starting
    /// and stopping the postmaster, the pooler) that have no SQL form.
    pub fn cmd(&self) -> &CommandRunner {
        &self.cmd
    }

    pub fn pgdata(&self) -> &str {
        &self.pgdata
    }

    /// `SELECT 42` — matches `pg.py::is_alive`'s cheap connectivity probe.
    pub async fn is_alive(&self) -> bool {
        sqlx::query("SELECT 42").fetch_one(&self.pool).await.is_ok()
    }

    /// Coarser than [`Self::is_alive`]: distinguishes "connected but the
    /// server is shutting down" from a genuine `Alive`, matching pgconsul's
    /// three-state liveness used to gate failover decisions.
    pub async fn liveness(&self) -> DbLiveness {
        match sqlx::query("SELECT pg_is_in_recovery()").fetch_one(&self.pool).await {
            Ok(_) => DbLiveness::Alive,
            Err(sqlx::Error::PoolTimedOut | sqlx::Error::Io(_)) => DbLiveness::Transient,
            Err(_) => DbLiveness::Dead,
        }
    }

    /// `SELECT pg_is_in_recovery()`.
    pub async fn role(&self) -> DbResult<Role> {
        let row = sqlx::query("SELECT pg_is_in_recovery() AS in_recovery")
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Query)?;
        let in_recovery: bool = row.try_get("in_recovery").map_err(|e| DbError::Decode(e.to_string()))?;
        Ok(if in_recovery { Role::Replica } else { Role::Primary })
    }

    /// Current write position on a primary (`pg_current_wal_lsn`).
    pub async fn current_wal_lsn(&self) -> DbResult<Lsn> {
        self.scalar_lsn("SELECT pg_current_wal_lsn()").await
    }

    /// Last position replayed on a replica (`pg_last_wal_replay_lsn`).
    pub async fn last_replay_lsn(&self) -> DbResult<Lsn> {
        self.scalar_lsn("SELECT pg_last_wal_replay_lsn()").await
    }

    /// Last position received but not necessarily replayed
    /// (`pg_last_wal_receive_lsn`), used as the rewind safety check when
    /// `use_lwaldump` is off.
    pub async fn last_receive_lsn(&self) -> DbResult<Lsn> {
        self.scalar_lsn("SELECT pg_last_wal_receive_lsn()").await
    }

    /// `pg_wal_lsn_diff(pg_last_wal_replay_lsn(), diff_from)`, used to
    /// detect whether a replica is still actively replaying WAL.
    pub async fn replay_diff(&self, diff_from: Lsn) -> DbResult<i64> {
        let row = sqlx::query("SELECT pg_wal_lsn_diff(pg_last_wal_replay_lsn(), $1::pg_lsn) AS diff")
            .bind(diff_from.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Query)?;
        row.try_get("diff").map_err(|e| DbError::Decode(e.to_string()))
    }

    /// `SELECT count(*) FROM pg_stat_activity WHERE state != 'idle'` over
    /// `max_connections`, expressed as a percentage (spec §4.2: used to
    /// decide whether a replica can absorb a switchover's reconnect storm).
    pub async fn sessions_ratio(&self) -> DbResult<f64> {
        let active: i64 = sqlx::query_scalar("SELECT count(*) FROM pg_stat_activity WHERE state != 'idle'")
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Query)?;
        let max_connections: String =
            sqlx::query_scalar("SHOW max_connections").fetch_one(&self.pool).await.map_err(DbError::Query)?;
        let max_connections: f64 = max_connections.parse().map_err(|_| {
            DbError::Decode(format!("max_connections is not numeric: {max_connections}"))
        })?;
        Ok((active as f64 / max_connections) * 100.0)
    }

    /// Runs `CHECKPOINT`, used before promotion to minimize replay time and
    /// before rewind so the control file reflects the latest state.
    pub async fn checkpoint(&self) -> DbResult<()> {
        sqlx::query("CHECKPOINT").execute(&self.pool).await.map_err(DbError::Query)?;
        Ok(())
    }

    pub async fn reload(&self) -> DbResult<()> {
        sqlx::query("SELECT pg_reload_conf()").execute(&self.pool).await.map_err(DbError::Query)?;
        Ok(())
    }

    pub async fn terminate_backend(&self, pid: i32) -> DbResult<()> {
        warn!(pid, "terminating backend");
        sqlx::query("SELECT pg_terminate_backend($1)").bind(pid).execute(&self.pool).await.map_err(DbError::Query)?;
        Ok(())
    }

    pub async fn check_extension_installed(&self, name: &str) -> DbResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM pg_extension WHERE extname = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::Query)?;
        Ok(row.is_some())
    }

    /// Runs `pg_controldata` through the Command Runner and greps a field
    /// out of its output, matching `pg.py::get_data_from_control_file`.
    pub async fn control_parameter(&self, parameter: &str) -> DbResult<Option<String>> {
        Ok(self.cmd.get_control_parameter(&self.pgdata, parameter).await?)
    }

    /// Checksums or `wal_log_hints` must be on for `pg_rewind` to be safe
    /// (ported from `pg.py::is_ready_for_pg_rewind`).
    pub async fn is_ready_for_pg_rewind(&self) -> DbResult<bool> {
        if let Some(checksums) = self.control_parameter("Data page checksum version").await? {
            if checksums.trim() != "0" {
                return Ok(true);
            }
        }
        let wal_log_hints = self.param("wal_log_hints").await.unwrap_or_default();
        Ok(wal_log_hints == "on")
    }

    async fn scalar_lsn(&self, query: &str) -> DbResult<Lsn> {
        let raw: String = sqlx::query_scalar::<_, Option<String>>(query)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Query)?
            .unwrap_or_else(|| "0/0".to_string());
        raw.parse().map_err(|e: pgsentry_types::lsn::ParseLsnError| DbError::Decode(e.to_string()))
    }
}
