//! WAL archiving control and generic `ALTER SYSTEM` parameter changes,
//! ported from `pg.py::ensure_archive_mode` / `ensure_archiving_wal` /
//! `stop_archiving_wal` / `_alter_system_set_param`.

use sqlx::Row;
use tracing::warn;

use crate::client::{PgClient, DISABLED_ARCHIVE_COMMAND};
use crate::error::{DbError, DbResult};

impl PgClient {
    /// `SHOW <param>`, used to read back whatever `ALTER SYSTEM` last set
    /// (Postgres only applies `ALTER SYSTEM` after a reload).
    pub async fn param(&self, name: &str) -> DbResult<String> {
        let query = format!("SHOW {name}");
        let row = sqlx::query(&query).fetch_one(self.pool()).await.map_err(DbError::Query)?;
        row.try_get::<String, _>(0).map_err(|e| DbError::Decode(e.to_string()))
    }

    /// `ALTER SYSTEM SET <param> = <value>` (or `RESET <param>`), reloaded
    /// immediately, then reads the value back to confirm it took.
    pub async fn alter_system_set(&self, name: &str, value: Option<&str>) -> DbResult<bool> {
        let query = match value {
            Some(v) => format!("ALTER SYSTEM SET {name} = '{}'", v.replace('\'', "''")),
            None => format!("ALTER SYSTEM RESET {name}"),
        };
        sqlx::query(&query).execute(self.pool()).await.map_err(DbError::Query)?;
        self.reload().await?;

        let observed = self.param(name).await?;
        let matches = match value {
            Some(v) => observed == v,
            None => true,
        };
        if !matches {
            warn!(param = name, expected = ?value, %observed, "ALTER SYSTEM did not take effect");
        }
        Ok(matches)
    }

    pub async fn ensure_archive_mode(&self) -> DbResult<bool> {
        let mode = self.param("archive_mode").await?;
        if mode == "off" {
            warn!("archive_mode is off; this host cannot be safely rewound from");
            return Ok(false);
        }
        Ok(true)
    }

    pub async fn is_archiving_disabled(&self) -> DbResult<bool> {
        Ok(self.param("archive_command").await? == DISABLED_ARCHIVE_COMMAND)
    }

    /// Swaps `archive_command` for `/bin/false`, used while holding the
    /// rewind-exclusivity lock so a losing node cannot archive stale WAL
    /// onto the shared archive (spec invariant I5).
    pub async fn stop_archiving_wal(&self) -> DbResult<bool> {
        self.alter_system_set("archive_command", Some(DISABLED_ARCHIVE_COMMAND)).await
    }

    pub async fn resume_archiving_wal(&self) -> DbResult<bool> {
        self.alter_system_set("archive_command", None).await
    }

    pub async fn is_wal_replay_paused(&self) -> DbResult<bool> {
        let row = sqlx::query("SELECT pg_is_wal_replay_paused()").fetch_one(self.pool()).await.map_err(DbError::Query)?;
        row.try_get(0).map_err(|e| DbError::Decode(e.to_string()))
    }

    pub async fn pg_wal_replay_pause(&self) -> DbResult<()> {
        sqlx::query("SELECT pg_wal_replay_pause()").execute(self.pool()).await.map_err(DbError::Query)?;
        Ok(())
    }

    pub async fn pg_wal_replay_resume(&self) -> DbResult<()> {
        sqlx::query("SELECT pg_wal_replay_resume()").execute(self.pool()).await.map_err(DbError::Query)?;
        Ok(())
    }
}
