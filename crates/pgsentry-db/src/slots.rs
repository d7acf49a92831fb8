//! Physical replication slot lifecycle, ported from
//! `pg.py::get_replication_slots` / `_create_replication_slot` /
//! `_drop_replication_slot`.

use sqlx::Row;
use tracing::{debug, info};

use crate::client::PgClient;
use crate::error::{DbError, DbResult};

impl PgClient {
    pub async fn replication_slots(&self) -> DbResult<Vec<String>> {
        let rows = sqlx::query("SELECT slot_name FROM pg_replication_slots")
            .fetch_all(self.pool())
            .await
            .map_err(DbError::Query)?;
        rows.into_iter()
            .map(|row| row.try_get("slot_name").map_err(|e| DbError::Decode(e.to_string())))
            .collect()
    }

    /// Creates every slot in `slots` that does not already exist.
    pub async fn create_replication_slots(&self, slots: &[String]) -> DbResult<()> {
        let current = self.replication_slots().await?;
        for slot in slots {
            if current.iter().any(|s| s == slot) {
                debug!(slot, "replication slot already exists");
                continue;
            }
            info!(slot, "creating replication slot");
            sqlx::query("SELECT pg_create_physical_replication_slot($1, true)")
                .bind(slot)
                .execute(self.pool())
                .await
                .map_err(DbError::Query)?;
        }
        Ok(())
    }

    /// Drops every slot in `slots` that currently exists. Used by the
    /// Controller's `drop_slot_countdown` sweep to reclaim WAL retained for
    /// a host that has been gone too long (spec §4.3).
    pub async fn drop_replication_slots(&self, slots: &[String]) -> DbResult<()> {
        let current = self.replication_slots().await?;
        for slot in slots {
            if !current.iter().any(|s| s == slot) {
                debug!(slot, "replication slot does not exist");
                continue;
            }
            info!(slot, "dropping replication slot");
            sqlx::query("SELECT pg_drop_replication_slot($1)")
                .bind(slot)
                .execute(self.pool())
                .await
                .map_err(DbError::Query)?;
        }
        Ok(())
    }
}
