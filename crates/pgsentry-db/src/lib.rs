//! Typed PostgreSQL adapter: role and LSN queries, replication topology,
//! synchronous_standby_names management, slot lifecycle, and archiving
//! control, all over a pooled `sqlx` connection.

mod archive;
mod client;
mod error;
mod replication;
mod slots;

pub use client::{PgClient, DISABLED_ARCHIVE_COMMAND};
pub use error::{DbError, DbResult};
