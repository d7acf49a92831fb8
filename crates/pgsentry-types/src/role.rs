//! Local PostgreSQL role and liveness classification.

use serde::{Deserialize, Serialize};

/// Role of the local PostgreSQL instance, as determined by
/// `SELECT pg_is_in_recovery()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Primary,
    Replica,
}

/// Three-valued liveness of the local PostgreSQL instance (spec §4.1 step 1).
///
/// `Transient` covers the `FATAL: ... starting up` / `shutting down`
/// connection error classes (spec §5): the controller should wait rather
/// than treat the instance as dead or act on it as alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DbLiveness {
    Dead,
    Transient,
    Alive,
}

impl DbLiveness {
    #[must_use]
    pub fn is_alive(self) -> bool {
        matches!(self, DbLiveness::Alive)
    }

    #[must_use]
    pub fn is_dead(self) -> bool {
        matches!(self, DbLiveness::Dead)
    }
}
