//! Cluster member identity and priority.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fully-qualified hostname of a cluster member, as registered under
/// `all_hosts/{host}` in the DCS.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HostId(pub String);

impl HostId {
    #[must_use]
    pub fn new(fqdn: impl Into<String>) -> Self {
        HostId(fqdn.into())
    }

    /// `pg_stat_replication.application_name` derived from this host's
    /// FQDN: every `.` and `-` becomes `_` (spec glossary, "App name").
    #[must_use]
    pub fn app_name(&self) -> String {
        self.0.replace(['.', '-'], "_")
    }

    /// Replication slot name for this host: same transform as `app_name`,
    /// since slots and `synchronous_standby_names` entries share the
    /// sanitized identifier (spec §4.8).
    #[must_use]
    pub fn slot_name(&self) -> String {
        self.app_name()
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for HostId {
    fn from(value: &str) -> Self {
        HostId(value.to_string())
    }
}

impl From<String> for HostId {
    fn from(value: String) -> Self {
        HostId(value)
    }
}

/// Election/sync-replica priority for a host. Higher wins ties (spec
/// property P8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(pub i32);

impl Default for Priority {
    fn default() -> Self {
        Priority(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_name_replaces_dots_and_dashes() {
        let host = HostId::new("pg-replica-01.db.example.com");
        assert_eq!(host.app_name(), "pg_replica_01_db_example_com");
    }

    #[test]
    fn priority_ties_break_by_value() {
        assert!(Priority(5) > Priority(3));
    }
}
