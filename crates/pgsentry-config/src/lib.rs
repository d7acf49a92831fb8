//! Typed configuration for pgsentry, merged from built-in defaults, a TOML
//! config file, and `PGSENTRY_*` environment overrides.
//!
//! Sections mirror the `[global]`, `[primary]`, `[replica]`, `[commands]`,
//! and `[plugins]` sections of the original ini-style config
//! (`original_source/src/__init__.py::read_config`), translated to typed
//! TOML so invalid values are caught at load time rather than at first use.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Full merged configuration for one pgsentry agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PgSentryConfig {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub primary: PrimaryConfig,
    #[serde(default)]
    pub replica: ReplicaConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
}

impl Default for PgSentryConfig {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            primary: PrimaryConfig::default(),
            replica: ReplicaConfig::default(),
            commands: CommandsConfig::default(),
            plugins: PluginsConfig::default(),
        }
    }
}

/// `[global]` — cluster-wide and DCS-connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub log_level: String,
    pub working_dir: PathBuf,
    pub pgdata: PathBuf,
    pub local_conn_string: String,
    pub append_primary_conn_string: String,
    #[serde(with = "humantime_serde")]
    pub iteration_timeout: Duration,
    pub zk_hosts: String,
    pub zk_lockpath_prefix: String,
    pub use_replication_slots: bool,
    pub replication_slots_polling: bool,
    pub max_rewind_retries: u32,
    #[serde(with = "humantime_serde")]
    pub postgres_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub switchover_catchup_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub switchover_replica_turn_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub switchover_rollback_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub election_timeout: Duration,
    pub priority: i32,
    pub update_prio_in_zk: bool,
    pub standalone_pooler: bool,
    pub pooler_port: u16,
    pub pooler_addr: String,
    #[serde(with = "humantime_serde")]
    pub pooler_conn_timeout: Duration,
    pub stream_from: Option<String>,
    pub autofailover: bool,
    pub do_consecutive_primary_switch: bool,
    pub quorum_commit: bool,
    pub use_lwaldump: bool,
    #[serde(with = "humantime_serde")]
    pub zk_connect_max_delay: Duration,
    pub zk_auth: bool,
    pub zk_username: Option<String>,
    pub zk_password: Option<String>,
    pub zk_ssl: bool,
    pub drop_slot_countdown: u32,
    pub max_allowed_switchover_lag_ms: i64,
    pub release_lock_after_acquire_failed: bool,
    #[serde(with = "humantime_serde")]
    pub max_delay_on_zk_reinit: Duration,
    pub is_single_node: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            working_dir: PathBuf::from("."),
            pgdata: PathBuf::from("/var/lib/postgresql/data"),
            local_conn_string: "dbname=postgres user=postgres connect_timeout=1".to_string(),
            append_primary_conn_string: "connect_timeout=1".to_string(),
            iteration_timeout: Duration::from_secs(1),
            zk_hosts: "localhost:2181".to_string(),
            zk_lockpath_prefix: "/pgsentry".to_string(),
            use_replication_slots: false,
            replication_slots_polling: false,
            max_rewind_retries: 3,
            postgres_timeout: Duration::from_secs(60),
            switchover_catchup_timeout: Duration::from_secs(60),
            switchover_replica_turn_timeout: Duration::from_secs(180),
            switchover_rollback_timeout: Duration::from_secs(180),
            election_timeout: Duration::from_secs(5),
            priority: 0,
            update_prio_in_zk: true,
            standalone_pooler: true,
            pooler_port: 6432,
            pooler_addr: "localhost".to_string(),
            pooler_conn_timeout: Duration::from_secs(1),
            stream_from: None,
            autofailover: true,
            do_consecutive_primary_switch: false,
            quorum_commit: false,
            use_lwaldump: false,
            zk_connect_max_delay: Duration::from_secs(60),
            zk_auth: false,
            zk_username: None,
            zk_password: None,
            zk_ssl: false,
            drop_slot_countdown: 300,
            max_allowed_switchover_lag_ms: 60_000,
            release_lock_after_acquire_failed: true,
            max_delay_on_zk_reinit: Duration::from_secs(60),
            is_single_node: false,
        }
    }
}

/// `[primary]` — replication-manager tuning that only applies while this
/// host is the primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryConfig {
    pub change_replication_type: bool,
    /// Comma-separated subset of `count,time,load` (spec §4.4).
    pub change_replication_metric: String,
    pub overload_sessions_ratio: f64,
    pub weekday_change_hours: String,
    pub weekend_change_hours: String,
    pub primary_switch_checks: u32,
    pub sync_replication_in_maintenance: bool,
    #[serde(with = "humantime_serde")]
    pub before_async_unavailability_timeout: Duration,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            change_replication_type: true,
            change_replication_metric: "count,load".to_string(),
            overload_sessions_ratio: 0.75,
            weekday_change_hours: "10-22".to_string(),
            weekend_change_hours: "0-0".to_string(),
            primary_switch_checks: 3,
            sync_replication_in_maintenance: true,
            before_async_unavailability_timeout: Duration::from_secs(15),
        }
    }
}

/// `[replica]` — return-to-cluster and failover-acceptance tuning that
/// only applies while this host is a replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicaConfig {
    #[serde(with = "humantime_serde")]
    pub primary_unavailability_timeout: Duration,
    pub start_pooler: bool,
    pub primary_switch_checks: u32,
    #[serde(with = "humantime_serde")]
    pub min_failover_timeout: Duration,
    pub allow_potential_data_loss: bool,
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
    pub can_delayed: bool,
    pub primary_switch_restart: bool,
    #[serde(with = "humantime_serde")]
    pub close_detached_after: Duration,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            primary_unavailability_timeout: Duration::from_secs(5),
            start_pooler: true,
            primary_switch_checks: 3,
            min_failover_timeout: Duration::from_secs(3600),
            allow_potential_data_loss: false,
            recovery_timeout: Duration::from_secs(60),
            can_delayed: false,
            primary_switch_restart: true,
            close_detached_after: Duration::from_secs(300),
        }
    }
}

/// `[commands]` — shell templates for the Command Runner (spec §4, Command
/// Runner component). `%p`/`%m`/`%w`/`%t`/`%a` placeholders are substituted
/// by `pgsentry-cmd`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub promote: String,
    pub rewind: String,
    pub get_control_parameter: String,
    pub pg_start: String,
    pub pg_stop: String,
    pub pg_status: String,
    pub pg_reload: String,
    pub pooler_start: String,
    pub pooler_stop: String,
    pub pooler_status: String,
    pub list_clusters: String,
    pub generate_recovery_conf: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            promote: "pg_ctl promote -D %p".to_string(),
            rewind: "pg_rewind --target-pgdata=%p --source-server='host=%m connect_timeout=10'"
                .to_string(),
            get_control_parameter: "pg_controldata %p | grep '%a:'".to_string(),
            pg_start: "pg_ctl start -s -D %p".to_string(),
            pg_stop: "pg_ctl stop -s -m fast %w -t %t -D %p".to_string(),
            pg_status: "pg_ctl status -D %p".to_string(),
            pg_reload: "pg_ctl reload -s -D %p".to_string(),
            pooler_start: "service pgbouncer start".to_string(),
            pooler_stop: "service pgbouncer stop".to_string(),
            pooler_status: "service pgbouncer status >/dev/null 2>&1".to_string(),
            list_clusters: "pg_lsclusters --no-header".to_string(),
            generate_recovery_conf: "populate_recovery_conf.py -s -r -p %p %m".to_string(),
        }
    }
}

/// `[plugins]` — settings for optional plugin-style extensions
/// (`upload_wals`, `pgbouncer`), out of scope for the core control loop but
/// carried as configuration surface (spec §1 lists the plugin loader as an
/// external collaborator).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    pub wals_to_upload: u32,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self { wals_to_upload: 20 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_pgconsul_ini_defaults() {
        let config = PgSentryConfig::default();
        assert_eq!(config.global.iteration_timeout, Duration::from_secs(1));
        assert_eq!(config.global.zk_hosts, "localhost:2181");
        assert_eq!(config.global.max_rewind_retries, 3);
        assert_eq!(config.replica.min_failover_timeout, Duration::from_secs(3600));
        assert_eq!(config.primary.change_replication_metric, "count,load");
    }
}
