//! Decides whether the primary should run sync or async replication this
//! tick, ported from `replication_manager.py::_get_needed_replication_type`.

use std::collections::HashSet;

use pgsentry_config::PrimaryConfig;
use pgsentry_types::{HostId, NeededReplicationType, ReplicaInfo};

/// Snapshot of the inputs `_get_needed_replication_type` reads every tick:
/// who is streaming right now, who the HA membership considers a replica,
/// and (for the `load` metric) the primary's current session pressure.
pub struct DecisionInputs<'a> {
    pub replics_info: &'a [ReplicaInfo],
    pub ha_replicas: &'a [HostId],
    pub sessions_ratio: Option<f64>,
}

/// `change_replication_metric` is a comma-joined list (`"count,load"`);
/// each named check can veto sync and fall through to async.
#[must_use]
pub fn needed_replication_type(config: &PrimaryConfig, inputs: &DecisionInputs<'_>) -> NeededReplicationType {
    let metric = config.change_replication_metric.as_str();

    let streaming: HashSet<&str> = inputs
        .replics_info
        .iter()
        .filter(|r| r.is_streaming())
        .map(|r| r.application_name.as_str())
        .collect();
    let ha_app_names: HashSet<String> = inputs.ha_replicas.iter().map(HostId::app_name).collect();
    let replics_number = streaming.iter().filter(|name| ha_app_names.contains(**name)).count();

    if metric.contains("count") && replics_number == 0 {
        return NeededReplicationType::Async;
    }

    if metric.contains("time") && !within_sync_hours(config) {
        return NeededReplicationType::Sync;
    }

    if metric.contains("load") {
        let ratio = inputs.sessions_ratio.unwrap_or(0.0);
        if ratio >= config.overload_sessions_ratio {
            return NeededReplicationType::Async;
        }
    }

    NeededReplicationType::Sync
}

fn within_sync_hours(config: &PrimaryConfig) -> bool {
    use chrono::{Datelike, Timelike};
    let now = chrono::Local::now();
    let is_weekend = matches!(now.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun);
    let range = if is_weekend { &config.weekend_change_hours } else { &config.weekday_change_hours };
    let Some((start, stop)) = parse_hour_range(range) else {
        return true;
    };
    let hour = now.hour();
    start <= hour && hour <= stop
}

fn parse_hour_range(range: &str) -> Option<(u32, u32)> {
    let (start, stop) = range.split_once('-')?;
    Some((start.trim().parse().ok()?, stop.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgsentry_types::SyncState;

    fn replica(app_name: &str, streaming: bool) -> ReplicaInfo {
        ReplicaInfo {
            application_name: app_name.to_string(),
            state: if streaming { "streaming".into() } else { "startup".into() },
            sync_state: SyncState::Async,
            reply_time_ms: 0,
            write_lsn: None,
            flush_lsn: None,
            replay_lsn: None,
        }
    }

    #[test]
    fn count_metric_forces_async_with_no_streaming_replicas() {
        let mut config = PrimaryConfig::default();
        config.change_replication_metric = "count".into();
        let ha = vec![HostId::new("db-replica-1")];
        let inputs = DecisionInputs { replics_info: &[], ha_replicas: &ha, sessions_ratio: None };
        assert_eq!(needed_replication_type(&config, &inputs), NeededReplicationType::Async);
    }

    #[test]
    fn count_metric_allows_sync_with_a_streaming_ha_replica() {
        let mut config = PrimaryConfig::default();
        config.change_replication_metric = "count".into();
        let ha = vec![HostId::new("db-replica-1")];
        let replics = vec![replica(&ha[0].app_name(), true)];
        let inputs = DecisionInputs { replics_info: &replics, ha_replicas: &ha, sessions_ratio: None };
        assert_eq!(needed_replication_type(&config, &inputs), NeededReplicationType::Sync);
    }

    #[test]
    fn load_metric_forces_async_when_overloaded() {
        let mut config = PrimaryConfig::default();
        config.change_replication_metric = "load".into();
        config.overload_sessions_ratio = 0.5;
        let ha = vec![HostId::new("db-replica-1")];
        let replics = vec![replica(&ha[0].app_name(), true)];
        let inputs = DecisionInputs { replics_info: &replics, ha_replicas: &ha, sessions_ratio: Some(0.9) };
        assert_eq!(needed_replication_type(&config, &inputs), NeededReplicationType::Async);
    }
}
