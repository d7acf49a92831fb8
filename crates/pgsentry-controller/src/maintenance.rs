//! Maintenance mode: an operator-set flag that suspends failover/switchover
//! decisions cluster-wide, ported from `main.py::update_maintenance_status`.
//! While in maintenance a host only advertises `maintenance/{host} = enable`
//! and otherwise does nothing.

use pgsentry_dcs::{paths, Dcs, LockRequirement};
use pgsentry_types::HostId;
use tracing::{info, warn};

use crate::error::ControllerResult;

/// Tracks whether this host currently believes the cluster is in
/// maintenance, so transitions can be logged once instead of every tick.
#[derive(Debug, Default)]
pub struct MaintenanceTracker {
    in_maintenance: bool,
}

impl MaintenanceTracker {
    #[must_use]
    pub fn is_in_maintenance(&self) -> bool {
        self.in_maintenance
    }

    /// Re-reads the `maintenance` node and updates local state, logging on
    /// any enter/exit transition. Entering maintenance while this host is
    /// the primary also forces sync replication off unless
    /// `sync_replication_in_maintenance` is set (matches
    /// `_update_replication_on_maintenance_enter`).
    pub async fn refresh(&mut self, dcs: &dyn Dcs) -> ControllerResult<bool> {
        let enabled = dcs.get(paths::MAINTENANCE).await?.as_deref() == Some("enable");
        let transitioned_in = enabled && !self.in_maintenance;
        if transitioned_in {
            info!("entering maintenance mode");
        } else if !enabled && self.in_maintenance {
            info!("leaving maintenance mode");
        }
        self.in_maintenance = enabled;
        Ok(transitioned_in)
    }

    /// Advertises this host's own maintenance state under
    /// `maintenance/{host}`, matching `zk.write(get_host_maintenance_path(), 'enable')`.
    pub async fn advertise(&self, dcs: &dyn Dcs, host: &HostId) -> ControllerResult<()> {
        if let Err(error) = dcs.set(&paths::host_maintenance(host), "enable", LockRequirement::None).await {
            warn!(%error, "could not advertise maintenance state");
        }
        Ok(())
    }
}
