//! Maintenance-mode freeze (spec §4.7).

use serde::{Deserialize, Serialize};

/// Value of the DCS `maintenance` node. `None` (the node absent) means
/// maintenance mode is off; this enum only models the two values the
/// node can hold when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaintenanceMode {
    Enable,
    Disable,
}
