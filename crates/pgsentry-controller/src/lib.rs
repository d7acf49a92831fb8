//! The per-host control loop that ties the DCS client, database adapter,
//! replication manager, and failover election together (spec §4.1-§4.3,
//! §4.9). One [`Controller`] runs for the lifetime of a `pgsentryd`
//! process.

pub mod controller;
pub mod error;
pub mod maintenance;
pub mod sdnotify;
pub mod slots;

pub use controller::Controller;
pub use error::{ControllerError, ControllerResult};
