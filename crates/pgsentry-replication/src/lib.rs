//! The two replication manager variants a pgsentry cluster can be
//! configured with: [`single_sync::SingleSync`] (one synchronous replica)
//! and [`quorum::Quorum`] (`ANY n(...)` quorum commit). Both implement
//! [`manager::ReplicationManager`]; the Controller holds a
//! `Box<dyn ReplicationManager>` chosen once at startup and never branches
//! on which variant it is.

pub mod decision;
pub mod error;
pub mod manager;
pub mod quorum;
pub mod single_sync;

pub use decision::{needed_replication_type, DecisionInputs};
pub use error::{ReplicationError, ReplicationResult};
pub use manager::ReplicationManager;
pub use quorum::Quorum;
pub use single_sync::SingleSync;
