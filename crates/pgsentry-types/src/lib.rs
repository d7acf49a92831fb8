//! Shared domain types for pgsentry.
//!
//! Every other crate in the workspace depends on this one for the vocabulary
//! shared across the DCS client, database adapter, replication manager,
//! election, and controller: host identity, LSNs/timelines, replication
//! topology, and the failover/switchover state machines.

pub mod failover;
pub mod host;
pub mod lsn;
pub mod maintenance;
pub mod replication;
pub mod role;

pub use failover::{ElectionVote, FailoverState, SwitchoverIntent, SwitchoverState};
pub use host::{HostId, Priority};
pub use lsn::{Lsn, Timeline};
pub use maintenance::MaintenanceMode;
pub use replication::{NeededReplicationType, ReplicaInfo, ReplicationVariant, SyncState};
pub use role::{DbLiveness, Role};
