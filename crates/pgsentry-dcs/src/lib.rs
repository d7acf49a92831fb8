//! Typed client for the ZooKeeper-shaped distributed coordination service
//! that anchors leader election, switchover, and replication-manager state
//! across a PostgreSQL cluster.
//!
//! The [`Dcs`] trait is the seam: [`zk::ZkDcs`] talks to a real ensemble,
//! [`testing::MockDcs`] (behind the `testing` feature) is an in-memory
//! stand-in for unit and property tests. [`paths`] holds every node path
//! this project reads or writes, so a renamed node shows up as one diff.

pub mod client;
pub mod error;
pub mod paths;
pub mod retry;
pub mod zk;

#[cfg(feature = "testing")]
pub mod testing;

pub use client::{Dcs, DcsJsonExt, LockRequirement, SessionState};
pub use error::{DcsError, DcsResult};
pub use retry::{retry_until, RetryOutcome};
pub use zk::{ZkConfig, ZkDcs};

#[cfg(feature = "testing")]
pub use testing::MockDcs;
