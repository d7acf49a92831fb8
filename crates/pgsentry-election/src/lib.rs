//! The failover election protocol: when the primary lock is vacated
//! unexpectedly, exactly one host is chosen to become the new primary by
//! comparing each replica's `(lsn, priority)` vote (spec §4.5).

pub mod election;
pub mod error;
pub mod status;

pub use election::FailoverElection;
pub use error::{ElectionError, ElectionResult};
pub use status::ElectionStatus;
