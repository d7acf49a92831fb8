//! DCS error taxonomy (spec §7).

use thiserror::Error;

/// Errors surfaced by the DCS client.
///
/// `Transient` and `Fatal` correspond to spec §7's `DcsTransient` /
/// `DcsFatal` categories: transient errors (RPC timeout, session
/// suspended) leave the last-known state in place and the caller decides
/// whether to act on a partial snapshot; fatal errors (session lost) mean
/// every ephemeral lock this session held has been released.
#[derive(Debug, Error)]
pub enum DcsError {
    #[error("DCS request timed out or the session is suspended: {0}")]
    Transient(String),

    #[error("DCS session lost: {0}")]
    Fatal(String),

    #[error("path does not exist: {0}")]
    NoNode(String),

    #[error("serialization error for {path}: {source}")]
    Serde {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("write to {path} rejected: caller does not hold required lock {lock}")]
    LockNotHeld { path: String, lock: String },
}

impl DcsError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, DcsError::Transient(_))
    }

    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, DcsError::Fatal(_))
    }
}

pub type DcsResult<T> = Result<T, DcsError>;
