//! The `Dcs` trait: everything the Controller, Replication Manager, and
//! Election components need from the coordination service, abstracted away
//! from any particular backend (spec §6, "DCS (ZooKeeper-shaped)").

use std::time::Duration;

use async_trait::async_trait;
use pgsentry_types::HostId;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DcsError, DcsResult};

/// Session lifecycle state, delivered to callbacks registered with
/// [`Dcs::on_session_state`] (spec §6: "Session lifecycle callbacks:
/// suspended, lost, connected").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Connected,
    Suspended,
    Lost,
}

/// Whether a write must be made by the current holder of a named lock
/// (spec §5: "Primary-side writes outside locks are rejected by the DCS
/// wrapper unless `need_lock=False` is set explicitly").
#[derive(Debug, Clone)]
pub enum LockRequirement<'a> {
    /// The write is rejected unless `contender` currently holds `lock`.
    Held { lock: &'a str, contender: &'a HostId },
    /// No lock check; the write proceeds unconditionally.
    None,
}

/// Typed wrapper over a ZooKeeper-shaped distributed coordination service.
///
/// Implementations: [`crate::zk::ZkDcs`] (real ZooKeeper ensemble, via the
/// `zookeeper-client` crate) and, behind the `testing` feature,
/// [`crate::testing::MockDcs`] (in-memory fake for unit and property
/// tests).
///
/// Kept free of generic methods so it stays object-safe (`Arc<dyn Dcs>` is
/// what the Controller, Replication Manager, and Election components hold).
/// JSON convenience wrappers live on [`DcsJsonExt`] instead.
#[async_trait]
pub trait Dcs: Send + Sync {
    /// Reads a text node. Returns `Ok(None)` if the path does not exist.
    async fn get(&self, path: &str) -> DcsResult<Option<String>>;

    /// Writes a text node, creating it if absent.
    async fn set(&self, path: &str, value: &str, lock: LockRequirement<'_>) -> DcsResult<()>;

    /// Deletes a node. `recursive` also deletes all descendants.
    async fn delete(&self, path: &str, recursive: bool) -> DcsResult<()>;

    /// Creates every path component that does not already exist, without
    /// changing the value of any node that does.
    async fn ensure_path(&self, path: &str) -> DcsResult<()>;

    /// Lists the immediate children of `path`.
    async fn children(&self, path: &str) -> DcsResult<Vec<String>>;

    /// Attempts to acquire the sequential-ephemeral exclusive lock at
    /// `name` on behalf of `contender`, waiting up to `timeout`.
    /// `allow_queue` lets the caller enqueue behind other contenders
    /// instead of failing immediately when the lock is held (spec §4.5,
    /// `enter_election` / `sync_replica` contention).
    async fn try_acquire_lock(
        &self,
        name: &str,
        contender: &HostId,
        timeout: Duration,
        allow_queue: bool,
    ) -> DcsResult<bool>;

    /// Releases a lock this session holds. A no-op if not held.
    async fn release_lock(&self, name: &str, contender: &HostId) -> DcsResult<()>;

    /// Returns the current holder of an exclusive lock, if any.
    async fn current_lock_holder(&self, name: &str) -> DcsResult<Option<HostId>>;

    /// Returns every contender currently queued on a lock, in acquisition
    /// order (the head is the current or next holder).
    async fn lock_contenders(&self, name: &str) -> DcsResult<Vec<HostId>>;

    /// Acquires a shared read-lock at `name` on behalf of `contender`
    /// (spec §4.8, `replication_sources/{upstream}`).
    async fn acquire_read_lock(&self, name: &str, contender: &HostId) -> DcsResult<()>;

    /// Releases a read-lock held by `contender`.
    async fn release_read_lock(&self, name: &str, contender: &HostId) -> DcsResult<()>;

    /// Returns every contender currently holding a shared read-lock.
    async fn read_lock_holders(&self, name: &str) -> DcsResult<Vec<HostId>>;

    /// Current session state.
    fn session_state(&self) -> SessionState;
}

/// JSON convenience methods layered over [`Dcs`]. A blanket impl, so every
/// `Dcs` implementation gets `get_json`/`set_json` for free; kept off the
/// base trait because generic methods would make `Dcs` non-object-safe.
#[async_trait]
pub trait DcsJsonExt: Dcs {
    /// Reads and deserializes a JSON node.
    async fn get_json<T: DeserializeOwned + Send>(&self, path: &str) -> DcsResult<Option<T>> {
        match self.get(path).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|source| DcsError::Serde { path: path.to_string(), source }),
            None => Ok(None),
        }
    }

    /// Serializes and writes a JSON node.
    async fn set_json<T: Serialize + Sync>(
        &self,
        path: &str,
        value: &T,
        lock: LockRequirement<'_>,
    ) -> DcsResult<()> {
        let raw = serde_json::to_string(value)
            .map_err(|source| DcsError::Serde { path: path.to_string(), source })?;
        self.set(path, &raw, lock).await
    }
}

impl<T: Dcs + ?Sized> DcsJsonExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_requirement_held_carries_contender_and_lock_name() {
        let host = HostId::new("a");
        let req = LockRequirement::Held { lock: "leader", contender: &host };
        match req {
            LockRequirement::Held { lock, contender } => {
                assert_eq!(lock, "leader");
                assert_eq!(contender, &host);
            }
            LockRequirement::None => panic!("expected Held"),
        }
    }
}
