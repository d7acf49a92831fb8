//! In-memory [`Dcs`] fake, gated behind the `testing` feature. Used by this
//! crate's own tests and by every downstream crate that needs a `Dcs`
//! without a live ZooKeeper ensemble.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pgsentry_types::HostId;

use crate::client::{Dcs, LockRequirement, SessionState};
use crate::error::{DcsError, DcsResult};

#[derive(Default)]
struct State {
    nodes: HashMap<String, String>,
    lock_queues: HashMap<String, VecDeque<HostId>>,
    read_holders: HashMap<String, HashSet<HostId>>,
    session: SessionState,
}

/// An in-memory stand-in for a ZooKeeper ensemble. Single-process only;
/// every clone of a [`std::sync::Arc<MockDcs>`] shares the same state.
#[derive(Default)]
pub struct MockDcs {
    state: Mutex<State>,
}

impl MockDcs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: force the session into a particular lifecycle state,
    /// e.g. to exercise a "session lost" code path without a real
    /// ZooKeeper expiry.
    pub fn set_session_state(&self, state: SessionState) {
        self.state.lock().expect("mock dcs mutex poisoned").session = state;
    }

    fn normalize(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    fn children_of(state: &State, path: &str) -> Vec<String> {
        let prefix = if path.is_empty() { String::new() } else { format!("{path}/") };
        let mut seen = HashSet::new();
        for key in state.nodes.keys().chain(state.lock_queues.keys()) {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if !rest.is_empty() {
                    if let Some(first) = rest.split('/').next() {
                        seen.insert(first.to_string());
                    }
                }
            }
        }
        seen.into_iter().collect()
    }
}

#[async_trait]
impl Dcs for MockDcs {
    async fn get(&self, path: &str) -> DcsResult<Option<String>> {
        let path = Self::normalize(path);
        Ok(self.state.lock().expect("mock dcs mutex poisoned").nodes.get(&path).cloned())
    }

    async fn set(&self, path: &str, value: &str, lock: LockRequirement<'_>) -> DcsResult<()> {
        let path = Self::normalize(path);
        let mut state = self.state.lock().expect("mock dcs mutex poisoned");
        if let LockRequirement::Held { lock: lock_name, contender } = lock {
            let lock_name = Self::normalize(lock_name);
            let holds = state
                .lock_queues
                .get(&lock_name)
                .and_then(VecDeque::front)
                .is_some_and(|h| h == contender);
            if !holds {
                return Err(DcsError::LockNotHeld { path, lock: lock_name });
            }
        }
        state.nodes.insert(path, value.to_string());
        Ok(())
    }

    async fn delete(&self, path: &str, recursive: bool) -> DcsResult<()> {
        let path = Self::normalize(path);
        let mut state = self.state.lock().expect("mock dcs mutex poisoned");
        if recursive {
            let prefix = format!("{path}/");
            state.nodes.retain(|k, _| !(k == &path || k.starts_with(&prefix)));
        } else {
            state.nodes.remove(&path);
        }
        Ok(())
    }

    async fn ensure_path(&self, _path: &str) -> DcsResult<()> {
        // The mock's flat key space needs no intermediate node creation.
        Ok(())
    }

    async fn children(&self, path: &str) -> DcsResult<Vec<String>> {
        let path = Self::normalize(path);
        let state = self.state.lock().expect("mock dcs mutex poisoned");
        Ok(Self::children_of(&state, &path))
    }

    async fn try_acquire_lock(
        &self,
        name: &str,
        contender: &HostId,
        _timeout: Duration,
        allow_queue: bool,
    ) -> DcsResult<bool> {
        let name = Self::normalize(name);
        let mut state = self.state.lock().expect("mock dcs mutex poisoned");
        let queue = state.lock_queues.entry(name).or_default();
        if !queue.contains(contender) {
            if !queue.is_empty() && !allow_queue {
                return Ok(false);
            }
            queue.push_back(contender.clone());
        }
        Ok(queue.front() == Some(contender))
    }

    async fn release_lock(&self, name: &str, contender: &HostId) -> DcsResult<()> {
        let name = Self::normalize(name);
        let mut state = self.state.lock().expect("mock dcs mutex poisoned");
        if let Some(queue) = state.lock_queues.get_mut(&name) {
            queue.retain(|h| h != contender);
        }
        Ok(())
    }

    async fn current_lock_holder(&self, name: &str) -> DcsResult<Option<HostId>> {
        let name = Self::normalize(name);
        let state = self.state.lock().expect("mock dcs mutex poisoned");
        Ok(state.lock_queues.get(&name).and_then(VecDeque::front).cloned())
    }

    async fn lock_contenders(&self, name: &str) -> DcsResult<Vec<HostId>> {
        let name = Self::normalize(name);
        let state = self.state.lock().expect("mock dcs mutex poisoned");
        Ok(state.lock_queues.get(&name).cloned().unwrap_or_default().into())
    }

    async fn acquire_read_lock(&self, name: &str, contender: &HostId) -> DcsResult<()> {
        let name = Self::normalize(name);
        let mut state = self.state.lock().expect("mock dcs mutex poisoned");
        state.read_holders.entry(name).or_default().insert(contender.clone());
        Ok(())
    }

    async fn release_read_lock(&self, name: &str, contender: &HostId) -> DcsResult<()> {
        let name = Self::normalize(name);
        let mut state = self.state.lock().expect("mock dcs mutex poisoned");
        if let Some(holders) = state.read_holders.get_mut(&name) {
            holders.remove(contender);
        }
        Ok(())
    }

    async fn read_lock_holders(&self, name: &str) -> DcsResult<Vec<HostId>> {
        let name = Self::normalize(name);
        let state = self.state.lock().expect("mock dcs mutex poisoned");
        Ok(state.read_holders.get(&name).cloned().unwrap_or_default().into_iter().collect())
    }

    fn session_state(&self) -> SessionState {
        self.state.lock().expect("mock dcs mutex poisoned").session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_contender_queues_behind_first() {
        let dcs = MockDcs::new();
        let a = HostId::new("a");
        let b = HostId::new("b");
        assert!(dcs.try_acquire_lock("leader", &a, Duration::from_secs(1), true).await.unwrap());
        assert!(!dcs.try_acquire_lock("leader", &b, Duration::from_secs(1), true).await.unwrap());
        assert_eq!(dcs.current_lock_holder("leader").await.unwrap(), Some(a.clone()));

        dcs.release_lock("leader", &a).await.unwrap();
        assert_eq!(dcs.current_lock_holder("leader").await.unwrap(), Some(b));
    }

    #[tokio::test]
    async fn set_rejects_writer_without_lock() {
        let dcs = MockDcs::new();
        let a = HostId::new("a");
        let b = HostId::new("b");
        dcs.try_acquire_lock("leader", &a, Duration::from_secs(1), true).await.unwrap();
        let result = dcs
            .set("timeline", "3", LockRequirement::Held { lock: "leader", contender: &b })
            .await;
        assert!(matches!(result, Err(DcsError::LockNotHeld { .. })));
    }

    #[tokio::test]
    async fn ephemeral_children_enumerate_under_prefix() {
        let dcs = MockDcs::new();
        dcs.set("all_hosts/a/ha", "true", LockRequirement::None).await.unwrap();
        dcs.set("all_hosts/b/ha", "true", LockRequirement::None).await.unwrap();
        let mut children = dcs.children("all_hosts").await.unwrap();
        children.sort();
        assert_eq!(children, vec!["a".to_string(), "b".to_string()]);
    }
}
