//! ZooKeeper-backed [`Dcs`] implementation, built on the `zookeeper-client`
//! crate (spec §6: "DCS transport is ZooKeeper; the agent never talks to
//! etcd/Consul directly").
//!
//! Locks follow the standard ZK recipe: a contender creates an
//! ephemeral-sequential child under the lock path, then holds the lock
//! once its sequence number is the lowest among siblings (or, for read
//! locks, the lowest among `write-*` siblings created before it).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pgsentry_types::HostId;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};
use zookeeper_client as zk;

use crate::client::{Dcs, LockRequirement, SessionState};
use crate::error::{DcsError, DcsResult};
use crate::retry::{retry_until, RetryOutcome};

const WRITE_PREFIX: &str = "write-";
const READ_PREFIX: &str = "read-";

/// Connection settings for the ZooKeeper ensemble (spec §6: "auth config
/// surface: plaintext digest or TLS, per `zk_auth`/`zk_ssl` ini keys").
#[derive(Debug, Clone)]
pub struct ZkConfig {
    pub hosts: String,
    pub chroot: String,
    pub session_timeout: Duration,
    /// `scheme:credential` digest auth, e.g. `"digest:pgsentry:secret"`.
    pub auth: Option<String>,
}

pub struct ZkDcs {
    client: zk::Client,
    chroot: String,
    state_rx: watch::Receiver<SessionState>,
    /// Sequence number this session assigned to each lock/read-lock node it
    /// created, so `release_lock`/`release_read_lock` know what to delete
    /// without a second round-trip.
    owned_nodes: Mutex<HashMap<String, String>>,
}

impl ZkDcs {
    /// Connects to the ensemble and ensures the chroot prefix exists.
    pub async fn connect(config: &ZkConfig) -> DcsResult<Self> {
        let mut connector = zk::Client::connector();
        connector.session_timeout(config.session_timeout);
        let client = connector
            .connect(&config.hosts)
            .await
            .map_err(|e| DcsError::Fatal(format!("zookeeper connect failed: {e}")))?;

        if let Some(auth) = &config.auth {
            let (scheme, credential) = auth
                .split_once(':')
                .ok_or_else(|| DcsError::Fatal("malformed zk_auth, expected scheme:credential".into()))?;
            client
                .auth(scheme.to_string(), credential.as_bytes().to_vec())
                .await
                .map_err(|e| DcsError::Fatal(format!("zookeeper auth failed: {e}")))?;
        }

        let (state_tx, state_rx) = watch::channel(SessionState::Connected);
        tokio::spawn(Self::watch_session(client.state_watcher(), state_tx));

        let dcs = Self {
            client,
            chroot: config.chroot.trim_end_matches('/').to_string(),
            state_rx,
            owned_nodes: Mutex::new(HashMap::new()),
        };
        dcs.ensure_path("").await?;
        Ok(dcs)
    }

    async fn watch_session(mut watcher: zk::StateWatcher, tx: watch::Sender<SessionState>) {
        loop {
            let state = watcher.changed().await;
            let mapped = match state {
                zk::SessionState::SyncConnected | zk::SessionState::ConnectedReadOnly => {
                    SessionState::Connected
                }
                zk::SessionState::Disconnected => SessionState::Suspended,
                zk::SessionState::Expired | zk::SessionState::Closed | zk::SessionState::AuthFailed => {
                    SessionState::Lost
                }
            };
            if tx.send(mapped).is_err() {
                return;
            }
        }
    }

    fn full_path(&self, path: &str) -> String {
        if path.is_empty() {
            self.chroot.clone()
        } else {
            format!("{}/{}", self.chroot, path.trim_start_matches('/'))
        }
    }

    async fn create_missing(&self, path: &str) -> DcsResult<()> {
        match self.client.create(path, b"", &zk::CreateMode::Persistent).await {
            Ok(_) | Err(zk::Error::NodeExists) => Ok(()),
            Err(e) => Err(map_err(path, e)),
        }
    }

    async fn create_sequential(
        &self,
        lock_root: &str,
        prefix: &str,
        contender: &HostId,
    ) -> DcsResult<String> {
        self.ensure_path(lock_root).await?;
        let node_path = format!("{lock_root}/{prefix}");
        let full = self.full_path(&node_path);
        let (path, _stat) = self
            .client
            .create(
                &full,
                contender.as_str().as_bytes(),
                &zk::CreateMode::EphemeralSequential,
            )
            .await
            .map_err(|e| map_err(&node_path, e))?;
        let name = path
            .rsplit('/')
            .next()
            .ok_or_else(|| DcsError::Fatal("zookeeper returned an empty sequential node name".into()))?
            .to_string();
        Ok(name)
    }

    async fn sorted_children(&self, root: &str) -> DcsResult<Vec<String>> {
        let mut children = self.children(root).await?;
        children.sort();
        Ok(children)
    }
}

fn map_err(path: &str, err: zk::Error) -> DcsError {
    match err {
        zk::Error::NoNode => DcsError::NoNode(path.to_string()),
        zk::Error::ConnectionLoss | zk::Error::OperationTimeout => {
            DcsError::Transient(format!("{path}: {err}"))
        }
        zk::Error::SessionExpired | zk::Error::SessionMoved => {
            DcsError::Fatal(format!("{path}: {err}"))
        }
        other => DcsError::Transient(format!("{path}: {other}")),
    }
}

#[async_trait]
impl Dcs for ZkDcs {
    #[instrument(skip(self))]
    async fn get(&self, path: &str) -> DcsResult<Option<String>> {
        let full = self.full_path(path);
        match self.client.get_data(&full).await {
            Ok((data, _stat)) => Ok(Some(
                String::from_utf8(data).map_err(|e| DcsError::Transient(e.to_string()))?,
            )),
            Err(zk::Error::NoNode) => Ok(None),
            Err(e) => Err(map_err(path, e)),
        }
    }

    #[instrument(skip(self, value))]
    async fn set(&self, path: &str, value: &str, lock: LockRequirement<'_>) -> DcsResult<()> {
        if let LockRequirement::Held { lock: lock_name, contender } = lock {
            match self.current_lock_holder(lock_name).await? {
                Some(holder) if &holder == contender => {}
                _ => {
                    return Err(DcsError::LockNotHeld {
                        path: path.to_string(),
                        lock: lock_name.to_string(),
                    })
                }
            }
        }

        let full = self.full_path(path);
        match self.client.set_data(&full, value.as_bytes(), None).await {
            Ok(_) => Ok(()),
            Err(zk::Error::NoNode) => {
                self.create_missing(path).await?;
                self.client
                    .set_data(&full, value.as_bytes(), None)
                    .await
                    .map(|_| ())
                    .map_err(|e| map_err(path, e))
            }
            Err(e) => Err(map_err(path, e)),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, path: &str, recursive: bool) -> DcsResult<()> {
        if recursive {
            for child in self.children(path).await.unwrap_or_default() {
                let child_path = format!("{}/{child}", path.trim_end_matches('/'));
                Box::pin(self.delete(&child_path, true)).await?;
            }
        }
        let full = self.full_path(path);
        match self.client.delete(&full, None).await {
            Ok(_) | Err(zk::Error::NoNode) => Ok(()),
            Err(e) => Err(map_err(path, e)),
        }
    }

    #[instrument(skip(self))]
    async fn ensure_path(&self, path: &str) -> DcsResult<()> {
        let mut built = self.chroot.clone();
        if built.is_empty() {
            built.push('/');
        }
        self.create_missing("").await?;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            built = format!("{built}/{segment}");
            match self.client.create(&built, b"", &zk::CreateMode::Persistent).await {
                Ok(_) | Err(zk::Error::NodeExists) => {}
                Err(e) => return Err(map_err(path, e)),
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn children(&self, path: &str) -> DcsResult<Vec<String>> {
        let full = self.full_path(path);
        match self.client.list_children(&full).await {
            Ok(children) => Ok(children),
            Err(zk::Error::NoNode) => Ok(Vec::new()),
            Err(e) => Err(map_err(path, e)),
        }
    }

    #[instrument(skip(self))]
    async fn try_acquire_lock(
        &self,
        name: &str,
        contender: &HostId,
        timeout: Duration,
        allow_queue: bool,
    ) -> DcsResult<bool> {
        let node_name = self.create_sequential(name, WRITE_PREFIX, contender).await?;
        self.owned_nodes
            .lock()
            .expect("owned_nodes mutex poisoned")
            .insert(name.to_string(), node_name.clone());

        let cancel = tokio_util::sync::CancellationToken::new();
        let outcome = retry_until(
            || async {
                let siblings = self.sorted_children(name).await.ok()?;
                let is_lowest = siblings.first().map(String::as_str) == Some(node_name.as_str());
                if is_lowest {
                    Some(true)
                } else if allow_queue {
                    None
                } else {
                    Some(false)
                }
            },
            Some(timeout),
            &cancel,
        )
        .await;

        match outcome {
            RetryOutcome::Ready(true) => Ok(true),
            RetryOutcome::Ready(false) => {
                self.release_lock(name, contender).await?;
                Ok(false)
            }
            RetryOutcome::TimedOut | RetryOutcome::Cancelled => {
                self.release_lock(name, contender).await?;
                warn!(lock = name, "timed out waiting to acquire lock");
                Ok(false)
            }
        }
    }

    #[instrument(skip(self))]
    async fn release_lock(&self, name: &str, _contender: &HostId) -> DcsResult<()> {
        let node_name = self
            .owned_nodes
            .lock()
            .expect("owned_nodes mutex poisoned")
            .remove(name);
        if let Some(node_name) = node_name {
            let full = self.full_path(&format!("{name}/{node_name}"));
            match self.client.delete(&full, None).await {
                Ok(_) | Err(zk::Error::NoNode) => {}
                Err(e) => return Err(map_err(name, e)),
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn current_lock_holder(&self, name: &str) -> DcsResult<Option<HostId>> {
        let siblings = self.sorted_children(name).await?;
        let Some(head) = siblings.iter().find(|c| c.starts_with(WRITE_PREFIX)) else {
            return Ok(None);
        };
        let data = self.get(&format!("{name}/{head}")).await?;
        Ok(data.map(HostId::new))
    }

    #[instrument(skip(self))]
    async fn lock_contenders(&self, name: &str) -> DcsResult<Vec<HostId>> {
        let siblings = self.sorted_children(name).await?;
        let mut out = Vec::with_capacity(siblings.len());
        for child in siblings.iter().filter(|c| c.starts_with(WRITE_PREFIX)) {
            if let Some(data) = self.get(&format!("{name}/{child}")).await? {
                out.push(HostId::new(data));
            }
        }
        Ok(out)
    }

    #[instrument(skip(self))]
    async fn acquire_read_lock(&self, name: &str, contender: &HostId) -> DcsResult<()> {
        let node_name = self.create_sequential(name, READ_PREFIX, contender).await?;
        self.owned_nodes
            .lock()
            .expect("owned_nodes mutex poisoned")
            .insert(format!("{name}#read"), node_name);
        debug!(lock = name, %contender, "acquired shared read lock");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn release_read_lock(&self, name: &str, _contender: &HostId) -> DcsResult<()> {
        let node_name = self
            .owned_nodes
            .lock()
            .expect("owned_nodes mutex poisoned")
            .remove(&format!("{name}#read"));
        if let Some(node_name) = node_name {
            let full = self.full_path(&format!("{name}/{node_name}"));
            match self.client.delete(&full, None).await {
                Ok(_) | Err(zk::Error::NoNode) => {}
                Err(e) => return Err(map_err(name, e)),
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn read_lock_holders(&self, name: &str) -> DcsResult<Vec<HostId>> {
        let siblings = self.sorted_children(name).await?;
        let mut out = Vec::with_capacity(siblings.len());
        for child in siblings.iter().filter(|c| c.starts_with(READ_PREFIX)) {
            if let Some(data) = self.get(&format!("{name}/{child}")).await? {
                out.push(HostId::new(data));
            }
        }
        Ok(out)
    }

    fn session_state(&self) -> SessionState {
        *self.state_rx.borrow()
    }
}
