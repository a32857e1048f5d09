//! In-process coordination namespace
//!
//! `MemoryEnsemble` holds a node tree shared by any number of sessions
//! (`MemoryCoordinator`). It follows the service semantics the rest of the
//! crate depends on: parents must exist, ephemeral nodes die with their
//! session, watches fire once. It also lets tests mutate the tree from the
//! outside and inject failures.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use anyhow::anyhow;
use async_trait::async_trait;
use keeper_common::{ROOT, base_name, parent};
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tracing::debug;

use crate::coordinator::{
    Coordinator, CreateMode, NodeStat, SessionEvents, SessionState, Watch, WatchEvent,
    WatchEventKind,
};
use crate::error::{KeeperError, Result};

/// Operations that can be made to fail on purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Exists,
    Children,
}

struct MemNode {
    data: Vec<u8>,
    ephemeral_owner: i64,
    czxid: i64,
    mzxid: i64,
    version: i32,
    cversion: i32,
    next_sequence: i64,
}

impl MemNode {
    fn new(data: Vec<u8>, ephemeral_owner: i64, zxid: i64) -> Self {
        Self {
            data,
            ephemeral_owner,
            czxid: zxid,
            mzxid: zxid,
            version: 0,
            cversion: 0,
            next_sequence: 0,
        }
    }
}

struct PendingWatch {
    session_id: i64,
    tx: oneshot::Sender<WatchEvent>,
}

#[derive(Default)]
struct Namespace {
    nodes: BTreeMap<String, MemNode>,
    zxid: i64,
    exists_watches: HashMap<String, Vec<PendingWatch>>,
    child_watches: HashMap<String, Vec<PendingWatch>>,
    sessions: HashMap<i64, broadcast::Sender<SessionState>>,
    dead_sessions: HashSet<i64>,
    failures: HashSet<(Operation, String)>,
    create_attempts: Vec<String>,
    created: Vec<String>,
}

impl Namespace {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(ROOT.to_string(), MemNode::new(Vec::new(), 0, 0));
        Self {
            nodes,
            ..Default::default()
        }
    }

    fn stat(&self, path: &str) -> Option<NodeStat> {
        self.nodes.get(path).map(|node| NodeStat {
            czxid: node.czxid,
            mzxid: node.mzxid,
            version: node.version,
            cversion: node.cversion,
            ephemeral_owner: node.ephemeral_owner,
            data_length: node.data.len() as i32,
            num_children: self.child_names(path).len() as i32,
        })
    }

    fn child_names(&self, path: &str) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|candidate| candidate.as_str() != ROOT && parent(candidate) == Some(path))
            .map(|candidate| base_name(candidate).to_string())
            .collect()
    }

    fn check_session(&self, session_id: i64) -> Result<()> {
        if self.dead_sessions.contains(&session_id) {
            return Err(KeeperError::SessionExpired);
        }
        Ok(())
    }

    fn check_failure(&self, op: Operation, path: &str) -> Result<()> {
        if self.failures.contains(&(op, path.to_string())) {
            return Err(KeeperError::Other(anyhow!(
                "injected {:?} failure at {}",
                op,
                path
            )));
        }
        Ok(())
    }

    /// Drop watches whose receiver went away without firing.
    fn prune_watches(&mut self) {
        for watches in [&mut self.exists_watches, &mut self.child_watches] {
            watches.retain(|_, pending| {
                pending.retain(|watch| !watch.tx.is_closed());
                !pending.is_empty()
            });
        }
    }

    fn next_zxid(&mut self) -> i64 {
        self.zxid += 1;
        self.zxid
    }

    fn fire(watches: &mut HashMap<String, Vec<PendingWatch>>, path: &str, kind: WatchEventKind) {
        if let Some(pending) = watches.remove(path) {
            for watch in pending {
                let _ = watch.tx.send(WatchEvent::new(kind, path));
            }
        }
    }

    fn fire_node(&mut self, path: &str, kind: WatchEventKind) {
        Self::fire(&mut self.exists_watches, path, kind);
        if kind == WatchEventKind::NodeDeleted {
            Self::fire(&mut self.child_watches, path, kind);
        }
        if matches!(kind, WatchEventKind::NodeCreated | WatchEventKind::NodeDeleted)
            && let Some(parent_path) = parent(path)
        {
            let parent_path = parent_path.to_string();
            if let Some(parent_node) = self.nodes.get_mut(&parent_path) {
                parent_node.cversion += 1;
            }
            Self::fire(
                &mut self.child_watches,
                &parent_path,
                WatchEventKind::NodeChildrenChanged,
            );
        }
    }

    fn remove_node(&mut self, path: &str) -> Result<()> {
        if !self.nodes.contains_key(path) {
            return Err(KeeperError::NoNode);
        }
        if !self.child_names(path).is_empty() {
            return Err(KeeperError::Other(anyhow!("node {} has children", path)));
        }
        self.nodes.remove(path);
        self.fire_node(path, WatchEventKind::NodeDeleted);
        Ok(())
    }

    fn end_session(&mut self, session_id: i64, state: SessionState) {
        if !self.dead_sessions.insert(session_id) {
            return;
        }

        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == session_id)
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            let _ = self.remove_node(&path);
        }

        for watches in [&mut self.exists_watches, &mut self.child_watches] {
            for (path, pending) in watches.iter_mut() {
                let (ours, others): (Vec<_>, Vec<_>) = pending
                    .drain(..)
                    .partition(|watch| watch.session_id == session_id);
                for watch in ours {
                    let _ = watch
                        .tx
                        .send(WatchEvent::new(WatchEventKind::Session(state), path));
                }
                *pending = others;
            }
            watches.retain(|_, pending| !pending.is_empty());
        }

        if let Some(events) = self.sessions.remove(&session_id) {
            let _ = events.send(state);
        }
    }
}

/// Shared in-memory namespace.
#[derive(Clone)]
pub struct MemoryEnsemble {
    inner: Arc<Mutex<Namespace>>,
    next_session: Arc<AtomicI64>,
}

impl Default for MemoryEnsemble {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEnsemble {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Namespace::new())),
            next_session: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Open a new session against this namespace.
    pub fn connect(&self) -> MemoryCoordinator {
        let session_id = self.next_session.fetch_add(1, Ordering::SeqCst);
        let (events, _) = broadcast::channel(16);
        self.inner.lock().sessions.insert(session_id, events.clone());
        let _ = events.send(SessionState::Connected);
        debug!("memory session {} connected", session_id);
        MemoryCoordinator {
            ensemble: self.clone(),
            session_id,
            events,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.inner.lock().nodes.contains_key(path)
    }

    pub fn data(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.lock().nodes.get(path).map(|node| node.data.clone())
    }

    pub fn stat(&self, path: &str) -> Option<NodeStat> {
        self.inner.lock().stat(path)
    }

    /// Delete a node as another actor would.
    pub fn delete(&self, path: &str) -> Result<()> {
        self.inner.lock().remove_node(path)
    }

    /// Replace a node's data, bumping its version.
    pub fn set_data(&self, path: &str, data: &[u8]) -> Result<()> {
        let mut ns = self.inner.lock();
        let zxid = ns.next_zxid();
        let node = ns.nodes.get_mut(path).ok_or(KeeperError::NoNode)?;
        node.data = data.to_vec();
        node.version += 1;
        node.mzxid = zxid;
        ns.fire_node(path, WatchEventKind::NodeDataChanged);
        Ok(())
    }

    /// Expire a session: its ephemeral nodes are removed and its watches
    /// fire with a session event.
    pub fn expire(&self, session_id: i64) {
        self.inner.lock().end_session(session_id, SessionState::Expired);
    }

    /// Make every future `op` against `path` fail.
    pub fn inject_failure(&self, op: Operation, path: &str) {
        self.inner.lock().failures.insert((op, path.to_string()));
    }

    pub fn clear_failures(&self) {
        self.inner.lock().failures.clear();
    }

    /// Every path a create was attempted on, in order.
    pub fn create_attempts(&self) -> Vec<String> {
        self.inner.lock().create_attempts.clone()
    }

    /// Every path successfully created, in order.
    pub fn created(&self) -> Vec<String> {
        self.inner.lock().created.clone()
    }

    /// Number of armed, unfired exists-watches on `path`.
    pub fn exists_watch_count(&self, path: &str) -> usize {
        self.inner
            .lock()
            .exists_watches
            .get(path)
            .map_or(0, |pending| pending.iter().filter(|w| !w.tx.is_closed()).count())
    }

    /// Number of armed, unfired children-watches on `path`.
    pub fn children_watch_count(&self, path: &str) -> usize {
        self.inner
            .lock()
            .child_watches
            .get(path)
            .map_or(0, |pending| pending.iter().filter(|w| !w.tx.is_closed()).count())
    }
}

/// One session against a [`MemoryEnsemble`].
pub struct MemoryCoordinator {
    ensemble: MemoryEnsemble,
    session_id: i64,
    events: broadcast::Sender<SessionState>,
}

impl MemoryCoordinator {
    pub fn session_id(&self) -> i64 {
        self.session_id
    }

    pub fn ensemble(&self) -> &MemoryEnsemble {
        &self.ensemble
    }

    /// Close the session, removing its ephemeral nodes.
    pub fn close(&self) {
        self.ensemble
            .inner
            .lock()
            .end_session(self.session_id, SessionState::Closed);
    }

    fn arm(
        &self,
        watches: &mut HashMap<String, Vec<PendingWatch>>,
        path: &str,
    ) -> Watch {
        let (tx, rx) = oneshot::channel();
        watches.entry(path.to_string()).or_default().push(PendingWatch {
            session_id: self.session_id,
            tx,
        });
        let path = path.to_string();
        Watch::new(async move {
            rx.await.unwrap_or_else(|_| {
                WatchEvent::new(WatchEventKind::Session(SessionState::Closed), &path)
            })
        })
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String> {
        let mut ns = self.ensemble.inner.lock();
        ns.create_attempts.push(path.to_string());
        ns.check_session(self.session_id)?;
        ns.check_failure(Operation::Create, path)?;

        let parent_path = parent(path)
            .ok_or_else(|| KeeperError::Other(anyhow!("cannot create {}", path)))?
            .to_string();
        let parent_node = ns.nodes.get_mut(&parent_path).ok_or(KeeperError::NoNode)?;
        if parent_node.ephemeral_owner != 0 {
            return Err(KeeperError::Other(anyhow!(
                "ephemeral node {} cannot have children",
                parent_path
            )));
        }

        let created = if mode.is_sequential() {
            let sequence = parent_node.next_sequence;
            parent_node.next_sequence += 1;
            format!("{}{:010}", path, sequence)
        } else {
            path.to_string()
        };
        if ns.nodes.contains_key(&created) {
            return Err(KeeperError::NodeExists);
        }

        let owner = if mode.is_ephemeral() {
            self.session_id
        } else {
            0
        };
        let zxid = ns.next_zxid();
        ns.nodes
            .insert(created.clone(), MemNode::new(data.to_vec(), owner, zxid));
        ns.created.push(created.clone());
        ns.fire_node(&created, WatchEventKind::NodeCreated);
        Ok(created)
    }

    async fn exists_watch(&self, path: &str) -> Result<(Option<NodeStat>, Watch)> {
        let mut ns = self.ensemble.inner.lock();
        ns.check_session(self.session_id)?;
        ns.check_failure(Operation::Exists, path)?;
        ns.prune_watches();
        let stat = ns.stat(path);
        let watch = self.arm(&mut ns.exists_watches, path);
        Ok((stat, watch))
    }

    async fn children(&self, path: &str) -> Result<(Vec<String>, Option<NodeStat>)> {
        let ns = self.ensemble.inner.lock();
        ns.check_session(self.session_id)?;
        ns.check_failure(Operation::Children, path)?;
        let stat = ns.stat(path).ok_or(KeeperError::NoNode)?;
        Ok((ns.child_names(path), Some(stat)))
    }

    async fn children_watch(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, Option<NodeStat>, Watch)> {
        let mut ns = self.ensemble.inner.lock();
        ns.check_session(self.session_id)?;
        ns.check_failure(Operation::Children, path)?;
        let stat = ns.stat(path).ok_or(KeeperError::NoNode)?;
        let children = ns.child_names(path);
        ns.prune_watches();
        let watch = self.arm(&mut ns.child_watches, path);
        Ok((children, Some(stat), watch))
    }

    fn session_events(&self) -> SessionEvents {
        let done = self.ensemble.inner.lock().dead_sessions.contains(&self.session_id);
        if done {
            return Box::pin(futures::stream::empty());
        }
        let rx = self.events.subscribe();
        Box::pin(futures::stream::unfold(Some(rx), |rx| async move {
            let mut rx = rx?;
            loop {
                match rx.recv().await {
                    Ok(state) => {
                        let next = if state.is_terminal() { None } else { Some(rx) };
                        return Some((state, next));
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }
}
