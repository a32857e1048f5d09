//! Coordination client seam
//!
//! Every operation in this crate talks to the coordination service through
//! the [`Coordinator`] trait. [`crate::zookeeper::ZkCoordinator`] binds it to a
//! live ensemble and [`crate::memory::MemoryEnsemble`] provides an in-process
//! namespace for tests.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;

use crate::error::Result;

/// How a node is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateMode {
    /// Survives the creating session.
    Persistent,
    /// Removed by the service when the creating session ends.
    Ephemeral,
    PersistentSequential,
    EphemeralSequential,
}

impl CreateMode {
    pub fn is_ephemeral(self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            CreateMode::PersistentSequential | CreateMode::EphemeralSequential
        )
    }
}

/// Node metadata reported alongside reads.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeStat {
    pub czxid: i64,
    pub mzxid: i64,
    pub version: i32,
    pub cversion: i32,
    /// Owning session id for ephemeral nodes, zero otherwise
    pub ephemeral_owner: i64,
    pub data_length: i32,
    pub num_children: i32,
}

impl NodeStat {
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral_owner != 0
    }
}

/// Session state as reported by the coordination client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    ConnectedReadOnly,
    Disconnected,
    AuthFailed,
    Expired,
    Closed,
}

impl SessionState {
    /// Terminal states never change again; the session is gone.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::AuthFailed | SessionState::Expired | SessionState::Closed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Connected => "Connected",
            SessionState::ConnectedReadOnly => "ConnectedReadOnly",
            SessionState::Disconnected => "Disconnected",
            SessionState::AuthFailed => "AuthFailed",
            SessionState::Expired => "Expired",
            SessionState::Closed => "Closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What caused a watch to fire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchEventKind {
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
    /// Connection or session change; the watch is spent either way.
    Session(SessionState),
}

/// The single event delivered by a [`Watch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: String,
}

impl WatchEvent {
    pub fn new(kind: WatchEventKind, path: &str) -> Self {
        Self {
            kind,
            path: path.to_string(),
        }
    }
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            WatchEventKind::Session(state) => write!(f, "Session({}) {}", state, self.path),
            kind => write!(f, "{:?} {}", kind, self.path),
        }
    }
}

/// One-shot watch: resolves exactly once, then must be re-armed.
pub struct Watch {
    fired: BoxFuture<'static, WatchEvent>,
}

impl Watch {
    pub fn new<F>(fired: F) -> Self
    where
        F: Future<Output = WatchEvent> + Send + 'static,
    {
        Self {
            fired: Box::pin(fired),
        }
    }

    /// Wait for the watch to fire.
    pub async fn fired(self) -> WatchEvent {
        self.fired.await
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch").finish_non_exhaustive()
    }
}

/// Session state changes, ending once a terminal state has been delivered.
pub type SessionEvents = BoxStream<'static, SessionState>;

/// Primitives consumed from the coordination service.
///
/// Implementations are shared behind an `Arc` and must be safe for
/// concurrent use.
#[async_trait]
pub trait Coordinator: Send + Sync + 'static {
    /// Create a node with open ACLs, returning the path actually created
    /// (sequential modes append a counter).
    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String>;

    /// Query existence and arm a watch on the node's next change. The
    /// watch is armed even if the node is absent and fires on creation.
    async fn exists_watch(&self, path: &str) -> Result<(Option<NodeStat>, Watch)>;

    /// List the node's children.
    async fn children(&self, path: &str) -> Result<(Vec<String>, Option<NodeStat>)>;

    /// List the node's children and arm a watch on the next change of
    /// that set.
    async fn children_watch(&self, path: &str)
    -> Result<(Vec<String>, Option<NodeStat>, Watch)>;

    /// Subscribe to session state changes.
    fn session_events(&self) -> SessionEvents;
}
