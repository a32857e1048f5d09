//! ZooKeeper binding for the [`Coordinator`] seam
//!
//! Wraps a `zookeeper_client::Client`. Sentinel errors are mapped by
//! `KeeperError::from`; everything else passes through unchanged.

use async_trait::async_trait;
use futures::stream;
use tracing::error;
use zookeeper_client as zk;

use crate::config::KeeperConfig;
use crate::coordinator::{
    Coordinator, CreateMode, NodeStat, SessionEvents, SessionState, Watch, WatchEvent,
    WatchEventKind,
};
use crate::error::{KeeperError, Result};

/// Coordinator backed by a live ZooKeeper session.
#[derive(Clone)]
pub struct ZkCoordinator {
    client: zk::Client,
}

impl ZkCoordinator {
    /// Establish a session with the ensemble described by `config`.
    pub async fn connect(config: &KeeperConfig) -> Result<Self> {
        let cluster = config.connect_string();
        let connecting = async {
            zk::Client::connector()
                .session_timeout(config.session_timeout())
                .connect(&cluster)
                .await
        };

        let client = match tokio::time::timeout(config.connect_timeout(), connecting).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                error!(
                    "zk connect(\"{}\", {:?}) error({})",
                    cluster,
                    config.session_timeout(),
                    e
                );
                return Err(e.into());
            }
            Err(_) => {
                error!(
                    "zk connect(\"{}\") timed out after {:?}",
                    cluster,
                    config.connect_timeout()
                );
                return Err(KeeperError::Timeout);
            }
        };

        Ok(Self { client })
    }

    /// Wrap an already connected client.
    pub fn from_client(client: zk::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &zk::Client {
        &self.client
    }
}

#[async_trait]
impl Coordinator for ZkCoordinator {
    async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String> {
        let options = to_zk_mode(mode).with_acls(zk::Acls::anyone_all());
        let (_stat, sequence) = self.client.create(path, data, &options).await?;
        if mode.is_sequential() {
            Ok(format!("{}{}", path, sequence))
        } else {
            Ok(path.to_string())
        }
    }

    async fn exists_watch(&self, path: &str) -> Result<(Option<NodeStat>, Watch)> {
        let (stat, watcher) = self.client.check_and_watch_stat(path).await?;
        Ok((stat.as_ref().map(to_node_stat), oneshot_watch(watcher)))
    }

    async fn children(&self, path: &str) -> Result<(Vec<String>, Option<NodeStat>)> {
        let (children, stat) = self.client.get_children(path).await?;
        Ok((children, Some(to_node_stat(&stat))))
    }

    async fn children_watch(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, Option<NodeStat>, Watch)> {
        let (children, stat, watcher) = self.client.get_and_watch_children(path).await?;
        Ok((
            children,
            Some(to_node_stat(&stat)),
            oneshot_watch(watcher),
        ))
    }

    fn session_events(&self) -> SessionEvents {
        let watcher = self.client.state_watcher();
        Box::pin(stream::unfold(Some(watcher), |watcher| async move {
            let mut watcher = watcher?;
            let state = to_session_state(watcher.changed().await);
            let next = if state.is_terminal() {
                None
            } else {
                Some(watcher)
            };
            Some((state, next))
        }))
    }
}

fn to_zk_mode(mode: CreateMode) -> zk::CreateMode {
    match mode {
        CreateMode::Persistent => zk::CreateMode::Persistent,
        CreateMode::Ephemeral => zk::CreateMode::Ephemeral,
        CreateMode::PersistentSequential => zk::CreateMode::PersistentSequential,
        CreateMode::EphemeralSequential => zk::CreateMode::EphemeralSequential,
    }
}

fn to_node_stat(stat: &zk::Stat) -> NodeStat {
    NodeStat {
        czxid: stat.czxid,
        mzxid: stat.mzxid,
        version: stat.version,
        cversion: stat.cversion,
        ephemeral_owner: stat.ephemeral_owner,
        data_length: stat.data_length,
        num_children: stat.num_children,
    }
}

fn to_session_state(state: zk::SessionState) -> SessionState {
    match state {
        zk::SessionState::SyncConnected => SessionState::Connected,
        zk::SessionState::ConnectedReadOnly => SessionState::ConnectedReadOnly,
        zk::SessionState::Disconnected => SessionState::Disconnected,
        zk::SessionState::AuthFailed => SessionState::AuthFailed,
        zk::SessionState::Expired => SessionState::Expired,
        zk::SessionState::Closed => SessionState::Closed,
        #[allow(unreachable_patterns)]
        _ => SessionState::Disconnected,
    }
}

fn to_watch_event(event: zk::WatchedEvent) -> WatchEvent {
    let kind = match event.event_type {
        zk::EventType::NodeCreated => WatchEventKind::NodeCreated,
        zk::EventType::NodeDeleted => WatchEventKind::NodeDeleted,
        zk::EventType::NodeDataChanged => WatchEventKind::NodeDataChanged,
        zk::EventType::NodeChildrenChanged => WatchEventKind::NodeChildrenChanged,
        _ => WatchEventKind::Session(to_session_state(event.session_state)),
    };
    WatchEvent {
        kind,
        path: event.path,
    }
}

fn oneshot_watch(watcher: zk::OneshotWatcher) -> Watch {
    Watch::new(async move { to_watch_event(watcher.changed().await) })
}
