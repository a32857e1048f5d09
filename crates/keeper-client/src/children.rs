//! Child listing
//!
//! Normalizes the three outcomes callers care about: the node is absent
//! (`NodeNotExist`), present without children (`NoChild`), or present with
//! children.

use tracing::error;

use crate::coordinator::{Coordinator, NodeStat, Watch};
use crate::error::{KeeperError, Result};

/// List the children of `path`.
pub async fn list_children<C>(conn: &C, path: &str) -> Result<Vec<String>>
where
    C: Coordinator + ?Sized,
{
    let (nodes, stat) = match conn.children(path).await {
        Ok(listing) => listing,
        Err(KeeperError::NoNode) => return Err(KeeperError::NodeNotExist),
        Err(e) => {
            error!("zk.Children(\"{}\") error({})", path, e);
            return Err(e);
        }
    };

    normalize(nodes, stat)
}

/// List the children of `path` and arm a watch on the next change of that
/// set. The watch is one-shot; call again to keep observing.
pub async fn list_children_watch<C>(conn: &C, path: &str) -> Result<(Vec<String>, Watch)>
where
    C: Coordinator + ?Sized,
{
    let (nodes, stat, watch) = match conn.children_watch(path).await {
        Ok(listing) => listing,
        Err(KeeperError::NoNode) => return Err(KeeperError::NodeNotExist),
        Err(e) => {
            error!("zk.ChildrenW(\"{}\") error({})", path, e);
            return Err(e);
        }
    };

    Ok((normalize(nodes, stat)?, watch))
}

fn normalize(nodes: Vec<String>, stat: Option<NodeStat>) -> Result<Vec<String>> {
    // Missing metadata is treated like a missing node.
    if stat.is_none() {
        return Err(KeeperError::NodeNotExist);
    }
    if nodes.is_empty() {
        return Err(KeeperError::NoChild);
    }
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::coordinator::{CreateMode, SessionEvents, WatchEvent, WatchEventKind};
    use crate::memory::{MemoryEnsemble, Operation};

    /// Reports children without metadata.
    struct StatlessCoordinator;

    #[async_trait]
    impl Coordinator for StatlessCoordinator {
        async fn create(&self, path: &str, _data: &[u8], _mode: CreateMode) -> Result<String> {
            Ok(path.to_string())
        }

        async fn exists_watch(&self, _path: &str) -> Result<(Option<NodeStat>, Watch)> {
            Err(KeeperError::NoNode)
        }

        async fn children(&self, _path: &str) -> Result<(Vec<String>, Option<NodeStat>)> {
            Ok((vec!["1".to_string()], None))
        }

        async fn children_watch(
            &self,
            path: &str,
        ) -> Result<(Vec<String>, Option<NodeStat>, Watch)> {
            let event = WatchEvent::new(WatchEventKind::NodeChildrenChanged, path);
            Ok((
                vec!["1".to_string()],
                None,
                Watch::new(async move { event }),
            ))
        }

        fn session_events(&self) -> SessionEvents {
            Box::pin(futures::stream::empty())
        }
    }

    #[tokio::test]
    async fn test_missing_node() {
        let ensemble = MemoryEnsemble::new();
        let conn = ensemble.connect();

        let err = list_children(&conn, "/nope").await.unwrap_err();
        assert!(matches!(err, KeeperError::NodeNotExist));

        let err = list_children_watch(&conn, "/nope").await.unwrap_err();
        assert!(matches!(err, KeeperError::NodeNotExist));
    }

    #[tokio::test]
    async fn test_no_children() {
        let ensemble = MemoryEnsemble::new();
        let conn = ensemble.connect();
        conn.create("/svc", b"", CreateMode::Persistent).await.unwrap();

        let err = list_children(&conn, "/svc").await.unwrap_err();
        assert!(matches!(err, KeeperError::NoChild));

        let err = list_children_watch(&conn, "/svc").await.unwrap_err();
        assert!(matches!(err, KeeperError::NoChild));
    }

    #[tokio::test]
    async fn test_lists_children() {
        let ensemble = MemoryEnsemble::new();
        let conn = ensemble.connect();
        conn.create("/svc", b"", CreateMode::Persistent).await.unwrap();
        conn.create("/svc/1", b"", CreateMode::Ephemeral)
            .await
            .unwrap();
        conn.create("/svc/2", b"", CreateMode::Ephemeral)
            .await
            .unwrap();

        let mut nodes = list_children(&conn, "/svc").await.unwrap();
        nodes.sort();
        assert_eq!(nodes, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_watch_fires_on_change() {
        let ensemble = MemoryEnsemble::new();
        let conn = ensemble.connect();
        conn.create("/svc", b"", CreateMode::Persistent).await.unwrap();
        conn.create("/svc/1", b"", CreateMode::Ephemeral)
            .await
            .unwrap();

        let (nodes, watch) = list_children_watch(&conn, "/svc").await.unwrap();
        assert_eq!(nodes, vec!["1"]);

        ensemble.delete("/svc/1").unwrap();
        let event = watch.fired().await;
        assert_eq!(event.kind, WatchEventKind::NodeChildrenChanged);
    }

    #[tokio::test]
    async fn test_missing_stat_maps_to_node_not_exist() {
        let conn = StatlessCoordinator;

        let err = list_children(&conn, "/svc").await.unwrap_err();
        assert!(matches!(err, KeeperError::NodeNotExist));

        let err = list_children_watch(&conn, "/svc").await.unwrap_err();
        assert!(matches!(err, KeeperError::NodeNotExist));
    }

    #[tokio::test]
    async fn test_other_errors_pass_through() {
        let ensemble = MemoryEnsemble::new();
        let conn = ensemble.connect();
        conn.create("/svc", b"", CreateMode::Persistent).await.unwrap();
        ensemble.inject_failure(Operation::Children, "/svc");

        let err = list_children(&conn, "/svc").await.unwrap_err();
        assert!(matches!(err, KeeperError::Other(_)));
    }
}
