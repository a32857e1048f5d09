//! Persistent path provisioning

use tracing::{error, info, warn};

use crate::coordinator::{Coordinator, CreateMode};
use crate::error::{KeeperError, Result};

/// Ensure `path` and all of its ancestors exist as persistent nodes.
///
/// Each prefix is created in order with an empty payload and open ACLs.
/// A prefix that already exists is skipped. Any other failure stops the
/// walk and is returned; prefixes created before it are left in place.
pub async fn ensure_path<C>(conn: &C, path: &str) -> Result<()>
where
    C: Coordinator + ?Sized,
{
    for prefix in keeper_common::prefixes(path)? {
        info!("create zookeeper path: \"{}\"", prefix);
        match conn.create(&prefix, b"", CreateMode::Persistent).await {
            Ok(_) => {}
            Err(KeeperError::NodeExists) => {
                warn!("zk.create(\"{}\") exists", prefix);
            }
            Err(e) => {
                error!("zk.create(\"{}\") error({})", prefix, e);
                return Err(e);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryEnsemble, Operation};

    #[tokio::test]
    async fn test_creates_each_prefix_in_order() {
        let ensemble = MemoryEnsemble::new();
        let conn = ensemble.connect();

        ensure_path(&conn, "/a/b/c").await.unwrap();
        assert_eq!(ensemble.created(), vec!["/a", "/a/b", "/a/b/c"]);
        assert!(!ensemble.stat("/a/b/c").unwrap().is_ephemeral());
        assert_eq!(ensemble.data("/a/b/c"), Some(Vec::new()));
    }

    #[tokio::test]
    async fn test_second_call_is_noop() {
        let ensemble = MemoryEnsemble::new();
        let conn = ensemble.connect();

        ensure_path(&conn, "/a/b/c").await.unwrap();
        ensure_path(&conn, "/a/b/c").await.unwrap();

        assert_eq!(ensemble.created().len(), 3);
        assert_eq!(ensemble.create_attempts().len(), 6);
    }

    #[tokio::test]
    async fn test_partial_existing_prefix() {
        let ensemble = MemoryEnsemble::new();
        let conn = ensemble.connect();

        ensure_path(&conn, "/a").await.unwrap();
        ensure_path(&conn, "/a/b").await.unwrap();
        assert_eq!(ensemble.created(), vec!["/a", "/a/b"]);
    }

    #[tokio::test]
    async fn test_aborts_on_other_error() {
        let ensemble = MemoryEnsemble::new();
        let conn = ensemble.connect();
        ensemble.inject_failure(Operation::Create, "/a/b");

        let err = ensure_path(&conn, "/a/b/c/d").await.unwrap_err();
        assert!(matches!(err, KeeperError::Other(_)));

        // No attempt past the failing segment, no rollback before it
        assert_eq!(ensemble.create_attempts(), vec!["/a", "/a/b"]);
        assert!(ensemble.exists("/a"));
        assert!(!ensemble.exists("/a/b/c"));
    }

    #[tokio::test]
    async fn test_collapses_empty_segments() {
        let ensemble = MemoryEnsemble::new();
        let conn = ensemble.connect();

        ensure_path(&conn, "/x//y/").await.unwrap();
        assert_eq!(ensemble.created(), vec!["/x", "/x/y"]);
    }

    #[tokio::test]
    async fn test_root_is_noop() {
        let ensemble = MemoryEnsemble::new();
        let conn = ensemble.connect();

        ensure_path(&conn, "/").await.unwrap();
        assert!(ensemble.create_attempts().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_invalid_path_without_attempts() {
        let ensemble = MemoryEnsemble::new();
        let conn = ensemble.connect();

        let err = ensure_path(&conn, "relative/path").await.unwrap_err();
        assert!(matches!(err, KeeperError::InvalidPath(_)));

        let err = ensure_path(&conn, "/a/../b").await.unwrap_err();
        assert!(matches!(err, KeeperError::InvalidPath(_)));
        assert!(ensemble.create_attempts().is_empty());
    }
}
