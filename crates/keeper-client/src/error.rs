//! Client error types for Keeper

use keeper_common::PathError;

/// Error type for coordination operations
#[derive(Debug, thiserror::Error)]
pub enum KeeperError {
    #[error("zk: node not exist")]
    NodeNotExist,

    #[error("zk: children is nil")]
    NoChild,

    #[error("node already exists")]
    NodeExists,

    #[error("node does not exist")]
    NoNode,

    #[error("session expired")]
    SessionExpired,

    #[error("request timeout")]
    Timeout,

    #[error("invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("zookeeper error: {0}")]
    ZooKeeper(zookeeper_client::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl From<zookeeper_client::Error> for KeeperError {
    fn from(err: zookeeper_client::Error) -> Self {
        match err {
            zookeeper_client::Error::NodeExists => KeeperError::NodeExists,
            zookeeper_client::Error::NoNode => KeeperError::NoNode,
            zookeeper_client::Error::SessionExpired => KeeperError::SessionExpired,
            other => KeeperError::ZooKeeper(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, KeeperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(KeeperError::NodeNotExist.to_string(), "zk: node not exist");
        assert_eq!(KeeperError::NoChild.to_string(), "zk: children is nil");
        assert_eq!(KeeperError::Timeout.to_string(), "request timeout");

        let err = KeeperError::from(PathError::Empty);
        assert_eq!(err.to_string(), "invalid path: path is empty");
    }

    #[test]
    fn test_from_zookeeper_sentinels() {
        let err: KeeperError = zookeeper_client::Error::NodeExists.into();
        assert!(matches!(err, KeeperError::NodeExists));

        let err: KeeperError = zookeeper_client::Error::NoNode.into();
        assert!(matches!(err, KeeperError::NoNode));

        let err: KeeperError = zookeeper_client::Error::SessionExpired.into();
        assert!(matches!(err, KeeperError::SessionExpired));

        let err: KeeperError = zookeeper_client::Error::NoAuth.into();
        assert!(matches!(err, KeeperError::ZooKeeper(_)));
    }
}
