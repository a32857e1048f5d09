//! Session bootstrap and event logging
//!
//! `connect` establishes the session and starts a task that logs every
//! session state change until the stream ends or the session is closed.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::KeeperConfig;
use crate::coordinator::{Coordinator, SessionEvents};
use crate::error::Result;
use crate::shutdown::{ShutdownListener, ShutdownSignal};
use crate::zookeeper::ZkCoordinator;

/// A connected coordinator plus its event-logging task.
pub struct Session<C: Coordinator> {
    coordinator: Arc<C>,
    shutdown: ShutdownSignal,
    logger: JoinHandle<()>,
}

impl<C: Coordinator> Session<C> {
    /// Take ownership of an already connected coordinator and start
    /// logging its session events.
    pub fn start(coordinator: Arc<C>) -> Self {
        let shutdown = ShutdownSignal::new();
        let logger = spawn_event_logger(coordinator.session_events(), shutdown.subscribe());
        Self {
            coordinator,
            shutdown,
            logger,
        }
    }

    /// The shared connection handle passed into every operation.
    pub fn coordinator(&self) -> &Arc<C> {
        &self.coordinator
    }

    /// Whether the event-logging task has stopped.
    pub fn is_logger_finished(&self) -> bool {
        self.logger.is_finished()
    }

    /// Stop the event-logging task. The underlying connection is left to
    /// the caller.
    pub async fn close(self) {
        self.shutdown.shutdown();
        let _ = self.logger.await;
    }
}

/// Connect to the ensemble described by `config`.
pub async fn connect(config: &KeeperConfig) -> Result<Session<ZkCoordinator>> {
    let coordinator = ZkCoordinator::connect(config).await?;
    info!("connected to zookeeper: {}", config.connect_string());
    Ok(Session::start(Arc::new(coordinator)))
}

/// Connect to `addrs` with the given session timeout.
pub async fn connect_addrs(addrs: &[String], timeout: Duration) -> Result<Session<ZkCoordinator>> {
    let config = KeeperConfig::with_servers(addrs.to_vec()).with_session_timeout(timeout);
    connect(&config).await
}

/// Log every session event until the stream ends or shutdown fires.
pub fn spawn_event_logger(
    mut events: SessionEvents,
    mut shutdown: ShutdownListener,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.next() => match event {
                    Some(state) => info!("zookeeper get a event: {}", state),
                    None => {
                        debug!("session event stream ended");
                        break;
                    }
                },
                _ = shutdown.triggered() => {
                    debug!("session event logger stopped");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEnsemble;

    #[tokio::test]
    async fn test_logger_stops_on_close() {
        let ensemble = MemoryEnsemble::new();
        let session = Session::start(Arc::new(ensemble.connect()));
        assert!(!session.is_logger_finished());

        tokio::time::timeout(Duration::from_secs(1), session.close())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_logger_ends_with_session() {
        let ensemble = MemoryEnsemble::new();
        let session = Session::start(Arc::new(ensemble.connect()));
        tokio::task::yield_now().await;

        session.coordinator().close();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !session.is_logger_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
