//! Continuous observation of a registration directory
//!
//! [`MemberWatcher`] keeps a children watch armed on a path and hands a
//! fresh [`MembershipEvent`] to every listener after each change. This is
//! how a process discovers peers that registered themselves through
//! [`crate::liveness::LivenessRegistrar`].

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::coordinator::{Coordinator, Watch};
use crate::error::{KeeperError, Result};
use crate::shutdown::{ShutdownListener, ShutdownSignal};

/// Snapshot delivered to membership listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MembershipEvent {
    pub path: String,
    /// Child names, sorted. Empty when the path has no children or does
    /// not exist.
    pub members: Vec<String>,
    /// Whether the watched path itself exists.
    pub exists: bool,
}

/// Trait for receiving membership changes.
pub trait MembershipListener: Send + Sync + 'static {
    /// Called with the current membership after every observed change.
    fn on_change(&self, event: MembershipEvent);
}

/// A simple listener that invokes a closure.
pub struct FnMembershipListener<F>
where
    F: Fn(MembershipEvent) + Send + Sync + 'static,
{
    f: F,
}

impl<F> FnMembershipListener<F>
where
    F: Fn(MembershipEvent) + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> MembershipListener for FnMembershipListener<F>
where
    F: Fn(MembershipEvent) + Send + Sync + 'static,
{
    fn on_change(&self, event: MembershipEvent) {
        (self.f)(event);
    }
}

/// Watches the children of one path until stopped or the session fails.
pub struct MemberWatcher {
    path: String,
    shutdown: ShutdownSignal,
    task: JoinHandle<Result<()>>,
}

impl MemberWatcher {
    /// Start watching `path`. The first snapshot is delivered as soon as
    /// the initial listing completes.
    pub fn spawn<C>(conn: Arc<C>, path: &str, listeners: Vec<Arc<dyn MembershipListener>>) -> Self
    where
        C: Coordinator + ?Sized,
    {
        let shutdown = ShutdownSignal::new();
        let task = tokio::spawn(observe(
            conn,
            path.to_string(),
            listeners,
            shutdown.subscribe(),
        ));
        Self {
            path: path.to_string(),
            shutdown,
            task,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop watching and wait for the task to end. Returns the error that
    /// ended the watch early, if any.
    pub async fn stop(self) -> Result<()> {
        self.shutdown.shutdown();
        self.task
            .await
            .map_err(|e| KeeperError::Other(anyhow::anyhow!("membership task failed: {}", e)))?
    }
}

async fn snapshot<C>(conn: &C, path: &str) -> Result<(MembershipEvent, Watch)>
where
    C: Coordinator + ?Sized,
{
    loop {
        match conn.children_watch(path).await {
            Ok((mut members, _stat, watch)) => {
                members.sort();
                return Ok((
                    MembershipEvent {
                        path: path.to_string(),
                        members,
                        exists: true,
                    },
                    watch,
                ));
            }
            Err(KeeperError::NoNode) => {
                // A children watch cannot be set on a missing node; wait for it
                // to be created instead.
                let (stat, watch) = conn.exists_watch(path).await?;
                if stat.is_some() {
                    // Created in between: this watch would miss child changes.
                    debug!("{} appeared between listing and exists check", path);
                    continue;
                }
                return Ok((
                    MembershipEvent {
                        path: path.to_string(),
                        members: Vec::new(),
                        exists: false,
                    },
                    watch,
                ));
            }
            Err(e) => return Err(e),
        }
    }
}

async fn observe<C>(
    conn: Arc<C>,
    path: String,
    listeners: Vec<Arc<dyn MembershipListener>>,
    mut shutdown: ShutdownListener,
) -> Result<()>
where
    C: Coordinator + ?Sized,
{
    let mut last: Option<MembershipEvent> = None;
    loop {
        let (event, watch) = match snapshot(conn.as_ref(), &path).await {
            Ok(next) => next,
            Err(e) => {
                error!("watch members of \"{}\" error({})", path, e);
                return Err(e);
            }
        };

        if last.as_ref() != Some(&event) {
            info!(
                "members of \"{}\" changed: {} member(s)",
                path,
                event.members.len()
            );
            for listener in &listeners {
                listener.on_change(event.clone());
            }
            last = Some(event);
        }

        tokio::select! {
            fired = watch.fired() => {
                debug!("members of \"{}\" receive a event {}", path, fired);
            }
            _ = shutdown.triggered() => {
                debug!("member watch on {} stopped", path);
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::*;
    use crate::coordinator::{CreateMode, NodeStat, SessionEvents};
    use crate::memory::{MemoryCoordinator, MemoryEnsemble};

    fn channel_listener() -> (
        Arc<dyn MembershipListener>,
        mpsc::UnboundedReceiver<MembershipEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = FnMembershipListener::new(move |event| {
            let _ = tx.send(event);
        });
        (Arc::new(listener), rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<MembershipEvent>) -> MembershipEvent {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_tracks_members() {
        let ensemble = MemoryEnsemble::new();
        let observer = Arc::new(ensemble.connect());
        let member = ensemble.connect();
        observer
            .create("/svc", b"", CreateMode::Persistent)
            .await
            .unwrap();

        let (listener, mut rx) = channel_listener();
        let watcher = MemberWatcher::spawn(observer, "/svc", vec![listener]);

        let event = next(&mut rx).await;
        assert!(event.exists);
        assert!(event.members.is_empty());

        member
            .create("/svc/2", b"", CreateMode::Ephemeral)
            .await
            .unwrap();
        assert_eq!(next(&mut rx).await.members, vec!["2"]);

        member
            .create("/svc/1", b"", CreateMode::Ephemeral)
            .await
            .unwrap();
        assert_eq!(next(&mut rx).await.members, vec!["1", "2"]);

        member.close();
        assert!(next(&mut rx).await.members.is_empty());

        watcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_waits_for_missing_path() {
        let ensemble = MemoryEnsemble::new();
        let observer = Arc::new(ensemble.connect());

        let (listener, mut rx) = channel_listener();
        let watcher = MemberWatcher::spawn(observer.clone(), "/late", vec![listener]);

        let event = next(&mut rx).await;
        assert!(!event.exists);

        observer
            .create("/late", b"", CreateMode::Persistent)
            .await
            .unwrap();
        let event = next(&mut rx).await;
        assert!(event.exists);
        assert!(event.members.is_empty());

        watcher.stop().await.unwrap();
    }

    /// Creates the watched path right after the first listing reports it
    /// missing, before the exists check runs.
    struct CreatedInBetween {
        inner: MemoryCoordinator,
        creator: MemoryCoordinator,
        raced: AtomicBool,
    }

    #[async_trait]
    impl Coordinator for CreatedInBetween {
        async fn create(&self, path: &str, data: &[u8], mode: CreateMode) -> Result<String> {
            self.inner.create(path, data, mode).await
        }

        async fn exists_watch(&self, path: &str) -> Result<(Option<NodeStat>, Watch)> {
            self.inner.exists_watch(path).await
        }

        async fn children(&self, path: &str) -> Result<(Vec<String>, Option<NodeStat>)> {
            self.inner.children(path).await
        }

        async fn children_watch(
            &self,
            path: &str,
        ) -> Result<(Vec<String>, Option<NodeStat>, Watch)> {
            let listing = self.inner.children_watch(path).await;
            let missing = matches!(listing, Err(KeeperError::NoNode));
            if missing && !self.raced.swap(true, Ordering::SeqCst) {
                self.creator
                    .create(path, b"", CreateMode::Persistent)
                    .await?;
            }
            listing
        }

        fn session_events(&self) -> SessionEvents {
            self.inner.session_events()
        }
    }

    #[tokio::test]
    async fn test_path_created_between_listing_and_exists_check() {
        let ensemble = MemoryEnsemble::new();
        let observer = Arc::new(CreatedInBetween {
            inner: ensemble.connect(),
            creator: ensemble.connect(),
            raced: AtomicBool::new(false),
        });
        let member = ensemble.connect();

        let (listener, mut rx) = channel_listener();
        let watcher = MemberWatcher::spawn(observer, "/svc", vec![listener]);

        let event = next(&mut rx).await;
        assert!(event.exists);
        assert!(event.members.is_empty());

        member
            .create("/svc/1", b"", CreateMode::Ephemeral)
            .await
            .unwrap();
        assert_eq!(next(&mut rx).await.members, vec!["1"]);

        watcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_session_loss_ends_watch() {
        let ensemble = MemoryEnsemble::new();
        let observer = Arc::new(ensemble.connect());
        observer
            .create("/svc", b"", CreateMode::Persistent)
            .await
            .unwrap();

        let (listener, mut rx) = channel_listener();
        let watcher = MemberWatcher::spawn(observer.clone(), "/svc", vec![listener]);
        next(&mut rx).await;

        ensemble.expire(observer.session_id());
        tokio::time::timeout(Duration::from_secs(1), async {
            while !watcher.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let err = watcher.stop().await.unwrap_err();
        assert!(matches!(err, KeeperError::SessionExpired));
    }
}
