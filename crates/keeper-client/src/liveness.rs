//! Liveness registration
//!
//! [`LivenessRegistrar::register`] creates an ephemeral node for this
//! process and then keeps a watch armed on it for the rest of the process
//! lifetime. If the node disappears, or the watch cannot be re-armed, the
//! configured [`FatalAction`] runs. The default action, [`QuitProcess`],
//! sends SIGQUIT to the current process.
//!
//! A successful registration therefore does not promise that the process
//! keeps running. It promises that the process stops once its liveness
//! can no longer be proven to the cluster.

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::coordinator::{Coordinator, CreateMode};
use crate::error::{KeeperError, Result};
use crate::shutdown::{ShutdownListener, ShutdownSignal};

/// Why the liveness loop gave up.
#[derive(Debug)]
pub enum BreachCause {
    /// The existence query (and watch re-arm) failed.
    WatchFailed(KeeperError),
    /// The node no longer exists.
    NodeVanished,
}

/// A lost liveness node, handed to the [`FatalAction`].
#[derive(Debug)]
pub struct LivenessBreach {
    pub path: String,
    pub cause: BreachCause,
}

impl fmt::Display for LivenessBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            BreachCause::WatchFailed(e) => {
                write!(f, "zk path: \"{}\" set watch failed, error: {}", self.path, e)
            }
            BreachCause::NodeVanished => write!(f, "zk path: \"{}\" not exist", self.path),
        }
    }
}

/// Action taken when liveness is lost.
pub trait FatalAction: Send + Sync + 'static {
    fn on_fatal(&self, breach: &LivenessBreach);
}

/// Sends SIGQUIT to the current process, giving installed handlers a
/// chance to flush before exit.
#[derive(Clone, Copy, Debug, Default)]
pub struct QuitProcess;

impl FatalAction for QuitProcess {
    #[cfg(unix)]
    fn on_fatal(&self, breach: &LivenessBreach) {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let pid = Pid::this();
        error!("liveness of \"{}\" lost, kill itself", breach.path);
        if let Err(e) = kill(pid, Signal::SIGQUIT) {
            error!("kill({}, SIGQUIT) error({})", pid, e);
        }
    }

    #[cfg(not(unix))]
    fn on_fatal(&self, breach: &LivenessBreach) {
        error!("liveness of \"{}\" lost, exiting", breach.path);
        std::process::exit(1);
    }
}

/// A fatal action that invokes a closure.
pub struct FnFatalAction<F>
where
    F: Fn(&LivenessBreach) + Send + Sync + 'static,
{
    f: F,
}

impl<F> FnFatalAction<F>
where
    F: Fn(&LivenessBreach) + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> FatalAction for FnFatalAction<F>
where
    F: Fn(&LivenessBreach) + Send + Sync + 'static,
{
    fn on_fatal(&self, breach: &LivenessBreach) {
        (self.f)(breach);
    }
}

/// How the liveness loop ended.
#[derive(Debug)]
pub enum LivenessExit {
    /// Liveness was lost and the fatal action ran.
    Breached(LivenessBreach),
    /// The loop was stopped through [`Registration::cancel`].
    Cancelled,
}

/// Handle to a running liveness loop.
///
/// Dropping the handle detaches the loop; it keeps running.
pub struct Registration {
    path: String,
    shutdown: ShutdownSignal,
    task: JoinHandle<LivenessExit>,
}

impl Registration {
    /// The path actually created (includes the sequence suffix for
    /// sequential registrations).
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop watching without running the fatal action.
    pub fn cancel(&self) {
        self.shutdown.shutdown();
    }

    /// Wait for the loop to end.
    pub async fn join(self) -> Result<LivenessExit> {
        self.task
            .await
            .map_err(|e| KeeperError::Other(anyhow::anyhow!("liveness task failed: {}", e)))
    }
}

/// Ties process survival to the existence of an ephemeral node.
pub struct LivenessRegistrar<C: Coordinator + ?Sized> {
    conn: Arc<C>,
    fatal: Arc<dyn FatalAction>,
}

impl<C: Coordinator + ?Sized> LivenessRegistrar<C> {
    /// Create a registrar whose fatal action is [`QuitProcess`].
    pub fn new(conn: Arc<C>) -> Self {
        Self {
            conn,
            fatal: Arc::new(QuitProcess),
        }
    }

    pub fn with_fatal_action(mut self, fatal: Arc<dyn FatalAction>) -> Self {
        self.fatal = fatal;
        self
    }

    /// Create an ephemeral node at `path` holding `data` and start the
    /// liveness loop. Creation failures are returned and no loop starts.
    pub async fn register(&self, path: &str, data: &[u8]) -> Result<Registration> {
        self.register_with_mode(path, data, CreateMode::Ephemeral)
            .await
    }

    /// Like [`register`](Self::register) but with a sequence suffix
    /// appended to the node name by the service.
    pub async fn register_sequential(&self, path: &str, data: &[u8]) -> Result<Registration> {
        self.register_with_mode(path, data, CreateMode::EphemeralSequential)
            .await
    }

    async fn register_with_mode(
        &self,
        path: &str,
        data: &[u8],
        mode: CreateMode,
    ) -> Result<Registration> {
        let path = keeper_common::normalize(path)?;
        debug!("register liveness node: {}", path);
        let created = match self.conn.create(&path, data, mode).await {
            Ok(created) => created,
            Err(e) => {
                error!(
                    "zk.create(\"{}\", \"{}\", {:?}) error({})",
                    path,
                    String::from_utf8_lossy(data),
                    mode,
                    e
                );
                return Err(e);
            }
        };
        info!("create a zookeeper node: {}", created);

        let shutdown = ShutdownSignal::new();
        let task = tokio::spawn(watch_loop(
            self.conn.clone(),
            created.clone(),
            self.fatal.clone(),
            shutdown.subscribe(),
        ));

        Ok(Registration {
            path: created,
            shutdown,
            task,
        })
    }
}

/// Register `path` with the default [`QuitProcess`] action.
pub async fn register_liveness<C>(conn: Arc<C>, path: &str, data: &[u8]) -> Result<Registration>
where
    C: Coordinator + ?Sized,
{
    LivenessRegistrar::new(conn).register(path, data).await
}

async fn watch_loop<C>(
    conn: Arc<C>,
    path: String,
    fatal: Arc<dyn FatalAction>,
    mut shutdown: ShutdownListener,
) -> LivenessExit
where
    C: Coordinator + ?Sized,
{
    loop {
        info!("watch {}", path);
        let cause = match conn.exists_watch(&path).await {
            Err(e) => BreachCause::WatchFailed(e),
            Ok((None, _)) => BreachCause::NodeVanished,
            Ok((Some(_), watch)) => {
                tokio::select! {
                    event = watch.fired() => {
                        info!("zk path: \"{}\" receive a event {}", path, event);
                        continue;
                    }
                    _ = shutdown.triggered() => {
                        debug!("liveness watch on {} cancelled", path);
                        return LivenessExit::Cancelled;
                    }
                }
            }
        };

        let breach = LivenessBreach { path, cause };
        error!("{}", breach);
        fatal.on_fatal(&breach);
        return LivenessExit::Breached(breach);
    }
}
