//! Cancellation for background tasks and the process quit signal
//!
//! Background loops in this crate run for the life of the process. A
//! [`ShutdownSignal`] lets an owner stop them early, which tests rely on.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Shutdown signal shared between an owner and its background tasks
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Create a new, untriggered shutdown signal
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Get a listener for shutdown notifications
    pub fn subscribe(&self) -> ShutdownListener {
        ShutdownListener {
            receiver: self.sender.subscribe(),
        }
    }

    /// Trigger shutdown
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    /// Check if shutdown has been triggered
    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a [`ShutdownSignal`]
pub struct ShutdownListener {
    receiver: watch::Receiver<bool>,
}

impl ShutdownListener {
    /// Resolve once shutdown is triggered. Never resolves if every
    /// signal handle is dropped without triggering.
    pub async fn triggered(&mut self) {
        if self.receiver.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Wait for SIGQUIT, the signal sent when liveness is lost.
///
/// Installing this handler replaces the default "terminate and dump core"
/// action, so the caller is responsible for exiting once it resolves.
#[cfg(unix)]
pub async fn quit_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut quit = signal(SignalKind::quit())?;
    quit.recv().await;
    info!("Received SIGQUIT, shutting down...");
    Ok(())
}

/// Non-Unix platforms have no SIGQUIT; fall back to Ctrl+C.
#[cfg(not(unix))]
pub async fn quit_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down...");
    Ok(())
}
