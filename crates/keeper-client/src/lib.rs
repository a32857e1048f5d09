//! Keeper Client - ZooKeeper helpers for service processes
//!
//! This crate provides:
//! - Session bootstrap with session-event logging
//! - Idempotent creation of persistent paths and their ancestors
//! - Liveness registration: an ephemeral node whose loss stops the process
//! - Child listing, one-shot or with a watch, and continuous membership
//!   watching
//! - An in-memory ensemble for tests and local development

pub mod children;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod liveness;
pub mod membership;
pub mod memory;
pub mod provision;
pub mod session;
pub mod shutdown;
pub mod zookeeper;

pub use children::{list_children, list_children_watch};
pub use config::KeeperConfig;
pub use coordinator::{
    Coordinator, CreateMode, NodeStat, SessionEvents, SessionState, Watch, WatchEvent,
    WatchEventKind,
};
pub use error::{KeeperError, Result};
pub use liveness::{
    BreachCause, FatalAction, FnFatalAction, LivenessBreach, LivenessExit, LivenessRegistrar,
    QuitProcess, Registration, register_liveness,
};
pub use membership::{FnMembershipListener, MemberWatcher, MembershipEvent, MembershipListener};
pub use memory::{MemoryCoordinator, MemoryEnsemble};
pub use provision::ensure_path;
pub use session::{Session, connect, connect_addrs};
pub use shutdown::{ShutdownSignal, quit_signal};
pub use zookeeper::ZkCoordinator;
