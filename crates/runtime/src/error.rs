//! Unified error types surfaced by the runtime API.
//!
//! Wraps failures from worker coordination, persistence, and ability dispatch
//! so clients can bubble them up with consistent context.

use thiserror::Error;
use tokio::sync::oneshot;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("processor worker command channel closed")]
    CommandChannelClosed,

    #[error("processor worker reply channel closed")]
    ReplyChannelClosed(#[source] oneshot::error::RecvError),

    #[error("processor worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Engine(#[from] combat_core::EngineError),
}

/// Failures while reading or writing persisted engine state. Loads treat
/// these as "no saved state"; only saves surface them to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed")]
    Io(#[from] std::io::Error),

    #[error("store encoding failed")]
    Encoding(#[from] serde_json::Error),

    #[error("no writable data directory available")]
    NoDataDir,
}
