//! Error taxonomy for a transfer.
//!
//! Transient loss and length rejections are *not* errors: the sender absorbs
//! them by retrying the same round.  What surfaces here is what ends a
//! transfer early.

use thiserror::Error;

use crate::frame::FrameError;

/// Invalid transfer parameters, reported before the first round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    ZeroWindow,
    #[error("timeout must be greater than zero")]
    ZeroTimeout,
    #[error("message to send must not be empty")]
    EmptyStream,
}

/// The channel itself failed (as opposed to a round timing out).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed frame: {0}")]
    Frame(#[from] FrameError),
    #[error("peer closed the connection without a verdict")]
    Closed,
    #[error("receiver task failed: {0}")]
    Task(String),
}

/// Everything that can stop [`crate::gbn_sender::GbnSender::run`].
#[derive(Debug, Error)]
pub enum GbnError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("transfer abandoned at round {counter} after {retries} failed attempts")]
    Abandoned { counter: u32, retries: u32 },
}
