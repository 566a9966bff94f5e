use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur while driving the worker.
///
/// Worker-reported operation failures ("no such file", ...) are not errors at
/// this layer; they arrive as data in [`Response::error`](crate::Response::error).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Caller input rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The worker process could not be started.
    #[error("failed to spawn worker {program}: {source}")]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    /// The command could not be delivered to the worker.
    #[error("failed to write command to worker: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// A frame arrived that does not decode into a response.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A response arrived that matches no pending request.
    #[error("protocol desync: {0}")]
    ProtocolDesync(String),

    /// The worker exited cleanly; no further commands can be issued.
    #[error("channel closed")]
    ChannelClosed,

    /// The worker died or the pipes broke.
    #[error("channel failed: {0}")]
    ChannelFailed(String),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] filepipe_frame::FrameError),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// No response arrived within the configured request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

pub type Result<T> = std::result::Result<T, ClientError>;
