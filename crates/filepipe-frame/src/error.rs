/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A frame (or the unterminated tail of one) exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The payload to encode contains the frame delimiter.
    #[error("payload contains an unescaped frame delimiter")]
    EmbeddedDelimiter,

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended cleanly on a frame boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream ended in the middle of a frame.
    #[error("connection closed with {len} bytes of incomplete frame")]
    Truncated { len: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
