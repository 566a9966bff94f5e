use std::fmt;
use std::io;

use filepipe::client::ClientError;
use filepipe::frame::FrameError;

pub const SUCCESS: i32 = 0;
/// The worker ran the command and reported an error.
pub const FAILURE: i32 = 1;
pub const CHANNEL_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::NotFound => CHANNEL_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::FrameTooLarge { .. } | FrameError::EmbeddedDelimiter => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed | FrameError::Truncated { .. } => {
            CliError::new(CHANNEL_ERROR, format!("{context}: {err}"))
        }
    }
}

pub fn client_error(context: &str, err: ClientError) -> CliError {
    match err {
        ClientError::InvalidArgument(_) => CliError::new(USAGE, format!("{context}: {err}")),
        ClientError::Spawn { program, source } => io_error(
            &format!("{context}: failed to spawn worker {}", program.display()),
            source,
        ),
        ClientError::Frame(err) => frame_error(context, err),
        ClientError::MalformedResponse(_)
        | ClientError::ProtocolDesync(_)
        | ClientError::Json(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ClientError::Timeout(_) => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ClientError::WriteFailed(_)
        | ClientError::ChannelClosed
        | ClientError::ChannelFailed(_) => {
            CliError::new(CHANNEL_ERROR, format!("{context}: {err}"))
        }
    }
}
