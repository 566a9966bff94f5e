use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use filepipe_frame::DEFAULT_MAX_FRAME;

/// Where the worker's stderr goes. It is never mixed into the protocol stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StderrMode {
    /// Share the host's stderr.
    #[default]
    Inherit,
    /// Discard it.
    Null,
}

/// Worker launch and runtime configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Worker executable.
    pub program: PathBuf,
    /// Arguments passed to the worker.
    pub args: Vec<OsString>,
    /// Extra environment variables for the worker, on top of the inherited ones.
    pub envs: Vec<(OsString, OsString)>,
    /// Working directory for the worker. Default: inherit.
    pub current_dir: Option<PathBuf>,
    /// Worker stderr routing.
    pub stderr: StderrMode,
    /// Upper bound on waiting for a single response. Default: none.
    pub request_timeout: Option<Duration>,
    /// How long shutdown waits for the worker to exit before killing it.
    pub shutdown_timeout: Duration,
    /// Maximum frame size accepted from or sent to the worker.
    pub max_frame_size: usize,
}

impl ClientConfig {
    /// Default configuration for the given worker executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
            stderr: StderrMode::default(),
            request_timeout: None,
            shutdown_timeout: Duration::from_secs(5),
            max_frame_size: DEFAULT_MAX_FRAME,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::new("filepipe-worker");
        assert_eq!(config.program, PathBuf::from("filepipe-worker"));
        assert!(config.args.is_empty());
        assert!(config.envs.is_empty());
        assert_eq!(config.stderr, StderrMode::Inherit);
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));
        assert_eq!(config.max_frame_size, DEFAULT_MAX_FRAME);
    }

    #[test]
    fn struct_update_overrides() {
        let config = ClientConfig {
            stderr: StderrMode::Null,
            request_timeout: Some(Duration::from_millis(250)),
            ..ClientConfig::new("/usr/local/bin/worker")
        };
        assert_eq!(config.stderr, StderrMode::Null);
        assert_eq!(config.request_timeout, Some(Duration::from_millis(250)));
    }
}
