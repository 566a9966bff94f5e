use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use filepipe::client::{ClientConfig, Command as FileCommand, StderrMode};

use crate::exit::{CliError, CliResult, USAGE};
use crate::logging::{LogLevel, WORKER_LOG_ENV};
use crate::output::OutputFormat;

pub mod ops;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the entries of a directory.
    Ls(PathArgs),
    /// Remove a file or a directory with its contents.
    Rm(PathArgs),
    /// Create a directory (one level).
    Mkdir(PathArgs),
    /// Copy SRC into the directory DST.
    Cp(TransferArgs),
    /// Rename SRC to DST.
    Mv(TransferArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// What a parsed subcommand asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum Invocation {
    /// A request for the worker.
    File(FileCommand),
    /// Print version information locally.
    Version(VersionArgs),
}

impl From<Command> for Invocation {
    fn from(command: Command) -> Self {
        let file_command = match command {
            Command::Ls(args) => FileCommand::List { path: args.path },
            Command::Rm(args) => FileCommand::Remove { path: args.path },
            Command::Mkdir(args) => FileCommand::MakeDirectory { path: args.path },
            Command::Cp(args) => FileCommand::Copy {
                source: args.source,
                destination: args.destination,
            },
            Command::Mv(args) => FileCommand::Move {
                source: args.source,
                destination: args.destination,
            },
            Command::Version(args) => return Invocation::Version(args),
        };
        Invocation::File(file_command)
    }
}

pub fn run(
    command: Command,
    worker: &WorkerArgs,
    log_level: LogLevel,
    format: OutputFormat,
) -> CliResult<i32> {
    match Invocation::from(command) {
        Invocation::Version(args) => version::run(args),
        Invocation::File(file_command) => {
            let inherited_log = std::env::var_os(WORKER_LOG_ENV).is_some();
            let config = worker.client_config((!inherited_log).then_some(log_level))?;
            ops::run(file_command, &config, format)
        }
    }
}

/// How to launch the worker. Shared by every file subcommand.
#[derive(Args, Debug)]
pub struct WorkerArgs {
    /// Worker executable.
    #[arg(
        long,
        value_name = "PATH",
        env = "FILEPIPE_WORKER",
        default_value = "filepipe-worker",
        global = true
    )]
    pub worker: PathBuf,

    /// Extra argument for the worker (repeatable).
    #[arg(
        long = "worker-arg",
        value_name = "ARG",
        allow_hyphen_values = true,
        global = true
    )]
    pub worker_args: Vec<String>,

    /// Maximum time to wait for the response (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION", global = true)]
    pub timeout: Option<String>,

    /// Discard the worker's stderr.
    #[arg(long, global = true)]
    pub quiet_worker: bool,
}

impl WorkerArgs {
    /// Build the client configuration. `log_level`, when given, is handed to
    /// the worker through its log environment variable.
    pub fn client_config(&self, log_level: Option<LogLevel>) -> CliResult<ClientConfig> {
        let request_timeout = self.timeout.as_deref().map(parse_duration).transpose()?;
        let envs = log_level
            .map(|level| {
                (
                    OsString::from(WORKER_LOG_ENV),
                    OsString::from(level.as_directive()),
                )
            })
            .into_iter()
            .collect();
        Ok(ClientConfig {
            args: self.worker_args.iter().map(OsString::from).collect(),
            envs,
            stderr: if self.quiet_worker {
                StderrMode::Null
            } else {
                StderrMode::Inherit
            },
            request_timeout,
            ..ClientConfig::new(&self.worker)
        })
    }
}

#[derive(Args, Debug)]
pub struct PathArgs {
    /// Absolute path on the worker's filesystem.
    pub path: String,
}

#[derive(Args, Debug)]
pub struct TransferArgs {
    /// Source path.
    pub source: String,
    /// Destination path.
    pub destination: String,
}

#[derive(Args, Debug, PartialEq, Eq)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
