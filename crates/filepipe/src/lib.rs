//! Drive a file-management worker process over its stdin/stdout.
//!
//! filepipe spawns a worker, writes typed commands (list, remove, make
//! directory, copy, move) to its stdin and hands each newline-delimited
//! response read from its stdout back to the caller that issued the command.
//!
//! # Crate Structure
//!
//! - [`frame`]: newline-delimited framing, sync and async
//! - [`client`]: correlation queue, process channel and command API (behind `client` feature)
//! - [`worker`]: reference worker executing commands on the local filesystem (behind `worker` feature)

/// Re-export frame types.
pub mod frame {
    pub use filepipe_frame::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use filepipe_client::*;
}

#[cfg(feature = "worker")]
pub mod worker;
