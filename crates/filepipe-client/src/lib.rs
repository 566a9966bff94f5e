//! Async driver for a file-management worker process.
//!
//! The worker is spawned with piped stdin/stdout. Commands are written to its
//! stdin as newline-delimited JSON, responses are read back from its stdout
//! and handed to the caller that issued the matching command.
//!
//! ```no_run
//! # async fn run() -> filepipe_client::Result<()> {
//! use filepipe_client::{ClientConfig, FileClient};
//!
//! let client = FileClient::spawn(&ClientConfig::new("filepipe-worker"))?;
//! let listing = client.list("/tmp").await?;
//! if listing.is_ok() {
//!     for entry in &listing.files {
//!         println!("{}", entry.name);
//!     }
//! }
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Layers
//!
//! - [`message`]: commands, requests and responses as they appear on the wire
//! - [`queue`]: FIFO correlation of responses with pending requests
//! - [`channel`]: worker process ownership, read loop and reaping
//! - [`client`]: one async method per command

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod queue;

pub use channel::ProcessChannel;
pub use client::FileClient;
pub use config::{ClientConfig, StderrMode};
pub use error::{ClientError, Result};
pub use message::{
    decode_response, encode_request, Command, CommandKind, EntryKind, FileEntry, Request,
    Response,
};
pub use queue::{ChannelState, CorrelationQueue, ResponseHandle};
