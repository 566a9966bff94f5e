//! Newline-delimited message framing for pipe-connected worker processes.
//!
//! Every message on the wire is one self-delimited record:
//! - The record payload (a JSON document in practice), never containing `\n`
//! - A single `\n` (0x0A) terminator
//!
//! [`LineCodec`] turns an arbitrarily chunked byte stream back into complete
//! [`RawFrame`]s and keeps any trailing partial record for the next chunk.
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, FrameConfig, LineCodec, RawFrame, DEFAULT_MAX_FRAME, DELIMITER,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
