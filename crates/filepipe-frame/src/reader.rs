use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_frame_from, FrameConfig, RawFrame};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    next_index: usize,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            next_index: 0,
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached on a
    /// frame boundary and `Err(FrameError::Truncated)` when it cuts a frame.
    pub fn read_frame(&mut self) -> Result<RawFrame> {
        loop {
            let max = self.config.max_frame_size;
            if let Some(frame) = decode_frame_from(&mut self.buf, max, &mut self.next_index)? {
                return Ok(frame);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.buf.iter().all(u8::is_ascii_whitespace) {
                    return Err(FrameError::ConnectionClosed);
                }
                return Err(FrameError::Truncated {
                    len: self.buf.len(),
                });
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}
