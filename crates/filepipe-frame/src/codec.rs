use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame terminator: a single line feed.
pub const DELIMITER: u8 = b'\n';

/// Default maximum frame size (payload without delimiter): 16 MiB.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// One complete frame received from the wire, delimiter stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// The frame payload.
    pub payload: Bytes,
}

impl RawFrame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (payload + delimiter).
    pub fn wire_size(&self) -> usize {
        self.payload.len() + 1
    }
}

/// Encode a payload into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────────────────────┬──────┐
/// │ Payload (no 0x0A inside)     │ 0x0A │
/// └──────────────────────────────┴──────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.contains(&DELIMITER) {
        return Err(FrameError::EmbeddedDelimiter);
    }
    dst.reserve(payload.len() + 1);
    dst.put_slice(payload);
    dst.put_u8(DELIMITER);
    Ok(())
}

/// Decode a frame from the front of a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes (and its delimiter) from the buffer.
/// A trailing `\r` is stripped and blank lines are skipped.
pub fn decode_frame(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<RawFrame>> {
    let mut next_index = 0;
    decode_frame_from(src, max_frame_size, &mut next_index)
}

/// Like [`decode_frame`], but resumes the delimiter search at `next_index`.
///
/// `next_index` must be zero or a value left by a previous call on the same
/// buffer; bytes before it are known to hold no delimiter. It is reset to
/// zero whenever a frame is split off.
pub(crate) fn decode_frame_from(
    src: &mut BytesMut,
    max_frame_size: usize,
    next_index: &mut usize,
) -> Result<Option<RawFrame>> {
    loop {
        let start = (*next_index).min(src.len());
        let Some(offset) = src[start..].iter().position(|b| *b == DELIMITER) else {
            *next_index = src.len();
            if src.len() > max_frame_size {
                return Err(FrameError::FrameTooLarge {
                    size: src.len(),
                    max: max_frame_size,
                });
            }
            return Ok(None); // Need more data
        };
        let pos = start + offset;
        *next_index = 0;

        if pos > max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: pos,
                max: max_frame_size,
            });
        }

        let mut line = src.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(pos - 1);
        }

        if line.iter().all(u8::is_ascii_whitespace) {
            tracing::trace!("skipping blank line");
            continue;
        }

        return Ok(Some(RawFrame {
            payload: line.freeze(),
        }));
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum frame size in bytes, delimiter excluded. Default: 16 MiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
        }
    }
}

/// Incremental line codec with a carry-over buffer.
///
/// Bytes can arrive in chunks of any size; [`LineCodec::feed`] hands back
/// every frame completed by the chunk and keeps the incomplete tail.
#[derive(Debug, Default)]
pub struct LineCodec {
    buf: BytesMut,
    // Where the next delimiter search starts in the carried-over bytes.
    next_index: usize,
    config: FrameConfig,
}

impl LineCodec {
    /// Create a new codec with default configuration.
    pub fn new() -> Self {
        Self::with_config(FrameConfig::default())
    }

    /// Create a new codec with explicit configuration.
    pub fn with_config(config: FrameConfig) -> Self {
        Self {
            buf: BytesMut::new(),
            next_index: 0,
            config,
        }
    }

    /// Append newly arrived bytes and extract all complete frames.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<RawFrame>> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let max = self.config.max_frame_size;
        while let Some(frame) = decode_frame_from(&mut self.buf, max, &mut self.next_index)? {
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Number of bytes held back as an incomplete frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Signal end of stream.
    ///
    /// Fails with [`FrameError::Truncated`] if a partial frame is still buffered.
    pub fn finish(&mut self) -> Result<()> {
        let leftover = std::mem::take(&mut self.buf);
        self.next_index = 0;
        if leftover.iter().all(u8::is_ascii_whitespace) {
            return Ok(());
        }
        Err(FrameError::Truncated {
            len: leftover.len(),
        })
    }

    /// Current codec configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Decoder for LineCodec {
    type Item = RawFrame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>> {
        decode_frame_from(src, self.config.max_frame_size, &mut self.next_index)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<RawFrame>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        self.next_index = 0;
        if src.iter().all(u8::is_ascii_whitespace) {
            src.clear();
            return Ok(None);
        }
        Err(FrameError::Truncated { len: src.len() })
    }
}

#[cfg(feature = "async")]
impl tokio_util::codec::Encoder<Bytes> for LineCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        if item.len() > self.config.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: item.len(),
                max: self.config.max_frame_size,
            });
        }
        encode_frame(&item, dst)
    }
}
