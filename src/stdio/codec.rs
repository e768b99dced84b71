//! Newline framing shared by the backend's stdin and stdout.
//!
//! Every protocol message, the handshake included, is one UTF-8 JSON object
//! followed by `\n`. Reads are capped at [`MAX_LINE_BYTES`]: a backend that
//! writes without ever ending the line is cut off instead of growing the
//! adapter's buffer.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Longest stdout line the adapter buffers (1 MiB).
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Frames requests onto stdin and splits stdout into lines.
///
/// Decoded lines have their `\n` (and a trailing `\r`) removed. An
/// over-long line decodes to [`AppError::Protocol`]; after it the framed
/// stream ends. Encoding appends `\n` and never checks the length, since
/// the adapter builds every outbound line itself.
#[derive(Debug)]
pub struct StdioCodec {
    lines: LinesCodec,
}

impl StdioCodec {
    /// Codec capped at [`MAX_LINE_BYTES`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
        }
    }
}

impl Default for StdioCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StdioCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        Ok(self.lines.decode(src)?)
    }

    /// A final line without `\n` is still delivered at EOF.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<String>> {
        Ok(self.lines.decode_eof(src)?)
    }
}

impl Encoder<String> for StdioCodec {
    type Error = AppError;

    fn encode(&mut self, line: String, dst: &mut BytesMut) -> Result<()> {
        Ok(self.lines.encode(line, dst)?)
    }
}

impl From<LinesCodecError> for AppError {
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => Self::Protocol(format!(
                "backend line longer than {MAX_LINE_BYTES} bytes"
            )),
            LinesCodecError::Io(io_err) => io_err.into(),
        }
    }
}
