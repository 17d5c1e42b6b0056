use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, WireError};

/// Stdio sub-frame header size.
pub const STDIO_HEAD_SIZE: usize = 2;

/// Maximum payload length announced by one stdio sub-frame.
pub const STDIO_LEN_MAX: usize = 0x0FFF;

/// Header of one stdio sub-frame.
///
/// Used only inside an attached RUN_CMD exchange, nested in the same
/// encrypted byte stream. `len` raw stream bytes follow the header.
///
/// Wire format (2 bytes BE):
/// ```text
/// ┌───────┬───────┬───────────┬─────────────┐
/// │ err:1 │ fin:1 │ zero:2    │ len:12      │
/// └───────┴───────┴───────────┴─────────────┘
/// ```
///
/// `len == 0 && is_final` marks end-of-stream for that channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StdioHead {
    /// Number of raw payload bytes following this header.
    pub len: usize,
    /// Payload belongs to stderr rather than stdout (child output) or is
    /// ignored (child input).
    pub is_stderr: bool,
    /// Last sub-frame for this channel.
    pub is_final: bool,
}

impl StdioHead {
    /// End-of-stream marker for a channel.
    pub fn eof(is_stderr: bool) -> Self {
        Self {
            len: 0,
            is_stderr,
            is_final: true,
        }
    }

    /// True when this header closes its channel.
    pub fn is_eof(&self) -> bool {
        self.len == 0 && self.is_final
    }
}

/// Encode a stdio sub-frame header to the back of `dst`.
pub fn encode_stdio(head: &StdioHead, dst: &mut BytesMut) -> Result<()> {
    if head.len > STDIO_LEN_MAX {
        return Err(WireError::StdioTooLarge {
            size: head.len,
            max: STDIO_LEN_MAX,
        });
    }
    let mut word = head.len as u16;
    if head.is_stderr {
        word |= 0x8000;
    }
    if head.is_final {
        word |= 0x4000;
    }
    dst.reserve(STDIO_HEAD_SIZE);
    dst.put_u16(word);
    Ok(())
}

/// Decode a stdio sub-frame header from the front of `src`.
pub fn decode_stdio(src: &mut BytesMut) -> Result<Option<StdioHead>> {
    if src.len() < STDIO_HEAD_SIZE {
        return Ok(None); // Need more data
    }

    let word = u16::from_be_bytes([src[0], src[1]]);
    if word & 0x3000 != 0 {
        return Err(WireError::BadStdio);
    }
    src.advance(STDIO_HEAD_SIZE);

    Ok(Some(StdioHead {
        len: (word & 0x0FFF) as usize,
        is_stderr: word & 0x8000 != 0,
        is_final: word & 0x4000 != 0,
    }))
}
