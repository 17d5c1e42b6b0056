/// Errors that can occur during wire encoding/decoding.
///
/// Every decode error means the byte stream is malformed beyond recovery;
/// a truncated-but-valid prefix is reported as "need more bytes"
/// (`Ok(None)`), never as an error.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Message id outside the representable range (bit 15 carries the
    /// response flag).
    #[error("message id {0:#06x} out of range (max {max:#06x})", max = crate::head::ID_MAX)]
    IdOutOfRange(u16),

    /// The status body carries an unknown code byte.
    #[error("unknown status code {0:#04x}")]
    UnknownStatusCode(u8),

    /// Command args area exceeds the protocol bound.
    #[error("command args too large ({size} bytes, max {max})")]
    ArgsTooLarge { size: usize, max: usize },

    /// Command body is structurally invalid (empty, unterminated, or
    /// not valid UTF-8).
    #[error("malformed command body: {0}")]
    BadCommand(&'static str),

    /// Stdio sub-frame header has reserved bits set or an oversized length.
    #[error("malformed stdio sub-frame header")]
    BadStdio,

    /// Stdio payload length exceeds the sub-frame bound.
    #[error("stdio payload too large ({size} bytes, max {max})")]
    StdioTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, WireError>;
