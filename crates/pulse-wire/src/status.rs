use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, WireError};

/// Status body: code (1) + err (4) = 5 bytes.
pub const STATUS_SIZE: usize = 5;

/// Outcome class of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// Request carried out.
    Ok,
    /// Operation not implemented by this endpoint.
    Unimpl,
    /// Peer violated the protocol; connection teardown follows.
    ProtoErr,
    /// A system call failed; `err` carries the errno.
    Errno,
}

impl StatusCode {
    fn to_u8(self) -> u8 {
        match self {
            StatusCode::Ok => 0x00,
            StatusCode::Unimpl => 0x01,
            StatusCode::ProtoErr => 0x02,
            StatusCode::Errno => 0x03,
        }
    }

    fn from_u8(v: u8) -> Result<Self> {
        match v {
            0x00 => Ok(StatusCode::Ok),
            0x01 => Ok(StatusCode::Unimpl),
            0x02 => Ok(StatusCode::ProtoErr),
            0x03 => Ok(StatusCode::Errno),
            other => Err(WireError::UnknownStatusCode(other)),
        }
    }
}

/// A status report.
///
/// The meaning of `err` depends on `code`: an errno for `Errno`, the
/// child's exit classification for a completed RUN_CMD (`Ok`), unused
/// otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub code: StatusCode,
    pub err: i32,
}

impl Status {
    pub fn ok(err: i32) -> Self {
        Self {
            code: StatusCode::Ok,
            err,
        }
    }

    pub fn unimpl() -> Self {
        Self {
            code: StatusCode::Unimpl,
            err: 0,
        }
    }

    pub fn proto_err() -> Self {
        Self {
            code: StatusCode::ProtoErr,
            err: 0,
        }
    }

    pub fn errno(err: i32) -> Self {
        Self {
            code: StatusCode::Errno,
            err,
        }
    }
}

/// Encode a status body to the back of `dst`.
pub fn encode_status(status: &Status, dst: &mut BytesMut) {
    dst.reserve(STATUS_SIZE);
    dst.put_u8(status.code.to_u8());
    dst.put_i32(status.err);
}

/// Decode a status body from the front of `src`.
pub fn decode_status(src: &mut BytesMut) -> Result<Option<Status>> {
    if src.len() < STATUS_SIZE {
        return Ok(None); // Need more data
    }

    let code = StatusCode::from_u8(src[0])?;
    let err = i32::from_be_bytes([src[1], src[2], src[3], src[4]]);
    src.advance(STATUS_SIZE);

    Ok(Some(Status { code, err }))
}
