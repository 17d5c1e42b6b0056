use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, WireError};
use crate::op::Op;

/// Message header: id/flags (2) + op (1) = 3 bytes.
pub const HEAD_SIZE: usize = 3;

/// Maximum message id. Bit 15 of the id word carries the response flag.
pub const ID_MAX: u16 = 0x7FFF;

/// A frame header.
///
/// Wire format:
/// ```text
/// ┌────────────────────────────┬──────────┐
/// │ rsp:1  id:15   (2B BE)     │ op (1B)  │
/// └────────────────────────────┴──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgHead {
    /// Correlation id. Must be nonzero for any request op except NOOP.
    pub id: u16,
    /// Set on responses; a request with this bit set is a protocol violation.
    pub is_response: bool,
    /// Requested operation.
    pub op: Op,
}

impl MsgHead {
    /// Build a request header.
    pub fn request(id: u16, op: Op) -> Self {
        Self {
            id,
            is_response: false,
            op,
        }
    }

    /// Build the response header correlated with this request.
    pub fn response(&self, op: Op) -> Self {
        Self {
            id: self.id,
            is_response: true,
            op,
        }
    }
}

/// Encode a header to the back of `dst`.
pub fn encode_head(head: &MsgHead, dst: &mut BytesMut) -> Result<()> {
    if head.id > ID_MAX {
        return Err(WireError::IdOutOfRange(head.id));
    }
    let mut word = head.id;
    if head.is_response {
        word |= 0x8000;
    }
    dst.reserve(HEAD_SIZE);
    dst.put_u16(word);
    dst.put_u8(head.op.to_u8());
    Ok(())
}

/// Decode a header from the front of `src`.
///
/// Returns `Ok(None)` until `src` holds a complete header.
pub fn decode_head(src: &mut BytesMut) -> Result<Option<MsgHead>> {
    if src.len() < HEAD_SIZE {
        return Ok(None); // Need more data
    }

    let word = u16::from_be_bytes([src[0], src[1]]);
    let op = Op::from_u8(src[2]);
    src.advance(HEAD_SIZE);

    Ok(Some(MsgHead {
        id: word & ID_MAX,
        is_response: word & 0x8000 != 0,
        op,
    }))
}
