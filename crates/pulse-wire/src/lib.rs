//! Binary wire format for the pulse heartbeat protocol.
//!
//! Every exchange is a frame: a 3-byte message header followed by a body
//! whose shape is keyed by the header's op code. Bodies are encoded and
//! decoded incrementally over `bytes::BytesMut`:
//! - `Ok(Some(value))` — decoded, bytes consumed from the front
//! - `Ok(None)` — need more bytes; nothing consumed, caller retries later
//! - `Err(_)` — malformed; the connection is beyond recovery
//!
//! All integers are big-endian.

pub mod cmd;
pub mod error;
pub mod head;
pub mod host_info;
pub mod op;
pub mod status;
pub mod stdio;

pub use cmd::{decode_cmd, encode_cmd, CmdSpec, CMD_ARGS_MAX};
pub use error::{Result, WireError};
pub use head::{decode_head, encode_head, MsgHead, HEAD_SIZE, ID_MAX};
pub use host_info::{decode_host_info, encode_host_info, HostInfo, HOST_INFO_SIZE};
pub use op::Op;
pub use status::{decode_status, encode_status, Status, StatusCode, STATUS_SIZE};
pub use stdio::{decode_stdio, encode_stdio, StdioHead, STDIO_HEAD_SIZE, STDIO_LEN_MAX};

/// Well-known heartbeat TCP port.
pub const PROTO_PORT: u16 = 64420;

/// Minimum inbound buffer capacity a conforming endpoint must offer.
///
/// Sized to hold the largest request frame (header + maximum command
/// body). This doubles as the per-connection inbound DoS bound.
pub const PROTO_MIN_BUF: usize = HEAD_SIZE + cmd::CMD_BODY_MAX;

/// Outbound buffer capacity, sized for the stdio sub-protocol.
///
/// Must fit at least one maximum-length stdio sub-frame plus a pending
/// response frame.
pub const PROTO_SUB_MIN_BUF: usize = 8192;
