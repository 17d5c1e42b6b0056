use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, WireError};

/// Maximum size of the NUL-separated args area.
pub const CMD_ARGS_MAX: usize = 1023;

/// Largest possible command body: length word (2) + args area.
pub const CMD_BODY_MAX: usize = 2 + CMD_ARGS_MAX;

/// A parsed RUN_CMD request body.
///
/// Wire format:
/// ```text
/// ┌─────────────────────────────┬──────────────────────────────┐
/// │ detach:1  args_len:15 (2B)  │ args_len bytes of            │
/// │                             │ NUL-terminated strings       │
/// └─────────────────────────────┴──────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdSpec {
    /// Argument vector. `args[0]` is the executable path; never empty.
    pub args: Vec<String>,
    /// Fire-and-forget: spawn in its own session, do not relay or wait.
    pub detach: bool,
}

impl CmdSpec {
    /// Build a command spec, rejecting empty argument vectors.
    pub fn new(args: Vec<String>, detach: bool) -> Result<Self> {
        if args.is_empty() {
            return Err(WireError::BadCommand("empty argument vector"));
        }
        Ok(Self { args, detach })
    }
}

/// Encode a command body to the back of `dst`.
pub fn encode_cmd(cmd: &CmdSpec, dst: &mut BytesMut) -> Result<()> {
    if cmd.args.is_empty() {
        return Err(WireError::BadCommand("empty argument vector"));
    }

    let mut args_len = 0usize;
    for arg in &cmd.args {
        if arg.as_bytes().contains(&0) {
            return Err(WireError::BadCommand("NUL byte inside argument"));
        }
        args_len += arg.len() + 1;
    }
    if args_len > CMD_ARGS_MAX {
        return Err(WireError::ArgsTooLarge {
            size: args_len,
            max: CMD_ARGS_MAX,
        });
    }

    let mut word = args_len as u16;
    if cmd.detach {
        word |= 0x8000;
    }
    dst.reserve(2 + args_len);
    dst.put_u16(word);
    for arg in &cmd.args {
        dst.put_slice(arg.as_bytes());
        dst.put_u8(0);
    }
    Ok(())
}

/// Decode a command body from the front of `src`.
///
/// Returns `Ok(None)` until the full args area is buffered. The caller
/// must not discard buffered bytes while waiting.
pub fn decode_cmd(src: &mut BytesMut) -> Result<Option<CmdSpec>> {
    if src.len() < 2 {
        return Ok(None); // Need more data
    }

    let word = u16::from_be_bytes([src[0], src[1]]);
    let detach = word & 0x8000 != 0;
    let args_len = (word & 0x7FFF) as usize;

    if args_len > CMD_ARGS_MAX {
        return Err(WireError::ArgsTooLarge {
            size: args_len,
            max: CMD_ARGS_MAX,
        });
    }
    if args_len == 0 {
        return Err(WireError::BadCommand("empty argument vector"));
    }
    if src.len() < 2 + args_len {
        return Ok(None); // Need more data
    }

    let area = &src[2..2 + args_len];
    if area[args_len - 1] != 0 {
        return Err(WireError::BadCommand("unterminated argument area"));
    }

    let mut args = Vec::new();
    for raw in area[..args_len - 1].split(|b| *b == 0) {
        let arg = std::str::from_utf8(raw)
            .map_err(|_| WireError::BadCommand("argument is not valid UTF-8"))?;
        args.push(arg.to_owned());
    }
    src.advance(2 + args_len);

    Ok(Some(CmdSpec { args, detach }))
}
