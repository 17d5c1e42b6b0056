use bytes::{Buf, BufMut, BytesMut};

use crate::error::Result;

/// Host info body: uptime (8) + pid (4) + ver (16) + boot id (16) +
/// os (1) + arch (1) = 46 bytes.
pub const HOST_INFO_SIZE: usize = 46;

/// Host identification record, served in response to HOST_INFO.
///
/// The record is produced by a caller-supplied provider; this crate only
/// defines its wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostInfo {
    /// Seconds since the host booted.
    pub uptime_secs: u64,
    /// Agent process id.
    pub pid: u32,
    /// Program version fingerprint.
    pub prog_ver: [u8; 16],
    /// Host boot id.
    pub boot_id: [u8; 16],
    /// Operating system tag.
    pub os: u8,
    /// CPU architecture tag.
    pub arch: u8,
}

/// Encode a host info body to the back of `dst`.
pub fn encode_host_info(hi: &HostInfo, dst: &mut BytesMut) {
    dst.reserve(HOST_INFO_SIZE);
    dst.put_u64(hi.uptime_secs);
    dst.put_u32(hi.pid);
    dst.put_slice(&hi.prog_ver);
    dst.put_slice(&hi.boot_id);
    dst.put_u8(hi.os);
    dst.put_u8(hi.arch);
}

/// Decode a host info body from the front of `src`.
pub fn decode_host_info(src: &mut BytesMut) -> Result<Option<HostInfo>> {
    if src.len() < HOST_INFO_SIZE {
        return Ok(None); // Need more data
    }

    let mut hi = HostInfo {
        uptime_secs: u64::from_be_bytes(src[0..8].try_into().unwrap()),
        pid: u32::from_be_bytes(src[8..12].try_into().unwrap()),
        ..HostInfo::default()
    };
    hi.prog_ver.copy_from_slice(&src[12..28]);
    hi.boot_id.copy_from_slice(&src[28..44]);
    hi.os = src[44];
    hi.arch = src[45];
    src.advance(HOST_INFO_SIZE);

    Ok(Some(hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HostInfo {
        HostInfo {
            uptime_secs: 86_400,
            pid: 4321,
            prog_ver: *b"pulse-0.1.0\0\0\0\0\0",
            boot_id: [0xAB; 16],
            os: 1,
            arch: 7,
        }
    }

    #[test]
    fn roundtrip() {
        let hi = sample();
        let mut buf = BytesMut::new();
        encode_host_info(&hi, &mut buf);
        assert_eq!(buf.len(), HOST_INFO_SIZE);

        let decoded = decode_host_info(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, hi);
        assert!(buf.is_empty());
    }

    #[test]
    fn every_truncation_needs_more() {
        let mut buf = BytesMut::new();
        encode_host_info(&sample(), &mut buf);
        for cut in 0..HOST_INFO_SIZE {
            let mut partial = BytesMut::from(&buf[..cut]);
            assert!(decode_host_info(&mut partial).unwrap().is_none());
        }
    }

    #[test]
    fn trailing_bytes_left_in_buffer() {
        let mut buf = BytesMut::new();
        encode_host_info(&sample(), &mut buf);
        buf.extend_from_slice(b"tail");

        decode_host_info(&mut buf).unwrap().unwrap();
        assert_eq!(buf.as_ref(), b"tail");
    }
}
