//! Host identification backed by procfs.

use std::io;

use pulse_agent::HostInfoProvider;
use pulse_wire::HostInfo;

/// Serves HOST_INFO from `/proc` and build-time constants.
pub struct ProcHostInfo {
    prog_ver: [u8; 16],
}

impl ProcHostInfo {
    pub fn new() -> Self {
        Self {
            prog_ver: pad_version(env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for ProcHostInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl HostInfoProvider for ProcHostInfo {
    fn host_info(&self) -> io::Result<HostInfo> {
        Ok(HostInfo {
            uptime_secs: read_uptime()?,
            pid: std::process::id(),
            prog_ver: self.prog_ver,
            boot_id: read_boot_id()?,
            os: os_code(),
            arch: arch_code(),
        })
    }
}

/// Version string truncated or NUL-padded into the fixed wire field.
fn pad_version(ver: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    let len = ver.len().min(out.len());
    out[..len].copy_from_slice(&ver.as_bytes()[..len]);
    out
}

fn os_code() -> u8 {
    if cfg!(target_os = "linux") {
        1
    } else {
        0
    }
}

fn arch_code() -> u8 {
    if cfg!(target_arch = "x86_64") {
        1
    } else if cfg!(target_arch = "aarch64") {
        2
    } else {
        0
    }
}

#[cfg(target_os = "linux")]
fn read_uptime() -> io::Result<u64> {
    let raw = std::fs::read_to_string("/proc/uptime")?;
    parse_uptime(&raw)
}

#[cfg(not(target_os = "linux"))]
fn read_uptime() -> io::Result<u64> {
    Err(io::ErrorKind::Unsupported.into())
}

fn parse_uptime(raw: &str) -> io::Result<u64> {
    raw.split_whitespace()
        .next()
        .and_then(|field| field.parse::<f64>().ok())
        .map(|secs| secs as u64)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unparsable uptime"))
}

#[cfg(target_os = "linux")]
fn read_boot_id() -> io::Result<[u8; 16]> {
    let raw = std::fs::read_to_string("/proc/sys/kernel/random/boot_id")?;
    parse_boot_id(raw.trim())
}

#[cfg(not(target_os = "linux"))]
fn read_boot_id() -> io::Result<[u8; 16]> {
    Err(io::ErrorKind::Unsupported.into())
}

/// Parse the dashed UUID text form into raw bytes.
fn parse_boot_id(raw: &str) -> io::Result<[u8; 16]> {
    let mut out = [0u8; 16];
    let mut nibbles = raw.chars().filter(|c| *c != '-');
    for byte in out.iter_mut() {
        let hi = nibbles.next().and_then(|c| c.to_digit(16));
        let lo = nibbles.next().and_then(|c| c.to_digit(16));
        match (hi, lo) {
            (Some(hi), Some(lo)) => *byte = ((hi << 4) | lo) as u8,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "unparsable boot id",
                ))
            }
        }
    }
    if nibbles.next().is_some() {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "oversized boot id"));
    }
    Ok(out)
}
