//! Heartbeat op codes.

/// Operation requested by a frame.
///
/// Unknown bytes decode to `Other` rather than failing: an endpoint must
/// be able to answer an op it does not implement with STATUS/UNIMPL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Keep-alive; never answered.
    Noop,
    /// Status report (response-only in practice).
    Status,
    /// Host information query.
    HostInfo,
    /// Rendezvous redirect. Not implemented by this endpoint.
    Hover,
    /// Execute a command, optionally relaying its stdio.
    RunCmd,
    /// Upload-and-execute. Not implemented by this endpoint.
    RunBin,
    /// Binary handover. Not implemented by this endpoint.
    NyBin,
    /// Any op code this build does not know about.
    Other(u8),
}

impl Op {
    /// Wire value of this op.
    pub fn to_u8(self) -> u8 {
        match self {
            Op::Noop => 0x00,
            Op::Status => 0x01,
            Op::HostInfo => 0x02,
            Op::Hover => 0x03,
            Op::RunCmd => 0x04,
            Op::RunBin => 0x05,
            Op::NyBin => 0x06,
            Op::Other(v) => v,
        }
    }

    /// Decode a wire value.
    pub fn from_u8(v: u8) -> Self {
        match v {
            0x00 => Op::Noop,
            0x01 => Op::Status,
            0x02 => Op::HostInfo,
            0x03 => Op::Hover,
            0x04 => Op::RunCmd,
            0x05 => Op::RunBin,
            0x06 => Op::NyBin,
            other => Op::Other(other),
        }
    }

    /// Human-readable op name for logging.
    pub fn name(self) -> &'static str {
        match self {
            Op::Noop => "NOOP",
            Op::Status => "STATUS",
            Op::HostInfo => "HOST_INFO",
            Op::Hover => "HOVER",
            Op::RunCmd => "RUN_CMD",
            Op::RunBin => "RUN_BIN",
            Op::NyBin => "NY_BIN",
            Op::Other(_) => "UNKNOWN",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_ops_roundtrip() {
        for op in [
            Op::Noop,
            Op::Status,
            Op::HostInfo,
            Op::Hover,
            Op::RunCmd,
            Op::RunBin,
            Op::NyBin,
        ] {
            assert_eq!(Op::from_u8(op.to_u8()), op);
        }
    }

    #[test]
    fn unknown_op_preserved() {
        let op = Op::from_u8(0x7F);
        assert_eq!(op, Op::Other(0x7F));
        assert_eq!(op.to_u8(), 0x7F);
        assert_eq!(op.name(), "UNKNOWN");
    }
}
