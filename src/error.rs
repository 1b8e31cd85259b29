//! Error types for the ECHONET Lite core.
//!
//! `CodecError` covers malformed frames; `EchonetError` wraps it alongside
//! the I/O and addressing failures the protocol engine can hit. Library code
//! always returns these concrete types; only the `elnode` binary reaches for
//! `anyhow`.

use std::fmt;

/// Failures from [`crate::codec::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("frame too short ({len} bytes, minimum 13)")]
    TooShort { len: usize },
    #[error("bad EHD bytes: {ehd1:02X} {ehd2:02X}")]
    BadEhd { ehd1: u8, ehd2: u8 },
    #[error("unknown ESV code {0:02X}")]
    UnknownEsv(u8),
    #[error("OPC property list walks past the end of the frame")]
    Truncated,
}

/// Top-level error for the protocol engine.
#[derive(Debug, thiserror::Error)]
pub enum EchonetError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("DEOJ {0} is not served by this node")]
    UnservedEoj(EojDisplay),
}

/// Wraps a 3-byte EOJ purely for readable error messages, avoiding a
/// dependency from `error` back onto `eoj` for anything but `Display`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EojDisplay(pub u8, pub u8, pub u8);

impl fmt::Display for EojDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}
