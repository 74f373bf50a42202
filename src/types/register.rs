//! RegisterSession command-specific data.
//!
//! The 4-byte payload that opens an encapsulation session:
//!
//! ```text
//! +----------------+----------------+
//! | protocol u16   | options u16    |
//! +----------------+----------------+
//! ```

use bytes::{BufMut, BytesMut};

use crate::error::{EnipError, Result};

/// The only encapsulation protocol version in existence.
pub const PROTOCOL_VERSION: u16 = 1;

/// RegisterSession command-specific data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSession {
    /// Requested protocol version; must be 1
    pub protocol_version: u16,
    /// Option flags; no options are defined, must be 0
    pub option_flags: u16,
}

impl Default for RegisterSession {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            option_flags: 0,
        }
    }
}

impl RegisterSession {
    /// Create the standard request payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode into `buf`.
    ///
    /// A protocol version other than 1 is rejected before any bytes are
    /// produced; a device would refuse the session anyway.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        if self.protocol_version != PROTOCOL_VERSION {
            return Err(EnipError::validation(format!(
                "Unsupported encapsulation protocol version {} (must be {})",
                self.protocol_version, PROTOCOL_VERSION
            )));
        }
        buf.put_u16_le(self.protocol_version);
        buf.put_u16_le(self.option_flags);
        Ok(())
    }

    /// Encoded size in bytes.
    pub const fn encoded_size(&self) -> usize {
        4
    }

    /// Parse from bytes.
    ///
    /// Decode accepts any version; whether the peer speaks a supported
    /// protocol is a separate question answered by
    /// [`is_protocol_supported`](Self::is_protocol_supported).
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(EnipError::TooShort {
                expected: 4,
                actual: buf.len(),
            });
        }
        Ok(Self {
            protocol_version: u16::from_le_bytes([buf[0], buf[1]]),
            option_flags: u16::from_le_bytes([buf[2], buf[3]]),
        })
    }

    /// Check whether the announced version is one this stack speaks.
    #[inline]
    pub const fn is_protocol_supported(&self) -> bool {
        self.protocol_version == PROTOCOL_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_encoding() {
        let mut buf = BytesMut::new();
        RegisterSession::new().encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x01, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_roundtrip() {
        let csd = RegisterSession::new();
        let mut buf = BytesMut::new();
        csd.encode(&mut buf).unwrap();
        let decoded = RegisterSession::parse(&buf).unwrap();
        assert_eq!(decoded, csd);
        assert!(decoded.is_protocol_supported());
    }

    #[test]
    fn test_encode_rejects_bad_version() {
        let csd = RegisterSession {
            protocol_version: 2,
            option_flags: 0,
        };
        let mut buf = BytesMut::new();
        assert!(matches!(csd.encode(&mut buf), Err(EnipError::Validation(_))));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_parse_does_not_enforce_version() {
        // Decode is lenient; the predicate reports the mismatch.
        let decoded = RegisterSession::parse(&[0x02, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(decoded.protocol_version, 2);
        assert!(!decoded.is_protocol_supported());
    }

    #[test]
    fn test_parse_too_short() {
        assert!(RegisterSession::parse(&[0x01, 0x00, 0x00]).is_err());
    }

    #[test]
    fn test_parse_ignores_trailing_bytes() {
        let decoded = RegisterSession::parse(&[0x01, 0x00, 0x00, 0x00, 0xAA]).unwrap();
        assert_eq!(decoded, RegisterSession::new());
    }
}
