//! CIP path encoding.
//!
//! Two unrelated kinds of path live here. The *request path* (EPATH)
//! addresses a CIP object or a symbolic tag and rides inside the message
//! router envelope. The *route path* addresses the physical egress (port
//! and link address) an Unconnected Send request is forwarded through.

use bytes::{BufMut, BytesMut};

use crate::error::{EnipError, Result};

/// Maximum tag name length accepted by the symbol segment encoder.
pub const MAX_SYMBOL_LENGTH: usize = 255;

/// One segment of a CIP request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Logical class segment (8-bit form 0x20, 16-bit form 0x21)
    ClassId(u16),
    /// Logical instance segment (8-bit form 0x24, 16-bit form 0x25)
    InstanceId(u16),
    /// Logical attribute segment (8-bit form 0x30, 16-bit form 0x31)
    AttributeId(u16),
    /// ANSI extended symbol segment (0x91): a tag name, even-padded
    Symbol(String),
}

impl PathSegment {
    /// Encoded size in bytes, including padding.
    pub fn encoded_size(&self) -> usize {
        match self {
            Self::ClassId(id) | Self::InstanceId(id) | Self::AttributeId(id) => {
                if *id <= 0xFF {
                    2
                } else {
                    4
                }
            }
            Self::Symbol(name) => {
                let len = 2 + name.len();
                len + (len & 1)
            }
        }
    }

    /// Encode this segment into `buf`.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Self::ClassId(id) => encode_logical(buf, 0x20, 0x21, *id),
            Self::InstanceId(id) => encode_logical(buf, 0x24, 0x25, *id),
            Self::AttributeId(id) => encode_logical(buf, 0x30, 0x31, *id),
            Self::Symbol(name) => {
                if name.is_empty() {
                    return Err(EnipError::validation("Tag name must not be empty"));
                }
                if name.len() > MAX_SYMBOL_LENGTH {
                    return Err(EnipError::validation(format!(
                        "Tag name too long: {} bytes (max {})",
                        name.len(),
                        MAX_SYMBOL_LENGTH
                    )));
                }
                if !name.is_ascii() {
                    return Err(EnipError::validation("Tag name must be ASCII"));
                }
                buf.put_u8(0x91);
                buf.put_u8(name.len() as u8);
                buf.extend_from_slice(name.as_bytes());
                // Segments are word-aligned; odd names get one pad byte
                if name.len() & 1 == 1 {
                    buf.put_u8(0x00);
                }
            }
        }
        Ok(())
    }
}

fn encode_logical(buf: &mut BytesMut, code8: u8, code16: u8, id: u16) {
    if id <= 0xFF {
        buf.put_u8(code8);
        buf.put_u8(id as u8);
    } else {
        buf.put_u8(code16);
        buf.put_u8(0x00);
        buf.put_u16_le(id);
    }
}

/// A CIP request path: an ordered list of segments.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Epath {
    segments: Vec<PathSegment>,
}

impl Epath {
    /// Create an empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a path from segments.
    pub fn from_segments(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// Class/instance address, the common object form.
    pub fn class_instance(class: u16, instance: u16) -> Self {
        Self {
            segments: vec![PathSegment::ClassId(class), PathSegment::InstanceId(instance)],
        }
    }

    /// Symbolic tag address.
    pub fn symbol(name: impl Into<String>) -> Self {
        Self {
            segments: vec![PathSegment::Symbol(name.into())],
        }
    }

    /// The Connection Manager object (class 0x06, instance 1).
    pub fn connection_manager() -> Self {
        Self::class_instance(0x06, 0x01)
    }

    /// The Message Router object (class 0x02, instance 1).
    pub fn message_router() -> Self {
        Self::class_instance(0x02, 0x01)
    }

    /// The segments of this path.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Append a segment.
    pub fn push(&mut self, segment: PathSegment) {
        self.segments.push(segment);
    }

    /// Encoded size in bytes (always even).
    pub fn encoded_size(&self) -> usize {
        self.segments.iter().map(|s| s.encoded_size()).sum()
    }

    /// Path size in 16-bit words, as carried on the wire.
    pub fn size_words(&self) -> u8 {
        (self.encoded_size() / 2) as u8
    }

    /// Encode the path to a byte vector.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        for segment in &self.segments {
            segment.encode(&mut buf)?;
        }
        Ok(buf.to_vec())
    }
}

/// Route path for Unconnected Send: which port and link address the
/// bridging device forwards the embedded message through.
///
/// Encoded as two bytes: `(segment_type << 5) | (extended_link << 4) | port`
/// followed by the link address. The default addresses the backplane
/// (port 1) at slot 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutePath {
    /// Segment type (3 bits; 0 = port segment)
    pub segment_type: u8,
    /// Extended link address flag
    pub extended_link: bool,
    /// Port number (4 bits; 1 = backplane, 2 = Ethernet)
    pub port: u8,
    /// Link address (slot number on the backplane)
    pub link_address: u8,
}

impl Default for RoutePath {
    fn default() -> Self {
        Self {
            segment_type: 0,
            extended_link: false,
            port: 1,
            link_address: 0,
        }
    }
}

impl RoutePath {
    /// Route to a processor in the given backplane slot.
    pub fn backplane_slot(slot: u8) -> Self {
        Self {
            link_address: slot,
            ..Self::default()
        }
    }

    /// Validate field ranges before encoding.
    pub fn validate(&self) -> Result<()> {
        if self.segment_type > 0x07 {
            return Err(EnipError::validation(format!(
                "Route segment type {} exceeds 3 bits",
                self.segment_type
            )));
        }
        if self.port > 0x0F {
            return Err(EnipError::validation(format!(
                "Route port {} exceeds 4 bits",
                self.port
            )));
        }
        Ok(())
    }

    /// Encode to the two-byte wire form.
    pub fn to_bytes(&self) -> Result<[u8; 2]> {
        self.validate()?;
        let first = (self.segment_type << 5)
            | ((self.extended_link as u8) << 4)
            | (self.port & 0x0F);
        Ok([first, self.link_address])
    }

    /// Parse from the two-byte wire form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 2 {
            return Err(EnipError::TooShort {
                expected: 2,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            segment_type: bytes[0] >> 5,
            extended_link: bytes[0] & 0x10 != 0,
            port: bytes[0] & 0x0F,
            link_address: bytes[1],
        })
    }
}

impl std::fmt::Display for RoutePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "port {} / link {}", self.port, self.link_address)
    }
}
