//! CIP data-type marshalling.
//!
//! Tag values travel as "CIP generic data": a 16-bit type code followed
//! by a type-specific payload. Atomic numerics carry a 16-bit element
//! count and a little-endian value at the type's fixed width; the only
//! structured type implemented is the Logix 82-character ASCII string.

use bytes::{BufMut, BytesMut};

use crate::error::{EnipError, Result};

/// Maximum character count of the ASCII string struct.
pub const MAX_STRING_LENGTH: usize = 82;

/// Type code of a structured (template) value.
pub const STRUCT_TYPE_CODE: u16 = 0x02A0;

/// Structure handle of the Logix STRING template.
pub const STRING_STRUCT_HANDLE: u16 = 0x0FCE;

/// CIP atomic and structured data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum CipDataType {
    /// Boolean (0xC1), 1 byte
    Bool = 0x00C1,
    /// Signed 8-bit integer (0xC2)
    Sint = 0x00C2,
    /// Signed 16-bit integer (0xC3)
    Int = 0x00C3,
    /// Signed 32-bit integer (0xC4)
    Dint = 0x00C4,
    /// Signed 64-bit integer (0xC5)
    Lint = 0x00C5,
    /// Unsigned 8-bit integer (0xC6)
    Usint = 0x00C6,
    /// Unsigned 16-bit integer (0xC7)
    Uint = 0x00C7,
    /// Unsigned 32-bit integer (0xC8)
    Udint = 0x00C8,
    /// 32-bit IEEE float (0xCA)
    Real = 0x00CA,
    /// Structured value (0x02A0); the sub-type selects the template
    Struct = 0x02A0,
}

impl CipDataType {
    /// Parse a type code. 0xC9 (ULINT) is deliberately absent from the
    /// implemented table; it decodes as unknown.
    #[inline]
    pub fn from_u16(value: u16) -> Result<Self> {
        match value {
            0x00C1 => Ok(Self::Bool),
            0x00C2 => Ok(Self::Sint),
            0x00C3 => Ok(Self::Int),
            0x00C4 => Ok(Self::Dint),
            0x00C5 => Ok(Self::Lint),
            0x00C6 => Ok(Self::Usint),
            0x00C7 => Ok(Self::Uint),
            0x00C8 => Ok(Self::Udint),
            0x00CA => Ok(Self::Real),
            0x02A0 => Ok(Self::Struct),
            _ => Err(EnipError::UnknownDataType(value)),
        }
    }

    /// Convert to the wire value.
    #[inline]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Value width in bytes (atomic types only).
    #[inline]
    pub const fn byte_width(&self) -> Option<usize> {
        match self {
            Self::Bool | Self::Sint | Self::Usint => Some(1),
            Self::Int | Self::Uint => Some(2),
            Self::Dint | Self::Udint | Self::Real => Some(4),
            Self::Lint => Some(8),
            Self::Struct => None,
        }
    }

    /// Whether the type carries a sign bit.
    #[inline]
    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Sint | Self::Int | Self::Dint | Self::Lint)
    }

    /// Whether the type is an atomic numeric (writable through
    /// [`CipValue::from_numeric`]).
    #[inline]
    pub const fn is_numeric(&self) -> bool {
        !matches!(self, Self::Struct | Self::Real)
    }

    /// Inclusive `[min, max]` range of the integer types.
    pub const fn numeric_range(&self) -> Option<(i64, i64)> {
        match self {
            Self::Bool => Some((0, 1)),
            Self::Sint => Some((i8::MIN as i64, i8::MAX as i64)),
            Self::Int => Some((i16::MIN as i64, i16::MAX as i64)),
            Self::Dint => Some((i32::MIN as i64, i32::MAX as i64)),
            Self::Lint => Some((i64::MIN, i64::MAX)),
            Self::Usint => Some((0, u8::MAX as i64)),
            Self::Uint => Some((0, u16::MAX as i64)),
            Self::Udint => Some((0, u32::MAX as i64)),
            Self::Real | Self::Struct => None,
        }
    }
}

impl std::fmt::Display for CipDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Bool => "BOOL",
            Self::Sint => "SINT",
            Self::Int => "INT",
            Self::Dint => "DINT",
            Self::Lint => "LINT",
            Self::Usint => "USINT",
            Self::Uint => "UINT",
            Self::Udint => "UDINT",
            Self::Real => "REAL",
            Self::Struct => "STRUCT",
        };
        write!(f, "{}", name)
    }
}

/// A decoded CIP tag value.
#[derive(Debug, Clone, PartialEq)]
pub enum CipValue {
    /// BOOL
    Bool(bool),
    /// SINT
    Sint(i8),
    /// INT
    Int(i16),
    /// DINT
    Dint(i32),
    /// LINT
    Lint(i64),
    /// USINT
    Usint(u8),
    /// UINT
    Uint(u16),
    /// UDINT
    Udint(u32),
    /// REAL
    Real(f32),
    /// Logix STRING (ASCII, at most 82 characters)
    String(String),
}

impl CipValue {
    /// Build an integer value of the declared type, range-checked
    /// against the type's width and signedness. No bytes are produced
    /// for an out-of-range value.
    pub fn from_numeric(data_type: CipDataType, value: i64) -> Result<Self> {
        if !data_type.is_numeric() {
            return Err(EnipError::validation(format!(
                "{} is not an integer type",
                data_type
            )));
        }
        let (min, max) = data_type
            .numeric_range()
            .expect("numeric types always have a range");
        if value < min || value > max {
            return Err(EnipError::validation(format!(
                "Value {} out of range [{}, {}] for {}",
                value, min, max, data_type
            )));
        }

        Ok(match data_type {
            CipDataType::Bool => Self::Bool(value != 0),
            CipDataType::Sint => Self::Sint(value as i8),
            CipDataType::Int => Self::Int(value as i16),
            CipDataType::Dint => Self::Dint(value as i32),
            CipDataType::Lint => Self::Lint(value),
            CipDataType::Usint => Self::Usint(value as u8),
            CipDataType::Uint => Self::Uint(value as u16),
            CipDataType::Udint => Self::Udint(value as u32),
            CipDataType::Real | CipDataType::Struct => unreachable!(),
        })
    }

    /// Build a string value, truncated to the 82-character maximum.
    pub fn string(value: impl Into<String>) -> Self {
        let mut value = value.into();
        value.truncate(MAX_STRING_LENGTH);
        Self::String(value)
    }

    /// The CIP type of this value.
    pub fn data_type(&self) -> CipDataType {
        match self {
            Self::Bool(_) => CipDataType::Bool,
            Self::Sint(_) => CipDataType::Sint,
            Self::Int(_) => CipDataType::Int,
            Self::Dint(_) => CipDataType::Dint,
            Self::Lint(_) => CipDataType::Lint,
            Self::Usint(_) => CipDataType::Usint,
            Self::Uint(_) => CipDataType::Uint,
            Self::Udint(_) => CipDataType::Udint,
            Self::Real(_) => CipDataType::Real,
            Self::String(_) => CipDataType::Struct,
        }
    }

    /// Encoded size of the full generic-data form.
    pub fn encoded_size(&self) -> usize {
        match self {
            Self::String(s) => 4 + 4 + s.len(),
            _ => {
                4 + self
                    .data_type()
                    .byte_width()
                    .expect("atomic types have a width")
            }
        }
    }

    /// Encode the raw little-endian value bytes, without the type header.
    pub fn encode_raw(&self, buf: &mut BytesMut) {
        match self {
            Self::Bool(v) => buf.put_u8(*v as u8),
            Self::Sint(v) => buf.put_i8(*v),
            Self::Int(v) => buf.put_i16_le(*v),
            Self::Dint(v) => buf.put_i32_le(*v),
            Self::Lint(v) => buf.put_i64_le(*v),
            Self::Usint(v) => buf.put_u8(*v),
            Self::Uint(v) => buf.put_u16_le(*v),
            Self::Udint(v) => buf.put_u32_le(*v),
            Self::Real(v) => buf.put_f32_le(*v),
            Self::String(s) => {
                buf.put_u8(s.len() as u8);
                buf.put_bytes(0x00, 3);
                buf.extend_from_slice(s.as_bytes());
            }
        }
    }

    /// Encode the full generic-data form.
    ///
    /// Atomic: `type u16, element_count u16 = 1, value`. Struct:
    /// `0x02A0, struct_handle u16, len u8, pad[3], chars`.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::String(_) => {
                buf.put_u16_le(STRUCT_TYPE_CODE);
                buf.put_u16_le(STRING_STRUCT_HANDLE);
                self.encode_raw(buf);
            }
            _ => {
                buf.put_u16_le(self.data_type().as_u16());
                buf.put_u16_le(0x0001);
                self.encode_raw(buf);
            }
        }
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        self.encode(&mut buf);
        buf.to_vec()
    }

    /// Decode a generic-data buffer into a value.
    ///
    /// Unknown primary or secondary type codes are hard errors; there is
    /// no silent defaulting.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(EnipError::TooShort {
                expected: 4,
                actual: buf.len(),
            });
        }
        let type_code = u16::from_le_bytes([buf[0], buf[1]]);
        let data_type = CipDataType::from_u16(type_code)?;

        match data_type {
            CipDataType::Struct => {
                let handle = u16::from_le_bytes([buf[2], buf[3]]);
                if handle != STRING_STRUCT_HANDLE {
                    return Err(EnipError::UnknownDataType(handle));
                }
                Self::decode_string(&buf[4..])
            }
            _ => {
                // Two-byte element count sits between the type code and
                // the value bytes.
                let width = data_type.byte_width().expect("atomic width");
                if buf.len() < 4 + width {
                    return Err(EnipError::TooShort {
                        expected: 4 + width,
                        actual: buf.len(),
                    });
                }
                let raw = &buf[4..4 + width];
                Ok(match data_type {
                    CipDataType::Bool => Self::Bool(raw[0] != 0),
                    CipDataType::Sint => Self::Sint(raw[0] as i8),
                    CipDataType::Int => Self::Int(i16::from_le_bytes([raw[0], raw[1]])),
                    CipDataType::Dint => {
                        Self::Dint(i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
                    }
                    CipDataType::Lint => Self::Lint(i64::from_le_bytes([
                        raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
                    ])),
                    CipDataType::Usint => Self::Usint(raw[0]),
                    CipDataType::Uint => Self::Uint(u16::from_le_bytes([raw[0], raw[1]])),
                    CipDataType::Udint => {
                        Self::Udint(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
                    }
                    CipDataType::Real => {
                        Self::Real(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
                    }
                    CipDataType::Struct => unreachable!(),
                })
            }
        }
    }

    /// Decode the string struct payload: `{len u8, pad[3], chars[len]}`.
    fn decode_string(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(EnipError::TooShort {
                expected: 4,
                actual: buf.len(),
            });
        }
        let declared_len = buf[0] as usize;
        if declared_len > MAX_STRING_LENGTH {
            return Err(EnipError::invalid_cip(format!(
                "String length {} exceeds maximum {}",
                declared_len, MAX_STRING_LENGTH
            )));
        }
        if buf.len() < 4 + declared_len {
            return Err(EnipError::TooShort {
                expected: 4 + declared_len,
                actual: buf.len(),
            });
        }
        let chars = &buf[4..4 + declared_len];
        let text = std::str::from_utf8(chars)
            .map_err(|_| EnipError::invalid_cip("String payload is not ASCII"))?;
        if !text.is_ascii() {
            return Err(EnipError::invalid_cip("String payload is not ASCII"));
        }
        Ok(Self::String(text.to_owned()))
    }
}

impl std::fmt::Display for CipValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Sint(v) => write!(f, "{}", v),
            Self::Int(v) => write!(f, "{}", v),
            Self::Dint(v) => write!(f, "{}", v),
            Self::Lint(v) => write!(f, "{}", v),
            Self::Usint(v) => write!(f, "{}", v),
            Self::Uint(v) => write!(f, "{}", v),
            Self::Udint(v) => write!(f, "{}", v),
            Self::Real(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{:?}", v),
        }
    }
}
