//! CIP service codes, general status codes and the message router envelope.
//!
//! Every explicit CIP exchange is a `{service, path, data}` request and a
//! `{service | 0x80, reserved, status, ...}` reply. The envelope here is
//! shared by standalone requests and by messages embedded inside an
//! Unconnected Send wrapper.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{EnipError, Result};
use crate::types::Epath;

/// Bit 7 of the service byte distinguishes request (0) from reply (1).
pub const REPLY_FLAG: u8 = 0x80;

/// CIP service codes used by this stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CipService {
    /// Get_Attributes_All (0x01)
    GetAttributesAll = 0x01,

    /// Multiple Service Packet (0x0A)
    MultipleServicePacket = 0x0A,

    /// Get_Attribute_Single (0x0E)
    GetAttributeSingle = 0x0E,

    /// Read Tag (0x4C, Logix object-specific)
    ReadTag = 0x4C,

    /// Write Tag (0x4D, Logix object-specific)
    WriteTag = 0x4D,

    /// Unconnected Send (0x52, Connection Manager)
    UnconnectedSend = 0x52,
}

impl CipService {
    /// Parse a service from the request-direction code (reply flag cleared).
    #[inline]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value & !REPLY_FLAG {
            0x01 => Some(Self::GetAttributesAll),
            0x0A => Some(Self::MultipleServicePacket),
            0x0E => Some(Self::GetAttributeSingle),
            0x4C => Some(Self::ReadTag),
            0x4D => Some(Self::WriteTag),
            0x52 => Some(Self::UnconnectedSend),
            _ => None,
        }
    }

    /// Convert to the request-direction wire value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// The reply-direction wire value (request code with bit 7 set).
    #[inline]
    pub const fn reply_code(self) -> u8 {
        self as u8 | REPLY_FLAG
    }
}

/// CIP general status codes, with textual descriptions.
///
/// The description table is protocol data; behavior only depends on the
/// success / fatal classification below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GeneralStatus {
    /// Service executed successfully (0x00)
    Success = 0x00,
    /// Connection failure (0x01)
    ConnectionFailure = 0x01,
    /// Resource unavailable (0x02)
    ResourceUnavailable = 0x02,
    /// Invalid parameter value (0x03)
    InvalidParameterValue = 0x03,
    /// Path segment error (0x04)
    PathSegmentError = 0x04,
    /// Path destination unknown (0x05)
    PathDestinationUnknown = 0x05,
    /// Partial transfer (0x06)
    PartialTransfer = 0x06,
    /// Connection lost (0x07)
    ConnectionLost = 0x07,
    /// Service not supported (0x08)
    ServiceNotSupported = 0x08,
    /// Invalid attribute value (0x09)
    InvalidAttributeValue = 0x09,
    /// Attribute list error (0x0A)
    AttributeListError = 0x0A,
    /// Already in requested mode/state (0x0B)
    AlreadyInRequestedState = 0x0B,
    /// Object state conflict (0x0C)
    ObjectStateConflict = 0x0C,
    /// Object already exists (0x0D)
    ObjectAlreadyExists = 0x0D,
    /// Attribute not settable (0x0E)
    AttributeNotSettable = 0x0E,
    /// Privilege violation (0x0F)
    PrivilegeViolation = 0x0F,
    /// Device state conflict (0x10)
    DeviceStateConflict = 0x10,
    /// Reply data too large (0x11)
    ReplyDataTooLarge = 0x11,
    /// Fragmentation of a primitive value (0x12)
    FragmentationOfPrimitive = 0x12,
    /// Not enough data (0x13)
    NotEnoughData = 0x13,
    /// Attribute not supported (0x14)
    AttributeNotSupported = 0x14,
    /// Too much data (0x15)
    TooMuchData = 0x15,
    /// Object does not exist (0x16)
    ObjectDoesNotExist = 0x16,
    /// Service fragmentation sequence not in progress (0x17)
    FragmentationNotInProgress = 0x17,
    /// No stored attribute data (0x18)
    NoStoredAttributeData = 0x18,
    /// Store operation failure (0x19)
    StoreOperationFailure = 0x19,
    /// Routing failure, request packet too large (0x1A)
    RequestPacketTooLarge = 0x1A,
    /// Routing failure, response packet too large (0x1B)
    ResponsePacketTooLarge = 0x1B,
    /// Missing attribute list entry data (0x1C)
    MissingAttributeListEntry = 0x1C,
    /// Invalid attribute value list (0x1D)
    InvalidAttributeValueList = 0x1D,
    /// Embedded service error (0x1E)
    EmbeddedServiceError = 0x1E,
    /// Vendor specific error (0x1F)
    VendorSpecificError = 0x1F,
    /// Invalid parameter (0x20)
    InvalidParameter = 0x20,
    /// Write-once value already written (0x21)
    WriteOnceAlreadyWritten = 0x21,
    /// Invalid reply received (0x22)
    InvalidReplyReceived = 0x22,
    /// Key failure in path (0x25)
    KeyFailureInPath = 0x25,
    /// Path size invalid (0x26)
    PathSizeInvalid = 0x26,
    /// Unexpected attribute in list (0x27)
    UnexpectedAttributeInList = 0x27,
    /// Invalid member ID (0x28)
    InvalidMemberId = 0x28,
    /// Member not settable (0x29)
    MemberNotSettable = 0x29,
}

impl GeneralStatus {
    /// Parse a general status from its wire value.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Success),
            0x01 => Ok(Self::ConnectionFailure),
            0x02 => Ok(Self::ResourceUnavailable),
            0x03 => Ok(Self::InvalidParameterValue),
            0x04 => Ok(Self::PathSegmentError),
            0x05 => Ok(Self::PathDestinationUnknown),
            0x06 => Ok(Self::PartialTransfer),
            0x07 => Ok(Self::ConnectionLost),
            0x08 => Ok(Self::ServiceNotSupported),
            0x09 => Ok(Self::InvalidAttributeValue),
            0x0A => Ok(Self::AttributeListError),
            0x0B => Ok(Self::AlreadyInRequestedState),
            0x0C => Ok(Self::ObjectStateConflict),
            0x0D => Ok(Self::ObjectAlreadyExists),
            0x0E => Ok(Self::AttributeNotSettable),
            0x0F => Ok(Self::PrivilegeViolation),
            0x10 => Ok(Self::DeviceStateConflict),
            0x11 => Ok(Self::ReplyDataTooLarge),
            0x12 => Ok(Self::FragmentationOfPrimitive),
            0x13 => Ok(Self::NotEnoughData),
            0x14 => Ok(Self::AttributeNotSupported),
            0x15 => Ok(Self::TooMuchData),
            0x16 => Ok(Self::ObjectDoesNotExist),
            0x17 => Ok(Self::FragmentationNotInProgress),
            0x18 => Ok(Self::NoStoredAttributeData),
            0x19 => Ok(Self::StoreOperationFailure),
            0x1A => Ok(Self::RequestPacketTooLarge),
            0x1B => Ok(Self::ResponsePacketTooLarge),
            0x1C => Ok(Self::MissingAttributeListEntry),
            0x1D => Ok(Self::InvalidAttributeValueList),
            0x1E => Ok(Self::EmbeddedServiceError),
            0x1F => Ok(Self::VendorSpecificError),
            0x20 => Ok(Self::InvalidParameter),
            0x21 => Ok(Self::WriteOnceAlreadyWritten),
            0x22 => Ok(Self::InvalidReplyReceived),
            0x25 => Ok(Self::KeyFailureInPath),
            0x26 => Ok(Self::PathSizeInvalid),
            0x27 => Ok(Self::UnexpectedAttributeInList),
            0x28 => Ok(Self::InvalidMemberId),
            0x29 => Ok(Self::MemberNotSettable),
            _ => Err(EnipError::UnknownGeneralStatus(value)),
        }
    }

    /// Convert to the wire value.
    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Check for success.
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Check whether this status aborts the whole operation.
    ///
    /// A fatal status on one service inside a Multiple Service Packet
    /// still leaves sibling results valid; "fatal" classifies what the
    /// *caller* should do with the affected operation.
    #[inline]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailure | Self::ConnectionLost | Self::ReplyDataTooLarge
        )
    }

    /// Human-readable description of the status.
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::ConnectionFailure => "Connection failure",
            Self::ResourceUnavailable => "Resource unavailable",
            Self::InvalidParameterValue => "Invalid parameter value",
            Self::PathSegmentError => "Path segment error",
            Self::PathDestinationUnknown => "Path destination unknown",
            Self::PartialTransfer => "Partial transfer",
            Self::ConnectionLost => "Connection lost",
            Self::ServiceNotSupported => "Service not supported",
            Self::InvalidAttributeValue => "Invalid attribute value",
            Self::AttributeListError => "Attribute list error",
            Self::AlreadyInRequestedState => "Already in requested mode/state",
            Self::ObjectStateConflict => "Object state conflict",
            Self::ObjectAlreadyExists => "Object already exists",
            Self::AttributeNotSettable => "Attribute not settable",
            Self::PrivilegeViolation => "Privilege violation",
            Self::DeviceStateConflict => "Device state conflict",
            Self::ReplyDataTooLarge => "Reply data too large",
            Self::FragmentationOfPrimitive => "Fragmentation of a primitive value",
            Self::NotEnoughData => "Not enough data",
            Self::AttributeNotSupported => "Attribute not supported",
            Self::TooMuchData => "Too much data",
            Self::ObjectDoesNotExist => "Object does not exist",
            Self::FragmentationNotInProgress => {
                "Service fragmentation sequence not in progress"
            }
            Self::NoStoredAttributeData => "No stored attribute data",
            Self::StoreOperationFailure => "Store operation failure",
            Self::RequestPacketTooLarge => "Routing failure, request packet too large",
            Self::ResponsePacketTooLarge => "Routing failure, response packet too large",
            Self::MissingAttributeListEntry => "Missing attribute list entry data",
            Self::InvalidAttributeValueList => "Invalid attribute value list",
            Self::EmbeddedServiceError => "Embedded service error",
            Self::VendorSpecificError => "Vendor specific error",
            Self::InvalidParameter => "Invalid parameter",
            Self::WriteOnceAlreadyWritten => "Write-once value or medium already written",
            Self::InvalidReplyReceived => "Invalid reply received",
            Self::KeyFailureInPath => "Key failure in path",
            Self::PathSizeInvalid => "Path size invalid",
            Self::UnexpectedAttributeInList => "Unexpected attribute in list",
            Self::InvalidMemberId => "Invalid member ID",
            Self::MemberNotSettable => "Member not settable",
        }
    }
}

impl std::fmt::Display for GeneralStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (0x{:02X})", self.description(), self.as_u8())
    }
}

/// CIP message router request: `{service, request path, data}`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRouterRequest {
    /// Service code (request direction, bit 7 clear)
    pub service: u8,
    /// Request path addressing the target object or tag
    pub path: Epath,
    /// Service-specific data appended after the path
    pub data: Bytes,
}

impl MessageRouterRequest {
    /// Create a new request.
    pub fn new(service: u8, path: Epath, data: impl Into<Bytes>) -> Self {
        Self {
            service,
            path,
            data: data.into(),
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_size(&self) -> usize {
        2 + self.path.encoded_size() + self.data.len()
    }

    /// Encode into `buf`.
    ///
    /// Layout: `service u8, path_size_words u8, path bytes, data`.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        let path_bytes = self.path.to_bytes()?;
        buf.put_u8(self.service);
        buf.put_u8((path_bytes.len() / 2) as u8);
        buf.extend_from_slice(&path_bytes);
        buf.extend_from_slice(&self.data);
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }
}

/// Classification of a decoded CIP reply, resolved once at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    /// Single Service Packet reply (tag read/write, 0x4x range)
    SingleService,
    /// Multiple Service Packet reply (0x0A)
    MultipleService,
    /// Unconnected Send reply (0x52) carrying an embedded reply
    UnconnectedSend,
    /// Anything else: only status + raw remainder are exposed
    Generic,
}

/// CIP message router response envelope.
///
/// Wire layout: `service | 0x80, reserved, general_status, body...`.
/// The body handed to the next layer starts at the status byte, so the
/// per-service parsers see `{status, additional_status_size, ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRouterResponse {
    /// Service code with the reply flag cleared
    pub service: u8,
    /// Status byte onward; a non-success reply collapses to the status alone
    pub body: Bytes,
}

impl MessageRouterResponse {
    /// Parse a response envelope.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 3 {
            return Err(EnipError::TooShort {
                expected: 3,
                actual: buf.len(),
            });
        }
        if buf[0] & REPLY_FLAG == 0 {
            return Err(EnipError::invalid_cip(format!(
                "service byte 0x{:02X} has no reply flag",
                buf[0]
            )));
        }

        let service = buf[0] & !REPLY_FLAG;
        let status = buf[2];

        // On success the whole tail from the status byte onward is the
        // next layer's input; on failure only the status survives.
        let body = if status == 0 {
            Bytes::copy_from_slice(&buf[2..])
        } else {
            Bytes::copy_from_slice(&[status])
        };

        Ok(Self { service, body })
    }

    /// The general status byte.
    #[inline]
    pub fn status_byte(&self) -> u8 {
        self.body[0]
    }

    /// The general status, validated against the known table.
    pub fn status(&self) -> Result<GeneralStatus> {
        GeneralStatus::from_u8(self.status_byte())
    }

    /// Classify the reply by service code.
    pub fn kind(&self) -> ServiceKind {
        if self.service & 0xF0 == 0x40 {
            ServiceKind::SingleService
        } else if self.service == CipService::MultipleServicePacket.as_u8() {
            ServiceKind::MultipleService
        } else if self.service == CipService::UnconnectedSend.as_u8() {
            ServiceKind::UnconnectedSend
        } else {
            ServiceKind::Generic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PathSegment;

    #[test]
    fn test_service_codes() {
        assert_eq!(CipService::ReadTag.as_u8(), 0x4C);
        assert_eq!(CipService::WriteTag.as_u8(), 0x4D);
        assert_eq!(CipService::MultipleServicePacket.as_u8(), 0x0A);
        assert_eq!(CipService::UnconnectedSend.as_u8(), 0x52);
        assert_eq!(CipService::ReadTag.reply_code(), 0xCC);
        assert_eq!(CipService::WriteTag.reply_code(), 0xCD);
    }

    #[test]
    fn test_service_from_reply_code() {
        assert_eq!(CipService::from_u8(0xCC), Some(CipService::ReadTag));
        assert_eq!(CipService::from_u8(0xD2), Some(CipService::UnconnectedSend));
        assert_eq!(CipService::from_u8(0x7F), None);
    }

    #[test]
    fn test_general_status_table() {
        assert_eq!(GeneralStatus::from_u8(0x00).unwrap(), GeneralStatus::Success);
        assert_eq!(
            GeneralStatus::from_u8(0x04).unwrap(),
            GeneralStatus::PathSegmentError
        );
        assert_eq!(
            GeneralStatus::from_u8(0x16).unwrap(),
            GeneralStatus::ObjectDoesNotExist
        );
        assert!(GeneralStatus::from_u8(0x23).is_err());
        assert!(GeneralStatus::from_u8(0xFF).is_err());
    }

    #[test]
    fn test_general_status_classification() {
        assert!(GeneralStatus::Success.is_success());
        assert!(GeneralStatus::ConnectionFailure.is_fatal());
        assert!(GeneralStatus::ConnectionLost.is_fatal());
        assert!(GeneralStatus::ReplyDataTooLarge.is_fatal());
        assert!(!GeneralStatus::PathSegmentError.is_fatal());
    }

    #[test]
    fn test_request_encode() {
        let path = Epath::from_segments(vec![PathSegment::Symbol("Tag1".into())]);
        let req = MessageRouterRequest::new(0x4C, path, Bytes::from_static(&[0x01, 0x00]));
        let bytes = req.to_bytes().unwrap();

        // service, path words, [0x91, 4, 'T','a','g','1'], element count
        assert_eq!(
            &bytes[..],
            &[0x4C, 0x03, 0x91, 0x04, b'T', b'a', b'g', b'1', 0x01, 0x00]
        );
    }

    #[test]
    fn test_response_parse_success() {
        // ReadTag reply, status 0, DINT value 100
        let buf = [
            0xCC, 0x00, 0x00, 0x00, 0xC4, 0x00, 0x64, 0x00, 0x00, 0x00,
        ];
        let resp = MessageRouterResponse::parse(&buf).unwrap();
        assert_eq!(resp.service, 0x4C);
        assert_eq!(resp.kind(), ServiceKind::SingleService);
        assert_eq!(resp.status().unwrap(), GeneralStatus::Success);
        // Body starts at the status byte
        assert_eq!(resp.body[0], 0x00);
        assert_eq!(resp.body.len(), 8);
    }

    #[test]
    fn test_response_parse_error_collapses_body() {
        let buf = [0xCC, 0x00, 0x04, 0x01, 0xAA, 0xBB];
        let resp = MessageRouterResponse::parse(&buf).unwrap();
        assert_eq!(resp.status().unwrap(), GeneralStatus::PathSegmentError);
        assert_eq!(&resp.body[..], &[0x04]);
    }

    #[test]
    fn test_response_parse_rejects_request_direction() {
        let buf = [0x4C, 0x00, 0x00];
        assert!(MessageRouterResponse::parse(&buf).is_err());
    }

    #[test]
    fn test_response_parse_too_short() {
        assert!(MessageRouterResponse::parse(&[0xCC, 0x00]).is_err());
    }

    #[test]
    fn test_response_kind_dispatch() {
        let single = MessageRouterResponse::parse(&[0xCC, 0x00, 0x00]).unwrap();
        assert_eq!(single.kind(), ServiceKind::SingleService);

        let multi = MessageRouterResponse::parse(&[0x8A, 0x00, 0x00]).unwrap();
        assert_eq!(multi.kind(), ServiceKind::MultipleService);

        let ucmm = MessageRouterResponse::parse(&[0xD2, 0x00, 0x00]).unwrap();
        assert_eq!(ucmm.kind(), ServiceKind::UnconnectedSend);

        let generic = MessageRouterResponse::parse(&[0x8E, 0x00, 0x00]).unwrap();
        assert_eq!(generic.kind(), ServiceKind::Generic);
    }
}
