//! EtherNet/IP encapsulation frame.
//!
//! Every exchange on the TCP stream is one frame: a fixed 24-byte
//! header followed by command-specific data (CSD).
//!
//! ```text
//! +-----------+-----------+----------------+----------------+
//! | cmd u16   | len u16   | session u32    | status u32     |
//! +-----------+-----------+----------------+----------------+
//! | sender context u8[8]                   | options u32    |
//! +----------------------------------------+----------------+
//! | command-specific data (len bytes)                       |
//! +---------------------------------------------------------+
//! ```
//!
//! The CSD is resolved into a tagged union once, at decode time; callers
//! match on [`CommandSpecificData`] instead of re-checking command codes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{EnipError, Result};
use crate::types::{
    EncapCommand, EncapStatus, ListIdentityReply, ListServicesReply, RegisterSession, SendRRData,
};

/// Encapsulation header size in bytes.
pub const HEADER_SIZE: usize = 24;

/// Number of sender-context bytes the correlation token occupies.
const TOKEN_BYTES: usize = 5;

/// The fixed 24-byte encapsulation header.
///
/// The length field is wire-only: it is derived from the CSD on encode
/// and checked against it on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncapHeader {
    /// Encapsulation command
    pub command: EncapCommand,
    /// Session handle; 0 until a session is registered
    pub session_handle: u32,
    /// Status; always Success on requests
    pub status: EncapStatus,
    /// Opaque context echoed back by the device
    pub sender_context: [u8; 8],
    /// Options; always 0
    pub options: u32,
}

impl EncapHeader {
    /// Create a request header for `command`.
    pub fn request(command: EncapCommand, session_handle: u32) -> Self {
        Self {
            command,
            session_handle,
            status: EncapStatus::Success,
            sender_context: [0; 8],
            options: 0,
        }
    }

    /// Write the 40-bit correlation token into the low five context
    /// bytes (little-endian); the remaining three stay zero.
    pub fn set_token(&mut self, token: u64) {
        let bytes = token.to_le_bytes();
        self.sender_context = [0; 8];
        self.sender_context[..TOKEN_BYTES].copy_from_slice(&bytes[..TOKEN_BYTES]);
    }

    /// Read the 40-bit correlation token back out of the context.
    pub fn token(&self) -> u64 {
        let mut bytes = [0u8; 8];
        bytes[..TOKEN_BYTES].copy_from_slice(&self.sender_context[..TOKEN_BYTES]);
        u64::from_le_bytes(bytes)
    }

    /// Encode the header; `csd_len` becomes the declared length field.
    pub fn encode(&self, csd_len: usize, buf: &mut BytesMut) {
        buf.put_u16_le(self.command.as_u16());
        buf.put_u16_le(csd_len as u16);
        buf.put_u32_le(self.session_handle);
        buf.put_u32_le(self.status.as_u32());
        buf.extend_from_slice(&self.sender_context);
        buf.put_u32_le(self.options);
    }

    /// Parse a header, returning it and the declared CSD length.
    ///
    /// Unknown command or status values reject the frame here, before
    /// any payload interpretation.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        if buf.len() < HEADER_SIZE {
            return Err(EnipError::TooShort {
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }
        let command = EncapCommand::from_u16(u16::from_le_bytes([buf[0], buf[1]]))?;
        let length = u16::from_le_bytes([buf[2], buf[3]]) as usize;
        let session_handle = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let status = EncapStatus::from_u32(u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]))?;
        let mut sender_context = [0u8; 8];
        sender_context.copy_from_slice(&buf[12..20]);
        let options = u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]);

        Ok((
            Self {
                command,
                session_handle,
                status,
                sender_context,
                options,
            },
            length,
        ))
    }
}

/// Command-specific data, resolved by command code at decode time.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandSpecificData {
    /// RegisterSession request or reply payload
    RegisterSession(RegisterSession),
    /// ListIdentity reply payload
    ListIdentity(ListIdentityReply),
    /// ListServices reply payload
    ListServices(ListServicesReply),
    /// SendRRData request or reply payload
    SendRRData(SendRRData),
    /// No payload (NOP, UnRegisterSession, list requests)
    Empty,
    /// Payload carried but not interpreted (ListInterfaces,
    /// SendUnitData, IndicateStatus, NOP filler)
    Raw(Bytes),
}

impl CommandSpecificData {
    /// Resolve a payload against its command code.
    pub fn decode(command: EncapCommand, payload: &[u8]) -> Result<Self> {
        match command {
            EncapCommand::RegisterSession => {
                Ok(Self::RegisterSession(RegisterSession::parse(payload)?))
            }
            EncapCommand::ListIdentity if payload.is_empty() => Ok(Self::Empty),
            EncapCommand::ListIdentity => {
                Ok(Self::ListIdentity(ListIdentityReply::parse(payload)?))
            }
            EncapCommand::ListServices if payload.is_empty() => Ok(Self::Empty),
            EncapCommand::ListServices => {
                Ok(Self::ListServices(ListServicesReply::parse(payload)?))
            }
            EncapCommand::SendRRData => Ok(Self::SendRRData(SendRRData::parse(payload)?)),
            _ if payload.is_empty() => Ok(Self::Empty),
            _ => Ok(Self::Raw(Bytes::copy_from_slice(payload))),
        }
    }

    /// Encode the payload bytes.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        match self {
            Self::RegisterSession(csd) => csd.encode(buf)?,
            Self::ListIdentity(csd) => csd.encode(buf),
            Self::ListServices(csd) => csd.encode(buf),
            Self::SendRRData(csd) => csd.encode(buf)?,
            Self::Empty => {}
            Self::Raw(bytes) => buf.extend_from_slice(bytes),
        }
        Ok(())
    }

    /// Encoded payload size in bytes.
    pub fn encoded_size(&self) -> usize {
        match self {
            Self::RegisterSession(csd) => csd.encoded_size(),
            Self::ListIdentity(csd) => csd.encoded_size(),
            Self::ListServices(csd) => csd.encoded_size(),
            Self::SendRRData(csd) => csd.encoded_size(),
            Self::Empty => 0,
            Self::Raw(bytes) => bytes.len(),
        }
    }
}

/// A complete encapsulation frame.
#[derive(Debug, Clone, PartialEq)]
pub struct EncapFrame {
    /// The 24-byte header
    pub header: EncapHeader,
    /// The command-specific data
    pub csd: CommandSpecificData,
}

impl EncapFrame {
    /// Build a RegisterSession request (protocol version 1).
    pub fn register_session() -> Self {
        Self {
            header: EncapHeader::request(EncapCommand::RegisterSession, 0),
            csd: CommandSpecificData::RegisterSession(RegisterSession::new()),
        }
    }

    /// Build an UnRegisterSession request.
    pub fn unregister_session(session_handle: u32) -> Self {
        Self {
            header: EncapHeader::request(EncapCommand::UnRegisterSession, session_handle),
            csd: CommandSpecificData::Empty,
        }
    }

    /// Build a ListIdentity request.
    pub fn list_identity() -> Self {
        Self {
            header: EncapHeader::request(EncapCommand::ListIdentity, 0),
            csd: CommandSpecificData::Empty,
        }
    }

    /// Build a ListServices request.
    pub fn list_services() -> Self {
        Self {
            header: EncapHeader::request(EncapCommand::ListServices, 0),
            csd: CommandSpecificData::Empty,
        }
    }

    /// Build a NOP keep-alive.
    pub fn nop() -> Self {
        Self {
            header: EncapHeader::request(EncapCommand::Nop, 0),
            csd: CommandSpecificData::Empty,
        }
    }

    /// Build a SendRRData request carrying a CIP payload.
    pub fn send_rr_data(session_handle: u32, cip_payload: impl Into<Bytes>) -> Self {
        Self {
            header: EncapHeader::request(EncapCommand::SendRRData, session_handle),
            csd: CommandSpecificData::SendRRData(SendRRData::unconnected(cip_payload)),
        }
    }

    /// Encode the frame into `buf`.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        let mut csd = BytesMut::with_capacity(self.csd.encoded_size());
        self.csd.encode(&mut csd)?;
        buf.reserve(HEADER_SIZE + csd.len());
        self.header.encode(csd.len(), buf);
        buf.extend_from_slice(&csd);
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + self.csd.encoded_size());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Parse one complete frame.
    ///
    /// The buffer must hold exactly the header plus the declared CSD
    /// length; anything else is a length mismatch. A non-success status
    /// does not abort the parse - it is data the caller must check.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        let (header, declared_len) = EncapHeader::parse(buf)?;
        let payload = &buf[HEADER_SIZE..];
        if payload.len() != declared_len {
            return Err(EnipError::LengthMismatch {
                declared: declared_len,
                actual: payload.len(),
            });
        }
        let csd = CommandSpecificData::decode(header.command, payload)?;
        Ok(Self { header, csd })
    }

    /// The encapsulation status reported in the header.
    #[inline]
    pub fn status(&self) -> EncapStatus {
        self.header.status
    }

    /// Check whether this frame is a RegisterSession frame.
    #[inline]
    pub fn is_register_session(&self) -> bool {
        self.header.command == EncapCommand::RegisterSession
    }

    /// The RegisterSession payload, when this frame carries one.
    pub fn as_register_session(&self) -> Option<&RegisterSession> {
        match &self.csd {
            CommandSpecificData::RegisterSession(csd) => Some(csd),
            _ => None,
        }
    }

    /// Check whether this frame is a ListIdentity frame.
    #[inline]
    pub fn is_list_identity(&self) -> bool {
        self.header.command == EncapCommand::ListIdentity
    }

    /// The ListIdentity reply, when this frame carries one.
    pub fn as_list_identity(&self) -> Option<&ListIdentityReply> {
        match &self.csd {
            CommandSpecificData::ListIdentity(csd) => Some(csd),
            _ => None,
        }
    }

    /// Check whether this frame is a ListServices frame.
    #[inline]
    pub fn is_list_services(&self) -> bool {
        self.header.command == EncapCommand::ListServices
    }

    /// The ListServices reply, when this frame carries one.
    pub fn as_list_services(&self) -> Option<&ListServicesReply> {
        match &self.csd {
            CommandSpecificData::ListServices(csd) => Some(csd),
            _ => None,
        }
    }

    /// Check whether this frame is a SendRRData frame.
    #[inline]
    pub fn is_send_rr_data(&self) -> bool {
        self.header.command == EncapCommand::SendRRData
    }

    /// The SendRRData payload, when this frame carries one.
    pub fn as_send_rr_data(&self) -> Option<&SendRRData> {
        match &self.csd {
            CommandSpecificData::SendRRData(csd) => Some(csd),
            _ => None,
        }
    }
}

impl std::fmt::Display for EncapFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} session=0x{:08X} status={}",
            self.header.command, self.header.session_handle, self.header.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_session_golden_bytes() {
        let frame = EncapFrame::register_session();
        let bytes = frame.to_bytes().unwrap();

        assert_eq!(bytes.len(), 28);
        // Command 0x0065, CSD length 4
        assert_eq!(&bytes[..4], &[0x65, 0x00, 0x04, 0x00]);
        // Session, status, context, options all zero
        assert!(bytes[4..24].iter().all(|b| *b == 0));
        // CSD: protocol version 1, options 0
        assert_eq!(&bytes[24..], &[0x01, 0x00, 0x00, 0x00]);

        let decoded = EncapFrame::parse(&bytes).unwrap();
        let csd = decoded.as_register_session().unwrap();
        assert_eq!(csd.protocol_version, 1);
        assert_eq!(csd.option_flags, 0);
    }

    #[test]
    fn test_register_reply_capture() {
        // RegisterSession reply as a CompactLogix answers it: handle
        // assigned, context echoed back.
        let bytes = hex::decode(concat!(
            "65000400",         // command 0x0065, length 4
            "0100be05",         // session handle
            "00000000",         // status success
            "a1b2c3d4e5000000", // sender context
            "00000000",         // options
            "01000000",         // protocol version 1, options 0
        ))
        .unwrap();

        let frame = EncapFrame::parse(&bytes).unwrap();
        assert_eq!(frame.header.command, EncapCommand::RegisterSession);
        assert_eq!(frame.header.session_handle, 0x05BE_0001);
        assert_eq!(frame.header.token(), 0x00E5_D4C3_B2A1);
        assert!(frame.status().is_success());
        assert!(frame.as_register_session().unwrap().is_protocol_supported());
    }

    #[test]
    fn test_header_too_short() {
        let err = EncapFrame::parse(&[0u8; 23]).unwrap_err();
        assert!(matches!(
            err,
            EnipError::TooShort {
                expected: 24,
                actual: 23
            }
        ));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let frame = EncapFrame::register_session();
        let mut bytes = frame.to_bytes().unwrap().to_vec();
        // Declare 4 CSD bytes but truncate to 2
        bytes.truncate(26);
        assert!(matches!(
            EncapFrame::parse(&bytes),
            Err(EnipError::LengthMismatch {
                declared: 4,
                actual: 2
            })
        ));

        // A 24-byte buffer declaring a payload fails the same way
        let mut bytes = frame.to_bytes().unwrap().to_vec();
        bytes.truncate(24);
        assert!(matches!(
            EncapFrame::parse(&bytes),
            Err(EnipError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_unknown_command_rejected() {
        let mut bytes = EncapFrame::nop().to_bytes().unwrap().to_vec();
        bytes[0] = 0x99;
        assert!(matches!(
            EncapFrame::parse(&bytes),
            Err(EnipError::UnknownCommand(0x0099))
        ));
    }

    #[test]
    fn test_unknown_status_rejected() {
        let mut bytes = EncapFrame::nop().to_bytes().unwrap().to_vec();
        bytes[8] = 0x42;
        assert!(matches!(
            EncapFrame::parse(&bytes),
            Err(EnipError::UnknownStatus(0x42))
        ));
    }

    #[test]
    fn test_nonzero_status_is_data_not_error() {
        let mut bytes = EncapFrame::unregister_session(0x1122).to_bytes().unwrap().to_vec();
        bytes[8] = 0x64; // InvalidSessionHandle
        let frame = EncapFrame::parse(&bytes).unwrap();
        assert_eq!(frame.status(), EncapStatus::InvalidSessionHandle);
    }

    #[test]
    fn test_token_roundtrip() {
        let mut header = EncapHeader::request(EncapCommand::SendRRData, 1);
        let token = 0x00FF_1234_5678u64;
        header.set_token(token);
        assert_eq!(header.token(), token);
        // Only the low five bytes are used
        assert_eq!(header.sender_context[5..], [0, 0, 0]);

        // Survives the wire
        let frame = EncapFrame {
            header,
            csd: CommandSpecificData::Empty,
        };
        let decoded = EncapFrame::parse(&frame.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.header.token(), token);
    }

    #[test]
    fn test_token_masks_to_40_bits() {
        let mut header = EncapHeader::request(EncapCommand::SendRRData, 1);
        header.set_token(0xAABB_CCDD_EEFF_1122);
        assert_eq!(header.token(), 0x00DD_EEFF_1122);
    }

    #[test]
    fn test_send_rr_data_frame_roundtrip() {
        let frame = EncapFrame::send_rr_data(0xCAFE_F00D, Bytes::from_static(&[0x4C, 0x00]));
        let bytes = frame.to_bytes().unwrap();
        assert_eq!(u16::from_le_bytes([bytes[0], bytes[1]]), 0x006F);
        assert_eq!(
            u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            0xCAFE_F00D
        );

        let decoded = EncapFrame::parse(&bytes).unwrap();
        assert_eq!(decoded, frame);
        let csd = decoded.as_send_rr_data().unwrap();
        assert_eq!(&csd.cip_payload[..], &[0x4C, 0x00]);
    }

    #[test]
    fn test_empty_command_frames() {
        for frame in [
            EncapFrame::nop(),
            EncapFrame::list_identity(),
            EncapFrame::list_services(),
            EncapFrame::unregister_session(7),
        ] {
            let bytes = frame.to_bytes().unwrap();
            assert_eq!(bytes.len(), 24);
            let decoded = EncapFrame::parse(&bytes).unwrap();
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn test_dispatch_accessors_absent_on_mismatch() {
        let frame = EncapFrame::register_session();
        assert!(frame.is_register_session());
        assert!(frame.as_register_session().is_some());
        assert!(!frame.is_send_rr_data());
        assert!(frame.as_send_rr_data().is_none());
        assert!(frame.as_list_identity().is_none());
        assert!(frame.as_list_services().is_none());
    }
}
