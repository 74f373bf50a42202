//! Error types for the EtherNet/IP protocol stack.

use thiserror::Error;

/// Result type alias for EtherNet/IP operations.
pub type Result<T> = std::result::Result<T, EnipError>;

/// EtherNet/IP protocol error types.
///
/// Structural decode failures, encode-time validation failures and
/// transport failures all live here. Non-success status codes reported
/// by the remote device are *not* errors: they are carried as data in
/// [`crate::types::EncapStatus`] and [`crate::types::GeneralStatus`] so
/// callers can decide per status whether to retry.
#[derive(Debug, Error)]
pub enum EnipError {
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Not connected to remote
    #[error("Not connected")]
    NotConnected,

    /// A connection attempt is already in progress or established
    #[error("Already connected")]
    AlreadyConnected,

    /// Connection timeout
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// No response arrived for an outstanding request
    #[error("Request timeout after {0} ms")]
    RequestTimeout(u64),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Buffer shorter than the structure it should contain
    #[error("Buffer too short: need {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum byte count the structure requires
        expected: usize,
        /// Byte count actually available
        actual: usize,
    },

    /// Declared length field disagrees with the trailing byte count
    #[error("Length mismatch: header declares {declared} bytes, buffer carries {actual}")]
    LengthMismatch {
        /// Length declared in the header
        declared: usize,
        /// Bytes actually present
        actual: usize,
    },

    /// Encapsulation command code outside the known table
    #[error("Unknown encapsulation command: 0x{0:04X}")]
    UnknownCommand(u16),

    /// Encapsulation status code outside the known table
    #[error("Unknown encapsulation status: 0x{0:08X}")]
    UnknownStatus(u32),

    /// CIP general status code outside the known table
    #[error("Unknown CIP general status: 0x{0:02X}")]
    UnknownGeneralStatus(u8),

    /// CIP data type code outside the known table
    #[error("Unknown CIP data type: 0x{0:04X}")]
    UnknownDataType(u16),

    /// The device answered with a non-success encapsulation status
    #[error("Device reported: {0}")]
    Device(crate::types::EncapStatus),

    /// Invalid frame format
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Invalid CIP payload
    #[error("Invalid CIP data: {0}")]
    InvalidCip(String),

    /// Encode-time validation failure; no bytes were produced
    #[error("Validation error: {0}")]
    Validation(String),

    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,

    /// Codec error
    #[error("Codec error: {0}")]
    Codec(String),
}

impl EnipError {
    /// Create an invalid frame error.
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    /// Create an invalid CIP data error.
    pub fn invalid_cip(msg: impl Into<String>) -> Self {
        Self::InvalidCip(msg.into())
    }

    /// Create an encode-time validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a connection error with a message.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Check if this error indicates a connection problem.
    ///
    /// Connection problems invalidate the session; the caller must
    /// reconnect (or let auto-reconnect do it) before retrying.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::NotConnected
                | Self::ConnectionTimeout
                | Self::Io(_)
                | Self::ChannelClosed
        )
    }

    /// Check if this error is retryable on the same connection.
    ///
    /// A request timeout means the request may or may not have reached
    /// the device; the session itself is still usable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RequestTimeout(_) | Self::ConnectionTimeout)
    }

    /// Check if this is a structural decode failure.
    ///
    /// Structural failures mean the peer sent bytes this stack cannot
    /// interpret; retrying the same request will not help.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::TooShort { .. }
                | Self::LengthMismatch { .. }
                | Self::UnknownCommand(_)
                | Self::UnknownStatus(_)
                | Self::UnknownGeneralStatus(_)
                | Self::UnknownDataType(_)
                | Self::InvalidFrame(_)
                | Self::InvalidCip(_)
        )
    }
}
