//! CIP response drilling.
//!
//! A SendRRData reply carries a CIP payload that may be a single tag
//! reply, a Multiple Service Packet of replies, or an Unconnected Send
//! envelope around either. [`parse_rr_response`] walks the layers and
//! flattens whatever it finds into per-tag [`TagResult`]s.
//!
//! Per-tag status errors (a missing tag, a path error) are data in the
//! results; only structurally broken bytes fail the parse, and the error
//! names the failing sub-service.

use bytes::Bytes;

use crate::error::{EnipError, Result};
use crate::types::{
    CipValue, GeneralStatus, MessageRouterResponse, MultipleServiceReply, SendRRData, ServiceKind,
    ServiceReply,
};

/// The outcome of one tag operation.
#[derive(Debug, Clone, PartialEq)]
pub struct TagResult {
    /// CIP general status for this tag
    pub status: GeneralStatus,
    /// Decoded value for successful reads; `None` for writes and errors
    pub value: Option<CipValue>,
    /// The raw CIP generic data behind `value`
    pub raw: Bytes,
}

impl TagResult {
    /// Check for success.
    #[inline]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Check whether the operation is worth retrying as-is.
    ///
    /// Fatal statuses ([`GeneralStatus::is_fatal`]) condemn the whole
    /// exchange; anything else failed for this tag alone.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.status.is_fatal()
    }

    fn from_reply(reply: ServiceReply, decode_value: bool) -> Result<Self> {
        let value = if decode_value && reply.is_status_success() && !reply.data.is_empty() {
            Some(CipValue::decode(&reply.data)?)
        } else {
            None
        };
        Ok(Self {
            status: reply.status,
            value,
            raw: reply.data,
        })
    }
}

/// Parse the CIP payload of a SendRRData reply into tag results.
pub fn parse_rr_response(csd: &SendRRData) -> Result<Vec<TagResult>> {
    let response = MessageRouterResponse::parse(&csd.cip_payload)?;
    drill(response)
}

/// Recursively unwrap a message router response into tag results.
fn drill(response: MessageRouterResponse) -> Result<Vec<TagResult>> {
    match response.kind() {
        ServiceKind::SingleService => {
            let reply = ServiceReply::parse(&response.body)?;
            Ok(vec![TagResult::from_reply(reply, true)?])
        }

        ServiceKind::MultipleService => {
            // A non-success envelope collapsed to its status byte at the
            // message layer; there are no per-service slices to walk.
            if response.status_byte() != 0 {
                let reply = ServiceReply::parse(&response.body)?;
                return TagResult::from_reply(reply, false).map(|r| vec![r]);
            }
            let batch = MultipleServiceReply::parse(&response.body)?;
            let count = batch.replies.len();
            batch
                .replies
                .into_iter()
                .enumerate()
                .map(|(i, reply)| {
                    TagResult::from_reply(reply, true).map_err(|e| {
                        EnipError::invalid_cip(format!("Service {} of {}: {}", i, count, e))
                    })
                })
                .collect()
        }

        // The device strips the Unconnected Send wrapper on success, but
        // an error reply can still come back under the 0x52 envelope
        // carrying the embedded reply behind it.
        ServiceKind::UnconnectedSend => {
            let reply = ServiceReply::parse(&response.body)?;
            if reply.is_status_success() && !reply.data.is_empty() {
                let inner = MessageRouterResponse::parse(&reply.data)?;
                drill(inner)
            } else {
                TagResult::from_reply(reply, false).map(|r| vec![r])
            }
        }

        // Unrecognized services expose status and raw remainder only.
        ServiceKind::Generic => {
            let reply = ServiceReply::parse(&response.body)?;
            TagResult::from_reply(reply, false).map(|r| vec![r])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CipDataType;

    fn rr(payload: &[u8]) -> SendRRData {
        SendRRData::unconnected(Bytes::copy_from_slice(payload))
    }

    #[test]
    fn test_single_read_reply() {
        let results = parse_rr_response(&rr(&[
            0xCC, 0x00, 0x00, 0x00, 0xC4, 0x00, 0x01, 0x00, 0x64, 0x00, 0x00, 0x00,
        ]))
        .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_success());
        assert_eq!(results[0].value, Some(CipValue::Dint(100)));
    }

    #[test]
    fn test_single_write_reply_has_no_value() {
        let results = parse_rr_response(&rr(&[0xCD, 0x00, 0x00, 0x00])).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_success());
        assert_eq!(results[0].value, None);
    }

    #[test]
    fn test_single_error_reply() {
        let results = parse_rr_response(&rr(&[0xCC, 0x00, 0x04, 0x01])).unwrap();
        assert_eq!(results[0].status, GeneralStatus::PathSegmentError);
        assert_eq!(results[0].value, None);
        assert!(!results[0].is_fatal());
    }

    #[test]
    fn test_fatal_status_classified() {
        let results = parse_rr_response(&rr(&[0xCC, 0x00, 0x01, 0x00])).unwrap();
        assert_eq!(results[0].status, GeneralStatus::ConnectionFailure);
        assert!(results[0].is_fatal());
    }

    #[test]
    fn test_multiple_reply_mixed_statuses() {
        // Two replies: a successful INT read and a path segment error.
        let mut payload = vec![0x8A, 0x00, 0x00, 0x00];
        payload.extend_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&6u16.to_le_bytes());
        payload.extend_from_slice(&16u16.to_le_bytes());
        payload.extend_from_slice(&[0xCC, 0x00, 0x00, 0x00, 0xC3, 0x00, 0x01, 0x00, 0x2A, 0x00]);
        payload.extend_from_slice(&[0xCC, 0x00, 0x04, 0x01]);

        let results = parse_rr_response(&rr(&payload)).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].value, Some(CipValue::Int(42)));
        assert_eq!(results[1].status, GeneralStatus::PathSegmentError);
        assert_eq!(results[1].value, None);
    }

    #[test]
    fn test_multiple_reply_failed_envelope() {
        // The whole batch was rejected; the envelope status is all that
        // comes back.
        let results = parse_rr_response(&rr(&[0x8A, 0x00, 0x1E, 0x00])).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, GeneralStatus::EmbeddedServiceError);
        assert_eq!(results[0].value, None);
    }

    #[test]
    fn test_unconnected_send_envelope_unwrapped() {
        // A 0xD2 envelope carrying an embedded read reply.
        let mut payload = vec![0xD2, 0x00, 0x00, 0x00];
        payload.extend_from_slice(&[0xCC, 0x00, 0x00, 0x00, 0xC1, 0x00, 0x01, 0x00, 0x01]);

        let results = parse_rr_response(&rr(&payload)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value, Some(CipValue::Bool(true)));
    }

    #[test]
    fn test_unconnected_send_error_reply() {
        let results = parse_rr_response(&rr(&[0xD2, 0x00, 0x01, 0x00])).unwrap();
        assert_eq!(results[0].status, GeneralStatus::ConnectionFailure);
        assert_eq!(results[0].value, None);
    }

    #[test]
    fn test_generic_reply_raw_only() {
        // Get_Attributes_All reply: status + attribute bytes, no value
        // interpretation.
        let results =
            parse_rr_response(&rr(&[0x81, 0x00, 0x00, 0x00, 0x01, 0x00, 0x0E, 0x00])).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_success());
        assert_eq!(results[0].value, None);
        assert_eq!(&results[0].raw[..], &[0x01, 0x00, 0x0E, 0x00]);
    }

    #[test]
    fn test_bad_value_bytes_fail_with_position() {
        // Multiple reply whose second slice declares an unknown type.
        let mut payload = vec![0x8A, 0x00, 0x00, 0x00];
        payload.extend_from_slice(&2u16.to_le_bytes());
        payload.extend_from_slice(&6u16.to_le_bytes());
        payload.extend_from_slice(&16u16.to_le_bytes());
        payload.extend_from_slice(&[0xCC, 0x00, 0x00, 0x00, 0xC3, 0x00, 0x2A, 0x00, 0x00, 0x00]);
        payload.extend_from_slice(&[0xCC, 0x00, 0x00, 0x00, 0xC9, 0x00, 0x00, 0x00]);

        let err = parse_rr_response(&rr(&payload)).unwrap_err();
        assert!(err.to_string().contains("Service 1 of 2"));
    }

    #[test]
    fn test_empty_payload_fails() {
        assert!(parse_rr_response(&rr(&[])).is_err());
    }

    #[test]
    fn test_roundtrip_against_encoder() {
        // Drilling understands what the write path emits.
        let value = CipValue::from_numeric(CipDataType::Udint, 255).unwrap();
        let mut reply = vec![0xCC, 0x00, 0x00, 0x00];
        reply.extend_from_slice(&value.to_bytes());
        let results = parse_rr_response(&rr(&reply)).unwrap();
        assert_eq!(results[0].value, Some(value));
    }
}
