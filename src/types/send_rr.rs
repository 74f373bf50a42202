//! SendRRData command-specific data.
//!
//! SendRRData carries one unconnected CIP request or reply through the
//! Common Packet Format:
//!
//! ```text
//! +------------------+-------------+------------+-------------------+---------+
//! | interface u32    | timeout u16 | count u16  | items {id,len}xN  | payload |
//! +------------------+-------------+------------+-------------------+---------+
//! ```
//!
//! Requests always carry exactly two item descriptors, a Null Address
//! item and an Unconnected Data item whose length covers the trailing
//! CIP payload. Replies are decoded generically, but only the trailing
//! payload is interpreted further.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{EnipError, Result};

/// CPF item type: Null Address (unconnected messages carry no address).
pub const ITEM_NULL_ADDRESS: u16 = 0x0000;

/// CPF item type: Unconnected Data.
pub const ITEM_UNCONNECTED_DATA: u16 = 0x00B2;

/// Interface handle selecting CIP.
pub const INTERFACE_CIP: u32 = 0;

/// One Common Packet Format item descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpfItem {
    /// Item type id
    pub type_id: u16,
    /// Declared data length in bytes
    pub length: u16,
}

/// SendRRData command-specific data.
#[derive(Debug, Clone, PartialEq)]
pub struct SendRRData {
    /// Interface handle; 0 selects CIP
    pub interface_handle: u32,
    /// Request timeout in seconds; 0 lets the CIP layer's ticks govern
    pub timeout: u16,
    /// Item descriptor list
    pub items: Vec<CpfItem>,
    /// The CIP request or reply bytes after the descriptors
    pub cip_payload: Bytes,
}

impl SendRRData {
    /// Wrap a CIP payload for an unconnected request.
    pub fn unconnected(cip_payload: impl Into<Bytes>) -> Self {
        let cip_payload = cip_payload.into();
        Self {
            interface_handle: INTERFACE_CIP,
            timeout: 0,
            items: vec![
                CpfItem {
                    type_id: ITEM_NULL_ADDRESS,
                    length: 0,
                },
                CpfItem {
                    type_id: ITEM_UNCONNECTED_DATA,
                    length: cip_payload.len() as u16,
                },
            ],
            cip_payload,
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_size(&self) -> usize {
        8 + 4 * self.items.len() + self.cip_payload.len()
    }

    /// Encode into `buf`.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<()> {
        if self.items.len() != 2
            || self.items[0].type_id != ITEM_NULL_ADDRESS
            || self.items[1].type_id != ITEM_UNCONNECTED_DATA
        {
            return Err(EnipError::validation(
                "SendRRData requests carry exactly a Null Address and an Unconnected Data item",
            ));
        }
        if self.items[1].length as usize != self.cip_payload.len() {
            return Err(EnipError::validation(format!(
                "Unconnected Data item declares {} bytes but the payload is {}",
                self.items[1].length,
                self.cip_payload.len()
            )));
        }

        buf.put_u32_le(self.interface_handle);
        buf.put_u16_le(self.timeout);
        buf.put_u16_le(self.items.len() as u16);
        for item in &self.items {
            buf.put_u16_le(item.type_id);
            buf.put_u16_le(item.length);
        }
        buf.extend_from_slice(&self.cip_payload);
        Ok(())
    }

    /// Parse from bytes.
    ///
    /// The descriptor list is reconstructed generically; whatever
    /// follows it is kept as the CIP payload.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 8 {
            return Err(EnipError::TooShort {
                expected: 8,
                actual: buf.len(),
            });
        }
        let interface_handle = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let timeout = u16::from_le_bytes([buf[4], buf[5]]);
        let item_count = u16::from_le_bytes([buf[6], buf[7]]) as usize;

        let descriptors_end = 8 + 4 * item_count;
        if buf.len() < descriptors_end {
            return Err(EnipError::TooShort {
                expected: descriptors_end,
                actual: buf.len(),
            });
        }

        let mut items = Vec::with_capacity(item_count);
        for i in 0..item_count {
            let at = 8 + 4 * i;
            items.push(CpfItem {
                type_id: u16::from_le_bytes([buf[at], buf[at + 1]]),
                length: u16::from_le_bytes([buf[at + 2], buf[at + 3]]),
            });
        }

        Ok(Self {
            interface_handle,
            timeout,
            items,
            cip_payload: Bytes::copy_from_slice(&buf[descriptors_end..]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconnected_encode_layout() {
        let csd = SendRRData::unconnected(Bytes::from_static(&[0x4C, 0x02, 0x20, 0x02]));
        let mut buf = BytesMut::new();
        csd.encode(&mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[
                0x00, 0x00, 0x00, 0x00, // interface handle: CIP
                0x00, 0x00, // timeout
                0x02, 0x00, // two items
                0x00, 0x00, 0x00, 0x00, // null address
                0xB2, 0x00, 0x04, 0x00, // unconnected data, 4 bytes
                0x4C, 0x02, 0x20, 0x02, // CIP payload
            ]
        );
        assert_eq!(buf.len(), csd.encoded_size());
    }

    #[test]
    fn test_roundtrip() {
        let csd = SendRRData::unconnected(Bytes::from_static(&[0xCC, 0x00, 0x00, 0x00, 0xC1]));
        let mut buf = BytesMut::new();
        csd.encode(&mut buf).unwrap();
        let decoded = SendRRData::parse(&buf).unwrap();
        assert_eq!(decoded, csd);
    }

    #[test]
    fn test_encode_rejects_wrong_items() {
        let mut csd = SendRRData::unconnected(Bytes::from_static(&[0x01]));
        csd.items.truncate(1);
        let mut buf = BytesMut::new();
        assert!(csd.encode(&mut buf).is_err());
    }

    #[test]
    fn test_encode_rejects_length_mismatch() {
        let mut csd = SendRRData::unconnected(Bytes::from_static(&[0x01, 0x02]));
        csd.items[1].length = 5;
        let mut buf = BytesMut::new();
        assert!(csd.encode(&mut buf).is_err());
    }

    #[test]
    fn test_parse_generic_items() {
        // A connected-style reply with an address item carrying data is
        // still decodable; the payload is just the trailing bytes.
        let mut buf = BytesMut::new();
        buf.put_u32_le(0);
        buf.put_u16_le(0);
        buf.put_u16_le(2);
        buf.put_u16_le(0x00A1); // connected address item
        buf.put_u16_le(4);
        buf.put_u16_le(0x00B1); // connected data item
        buf.put_u16_le(2);
        buf.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02]);

        let decoded = SendRRData::parse(&buf).unwrap();
        assert_eq!(decoded.items.len(), 2);
        assert_eq!(decoded.items[0].type_id, 0x00A1);
        assert_eq!(&decoded.cip_payload[..], &[0xDE, 0xAD, 0xBE, 0xEF, 0x01, 0x02]);
    }

    #[test]
    fn test_parse_too_short() {
        assert!(SendRRData::parse(&[0x00; 7]).is_err());
        // Declares two items but has no descriptor bytes
        let mut buf = BytesMut::new();
        buf.put_u32_le(0);
        buf.put_u16_le(0);
        buf.put_u16_le(2);
        assert!(SendRRData::parse(&buf).is_err());
    }

    #[test]
    fn test_empty_payload() {
        let csd = SendRRData::unconnected(Bytes::new());
        let mut buf = BytesMut::new();
        csd.encode(&mut buf).unwrap();
        let decoded = SendRRData::parse(&buf).unwrap();
        assert!(decoded.cip_payload.is_empty());
    }
}
