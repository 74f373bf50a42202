//! ListIdentity command-specific data.
//!
//! The request carries no payload. The reply is a counted item list in
//! which only item type 0x0C (CIP Identity) is interpreted; other item
//! types are skipped by their declared length. The socket address block
//! inside the identity item is big-endian (it is a BSD `sockaddr_in`),
//! while the CIP fields around it stay little-endian.

use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};

use crate::error::{EnipError, Result};

/// CPF item type of a CIP Identity entry.
pub const IDENTITY_ITEM_TYPE: u16 = 0x000C;

/// A decoded CIP Identity item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityItem {
    /// Encapsulation protocol version the device speaks
    pub encap_version: u16,
    /// Socket address family (big-endian on the wire, normally 2 = AF_INET)
    pub socket_family: i16,
    /// UDP/TCP port the device answers on (big-endian)
    pub socket_port: u16,
    /// Device IP address (big-endian)
    pub socket_addr: Ipv4Addr,
    /// ODVA vendor id
    pub vendor_id: u16,
    /// CIP device type
    pub device_type: u16,
    /// Vendor-assigned product code
    pub product_code: u16,
    /// Major revision
    pub revision_major: u8,
    /// Minor revision
    pub revision_minor: u8,
    /// Device status word
    pub status: u16,
    /// Device serial number
    pub serial_number: u32,
    /// Counted ASCII product name
    pub product_name: String,
    /// Device state
    pub state: u8,
}

impl IdentityItem {
    /// Revision as the conventional `"major.minor"` string.
    pub fn revision(&self) -> String {
        format!("{}.{}", self.revision_major, self.revision_minor)
    }

    /// Parse an identity item payload.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        // Fixed part up to the product name length byte
        if buf.len() < 33 {
            return Err(EnipError::TooShort {
                expected: 33,
                actual: buf.len(),
            });
        }

        let encap_version = u16::from_le_bytes([buf[0], buf[1]]);
        let socket_family = i16::from_be_bytes([buf[2], buf[3]]);
        let socket_port = u16::from_be_bytes([buf[4], buf[5]]);
        let socket_addr = Ipv4Addr::new(buf[6], buf[7], buf[8], buf[9]);
        // buf[10..18] is the sockaddr zero pad
        let vendor_id = u16::from_le_bytes([buf[18], buf[19]]);
        let device_type = u16::from_le_bytes([buf[20], buf[21]]);
        let product_code = u16::from_le_bytes([buf[22], buf[23]]);
        let revision_major = buf[24];
        let revision_minor = buf[25];
        let status = u16::from_le_bytes([buf[26], buf[27]]);
        let serial_number = u32::from_le_bytes([buf[28], buf[29], buf[30], buf[31]]);

        let name_len = buf[32] as usize;
        if buf.len() < 33 + name_len + 1 {
            return Err(EnipError::TooShort {
                expected: 33 + name_len + 1,
                actual: buf.len(),
            });
        }
        let name_bytes = &buf[33..33 + name_len];
        let product_name = std::str::from_utf8(name_bytes)
            .map_err(|_| EnipError::invalid_frame("Product name is not ASCII"))?
            .to_owned();
        let state = buf[33 + name_len];

        Ok(Self {
            encap_version,
            socket_family,
            socket_port,
            socket_addr,
            vendor_id,
            device_type,
            product_code,
            revision_major,
            revision_minor,
            status,
            serial_number,
            product_name,
            state,
        })
    }

    /// Encoded payload size in bytes.
    pub fn encoded_size(&self) -> usize {
        33 + self.product_name.len() + 1
    }

    /// Encode the identity item payload.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.encap_version);
        buf.put_i16(self.socket_family);
        buf.put_u16(self.socket_port);
        buf.extend_from_slice(&self.socket_addr.octets());
        buf.put_bytes(0x00, 8);
        buf.put_u16_le(self.vendor_id);
        buf.put_u16_le(self.device_type);
        buf.put_u16_le(self.product_code);
        buf.put_u8(self.revision_major);
        buf.put_u8(self.revision_minor);
        buf.put_u16_le(self.status);
        buf.put_u32_le(self.serial_number);
        buf.put_u8(self.product_name.len() as u8);
        buf.extend_from_slice(self.product_name.as_bytes());
        buf.put_u8(self.state);
    }
}

impl std::fmt::Display for IdentityItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (vendor {}, product {}, rev {}) at {}:{}",
            self.product_name,
            self.vendor_id,
            self.product_code,
            self.revision(),
            self.socket_addr,
            self.socket_port
        )
    }
}

/// Decoded ListIdentity reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListIdentityReply {
    /// Identity items in wire order; unknown item types are dropped
    pub items: Vec<IdentityItem>,
}

impl ListIdentityReply {
    /// Parse a ListIdentity reply payload.
    ///
    /// Unknown item types are skipped by their declared length without
    /// failing the parse; a truncated item header or payload does fail.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 2 {
            return Err(EnipError::TooShort {
                expected: 2,
                actual: buf.len(),
            });
        }
        let item_count = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        let mut offset = 2;
        let mut items = Vec::new();

        for _ in 0..item_count {
            if buf.len() < offset + 4 {
                return Err(EnipError::TooShort {
                    expected: offset + 4,
                    actual: buf.len(),
                });
            }
            let type_code = u16::from_le_bytes([buf[offset], buf[offset + 1]]);
            let item_len = u16::from_le_bytes([buf[offset + 2], buf[offset + 3]]) as usize;
            offset += 4;

            if buf.len() < offset + item_len {
                return Err(EnipError::TooShort {
                    expected: offset + item_len,
                    actual: buf.len(),
                });
            }

            if type_code == IDENTITY_ITEM_TYPE {
                items.push(IdentityItem::parse(&buf[offset..offset + item_len])?);
            }
            offset += item_len;
        }

        Ok(Self { items })
    }

    /// Encode a reply payload (counted item list).
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.items.len() as u16);
        for item in &self.items {
            buf.put_u16_le(IDENTITY_ITEM_TYPE);
            buf.put_u16_le(item.encoded_size() as u16);
            item.encode(buf);
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_size(&self) -> usize {
        2 + self
            .items
            .iter()
            .map(|i| 4 + i.encoded_size())
            .sum::<usize>()
    }
}
