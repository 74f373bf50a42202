//! ListServices command-specific data.
//!
//! The request carries no payload. The reply lists the encapsulation
//! services the device offers; in practice a single "Communications"
//! entry whose capability flags announce TCP (bit 5) and UDP (bit 8)
//! transport support. Unlike ListIdentity, a malformed entry here aborts
//! the whole parse.

use bytes::{BufMut, BytesMut};

use crate::error::{EnipError, Result};

/// Capability flag: CIP encapsulated over TCP.
pub const CAPABILITY_CIP_TCP: u16 = 1 << 5;

/// Capability flag: CIP transport class 0/1 over UDP.
pub const CAPABILITY_CIP_UDP: u16 = 1 << 8;

/// Fixed width of the service name field.
const NAME_FIELD_LEN: usize = 16;

/// One announced encapsulation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceItem {
    /// CPF item type of the entry
    pub type_code: u16,
    /// Encapsulation protocol version
    pub encap_version: u16,
    /// Capability flags
    pub capability_flags: u16,
    /// Service name, trimmed of the fixed field's trailing garbage
    pub name: String,
}

impl ServiceItem {
    /// Check whether the service speaks CIP over TCP.
    #[inline]
    pub const fn supports_cip_tcp(&self) -> bool {
        self.capability_flags & CAPABILITY_CIP_TCP != 0
    }

    /// Check whether the service speaks CIP class 0/1 over UDP.
    #[inline]
    pub const fn supports_cip_udp(&self) -> bool {
        self.capability_flags & CAPABILITY_CIP_UDP != 0
    }
}

/// Decoded ListServices reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListServicesReply {
    /// Announced services in wire order
    pub services: Vec<ServiceItem>,
}

impl ListServicesReply {
    /// Parse a ListServices reply payload.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 2 {
            return Err(EnipError::TooShort {
                expected: 2,
                actual: buf.len(),
            });
        }
        let count = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        let mut offset = 2;
        let mut services = Vec::with_capacity(count);

        for _ in 0..count {
            if buf.len() < offset + 4 {
                return Err(EnipError::TooShort {
                    expected: offset + 4,
                    actual: buf.len(),
                });
            }
            let type_code = u16::from_le_bytes([buf[offset], buf[offset + 1]]);
            let payload_len = u16::from_le_bytes([buf[offset + 2], buf[offset + 3]]) as usize;
            offset += 4;

            // The payload must hold version, flags and the name field
            if payload_len < 4 + NAME_FIELD_LEN {
                return Err(EnipError::invalid_frame(format!(
                    "Service entry payload of {} bytes cannot hold a service descriptor",
                    payload_len
                )));
            }
            if buf.len() < offset + payload_len {
                return Err(EnipError::TooShort {
                    expected: offset + payload_len,
                    actual: buf.len(),
                });
            }

            let encap_version = u16::from_le_bytes([buf[offset], buf[offset + 1]]);
            let capability_flags = u16::from_le_bytes([buf[offset + 2], buf[offset + 3]]);
            let name_field = &buf[offset + 4..offset + 4 + NAME_FIELD_LEN];
            let name = trim_name(name_field);

            services.push(ServiceItem {
                type_code,
                encap_version,
                capability_flags,
                name,
            });
            offset += payload_len;
        }

        Ok(Self { services })
    }

    /// Encode a reply payload.
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.services.len() as u16);
        for service in &self.services {
            buf.put_u16_le(service.type_code);
            buf.put_u16_le((4 + NAME_FIELD_LEN) as u16);
            buf.put_u16_le(service.encap_version);
            buf.put_u16_le(service.capability_flags);
            let mut field = [0u8; NAME_FIELD_LEN];
            let take = service.name.len().min(NAME_FIELD_LEN);
            field[..take].copy_from_slice(&service.name.as_bytes()[..take]);
            buf.extend_from_slice(&field);
        }
    }

    /// Encoded size in bytes.
    pub fn encoded_size(&self) -> usize {
        2 + self.services.len() * (4 + 4 + NAME_FIELD_LEN)
    }
}

/// Trim the fixed 16-byte name field down to its leading printable run.
fn trim_name(field: &[u8]) -> String {
    field
        .iter()
        .take_while(|b| b.is_ascii_alphanumeric() || **b == b' ' || **b == b'.')
        .map(|b| *b as char)
        .collect::<String>()
        .trim_end()
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_service() -> ServiceItem {
        ServiceItem {
            type_code: 0x0100,
            encap_version: 1,
            capability_flags: CAPABILITY_CIP_TCP | CAPABILITY_CIP_UDP,
            name: "Communications".into(),
        }
    }

    #[test]
    fn test_roundtrip() {
        let reply = ListServicesReply {
            services: vec![sample_service()],
        };
        let mut buf = BytesMut::new();
        reply.encode(&mut buf);
        assert_eq!(buf.len(), reply.encoded_size());
        assert_eq!(ListServicesReply::parse(&buf).unwrap(), reply);
    }

    #[test]
    fn test_capability_bits() {
        let service = sample_service();
        assert!(service.supports_cip_tcp());
        assert!(service.supports_cip_udp());

        let tcp_only = ServiceItem {
            capability_flags: CAPABILITY_CIP_TCP,
            ..sample_service()
        };
        assert!(tcp_only.supports_cip_tcp());
        assert!(!tcp_only.supports_cip_udp());

        let none = ServiceItem {
            capability_flags: 0,
            ..sample_service()
        };
        assert!(!none.supports_cip_tcp());
        assert!(!none.supports_cip_udp());
    }

    #[test]
    fn test_name_trimming() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(1);
        buf.put_u16_le(0x0100);
        buf.put_u16_le(20);
        buf.put_u16_le(1);
        buf.put_u16_le(CAPABILITY_CIP_TCP);
        let mut field = [0u8; 16];
        field[..14].copy_from_slice(b"Communications");
        field[14] = 0xFF; // garbage after the name
        buf.extend_from_slice(&field);

        let reply = ListServicesReply::parse(&buf).unwrap();
        assert_eq!(reply.services[0].name, "Communications");
    }

    #[test]
    fn test_malformed_entry_aborts_parse() {
        // Two declared entries; the first is fine, the second declares
        // a payload too small for a descriptor. Nothing is returned.
        let mut buf = BytesMut::new();
        let good = ListServicesReply {
            services: vec![sample_service()],
        };
        good.encode(&mut buf);
        // Bump the count to 2 and append the bad entry
        buf[0] = 2;
        buf.put_u16_le(0x0100);
        buf.put_u16_le(2);
        buf.put_u16_le(1);

        assert!(ListServicesReply::parse(&buf).is_err());
    }

    #[test]
    fn test_truncated_entry_fails() {
        let mut buf = BytesMut::new();
        buf.put_u16_le(1);
        buf.put_u16_le(0x0100);
        buf.put_u16_le(20);
        buf.put_u16_le(1);
        // capability flags and name missing
        assert!(ListServicesReply::parse(&buf).is_err());
    }

    #[test]
    fn test_empty_reply() {
        let reply = ListServicesReply::parse(&[0x00, 0x00]).unwrap();
        assert!(reply.services.is_empty());
    }
}
