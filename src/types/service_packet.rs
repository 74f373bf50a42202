//! Single and Multiple Service Packet codecs.
//!
//! A Single Service Packet is one tag read or write. A Multiple Service
//! Packet batches several of them behind the Message Router object with
//! an offset table, and the device answers with an offset table of its
//! own, one reply slice per requested service.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{EnipError, Result};
use crate::types::{
    CipService, CipValue, Epath, GeneralStatus, MessageRouterRequest, MessageRouterResponse,
};

/// Generic-data tail of a tag read request: element count 1.
const READ_ELEMENT_COUNT: [u8; 2] = [0x01, 0x00];

/// A single tag get/set request.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleServicePacket {
    /// ReadTag or WriteTag
    pub service: CipService,
    /// Symbolic tag name
    pub tag: String,
    /// Value to write; `None` for reads
    pub value: Option<CipValue>,
}

impl SingleServicePacket {
    /// Build a tag read request.
    pub fn read(tag: impl Into<String>) -> Self {
        Self {
            service: CipService::ReadTag,
            tag: tag.into(),
            value: None,
        }
    }

    /// Build a tag write request.
    pub fn write(tag: impl Into<String>, value: CipValue) -> Self {
        Self {
            service: CipService::WriteTag,
            tag: tag.into(),
            value: Some(value),
        }
    }

    /// Encode to the message router request form.
    ///
    /// Reads get the fixed `[0x01, 0x00]` element-count tail; writes get
    /// the typed generic-data body. Writing a structured value is a hard
    /// encode error; only atomic types may be written.
    pub fn to_request(&self) -> Result<MessageRouterRequest> {
        let data: Bytes = match self.service {
            CipService::ReadTag => Bytes::from_static(&READ_ELEMENT_COUNT),
            CipService::WriteTag => {
                let value = self.value.as_ref().ok_or_else(|| {
                    EnipError::validation("Write request is missing a value")
                })?;
                if matches!(value, CipValue::String(_)) {
                    return Err(EnipError::validation(
                        "Only atomic types can be written through a service packet",
                    ));
                }
                Bytes::from(value.to_bytes())
            }
            other => {
                return Err(EnipError::validation(format!(
                    "Service 0x{:02X} is not a tag service",
                    other.as_u8()
                )))
            }
        };

        Ok(MessageRouterRequest::new(
            self.service.as_u8(),
            Epath::symbol(&self.tag),
            data,
        ))
    }

    /// Encode to bytes.
    pub fn to_bytes(&self) -> Result<Bytes> {
        self.to_request()?.to_bytes()
    }
}

/// A decoded service reply: `{status, additional_status_size, data}`.
///
/// The additional status words are skipped, not interpreted; the size
/// byte is kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceReply {
    /// CIP general status
    pub status: GeneralStatus,
    /// Additional status size in 16-bit words (carried, not parsed)
    pub additional_status_words: u8,
    /// Remainder after the skipped additional status: the CIP generic data
    pub data: Bytes,
}

impl ServiceReply {
    /// Parse a reply body that starts at the general status byte.
    ///
    /// Fails on a status byte outside the known general status table.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.is_empty() {
            return Err(EnipError::TooShort {
                expected: 1,
                actual: 0,
            });
        }
        let status = GeneralStatus::from_u8(buf[0])?;
        let additional_status_words = if buf.len() > 1 { buf[1] } else { 0 };
        let data_start = (2 + additional_status_words as usize * 2).min(buf.len());
        Ok(Self {
            status,
            additional_status_words,
            data: Bytes::copy_from_slice(&buf[data_start..]),
        })
    }

    /// Check for success.
    #[inline]
    pub fn is_status_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decode the generic data as a tag value.
    pub fn value(&self) -> Result<CipValue> {
        CipValue::decode(&self.data)
    }
}

/// A batch of tag services encoded as one Multiple Service Packet.
///
/// Each inserted packet gets a position-stable integer id: ids are
/// assigned by a monotonic counter and never renumbered on removal, so a
/// held id stays valid as an opaque handle across later mutations.
#[derive(Debug, Clone, Default)]
pub struct MultipleServicePacket {
    next_id: u32,
    packets: Vec<(u32, SingleServicePacket)>,
}

impl MultipleServicePacket {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of services in the batch.
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Check for emptiness.
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Insert a packet at the end, returning its stable id.
    pub fn insert(&mut self, packet: SingleServicePacket) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.packets.push((id, packet));
        id
    }

    /// Look up a packet by id.
    pub fn get(&self, id: u32) -> Option<&SingleServicePacket> {
        self.packets
            .iter()
            .find(|(pid, _)| *pid == id)
            .map(|(_, p)| p)
    }

    /// Replace the packet behind `id`, keeping its position and id.
    ///
    /// Returns `false` if the id is not present.
    pub fn replace(&mut self, id: u32, packet: SingleServicePacket) -> bool {
        match self.packets.iter_mut().find(|(pid, _)| *pid == id) {
            Some(slot) => {
                slot.1 = packet;
                true
            }
            None => false,
        }
    }

    /// Remove and return the packet behind `id`. Remaining ids keep
    /// their values.
    pub fn remove(&mut self, id: u32) -> Option<SingleServicePacket> {
        let index = self.packets.iter().position(|(pid, _)| *pid == id)?;
        Some(self.packets.remove(index).1)
    }

    /// Ids in insertion order.
    pub fn ids(&self) -> Vec<u32> {
        self.packets.iter().map(|(id, _)| *id).collect()
    }

    /// Encode to the message router request form.
    ///
    /// Body layout: `service_count u16, offsets u16 x count, blobs`.
    /// Offsets are byte distances from the start of the count field to
    /// each encoded single-service request, accumulated in insertion
    /// order.
    pub fn to_request(&self) -> Result<MessageRouterRequest> {
        if self.packets.is_empty() {
            return Err(EnipError::validation(
                "Multiple Service Packet must contain at least one service",
            ));
        }

        let count = self.packets.len();
        let mut blobs = Vec::with_capacity(count);
        for (_, packet) in &self.packets {
            blobs.push(packet.to_bytes()?);
        }

        let table_size = 2 + 2 * count;
        let body_size: usize = table_size + blobs.iter().map(|b| b.len()).sum::<usize>();
        let mut data = BytesMut::with_capacity(body_size);
        data.put_u16_le(count as u16);

        let mut offset = table_size;
        for blob in &blobs {
            data.put_u16_le(offset as u16);
            offset += blob.len();
        }
        for blob in &blobs {
            data.extend_from_slice(blob);
        }

        Ok(MessageRouterRequest::new(
            CipService::MultipleServicePacket.as_u8(),
            Epath::message_router(),
            data.freeze(),
        ))
    }

    /// Encode to bytes.
    pub fn to_bytes(&self) -> Result<Bytes> {
        self.to_request()?.to_bytes()
    }
}

/// A decoded Multiple Service Packet reply: one [`ServiceReply`] per
/// requested service, in request order.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipleServiceReply {
    /// Status of the batch envelope itself
    pub status: GeneralStatus,
    /// Per-service replies in request order
    pub replies: Vec<ServiceReply>,
}

impl MultipleServiceReply {
    /// Parse a reply body that starts at the general status byte.
    ///
    /// Layout: `status u8, reserved u8, service_count u16, offsets
    /// u16 x count, reply slices`. Offsets are relative to the start of
    /// the count field; each slice runs to the next offset, the last to
    /// the end of the buffer. Every slice is parsed independently as a
    /// nested CIP reply; a structurally broken slice aborts the whole
    /// parse and names the failing position.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(EnipError::TooShort {
                expected: 4,
                actual: buf.len(),
            });
        }
        let status = GeneralStatus::from_u8(buf[0])?;

        // The count field sits after status + reserved; offsets are
        // measured from it.
        let table_base = 2;
        let count = u16::from_le_bytes([buf[2], buf[3]]) as usize;
        let offsets_end = table_base + 2 + 2 * count;
        if buf.len() < offsets_end {
            return Err(EnipError::TooShort {
                expected: offsets_end,
                actual: buf.len(),
            });
        }

        let mut offsets = Vec::with_capacity(count);
        for i in 0..count {
            let at = table_base + 2 + 2 * i;
            offsets.push(u16::from_le_bytes([buf[at], buf[at + 1]]) as usize);
        }

        let mut replies = Vec::with_capacity(count);
        for i in 0..count {
            let start = table_base + offsets[i];
            let end = if i + 1 < count {
                table_base + offsets[i + 1]
            } else {
                buf.len()
            };
            if start > end || end > buf.len() {
                return Err(EnipError::invalid_cip(format!(
                    "Service {} of {}: offset {} outside reply of {} bytes",
                    i,
                    count,
                    offsets[i],
                    buf.len()
                )));
            }

            let inner = MessageRouterResponse::parse(&buf[start..end]).map_err(|e| {
                EnipError::invalid_cip(format!("Service {} of {}: {}", i, count, e))
            })?;
            let reply = ServiceReply::parse(&inner.body).map_err(|e| {
                EnipError::invalid_cip(format!("Service {} of {}: {}", i, count, e))
            })?;
            replies.push(reply);
        }

        Ok(Self { status, replies })
    }
}
