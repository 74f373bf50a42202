//! Connection Manager Unconnected Send wrapper.
//!
//! Unconnected Send (service 0x52, Connection Manager class 0x06) routes
//! an embedded CIP request through a bridging device toward its final
//! destination, named by a route path (port + link address). The device
//! strips the wrapper, so the reply that comes back is the *embedded*
//! service's reply.

use bytes::{BufMut, BytesMut};

use crate::error::Result;
use crate::types::{CipService, Epath, MessageRouterRequest, RoutePath};

/// Default priority/time-tick byte.
pub const DEFAULT_PRIORITY_TIMETICK: u8 = 0x04;

/// Default timeout tick count.
pub const DEFAULT_TIMEOUT_TICKS: u8 = 125;

/// An Unconnected Send request.
#[derive(Debug, Clone, PartialEq)]
pub struct UnconnectedSend {
    /// Priority and time-tick selector
    pub priority_timetick: u8,
    /// Timeout in ticks
    pub timeout_ticks: u8,
    /// The wrapped CIP request
    pub embedded: MessageRouterRequest,
    /// Egress port and link address
    pub route: RoutePath,
}

impl UnconnectedSend {
    /// Wrap an embedded request with default priority, ticks and route.
    pub fn new(embedded: MessageRouterRequest) -> Self {
        Self {
            priority_timetick: DEFAULT_PRIORITY_TIMETICK,
            timeout_ticks: DEFAULT_TIMEOUT_TICKS,
            embedded,
            route: RoutePath::default(),
        }
    }

    /// Wrap an embedded request routed to the given backplane slot.
    pub fn with_slot(embedded: MessageRouterRequest, slot: u8) -> Self {
        Self {
            route: RoutePath::backplane_slot(slot),
            ..Self::new(embedded)
        }
    }

    /// Encode to the message router request form.
    ///
    /// Body layout: `priority u8, ticks u8, embedded_len u16, embedded,
    /// route_size_words u8, reserved u8, route[2]`. A failure from the
    /// embedded request's own encoder propagates unmodified.
    pub fn to_request(&self) -> Result<MessageRouterRequest> {
        let embedded = self.embedded.to_bytes()?;
        let route = self.route.to_bytes()?;

        let mut data = BytesMut::with_capacity(4 + embedded.len() + 4);
        data.put_u8(self.priority_timetick);
        data.put_u8(self.timeout_ticks);
        data.put_u16_le(embedded.len() as u16);
        data.extend_from_slice(&embedded);
        data.put_u8(1); // route path size in words
        data.put_u8(0); // reserved
        data.extend_from_slice(&route);

        Ok(MessageRouterRequest::new(
            CipService::UnconnectedSend.as_u8(),
            Epath::connection_manager(),
            data.freeze(),
        ))
    }

    /// Encode to bytes.
    pub fn to_bytes(&self) -> Result<bytes::Bytes> {
        self.to_request()?.to_bytes()
    }
}
