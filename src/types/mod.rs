//! EtherNet/IP and CIP type definitions.
//!
//! This module contains all the core wire types of the stack:
//!
//! - `EncapCommand` / `EncapStatus` - encapsulation header tables
//! - `EncapFrame` - the 24-byte header plus command-specific data
//! - `RegisterSession`, `ListIdentityReply`, `ListServicesReply`,
//!   `SendRRData` - command-specific data codecs
//! - `MessageRouterRequest` / `MessageRouterResponse` - CIP envelope
//! - `Epath` / `RoutePath` - request and route addressing
//! - `UnconnectedSend` - Connection Manager routing wrapper
//! - `SingleServicePacket` / `MultipleServicePacket` - tag services
//! - `CipValue` - atomic and struct data marshalling

mod cip;
mod command;
mod data;
mod epath;
mod frame;
mod identity;
mod register;
mod send_rr;
mod service_packet;
mod services;
mod unconnected;

pub use cip::*;
pub use command::*;
pub use data::*;
pub use epath::*;
pub use frame::*;
pub use identity::*;
pub use register::*;
pub use send_rr::*;
pub use service_packet::*;
pub use services::*;
pub use unconnected::*;
