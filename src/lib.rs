//! # voltage_enip
//!
//! EtherNet/IP (CIP) client implementation for Rust.
//!
//! This crate provides a client-side stack for the EtherNet/IP
//! encapsulation protocol carrying CIP explicit messages, commonly used
//! to read and write tags on Rockwell CompactLogix/ControlLogix PLCs.
//!
//! ## Features
//!
//! - **Layered codec**: encapsulation frames, command-specific data,
//!   CIP message envelopes, Unconnected Send routing, Single/Multiple
//!   Service Packet batching, atomic and string value marshalling
//! - **Async transport**: session registration, request/response
//!   correlation over the sender context, frame re-segmentation,
//!   timeouts and optional auto-reconnect
//! - **Type safe**: commands, statuses, services and data types are
//!   closed enums resolved once at decode time
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voltage_enip::{ClientConfig, CipDataType, CipValue, EnipClient};
//!
//! #[tokio::main]
//! async fn main() -> voltage_enip::Result<()> {
//!     let config = ClientConfig::new("192.168.1.10:44818").slot(0);
//!     let mut client = EnipClient::new(config);
//!
//!     // Connect and register an encapsulation session
//!     client.connect().await?;
//!
//!     // Single tag operations
//!     let speed = client.read_tag("MotorSpeed").await?;
//!     println!("MotorSpeed = {:?}", speed.value);
//!     client
//!         .write_tag("SetPoint", CipValue::from_numeric(CipDataType::Dint, 1500)?)
//!         .await?;
//!
//!     // Batched operations; each tag fails or succeeds on its own
//!     for result in client.read_tags(&["Tank1.Level", "Tank2.Level"]).await? {
//!         println!("{:?} ({})", result.value, result.status);
//!     }
//!
//!     client.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Protocol Overview
//!
//! EtherNet/IP encapsulates CIP messages over TCP (default port 44818).
//! Every exchange is one frame:
//!
//! ```text
//! Encapsulation header (24 bytes):
//! +---------+---------+-----------+---------+------------------+----------+
//! | command | length  | session   | status  | sender context   | options  |
//! | u16     | u16     | u32       | u32     | u8[8]            | u32      |
//! +---------+---------+-----------+---------+------------------+----------+
//! ```
//!
//! Tag reads and writes ride inside SendRRData frames as CIP message
//! router requests, optionally wrapped in a Connection Manager
//! Unconnected Send when the processor sits behind a backplane route.
//! The device echoes the sender context verbatim, which this client
//! uses to correlate concurrent requests to their replies.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod codec;
pub mod error;
pub mod parser;
pub mod types;

// Re-export main types
pub use client::{ClientConfig, EnipClient, EnipEvent, SessionState};
pub use codec::EnipCodec;
pub use error::{EnipError, Result};
pub use parser::{parse_rr_response, TagResult};
pub use types::*;
