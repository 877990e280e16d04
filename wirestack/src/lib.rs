//! Layered decoding and encoding of network packets.
//!
//! ## Table of contents
//!
//! 1. [Design](#design)
//! 2. [Endpoints and flows](flow/index.html)
//! 3. [The layer contract](layer/index.html)
//! 4. [The packet pipeline](packet/index.html)
//! 5. [Protocols](wire/index.html)
//!    1. [Tag-length-value options](wire/option/index.html)
//!    1. [DNS and name compression](wire/dns/index.html)
//!    1. [ICMPv6 neighbor discovery](wire/ndisc/index.html)
//!    1. [EtherNet/IP](wire/enip/index.html) and [CIP](wire/cip/index.html)
//!
//! ## Design
//!
//! A captured frame is a stack of protocol headers. Each protocol is a [`Layer`]: it decodes its
//! own header from the front of a byte slice, reports which octets were header and which are
//! payload, and names the protocol of the payload. A [`Packet`] runs these decoders one after
//! another, starting from a root type the caller declares, and keeps every layer it managed to
//! decode even when a later one fails.
//!
//! ```
//! use wirestack::layer::LayerType;
//! use wirestack::packet::{DecodeOptions, Packet};
//! use wirestack::wire::Udp;
//!
//! let datagram = [0x30, 0x39, 0x1f, 0x90, 0x00, 0x0a, 0x00, 0x00, 0xde, 0xad];
//! let mut packet = Packet::new(&datagram[..], LayerType::Udp, DecodeOptions::DEFAULT);
//! assert_eq!(packet.layer_as::<Udp>().unwrap().src_port, 12345);
//! assert_eq!(packet.transport_flow().unwrap().to_string(), "12345->8080");
//! ```
//!
//! Decoders never panic on malformed input. They return a [`DecodeError`](error::DecodeError)
//! instead, and separately signal when the input merely ended too early so that callers can tell
//! a short capture from corrupt data.
//!
//! Addresses found in link, network and transport headers are available as [`Flow`]s: small
//! `Copy` keys with a hash that is equal for both directions of a conversation.
//!
//! Layers that support it can also be written. [`serialize_layers`](layer::serialize_layers)
//! serializes a stack innermost first and optionally fixes up lengths, counts and checksums.
//!
//! [`Layer`]: layer::Layer
//! [`Packet`]: packet::Packet
//! [`Flow`]: flow::Flow
#![warn(missing_docs)]
#![warn(unreachable_pub)]

#[macro_use] mod macros;

pub mod error;
pub mod flow;
pub mod layer;
pub mod packet;
pub mod wire;

pub use crate::error::{DecodeError, SerializeError};
pub use crate::flow::{Endpoint, EndpointType, Flow};
pub use crate::layer::{Layer, LayerType};
pub use crate::packet::{DecodeOptions, Packet};
