//! The contract every protocol decoder and encoder implements.
//!
//! A [`Layer`] decodes one protocol header from the front of a byte slice. It records which part of
//! the slice was its own header (the *contents*) and which part it carries for the next protocol
//! (the *payload*), see [`BaseLayer`]. It then names the [`LayerType`] that should decode the
//! payload. The [`packet`](crate::packet) module chains layers along these hints.
//!
//! Decoders never panic on malformed data. They return a [`DecodeError`] and, when the input simply
//! ended early, additionally signal truncation through the [`DecodeFeedback`] they were handed.
//! Some protocols tolerate short captures: an IPv4 packet whose total length exceeds the captured
//! bytes still decodes successfully but sets the truncation flag.
//!
//! ## Writing layers
//!
//! Serialization runs in the opposite direction, innermost layer first. Each layer prepends its
//! header to a [`SerializeBuffer`] that already holds the payload, so lengths and checksums can be
//! computed from what follows.
use core::any::Any;
use core::fmt;
use core::ops::Range;

use crate::error::{DecodeError, SerializeError};
use crate::flow::Flow;

mod serialize;

pub use self::serialize::{serialize_layers, SerializeBuffer, SerializeOptions};

enum_with_unknown! {
    /// Names a decoder in the decoder table.
    ///
    /// Layers name the type of their payload with one of these and the packet pipeline looks up
    /// the next decoder by it. Values not listed here are free for additional decoders.
    #[derive(Hash)]
    pub enum LayerType(u16) {
        /// Marks the layer recording where and why decoding stopped.
        DecodeFailure = 0,
        /// Opaque trailing bytes without further structure.
        Payload = 1,
        Ethernet = 10,
        /// BSD loopback encapsulation with a four byte protocol family.
        Loopback = 11,
        Ipv4 = 20,
        Ipv6 = 21,
        Icmpv6 = 30,
        Icmpv6RouterSolicitation = 31,
        Icmpv6RouterAdvertisement = 32,
        Icmpv6NeighborSolicitation = 33,
        Icmpv6NeighborAdvertisement = 34,
        Icmpv6Redirect = 35,
        Tcp = 40,
        Udp = 41,
        Dns = 50,
        /// EtherNet/IP encapsulation.
        Enip = 60,
        /// Common Industrial Protocol.
        Cip = 61,
    }
}

/// The role a layer type plays in a packet.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum LayerClass {
    /// Carries link addresses such as MAC addresses.
    Link,
    /// Carries network addresses such as IP addresses.
    Network,
    /// Carries ports.
    Transport,
    /// Carries application data.
    Application,
    /// Anything else, such as control messages or opaque payload.
    Other,
}

impl LayerType {
    /// The role of this layer type.
    pub fn class(self) -> LayerClass {
        match self {
            LayerType::Ethernet | LayerType::Loopback => LayerClass::Link,
            LayerType::Ipv4 | LayerType::Ipv6 => LayerClass::Network,
            LayerType::Tcp | LayerType::Udp => LayerClass::Transport,
            LayerType::Dns | LayerType::Enip | LayerType::Cip => LayerClass::Application,
            _ => LayerClass::Other,
        }
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            LayerType::DecodeFailure => "DecodeFailure",
            LayerType::Payload => "Payload",
            LayerType::Ethernet => "Ethernet",
            LayerType::Loopback => "Loopback",
            LayerType::Ipv4 => "IPv4",
            LayerType::Ipv6 => "IPv6",
            LayerType::Icmpv6 => "ICMPv6",
            LayerType::Icmpv6RouterSolicitation => "ICMPv6RouterSolicitation",
            LayerType::Icmpv6RouterAdvertisement => "ICMPv6RouterAdvertisement",
            LayerType::Icmpv6NeighborSolicitation => "ICMPv6NeighborSolicitation",
            LayerType::Icmpv6NeighborAdvertisement => "ICMPv6NeighborAdvertisement",
            LayerType::Icmpv6Redirect => "ICMPv6Redirect",
            LayerType::Tcp => "TCP",
            LayerType::Udp => "UDP",
            LayerType::Dns => "DNS",
            LayerType::Enip => "ENIP",
            LayerType::Cip => "CIP",
            LayerType::Unknown(id) => return write!(f, "LayerType({})", id),
        };
        f.write_str(name)
    }
}

/// Positions of a layer's header and payload within its decode input.
///
/// Both ranges are relative to the slice handed to [`Layer::decode_from_bytes`]. They never
/// overlap and the payload never starts before the contents end. Bytes covered by neither, such
/// as link padding behind an IP packet, belong to no layer.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct BaseLayer {
    /// The header octets of this layer.
    pub contents: Range<usize>,
    /// The octets carried for the next layer.
    pub payload: Range<usize>,
}

impl BaseLayer {
    /// A header of `header_len` octets followed by payload up to `end`.
    ///
    /// `end` must not be smaller than `header_len`.
    pub fn split(header_len: usize, end: usize) -> Self {
        BaseLayer {
            contents: 0..header_len,
            payload: header_len..end,
        }
    }

    /// A layer consuming all `len` octets, without payload.
    pub fn whole(len: usize) -> Self {
        BaseLayer {
            contents: 0..len,
            payload: len..len,
        }
    }
}

/// Receives signals from a decoder beyond its result.
pub trait DecodeFeedback {
    /// Note that the input ended before the layer's data did.
    fn set_truncated(&mut self);
}

/// A feedback sink discarding all signals.
#[derive(Clone, Copy, Debug, Default)]
pub struct NilDecodeFeedback;

/// A feedback sink remembering whether truncation was signalled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Truncation {
    truncated: bool,
}

impl DecodeFeedback for NilDecodeFeedback {
    fn set_truncated(&mut self) {}
}

impl Truncation {
    /// Whether any decoder signalled truncation.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

impl DecodeFeedback for Truncation {
    fn set_truncated(&mut self) {
        self.truncated = true;
    }
}

/// A protocol decoder and encoder.
///
/// Implementations are plain structs with public fields for the decoded header values. A decoder
/// object may be reused: [`Layer::decode_from_bytes`] overwrites every field.
pub trait Layer: Any + fmt::Debug + Send + Sync {
    /// The type under which this layer is registered.
    fn layer_type(&self) -> LayerType;

    /// Decode the header at the start of `data`.
    ///
    /// On success the ranges returned by [`Layer::base`] are within `data`. Truncated input must be
    /// signalled on `df` in addition to any error returned.
    fn decode_from_bytes(&mut self, data: &[u8], df: &mut dyn DecodeFeedback)
        -> Result<(), DecodeError>;

    /// Header and payload position of the last successful decode.
    fn base(&self) -> &BaseLayer;

    /// The layer type that should decode the payload.
    ///
    /// [`LayerType::Payload`] ends decoding with an opaque payload layer.
    fn next_layer_type(&self) -> LayerType {
        LayerType::Payload
    }

    /// Prepend this layer's header to `buffer`, which holds the encoded payload.
    ///
    /// The default implementation rejects serialization.
    fn serialize_to(&mut self, buffer: &mut SerializeBuffer, options: SerializeOptions)
        -> Result<(), SerializeError>
    {
        let _ = (buffer, options);
        Err(SerializeError::UnsupportedLayer(self.layer_type()))
    }

    /// The addresses of this layer, for link, network and transport layers.
    fn flow(&self) -> Option<Flow> {
        None
    }

    /// Access to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

impl dyn Layer {
    /// Downcast to a concrete layer implementation.
    pub fn downcast_ref<T: Layer>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    /// Whether the layer is of the concrete type `T`.
    pub fn is<T: Layer>(&self) -> bool {
        self.as_any().is::<T>()
    }
}
