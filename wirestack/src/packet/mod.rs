//! Turning a byte buffer into a stack of decoded layers.
//!
//! A [`Packet`] starts at a caller-declared root [`LayerType`] and repeatedly hands the remaining
//! bytes to the decoder of the type the previous layer names, until a layer has no payload left or
//! a decoder fails. A failure does not discard anything: the layers before it stay accessible and
//! a final [`DecodeFailure`] layer records the bytes and the error that stopped decoding.
//!
//! ```
//! use wirestack::layer::LayerType;
//! use wirestack::packet::{DecodeOptions, Packet};
//!
//! // An IPv4 header claiming more data than was captured, then two UDP octets.
//! let data = [
//!     0x45, 0x00, 0x00, 0x1c, 0x00, 0x00, 0x40, 0x00,
//!     0x40, 0x11, 0x00, 0x00, 0x0a, 0x00, 0x00, 0x01,
//!     0x0a, 0x00, 0x00, 0x02, 0x00, 0x35,
//! ];
//! let mut packet = Packet::new(&data[..], LayerType::Ipv4, DecodeOptions::DEFAULT);
//! assert_eq!(packet.layer_types(), [LayerType::Ipv4, LayerType::DecodeFailure]);
//! assert!(packet.is_truncated());
//! assert_eq!(packet.error_layer().unwrap().failed, LayerType::Udp);
//! ```
//!
//! Decoding is eager by default: the constructor runs the pipeline to completion. With
//! [`DecodeOptions::lazy`] set, each accessor decodes only as far as it needs to answer.
use std::borrow::Cow;
use std::sync::Arc;

use crate::error::DecodeError;
use crate::flow::Flow;
use crate::layer::{Layer, LayerClass, LayerType, Truncation};
use crate::wire::DecodeFailure;

mod decoders;

pub use self::decoders::{Decoders, Factory};

/// Controls how a packet decodes its buffer.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Decode layers only when an accessor asks for them.
    pub lazy: bool,
    /// Borrow the input buffer instead of copying it.
    ///
    /// A borrowed packet cannot outlive its input, see [`Packet::into_owned`].
    pub no_copy: bool,
    /// Decode TCP payloads as if each segment held complete application messages.
    pub decode_streams_as_datagrams: bool,
}

impl DecodeOptions {
    /// Eager decoding of a borrowed buffer.
    pub const DEFAULT: DecodeOptions = DecodeOptions {
        lazy: false,
        no_copy: true,
        decode_streams_as_datagrams: false,
    };

    /// Lazy decoding of a borrowed buffer.
    pub const LAZY: DecodeOptions = DecodeOptions {
        lazy: true,
        ..DecodeOptions::DEFAULT
    };

    /// Eager decoding of a private copy of the buffer.
    pub const COPY: DecodeOptions = DecodeOptions {
        no_copy: false,
        ..DecodeOptions::DEFAULT
    };
}

impl Default for DecodeOptions {
    fn default() -> Self {
        DecodeOptions::DEFAULT
    }
}

/// Progress of the decoding pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum State {
    /// More layers remain to be decoded.
    Pending {
        /// Start of the bytes for the next layer, in the packet buffer.
        offset: usize,
        /// End of the bytes for the next layer.
        end: usize,
        /// The decoder to run on them.
        next: LayerType,
    },
    /// Every layer was decoded.
    Done,
    /// A decoder failed.
    Failed {
        /// Index of the [`DecodeFailure`] layer.
        index: usize,
        /// What the decoder reported.
        error: DecodeError,
    },
}

#[derive(Debug)]
struct Decoded {
    layer: Box<dyn Layer>,
    /// Position of the layer's decode input in the packet buffer.
    offset: usize,
}

/// A decoded packet.
#[derive(Debug)]
pub struct Packet<'a> {
    data: Cow<'a, [u8]>,
    layers: Vec<Decoded>,
    state: State,
    truncated: bool,
    options: DecodeOptions,
    decoders: Arc<Decoders>,
}

/// A decoded layer together with its octets in the packet buffer.
#[derive(Clone, Copy, Debug)]
pub struct LayerRef<'p> {
    layer: &'p (dyn Layer + 'static),
    contents: &'p [u8],
    payload: &'p [u8],
    offset: usize,
}

impl<'a> Packet<'a> {
    /// Decode `data` starting with a layer of type `root`, using the builtin decoders.
    pub fn new(data: impl Into<Cow<'a, [u8]>>, root: LayerType, options: DecodeOptions) -> Self {
        Packet::with_decoders(data, root, options, Decoders::builtin())
    }

    /// Decode `data` starting with a layer of type `root`, using a custom decoder table.
    pub fn with_decoders(
        data: impl Into<Cow<'a, [u8]>>,
        root: LayerType,
        options: DecodeOptions,
        decoders: Arc<Decoders>,
    ) -> Self {
        let data = data.into();
        let data = if options.no_copy {
            data
        } else {
            Cow::Owned(data.into_owned())
        };

        let mut packet = Packet {
            state: State::Pending { offset: 0, end: data.len(), next: root },
            data,
            layers: Vec::new(),
            truncated: false,
            options,
            decoders,
        };

        if !options.lazy {
            packet.decode_all();
        }

        packet
    }

    /// Detach the packet from the lifetime of its input by copying the buffer if necessary.
    pub fn into_owned(self) -> Packet<'static> {
        Packet {
            data: Cow::Owned(self.data.into_owned()),
            layers: self.layers,
            state: self.state,
            truncated: self.truncated,
            options: self.options,
            decoders: self.decoders,
        }
    }

    /// The whole packet buffer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The options the packet was created with.
    pub fn options(&self) -> DecodeOptions {
        self.options
    }

    /// Current progress, without decoding anything.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Layers decoded so far, without decoding anything.
    pub fn decoded(&self) -> impl Iterator<Item=LayerRef<'_>> + '_ {
        self.layers.iter().map(move |decoded| self.layer_ref(decoded))
    }

    /// All layers, including a final [`DecodeFailure`].
    pub fn layers(&mut self) -> impl Iterator<Item=LayerRef<'_>> + '_ {
        self.decode_all();
        self.decoded()
    }

    /// The types of all layers, in order.
    pub fn layer_types(&mut self) -> Vec<LayerType> {
        self.layers().map(|layer| layer.layer_type()).collect()
    }

    /// The layer at an index, decoding up to it.
    pub fn layer_at(&mut self, index: usize) -> Option<LayerRef<'_>> {
        while self.layers.len() <= index && self.decode_next() {}
        self.layers.get(index).map(|decoded| self.layer_ref(decoded))
    }

    /// The first layer of a type, decoding up to it.
    pub fn layer(&mut self, layer_type: LayerType) -> Option<LayerRef<'_>> {
        let index = self.position(|layer| layer.layer_type() == layer_type)?;
        Some(self.layer_ref(&self.layers[index]))
    }

    /// The first layer of a concrete type, decoding up to it.
    pub fn layer_as<T: Layer>(&mut self) -> Option<&T> {
        let index = self.position(|layer| layer.is::<T>())?;
        self.layers[index].layer.downcast_ref()
    }

    /// The layer recording why decoding stopped early, if it did.
    pub fn error_layer(&mut self) -> Option<&DecodeFailure> {
        self.decode_all();
        match self.state {
            State::Failed { index, .. } => self.layers[index].layer.downcast_ref(),
            _ => None,
        }
    }

    /// Whether any layer ran out of data, decoding all layers first.
    pub fn is_truncated(&mut self) -> bool {
        self.decode_all();
        self.truncated
    }

    /// The flow of the first link layer.
    pub fn link_flow(&mut self) -> Option<Flow> {
        self.class_flow(LayerClass::Link)
    }

    /// The flow of the first network layer.
    pub fn network_flow(&mut self) -> Option<Flow> {
        self.class_flow(LayerClass::Network)
    }

    /// The flow of the first transport layer.
    pub fn transport_flow(&mut self) -> Option<Flow> {
        self.class_flow(LayerClass::Transport)
    }

    fn class_flow(&mut self, class: LayerClass) -> Option<Flow> {
        let index = self.position(|layer| layer.layer_type().class() == class)?;
        self.layers[index].layer.flow()
    }

    fn position(&mut self, mut predicate: impl FnMut(&(dyn Layer + 'static)) -> bool) -> Option<usize> {
        let mut index = 0;
        loop {
            while let Some(decoded) = self.layers.get(index) {
                if predicate(&*decoded.layer) {
                    return Some(index);
                }
                index += 1;
            }

            if !self.decode_next() {
                return None;
            }
        }
    }

    fn layer_ref<'p>(&'p self, decoded: &'p Decoded) -> LayerRef<'p> {
        let base = decoded.layer.base();
        let offset = decoded.offset;
        LayerRef {
            layer: &*decoded.layer,
            contents: &self.data[offset + base.contents.start..offset + base.contents.end],
            payload: &self.data[offset + base.payload.start..offset + base.payload.end],
            offset,
        }
    }

    fn decode_all(&mut self) {
        while self.decode_next() {}
    }

    /// Decode one more layer. Returns false once the pipeline reached a final state.
    fn decode_next(&mut self) -> bool {
        let (offset, end, next) = match self.state {
            State::Pending { offset, end, next } => (offset, end, next),
            State::Done | State::Failed { .. } => return false,
        };

        let input = &self.data[offset..end];
        let mut feedback = Truncation::default();
        let result = match self.decoders.create(next, &self.options) {
            None => Err(DecodeError::Unsupported(next)),
            Some(mut layer) => layer.decode_from_bytes(input, &mut feedback)
                .and_then(|()| check_base(&*layer, input.len()))
                .map(|()| layer),
        };
        self.truncated |= feedback.is_truncated();

        match result {
            Ok(layer) => {
                let payload = layer.base().payload.clone();
                net_trace!("decoded {} at {}, {} octets payload", next, offset, payload.len());
                self.state = if payload.is_empty() {
                    State::Done
                } else {
                    State::Pending {
                        offset: offset + payload.start,
                        end: offset + payload.end,
                        next: layer.next_layer_type(),
                    }
                };
                self.layers.push(Decoded { layer, offset });
            },
            Err(error) => {
                net_debug!("decoding {} at {} failed: {}", next, offset, error);
                let failure = DecodeFailure::new(next, error.clone(), input.len());
                self.state = State::Failed { index: self.layers.len(), error };
                self.layers.push(Decoded { layer: Box::new(failure), offset });
            },
        }

        true
    }
}

/// Reject layers whose ranges leave their input or would not shrink the remaining data.
fn check_base(layer: &dyn Layer, len: usize) -> Result<(), DecodeError> {
    let base = layer.base();
    let ordered = base.contents.start <= base.contents.end
        && base.contents.end <= base.payload.start
        && base.payload.start <= base.payload.end
        && base.payload.end <= len;
    if !ordered {
        return Err(DecodeError::malformed(layer.layer_type(), "layer ranges outside of its data"));
    }
    if !base.payload.is_empty() && base.payload.len() == len {
        return Err(DecodeError::malformed(layer.layer_type(), "layer consumed no data"));
    }
    Ok(())
}

impl<'p> LayerRef<'p> {
    /// The decoded layer.
    pub fn layer(&self) -> &'p (dyn Layer + 'static) {
        self.layer
    }

    /// The type of the decoded layer.
    pub fn layer_type(&self) -> LayerType {
        self.layer.layer_type()
    }

    /// The header octets of the layer.
    pub fn contents(&self) -> &'p [u8] {
        self.contents
    }

    /// The octets the layer carries for the next one.
    pub fn payload(&self) -> &'p [u8] {
        self.payload
    }

    /// Where the layer starts in the packet buffer.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Downcast to a concrete layer implementation.
    pub fn downcast_ref<T: Layer>(&self) -> Option<&'p T> {
        self.layer.downcast_ref()
    }
}
