//! Error types of every fallible operation in the crate.
//!
//! All errors are plain values: cloneable, comparable and carrying enough context to display a
//! useful message. Decoding never panics on malformed input, it returns one of these instead.
use std::borrow::Cow;

use thiserror::Error;

use crate::flow::{EndpointType, MAX_ENDPOINT_SIZE};
use crate::layer::{DecodeFeedback, LayerType};

/// Failure to construct an endpoint or a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConstructionError {
    /// The raw address does not fit into the fixed endpoint storage.
    #[error("raw byte length {len} greater than {max}", max = MAX_ENDPOINT_SIZE)]
    AddressTooLong {
        /// Length of the rejected address.
        len: usize,
    },
    /// A flow was requested between endpoints of different types.
    #[error("mismatched endpoint types: {src}->{dst}")]
    EndpointTypeMismatch {
        /// Type of the source endpoint.
        src: EndpointType,
        /// Type of the destination endpoint.
        dst: EndpointType,
    },
}

/// Failure to register an endpoint type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// The number was already taken by another registration.
    #[error("endpoint type number {0} already in use")]
    Duplicate(u16),
}

/// Failure of a single layer to decode its input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The input ended before a field the layer requires.
    ///
    /// Decoders raising this also signal truncation on their feedback sink, see
    /// [`DecodeError::report`].
    #[error("{layer} truncated: needed {needed} octets, {available} available")]
    Truncated {
        /// Layer that ran out of input.
        layer: LayerType,
        /// Number of octets the layer needed.
        needed: usize,
        /// Number of octets that were present.
        available: usize,
    },
    /// A field holds a value that makes the rest of the layer uninterpretable.
    #[error("malformed {layer}: {reason}")]
    Malformed {
        /// Layer with the inconsistent field.
        layer: LayerType,
        /// Short human readable description.
        reason: Cow<'static, str>,
    },
    /// No decoder is registered for the requested layer type.
    #[error("no decoder for layer type {0}")]
    Unsupported(LayerType),
    /// A compressed DNS name could not be read.
    #[error(transparent)]
    Name(#[from] NameError),
}

/// Failure to read a possibly compressed domain name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NameError {
    /// The name would start beyond the end of the message.
    #[error("dns name offset too high: {offset} >= {len}")]
    OffsetTooHigh {
        /// Offset at which the name was expected.
        offset: usize,
        /// Length of the message.
        len: usize,
    },
    /// A label extends beyond the end of the message.
    #[error("dns name uncomputable: invalid index {index}")]
    InvalidIndex {
        /// Offset of the label length octet.
        index: usize,
    },
    /// A compression pointer is incomplete or targets a position outside the message.
    #[error("dns offset pointer too high at {at}")]
    PointerTooHigh {
        /// Offset of the pointer.
        at: usize,
    },
    /// A compression pointer does not point strictly backwards.
    ///
    /// Each pointer followed while reading a name must target a position before itself and
    /// before every pointer target followed so far, which rules out cycles.
    #[error("dns compression pointer at {at} does not point backwards to {target}")]
    PointerLoop {
        /// Offset of the pointer.
        at: usize,
        /// Position it points to.
        target: usize,
    },
    /// The message ended before the terminating root label.
    #[error("dns index walked out of range")]
    IndexOutOfRange,
    /// The decoded name exceeds the 255 octet limit.
    #[error("dns name is too long")]
    NameTooLong,
    /// A record announced by the header is missing or a pointer led to no labels.
    #[error("no dns data found for name")]
    NoData,
    /// A label uses one of the reserved `0x40` or `0x80` length prefixes.
    #[error("dns label type {0:#04x} unsupported")]
    UnsupportedLabel(u8),
}

/// Failure to write layers into a serialization buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializeError {
    /// The layer type only supports decoding.
    #[error("serialization of {0} is not supported")]
    UnsupportedLayer(LayerType),
    /// A length or count field could not hold the actual value.
    #[error("cannot fix {layer} lengths: {reason}")]
    LengthFixupFailed {
        /// Layer being written.
        layer: LayerType,
        /// Short human readable description.
        reason: Cow<'static, str>,
    },
    /// A field value cannot be represented on the wire.
    #[error("invalid {layer} field: {reason}")]
    InvalidField {
        /// Layer being written.
        layer: LayerType,
        /// Short human readable description.
        reason: Cow<'static, str>,
    },
}

impl DecodeError {
    /// Shorthand for a [`DecodeError::Truncated`] error.
    pub fn truncated(layer: LayerType, needed: usize, available: usize) -> Self {
        DecodeError::Truncated { layer, needed, available }
    }

    /// Shorthand for a [`DecodeError::Malformed`] error.
    pub fn malformed(layer: LayerType, reason: impl Into<Cow<'static, str>>) -> Self {
        DecodeError::Malformed { layer, reason: reason.into() }
    }

    /// Whether the error stems from missing input.
    pub fn is_truncated(&self) -> bool {
        matches!(self, DecodeError::Truncated { .. })
    }

    /// Signal truncation on the feedback sink if this error is one, then pass it on.
    ///
    /// Decoders route every error through here so that truncation is observable independently
    /// of the error value.
    pub fn report(self, df: &mut dyn DecodeFeedback) -> Self {
        if self.is_truncated() {
            df.set_truncated();
        }
        self
    }
}

impl SerializeError {
    pub(crate) fn invalid(layer: LayerType, reason: impl Into<Cow<'static, str>>) -> Self {
        SerializeError::InvalidField { layer, reason: reason.into() }
    }

    pub(crate) fn length(layer: LayerType, reason: impl Into<Cow<'static, str>>) -> Self {
        SerializeError::LengthFixupFailed { layer, reason: reason.into() }
    }
}

/// Result of decoding a layer.
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result of serializing a layer.
pub type SerializeResult<T> = Result<T, SerializeError>;
