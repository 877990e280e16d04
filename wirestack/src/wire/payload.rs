//! Layers without protocol structure: opaque payload and the record of a failed decode.
use core::any::Any;

use bytes::Bytes;

use crate::error::{DecodeError, SerializeError};
use crate::layer::{BaseLayer, DecodeFeedback, Layer, LayerType, SerializeBuffer, SerializeOptions};

/// Opaque bytes at the end of a packet.
///
/// Decoding copies the bytes into `data`, which is also what serialization writes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Payload {
    base: BaseLayer,
    /// The payload octets.
    pub data: Bytes,
}

impl Payload {
    /// A payload layer writing `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Payload { base: BaseLayer::default(), data: data.into() }
    }
}

impl Layer for Payload {
    fn layer_type(&self) -> LayerType {
        LayerType::Payload
    }

    fn decode_from_bytes(&mut self, data: &[u8], _: &mut dyn DecodeFeedback)
        -> Result<(), DecodeError>
    {
        self.data = Bytes::copy_from_slice(data);
        self.base = BaseLayer::whole(data.len());
        Ok(())
    }

    fn base(&self) -> &BaseLayer {
        &self.base
    }

    fn serialize_to(&mut self, buffer: &mut SerializeBuffer, _: SerializeOptions)
        -> Result<(), SerializeError>
    {
        buffer.prepend_bytes(self.data.len()).copy_from_slice(&self.data);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Records the error that stopped decoding of a packet.
///
/// Its contents are all the bytes the failing decoder was given.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeFailure {
    base: BaseLayer,
    /// The layer type whose decoder failed.
    pub failed: LayerType,
    pub error: DecodeError,
}

impl DecodeFailure {
    pub(crate) fn new(failed: LayerType, error: DecodeError, len: usize) -> Self {
        DecodeFailure {
            base: BaseLayer::whole(len),
            failed,
            error,
        }
    }
}

impl Layer for DecodeFailure {
    fn layer_type(&self) -> LayerType {
        LayerType::DecodeFailure
    }

    /// Covers all of `data`. The error stays as constructed.
    fn decode_from_bytes(&mut self, data: &[u8], _: &mut dyn DecodeFeedback)
        -> Result<(), DecodeError>
    {
        self.base = BaseLayer::whole(data.len());
        Ok(())
    }

    fn base(&self) -> &BaseLayer {
        &self.base
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layer::{serialize_layers, NilDecodeFeedback};

    #[test]
    fn test_payload_covers_everything() {
        let mut layer = Payload::default();
        layer.decode_from_bytes(&[1, 2, 3], &mut NilDecodeFeedback).unwrap();
        assert_eq!(layer.base().contents, 0..3);
        assert!(layer.base().payload.is_empty());
        assert_eq!(&layer.data[..], &[1, 2, 3]);
    }

    #[test]
    fn test_decoded_payload_serializes_again() {
        let mut layer = Payload::default();
        layer.decode_from_bytes(b"trailing", &mut NilDecodeFeedback).unwrap();
        let bytes = serialize_layers(SerializeOptions::default(), &mut [&mut layer]).unwrap();
        assert_eq!(&bytes[..], b"trailing");
    }

    #[test]
    fn test_payload_serializes_data() {
        let mut layer = Payload::new(&b"hello"[..]);
        let bytes = serialize_layers(SerializeOptions::default(), &mut [&mut layer]).unwrap();
        assert_eq!(&bytes[..], b"hello");
    }

    #[test]
    fn test_failure_is_not_serializable() {
        let mut layer = DecodeFailure::new(LayerType::Dns, DecodeError::Unsupported(LayerType::Dns), 0);
        let err = serialize_layers(SerializeOptions::default(), &mut [&mut layer]).unwrap_err();
        assert_eq!(err, SerializeError::UnsupportedLayer(LayerType::DecodeFailure));
    }
}
