//! BSD loopback encapsulation.
//!
//! A four octet protocol family in the byte order of the capturing host precedes the packet. The
//! order is guessed: families are small numbers so a value with two leading zero octets was
//! written big-endian.
use core::any::Any;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{DecodeError, SerializeError};
use crate::layer::{BaseLayer, DecodeFeedback, Layer, LayerType, SerializeBuffer, SerializeOptions};

enum_with_unknown! {
    /// Address family of the encapsulated packet.
    #[derive(Hash)]
    pub enum ProtocolFamily(u32) {
        Ipv4 = 2,
        /// IPv6 as numbered by NetBSD and OpenBSD.
        Ipv6Bsd = 24,
        /// IPv6 as numbered by FreeBSD.
        Ipv6FreeBsd = 28,
        /// IPv6 as numbered by Darwin.
        Ipv6Darwin = 30,
    }
}

impl ProtocolFamily {
    /// The decoder for packets of this family.
    pub fn layer_type(self) -> LayerType {
        match self {
            ProtocolFamily::Ipv4 => LayerType::Ipv4,
            ProtocolFamily::Ipv6Bsd
            | ProtocolFamily::Ipv6FreeBsd
            | ProtocolFamily::Ipv6Darwin => LayerType::Ipv6,
            ProtocolFamily::Unknown(_) => LayerType::Payload,
        }
    }
}

impl Default for ProtocolFamily {
    fn default() -> Self {
        ProtocolFamily::Unknown(0)
    }
}

const HEADER_LEN: usize = 4;

/// A decoded loopback header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Loopback {
    base: BaseLayer,
    pub family: ProtocolFamily,
}

impl Loopback {
    pub fn new(family: ProtocolFamily) -> Self {
        Loopback { family, ..Loopback::default() }
    }
}

impl Layer for Loopback {
    fn layer_type(&self) -> LayerType {
        LayerType::Loopback
    }

    fn decode_from_bytes(&mut self, data: &[u8], df: &mut dyn DecodeFeedback)
        -> Result<(), DecodeError>
    {
        let header = data.get(..HEADER_LEN)
            .ok_or_else(|| DecodeError::truncated(LayerType::Loopback, HEADER_LEN, data.len()).report(df))?;
        let family = if header[0] == 0 && header[1] == 0 {
            BigEndian::read_u32(header)
        } else {
            LittleEndian::read_u32(header)
        };

        self.family = family.into();
        self.base = BaseLayer::split(HEADER_LEN, data.len());
        Ok(())
    }

    fn base(&self) -> &BaseLayer {
        &self.base
    }

    fn next_layer_type(&self) -> LayerType {
        self.family.layer_type()
    }

    fn serialize_to(&mut self, buffer: &mut SerializeBuffer, _: SerializeOptions)
        -> Result<(), SerializeError>
    {
        let header = buffer.prepend_bytes(HEADER_LEN);
        LittleEndian::write_u32(header, self.family.into());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layer::{NilDecodeFeedback, serialize_layers};

    #[test]
    fn test_byte_order_guess() {
        let mut layer = Loopback::default();
        layer.decode_from_bytes(&[0x02, 0x00, 0x00, 0x00, 0x45], &mut NilDecodeFeedback).unwrap();
        assert_eq!(layer.family, ProtocolFamily::Ipv4);
        assert_eq!(layer.base().payload, 4..5);

        layer.decode_from_bytes(&[0x00, 0x00, 0x00, 0x1e], &mut NilDecodeFeedback).unwrap();
        assert_eq!(layer.family, ProtocolFamily::Ipv6Darwin);
        assert_eq!(layer.next_layer_type(), LayerType::Ipv6);
        assert!(layer.base().payload.is_empty());
    }

    #[test]
    fn test_construct() {
        let mut layer = Loopback::new(ProtocolFamily::Ipv6Bsd);
        let bytes = serialize_layers(SerializeOptions::default(), &mut [&mut layer]).unwrap();
        assert_eq!(&bytes[..], &[24, 0, 0, 0]);
    }
}
