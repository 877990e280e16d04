use core::any::Any;

use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{DecodeError, SerializeError};
use crate::flow::{EndpointType, Flow};
use crate::layer::{BaseLayer, DecodeFeedback, Layer, LayerType, SerializeBuffer, SerializeOptions};
use super::ip::{checksum, Protocol, PseudoHeader};

byte_wrapper! {
    /// A byte sequence representing a UDP datagram.
    #[derive(Debug, PartialEq, Eq)]
    pub struct udp([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const SRC_PORT: Field = 0..2;
    pub(crate) const DST_PORT: Field = 2..4;
    pub(crate) const LENGTH:   Field = 4..6;
    pub(crate) const CHECKSUM: Field = 6..8;
}

/// Length of the datagram header.
pub const HEADER_LEN: usize = field::CHECKSUM.end;

/// Well-known ports with a decoder for their payload.
pub fn port_layer_type(port: u16) -> LayerType {
    match port {
        53 | 5353 => LayerType::Dns,
        _ => LayerType::Payload,
    }
}

impl udp {
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    pub fn new_checked(data: &[u8]) -> Result<&Self, DecodeError> {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::truncated(LayerType::Udp, HEADER_LEN, data.len()));
        }
        Ok(Self::new_unchecked(data))
    }

    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::SRC_PORT])
    }

    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::DST_PORT])
    }

    pub fn len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::LENGTH])
    }

    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::SRC_PORT], value)
    }

    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::DST_PORT], value)
    }

    pub fn set_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::LENGTH], value)
    }

    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }
}

/// A decoded UDP header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Udp {
    base: BaseLayer,
    pub src_port: u16,
    pub dst_port: u16,
    /// Length of header and payload.
    pub length: u16,
    pub checksum: u16,
    network: Option<PseudoHeader>,
}

impl Udp {
    pub fn new(src_port: u16, dst_port: u16) -> Self {
        Udp { src_port, dst_port, ..Udp::default() }
    }

    /// Provide the enclosing IP addresses so that serialization can compute the checksum.
    ///
    /// Without them the stored checksum is written even if checksums are computed.
    pub fn set_network_for_checksum(&mut self, network: PseudoHeader) {
        self.network = Some(network);
    }
}

impl Layer for Udp {
    fn layer_type(&self) -> LayerType {
        LayerType::Udp
    }

    fn decode_from_bytes(&mut self, data: &[u8], df: &mut dyn DecodeFeedback)
        -> Result<(), DecodeError>
    {
        let packet = udp::new_checked(data).map_err(|err| err.report(df))?;
        self.src_port = packet.src_port();
        self.dst_port = packet.dst_port();
        self.length = packet.len();
        self.checksum = packet.checksum();

        let end = match usize::from(self.length) {
            0 => data.len(),
            len if len < HEADER_LEN => {
                return Err(DecodeError::malformed(LayerType::Udp, "length shorter than header"));
            },
            len if len > data.len() => {
                df.set_truncated();
                data.len()
            },
            len => len,
        };

        self.base = BaseLayer::split(HEADER_LEN, end);
        Ok(())
    }

    fn base(&self) -> &BaseLayer {
        &self.base
    }

    fn next_layer_type(&self) -> LayerType {
        match port_layer_type(self.dst_port) {
            LayerType::Payload => port_layer_type(self.src_port),
            other => other,
        }
    }

    fn serialize_to(&mut self, buffer: &mut SerializeBuffer, options: SerializeOptions)
        -> Result<(), SerializeError>
    {
        if options.fix_lengths {
            self.length = u16::try_from(HEADER_LEN + buffer.len())
                .map_err(|_| SerializeError::length(LayerType::Udp, "payload exceeds 65527 octets"))?;
        }

        let packet = udp::new_unchecked_mut(buffer.prepend_bytes(HEADER_LEN));
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_len(self.length);

        if options.compute_checksums {
            if let Some(network) = &self.network {
                let segment = buffer.bytes();
                self.checksum = checksum::transport(network, Protocol::Udp, segment)
                    .ok_or_else(|| SerializeError::invalid(LayerType::Udp, "mixed address families"))?;
            }
        }
        udp::new_unchecked_mut(buffer.bytes_mut()).set_checksum(self.checksum);
        Ok(())
    }

    fn flow(&self) -> Option<Flow> {
        Flow::new(EndpointType::UDP_PORT, &self.src_port.to_be_bytes(), &self.dst_port.to_be_bytes()).ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::layer::{serialize_layers, Truncation};
    use crate::wire::Payload;

    static PACKET_BYTES: [u8; 12] =
        [0xbf, 0x00, 0x00, 0x35,
         0x00, 0x0c, 0x12, 0x4d,
         0xaa, 0x00, 0x00, 0xff];

    static PAYLOAD_BYTES: [u8; 4] =
        [0xaa, 0x00, 0x00, 0xff];

    fn network() -> PseudoHeader {
        PseudoHeader {
            src_addr: Ipv4Addr::new(192, 168, 1, 1).into(),
            dst_addr: Ipv4Addr::new(192, 168, 1, 2).into(),
        }
    }

    #[test]
    fn test_deconstruct() {
        let mut layer = Udp::default();
        layer.decode_from_bytes(&PACKET_BYTES, &mut Truncation::default()).unwrap();
        assert_eq!(layer.src_port, 48896);
        assert_eq!(layer.dst_port, 53);
        assert_eq!(layer.length, 12);
        assert_eq!(layer.checksum, 0x124d);
        assert_eq!(layer.base().payload, 8..12);
        assert_eq!(layer.next_layer_type(), LayerType::Dns);
        assert_eq!(layer.flow().unwrap().to_string(), "48896->53");
    }

    #[test]
    fn test_construct() {
        let mut layer = Udp::new(48896, 53);
        layer.set_network_for_checksum(network());
        let mut payload = Payload::new(PAYLOAD_BYTES.to_vec());
        let bytes = serialize_layers(SerializeOptions::FIX_ALL, &mut [&mut layer, &mut payload]).unwrap();
        assert_eq!(&bytes[..], &PACKET_BYTES[..]);
        assert_eq!(layer.checksum, 0x124d);
    }

    #[test]
    fn test_zero_checksum() {
        let mut layer = Udp::new(1, 31881);
        layer.set_network_for_checksum(network());
        serialize_layers(SerializeOptions::FIX_ALL, &mut [&mut layer]).unwrap();
        assert_eq!(layer.checksum, 0xffff);
    }

    #[test]
    fn test_impossible_len() {
        let mut bytes = PACKET_BYTES;
        bytes[5] = 4;
        let err = Udp::default().decode_from_bytes(&bytes, &mut Truncation::default()).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { layer: LayerType::Udp, .. }));
    }

    #[test]
    fn test_length_trims_payload() {
        let mut bytes = PACKET_BYTES.to_vec();
        bytes.extend_from_slice(&[0, 0]);
        let mut layer = Udp::default();
        let mut feedback = Truncation::default();
        layer.decode_from_bytes(&bytes, &mut feedback).unwrap();
        assert_eq!(layer.base().payload, 8..12);
        assert!(!feedback.is_truncated());

        layer.decode_from_bytes(&bytes[..10], &mut feedback).unwrap();
        assert_eq!(layer.base().payload, 8..10);
        assert!(feedback.is_truncated());
    }
}
