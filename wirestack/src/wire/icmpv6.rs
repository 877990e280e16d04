use core::any::Any;
use core::fmt;

use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{DecodeError, SerializeError};
use crate::layer::{BaseLayer, DecodeFeedback, Layer, LayerType, SerializeBuffer, SerializeOptions};
use super::ip::{checksum, Protocol, PseudoHeader};

enum_with_unknown! {
    /// Internet protocol control message type, version 6.
    #[derive(Hash)]
    pub enum Message(u8) {
        DstUnreachable = 1,
        PacketTooBig = 2,
        TimeExceeded = 3,
        ParamProblem = 4,
        EchoRequest = 128,
        EchoReply = 129,
        RouterSolicit = 133,
        RouterAdvert = 134,
        NeighborSolicit = 135,
        NeighborAdvert = 136,
        Redirect = 137,
    }
}

impl Message {
    /// The layer decoding the message body, for the neighbor discovery messages.
    pub fn layer_type(self) -> LayerType {
        match self {
            Message::RouterSolicit => LayerType::Icmpv6RouterSolicitation,
            Message::RouterAdvert => LayerType::Icmpv6RouterAdvertisement,
            Message::NeighborSolicit => LayerType::Icmpv6NeighborSolicitation,
            Message::NeighborAdvert => LayerType::Icmpv6NeighborAdvertisement,
            Message::Redirect => LayerType::Icmpv6Redirect,
            _ => LayerType::Payload,
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Message::Unknown(0)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Message::DstUnreachable  => write!(f, "destination unreachable"),
            Message::PacketTooBig    => write!(f, "packet too big"),
            Message::TimeExceeded    => write!(f, "time exceeded"),
            Message::ParamProblem    => write!(f, "parameter problem"),
            Message::EchoRequest     => write!(f, "echo request"),
            Message::EchoReply       => write!(f, "echo reply"),
            Message::RouterSolicit   => write!(f, "router solicitation"),
            Message::RouterAdvert    => write!(f, "router advertisement"),
            Message::NeighborSolicit => write!(f, "neighbor solicitation"),
            Message::NeighborAdvert  => write!(f, "neighbor advertisement"),
            Message::Redirect        => write!(f, "redirect"),
            Message::Unknown(id)     => write!(f, "{}", id),
        }
    }
}

byte_wrapper! {
    /// A byte sequence representing an ICMPv6 message.
    #[derive(Debug, PartialEq, Eq)]
    pub struct icmpv6([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const TYPE:     usize = 0;
    pub(crate) const CODE:     usize = 1;
    pub(crate) const CHECKSUM: Field = 2..4;
}

/// Length of the common message header.
pub const HEADER_LEN: usize = field::CHECKSUM.end;

impl icmpv6 {
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    pub fn new_checked(data: &[u8]) -> Result<&Self, DecodeError> {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::truncated(LayerType::Icmpv6, HEADER_LEN, data.len()));
        }
        Ok(Self::new_unchecked(data))
    }

    pub fn msg_type(&self) -> Message {
        self.0[field::TYPE].into()
    }

    pub fn msg_code(&self) -> u8 {
        self.0[field::CODE]
    }

    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    pub fn set_msg_type(&mut self, value: Message) {
        self.0[field::TYPE] = value.into()
    }

    pub fn set_msg_code(&mut self, value: u8) {
        self.0[field::CODE] = value
    }

    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }
}

/// The common header of an ICMPv6 message.
///
/// The message body is the payload, decoded by the neighbor discovery layers where they apply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Icmpv6 {
    base: BaseLayer,
    pub msg_type: Message,
    pub code: u8,
    pub checksum: u16,
    network: Option<PseudoHeader>,
}

impl Icmpv6 {
    pub fn new(msg_type: Message, code: u8) -> Self {
        Icmpv6 { msg_type, code, ..Icmpv6::default() }
    }

    /// Provide the enclosing IPv6 addresses so that serialization can compute the checksum.
    pub fn set_network_for_checksum(&mut self, network: PseudoHeader) {
        self.network = Some(network);
    }
}

impl Layer for Icmpv6 {
    fn layer_type(&self) -> LayerType {
        LayerType::Icmpv6
    }

    fn decode_from_bytes(&mut self, data: &[u8], df: &mut dyn DecodeFeedback)
        -> Result<(), DecodeError>
    {
        let packet = icmpv6::new_checked(data).map_err(|err| err.report(df))?;
        self.msg_type = packet.msg_type();
        self.code = packet.msg_code();
        self.checksum = packet.checksum();
        self.base = BaseLayer::split(HEADER_LEN, data.len());
        Ok(())
    }

    fn base(&self) -> &BaseLayer {
        &self.base
    }

    fn next_layer_type(&self) -> LayerType {
        self.msg_type.layer_type()
    }

    fn serialize_to(&mut self, buffer: &mut SerializeBuffer, options: SerializeOptions)
        -> Result<(), SerializeError>
    {
        let packet = icmpv6::new_unchecked_mut(buffer.prepend_bytes(HEADER_LEN));
        packet.set_msg_type(self.msg_type);
        packet.set_msg_code(self.code);

        if options.compute_checksums {
            if let Some(network) = &self.network {
                self.checksum = checksum::transport(network, Protocol::Icmpv6, buffer.bytes())
                    .ok_or_else(|| SerializeError::invalid(LayerType::Icmpv6, "mixed address families"))?;
            }
        }
        icmpv6::new_unchecked_mut(buffer.bytes_mut()).set_checksum(self.checksum);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod test {
    use std::net::Ipv6Addr;

    use super::*;
    use crate::layer::{serialize_layers, Truncation};
    use crate::wire::Payload;

    // Router solicitation from fe80::1 to ff02::2, without options.
    static PACKET_BYTES: [u8; 8] =
        [0x85, 0x00, 0x7d, 0x36,
         0x00, 0x00, 0x00, 0x00];

    fn network() -> PseudoHeader {
        PseudoHeader {
            src_addr: Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1).into(),
            dst_addr: Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0, 2).into(),
        }
    }

    #[test]
    fn test_deconstruct() {
        let mut layer = Icmpv6::default();
        layer.decode_from_bytes(&PACKET_BYTES, &mut Truncation::default()).unwrap();
        assert_eq!(layer.msg_type, Message::RouterSolicit);
        assert_eq!(layer.code, 0);
        assert_eq!(layer.checksum, 0x7d36);
        assert_eq!(layer.base().payload, 4..8);
        assert_eq!(layer.next_layer_type(), LayerType::Icmpv6RouterSolicitation);
    }

    #[test]
    fn test_construct() {
        let mut layer = Icmpv6::new(Message::RouterSolicit, 0);
        layer.set_network_for_checksum(network());
        let mut body = Payload::new(PACKET_BYTES[4..].to_vec());
        let bytes = serialize_layers(SerializeOptions::FIX_ALL, &mut [&mut layer, &mut body]).unwrap();
        assert_eq!(&bytes[..], &PACKET_BYTES[..]);
    }

    #[test]
    fn test_other_messages_are_payload() {
        let mut layer = Icmpv6::default();
        layer.decode_from_bytes(&[128, 0, 0, 0, 0, 1, 0, 1], &mut Truncation::default()).unwrap();
        assert_eq!(layer.msg_type, Message::EchoRequest);
        assert_eq!(layer.next_layer_type(), LayerType::Payload);
    }

    #[test]
    fn test_short() {
        let mut feedback = Truncation::default();
        let err = Icmpv6::default().decode_from_bytes(&[0x85, 0], &mut feedback).unwrap_err();
        assert!(err.is_truncated());
        assert!(feedback.is_truncated());
    }
}
