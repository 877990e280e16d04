use core::fmt;
use core::any::Any;

use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{DecodeError, SerializeError};
use crate::flow::{EndpointType, Flow};
use crate::layer::{BaseLayer, DecodeFeedback, Layer, LayerType, SerializeBuffer, SerializeOptions};

enum_with_unknown! {
    /// Ethernet protocol type.
    #[derive(Hash)]
    pub enum EtherType(u16) {
        Ipv4 = 0x0800,
        Arp  = 0x0806,
        Ipv6 = 0x86DD,
        JumboFrame = 0x8870,
    }
}

impl EtherType {
    /// The decoder for frames carrying this type.
    pub fn layer_type(self) -> LayerType {
        match self {
            EtherType::Ipv4 => LayerType::Ipv4,
            EtherType::Ipv6 => LayerType::Ipv6,
            _ => LayerType::Payload,
        }
    }

    /// Values below 0x0600 are an 802.3 length instead of a type.
    pub fn is_length(self) -> bool {
        u16::from(self) < 0x0600
    }
}

impl fmt::Display for EtherType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EtherType::Ipv4 => write!(f, "IPv4"),
            EtherType::Ipv6 => write!(f, "IPv6"),
            EtherType::Arp  => write!(f, "ARP"),
            EtherType::JumboFrame => write!(f, "JumboFrame"),
            EtherType::Unknown(id) => write!(f, "0x{:04x}", id)
        }
    }
}

/// A six-octet Ethernet II address.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default)]
pub struct Address(pub [u8; 6]);

impl Address {
    /// Return an Ethernet address as a sequence of octets, in big-endian.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let bytes = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
               bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5])
    }
}

byte_wrapper! {
    /// A byte sequence representing an Ethernet II frame.
    #[derive(Debug, PartialEq, Eq)]
    pub struct ethernet([u8]);
}

mod field {
    use crate::wire::field::*;

    pub(crate) const DESTINATION: Field =  0..6;
    pub(crate) const SOURCE:      Field =  6..12;
    pub(crate) const ETHERTYPE:   Field = 12..14;
    pub(crate) const PAYLOAD:     Rest  = 14..;
}

/// Frames are padded to this length, not counting the frame check sequence.
pub const MIN_FRAME_LEN: usize = 60;

impl ethernet {
    /// Imbue a raw octet buffer with Ethernet frame structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with Ethernet frame structure.
    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    pub fn new_checked(data: &[u8]) -> Result<&Self, DecodeError> {
        Self::new_unchecked(data).check_len()?;
        Ok(Self::new_unchecked(data))
    }

    /// Ensure that no accessor method will panic if called.
    pub fn check_len(&self) -> Result<(), DecodeError> {
        let len = self.0.len();
        if len < field::PAYLOAD.start {
            Err(DecodeError::truncated(LayerType::Ethernet, field::PAYLOAD.start, len))
        } else {
            Ok(())
        }
    }

    /// Return the length of a frame header.
    pub fn header_len() -> usize {
        field::PAYLOAD.start
    }

    pub fn dst_addr(&self) -> Address {
        let mut addr = [0; 6];
        addr.copy_from_slice(&self.0[field::DESTINATION]);
        Address(addr)
    }

    pub fn src_addr(&self) -> Address {
        let mut addr = [0; 6];
        addr.copy_from_slice(&self.0[field::SOURCE]);
        Address(addr)
    }

    pub fn ethertype(&self) -> EtherType {
        NetworkEndian::read_u16(&self.0[field::ETHERTYPE]).into()
    }

    pub fn set_dst_addr(&mut self, value: Address) {
        self.0[field::DESTINATION].copy_from_slice(value.as_bytes())
    }

    pub fn set_src_addr(&mut self, value: Address) {
        self.0[field::SOURCE].copy_from_slice(value.as_bytes())
    }

    pub fn set_ethertype(&mut self, value: EtherType) {
        NetworkEndian::write_u16(&mut self.0[field::ETHERTYPE], value.into())
    }
}

/// A decoded Ethernet II or 802.3 frame header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ethernet {
    base: BaseLayer,
    pub src_mac: Address,
    pub dst_mac: Address,
    /// The type field, or the length of an 802.3 frame.
    pub ethertype: EtherType,
}

impl Default for EtherType {
    fn default() -> Self {
        EtherType::Unknown(0)
    }
}

impl Ethernet {
    /// The length of an 802.3 frame.
    pub fn length(&self) -> Option<u16> {
        Some(self.ethertype)
            .filter(|typ| typ.is_length())
            .map(u16::from)
    }
}

impl Layer for Ethernet {
    fn layer_type(&self) -> LayerType {
        LayerType::Ethernet
    }

    fn decode_from_bytes(&mut self, data: &[u8], df: &mut dyn DecodeFeedback)
        -> Result<(), DecodeError>
    {
        let frame = ethernet::new_checked(data).map_err(|err| err.report(df))?;
        self.dst_mac = frame.dst_addr();
        self.src_mac = frame.src_addr();
        self.ethertype = frame.ethertype();

        let header_len = ethernet::header_len();
        let end = match self.length() {
            Some(length) => {
                let end = header_len + usize::from(length);
                if end > data.len() {
                    df.set_truncated();
                }
                end.min(data.len())
            },
            None => data.len(),
        };

        self.base = BaseLayer::split(header_len, end);
        Ok(())
    }

    fn base(&self) -> &BaseLayer {
        &self.base
    }

    fn next_layer_type(&self) -> LayerType {
        self.ethertype.layer_type()
    }

    fn serialize_to(&mut self, buffer: &mut SerializeBuffer, options: SerializeOptions)
        -> Result<(), SerializeError>
    {
        if options.fix_lengths && self.ethertype.is_length() {
            let length = u16::try_from(buffer.len())
                .ok()
                .filter(|&len| EtherType::from(len).is_length())
                .ok_or_else(|| SerializeError::length(LayerType::Ethernet, "802.3 payload too long"))?;
            self.ethertype = length.into();
        }

        let header = buffer.prepend_bytes(ethernet::header_len());
        let frame = ethernet::new_unchecked_mut(header);
        frame.set_dst_addr(self.dst_mac);
        frame.set_src_addr(self.src_mac);
        frame.set_ethertype(self.ethertype);

        if options.fix_lengths && buffer.len() < MIN_FRAME_LEN {
            buffer.append_bytes(MIN_FRAME_LEN - buffer.len());
        }
        Ok(())
    }

    fn flow(&self) -> Option<Flow> {
        Flow::new(EndpointType::MAC, self.src_mac.as_bytes(), self.dst_mac.as_bytes()).ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layer::{serialize_layers, Truncation};
    use crate::wire::Payload;

    static FRAME_BYTES: [u8; 64] =
        [0x01, 0x02, 0x03, 0x04, 0x05, 0x06,
         0x11, 0x12, 0x13, 0x14, 0x15, 0x16,
         0x08, 0x00,
         0xaa, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
         0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
         0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
         0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
         0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
         0x00, 0x00,
         0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff];

    #[test]
    fn test_deconstruct() {
        let mut layer = Ethernet::default();
        layer.decode_from_bytes(&FRAME_BYTES, &mut Truncation::default()).unwrap();
        assert_eq!(layer.dst_mac, Address([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]));
        assert_eq!(layer.src_mac, Address([0x11, 0x12, 0x13, 0x14, 0x15, 0x16]));
        assert_eq!(layer.ethertype, EtherType::Ipv4);
        assert_eq!(layer.next_layer_type(), LayerType::Ipv4);
        assert_eq!(layer.base().contents, 0..14);
        assert_eq!(layer.base().payload, 14..64);
        assert_eq!(layer.flow().unwrap().to_string(), "11:12:13:14:15:16->01:02:03:04:05:06");
    }

    #[test]
    fn test_truncated() {
        let mut feedback = Truncation::default();
        let err = Ethernet::default()
            .decode_from_bytes(&FRAME_BYTES[..13], &mut feedback)
            .unwrap_err();
        assert_eq!(err, DecodeError::truncated(LayerType::Ethernet, 14, 13));
        assert!(feedback.is_truncated());
    }

    #[test]
    fn test_ieee802_3_length() {
        let mut bytes = FRAME_BYTES;
        bytes[12..14].copy_from_slice(&[0x00, 0x04]);
        let mut layer = Ethernet::default();
        layer.decode_from_bytes(&bytes, &mut Truncation::default()).unwrap();
        assert_eq!(layer.length(), Some(4));
        assert_eq!(layer.base().payload, 14..18);
        assert_eq!(layer.next_layer_type(), LayerType::Payload);
    }

    #[test]
    fn test_construct_pads() {
        let mut eth = Ethernet {
            dst_mac: Address([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]),
            src_mac: Address([0x11, 0x12, 0x13, 0x14, 0x15, 0x16]),
            ethertype: EtherType::Ipv4,
            ..Ethernet::default()
        };
        let mut payload = Payload::new(vec![0xaa]);
        let options = SerializeOptions { fix_lengths: true, ..SerializeOptions::default() };
        let bytes = serialize_layers(options, &mut [&mut eth, &mut payload]).unwrap();
        assert_eq!(bytes.len(), MIN_FRAME_LEN);
        assert_eq!(&bytes[..], &FRAME_BYTES[..60]);
    }

    #[test]
    fn test_address_text() {
        let addr = Address([0x00, 0x1f, 0x16, 0xaa, 0x0b, 0xff]);
        assert_eq!(addr.to_string(), "00:1f:16:aa:0b:ff");
    }
}
