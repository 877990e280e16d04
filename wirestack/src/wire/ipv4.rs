use core::any::Any;
use core::fmt;
use std::net::Ipv4Addr;

use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{DecodeError, SerializeError};
use crate::flow::{EndpointType, Flow};
use crate::layer::{BaseLayer, DecodeFeedback, Layer, LayerType, SerializeBuffer, SerializeOptions};
use super::ip::{checksum, Protocol, PseudoHeader};
use super::option::{self, KindLength};

byte_wrapper! {
    /// A byte sequence representing an IPv4 packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct ipv4([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const VER_IHL:  usize = 0;
    pub(crate) const DSCP_ECN: usize = 1;
    pub(crate) const LENGTH:   Field = 2..4;
    pub(crate) const IDENT:    Field = 4..6;
    pub(crate) const FLG_OFF:  Field = 6..8;
    pub(crate) const TTL:      usize = 8;
    pub(crate) const PROTOCOL: usize = 9;
    pub(crate) const CHECKSUM: Field = 10..12;
    pub(crate) const SRC_ADDR: Field = 12..16;
    pub(crate) const DST_ADDR: Field = 16..20;
}

/// Length of a header without options.
pub const MIN_HEADER_LEN: usize = field::DST_ADDR.end;

/// Headers with options are at most fifteen words long.
pub const MAX_HEADER_LEN: usize = 60;

impl ipv4 {
    /// Imbue a raw octet buffer with IPv4 packet structure.
    pub fn new_unchecked(buffer: &[u8]) -> &ipv4 {
        Self::__from_macro_new_unchecked(buffer)
    }

    /// Imbue a mutable octet buffer with IPv4 packet structure.
    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut ipv4 {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&ipv4, DecodeError> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that the fixed header fields can be accessed.
    ///
    /// Unlike a full parse this does not consider the header length or total length fields.
    pub fn check_len(&self) -> Result<(), DecodeError> {
        if self.0.len() < MIN_HEADER_LEN {
            Err(DecodeError::truncated(LayerType::Ipv4, MIN_HEADER_LEN, self.0.len()))
        } else {
            Ok(())
        }
    }

    pub fn version(&self) -> u8 {
        self.0[field::VER_IHL] >> 4
    }

    /// The header length field in 32-bit words.
    pub fn ihl(&self) -> u8 {
        self.0[field::VER_IHL] & 0x0f
    }

    pub fn tos(&self) -> u8 {
        self.0[field::DSCP_ECN]
    }

    pub fn total_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::LENGTH])
    }

    pub fn ident(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::IDENT])
    }

    pub fn flags(&self) -> Flags {
        Flags((self.0[field::FLG_OFF.start] >> 5) & 0x07)
    }

    /// The fragment offset in units of eight octets.
    pub fn frag_offset(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::FLG_OFF]) & 0x1fff
    }

    pub fn ttl(&self) -> u8 {
        self.0[field::TTL]
    }

    pub fn protocol(&self) -> Protocol {
        self.0[field::PROTOCOL].into()
    }

    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.0[12], self.0[13], self.0[14], self.0[15])
    }

    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.0[16], self.0[17], self.0[18], self.0[19])
    }

    pub fn set_version_ihl(&mut self, version: u8, ihl: u8) {
        self.0[field::VER_IHL] = (version << 4) | (ihl & 0x0f);
    }

    pub fn set_tos(&mut self, value: u8) {
        self.0[field::DSCP_ECN] = value;
    }

    pub fn set_total_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::LENGTH], value)
    }

    pub fn set_ident(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::IDENT], value)
    }

    pub fn set_flags_frag_offset(&mut self, flags: Flags, offset: u16) {
        let raw = (u16::from(flags.0 & 0x07) << 13) | (offset & 0x1fff);
        NetworkEndian::write_u16(&mut self.0[field::FLG_OFF], raw)
    }

    pub fn set_ttl(&mut self, value: u8) {
        self.0[field::TTL] = value;
    }

    pub fn set_protocol(&mut self, value: Protocol) {
        self.0[field::PROTOCOL] = value.into();
    }

    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    pub fn set_src_addr(&mut self, value: Ipv4Addr) {
        self.0[field::SRC_ADDR].copy_from_slice(&value.octets())
    }

    pub fn set_dst_addr(&mut self, value: Ipv4Addr) {
        self.0[field::DST_ADDR].copy_from_slice(&value.octets())
    }

    /// Compute the header checksum over the first `header_len` octets.
    ///
    /// The checksum field is treated as zero.
    pub fn compute_checksum(&self, header_len: usize) -> u16 {
        let header = &self.0[..header_len];
        !checksum::combine(&[
            checksum::data(&header[..field::CHECKSUM.start]),
            checksum::data(&header[field::CHECKSUM.end..]),
        ])
    }
}

/// The three flag bits preceding the fragment offset.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub struct Flags(pub u8);

impl Flags {
    /// More fragments follow this one.
    pub const MORE_FRAGMENTS: Flags = Flags(0x1);
    /// The packet must not be fragmented.
    pub const DONT_FRAGMENT: Flags = Flags(0x2);

    pub fn more_frags(self) -> bool {
        self.0 & Self::MORE_FRAGMENTS.0 != 0
    }

    pub fn dont_frag(self) -> bool {
        self.0 & Self::DONT_FRAGMENT.0 != 0
    }
}

/// One entry of the IPv4 option list.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Ipv4Option {
    /// The option kind, including copy and class bits.
    pub kind: u8,
    /// Option data following kind and length.
    pub data: Vec<u8>,
}

/// A decoded IPv4 header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ipv4 {
    base: BaseLayer,
    pub version: u8,
    /// Header length in 32-bit words.
    pub ihl: u8,
    pub tos: u8,
    /// Total length of header and payload.
    pub length: u16,
    pub id: u16,
    pub flags: Flags,
    /// Fragment offset in units of eight octets.
    pub frag_offset: u16,
    pub ttl: u8,
    pub protocol: Protocol,
    pub checksum: u16,
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub options: Vec<Ipv4Option>,
}

impl Default for Ipv4 {
    fn default() -> Self {
        Ipv4 {
            base: BaseLayer::default(),
            version: 4,
            ihl: 5,
            tos: 0,
            length: 0,
            id: 0,
            flags: Flags::default(),
            frag_offset: 0,
            ttl: 64,
            protocol: Protocol::Unknown(0xff),
            checksum: 0,
            src_addr: Ipv4Addr::UNSPECIFIED,
            dst_addr: Ipv4Addr::UNSPECIFIED,
            options: Vec::new(),
        }
    }
}

impl Ipv4 {
    /// The addresses for checksums of the carried transport segment.
    pub fn pseudo_header(&self) -> PseudoHeader {
        PseudoHeader {
            src_addr: self.src_addr.into(),
            dst_addr: self.dst_addr.into(),
        }
    }

    /// Whether this is one fragment of a larger datagram.
    pub fn is_fragment(&self) -> bool {
        self.flags.more_frags() || self.frag_offset != 0
    }

    fn encoded_options(&self) -> Result<Vec<u8>, SerializeError> {
        let mut encoded = Vec::new();
        option::emit_kind_length(
            self.options.iter().map(|opt| (opt.kind, &opt.data[..])),
            &mut encoded,
        ).map_err(|reason| SerializeError::invalid(LayerType::Ipv4, reason))?;
        Ok(encoded)
    }
}

impl fmt::Display for Ipv4 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IPv4 src={} dst={} proto={} ttl={} len={}",
               self.src_addr, self.dst_addr, self.protocol, self.ttl, self.length)
    }
}

impl Layer for Ipv4 {
    fn layer_type(&self) -> LayerType {
        LayerType::Ipv4
    }

    fn decode_from_bytes(&mut self, data: &[u8], df: &mut dyn DecodeFeedback)
        -> Result<(), DecodeError>
    {
        let packet = ipv4::new_checked(data).map_err(|err| err.report(df))?;
        self.version = packet.version();
        self.ihl = packet.ihl();
        self.tos = packet.tos();
        self.length = packet.total_len();
        self.id = packet.ident();
        self.flags = packet.flags();
        self.frag_offset = packet.frag_offset();
        self.ttl = packet.ttl();
        self.protocol = packet.protocol();
        self.checksum = packet.checksum();
        self.src_addr = packet.src_addr();
        self.dst_addr = packet.dst_addr();
        self.options.clear();

        if self.version != 4 {
            return Err(DecodeError::malformed(LayerType::Ipv4, format!("invalid version {}", self.version)));
        }
        if self.ihl < 5 {
            return Err(DecodeError::malformed(LayerType::Ipv4, format!("invalid (too small) header length {}", self.ihl)));
        }

        let header_len = usize::from(self.ihl) * 4;
        let mut total_len = match usize::from(self.length) {
            // Segmentation offload leaves the length unset.
            0 => data.len(),
            len if len < header_len => {
                return Err(DecodeError::malformed(LayerType::Ipv4, "total length shorter than header"));
            },
            len => len,
        };

        if header_len > data.len() {
            return Err(DecodeError::truncated(LayerType::Ipv4, header_len, data.len()).report(df));
        }
        if total_len > data.len() {
            net_debug!("IPv4 length {} exceeds {} captured octets", total_len, data.len());
            df.set_truncated();
            total_len = data.len();
        }

        let options = &mut self.options;
        option::for_each::<KindLength>(&data[MIN_HEADER_LEN..header_len], LayerType::Ipv4, df, |opt| {
            options.push(Ipv4Option { kind: opt.tag as u8, data: opt.data.to_vec() });
            Ok(())
        })?;

        self.base = BaseLayer::split(header_len, total_len);
        Ok(())
    }

    fn base(&self) -> &BaseLayer {
        &self.base
    }

    fn next_layer_type(&self) -> LayerType {
        if self.is_fragment() {
            LayerType::Payload
        } else {
            self.protocol.layer_type()
        }
    }

    fn serialize_to(&mut self, buffer: &mut SerializeBuffer, options: SerializeOptions)
        -> Result<(), SerializeError>
    {
        let encoded = self.encoded_options()?;
        let header_len = MIN_HEADER_LEN + encoded.len();
        if header_len > MAX_HEADER_LEN {
            return Err(SerializeError::invalid(LayerType::Ipv4, "options exceed 40 octets"));
        }

        if options.fix_lengths {
            self.ihl = (header_len / 4) as u8;
            self.length = u16::try_from(header_len + buffer.len())
                .map_err(|_| SerializeError::length(LayerType::Ipv4, "payload exceeds 65535 octets"))?;
        }

        let header = buffer.prepend_bytes(header_len);
        header[MIN_HEADER_LEN..].copy_from_slice(&encoded);
        let packet = ipv4::new_unchecked_mut(header);
        packet.set_version_ihl(self.version, self.ihl);
        packet.set_tos(self.tos);
        packet.set_total_len(self.length);
        packet.set_ident(self.id);
        packet.set_flags_frag_offset(self.flags, self.frag_offset);
        packet.set_ttl(self.ttl);
        packet.set_protocol(self.protocol);
        packet.set_src_addr(self.src_addr);
        packet.set_dst_addr(self.dst_addr);

        if options.compute_checksums {
            self.checksum = packet.compute_checksum(header_len);
        }
        packet.set_checksum(self.checksum);
        Ok(())
    }

    fn flow(&self) -> Option<Flow> {
        Flow::new(EndpointType::IPV4, &self.src_addr.octets(), &self.dst_addr.octets()).ok()
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

    static PACKET_BYTES: [u8; 30] =
        [0x45, 0x00, 0x00, 0x1e,
         0x01, 0x02, 0x62, 0x03,
         0x1a, 0x01, 0xd5, 0x6e,
         0x11, 0x12, 0x13, 0x14,
         0x21, 0x22, 0x23, 0x24,
         0xaa, 0x00, 0x00, 0x00,
         0x00, 0x00, 0x00, 0x00,
         0x00, 0xff];

    static REPR_PACKET_BYTES: [u8; 24] =
        [0x45, 0x00, 0x00, 0x18,
         0x00, 0x00, 0x40, 0x00,
         0x40, 0x01, 0xd2, 0x79,
         0x11, 0x12, 0x13, 0x14,
         0x21, 0x22, 0x23, 0x24,
         0xaa, 0x00, 0x00, 0xff];

    fn decode(data: &[u8]) -> (Result<Ipv4, DecodeError>, bool) {
        let mut layer = Ipv4::default();
        let mut feedback = Truncation::default();
        let result = layer.decode_from_bytes(data, &mut feedback).map(|_| layer);
        (result, feedback.is_truncated())
    }

    #[test]
    fn test_deconstruct() {
        let (layer, truncated) = decode(&PACKET_BYTES);
        let layer = layer.unwrap();
        assert!(!truncated);
        assert_eq!(layer.version, 4);
        assert_eq!(layer.ihl, 5);
        assert_eq!(layer.length, 30);
        assert_eq!(layer.id, 0x102);
        assert!(layer.flags.more_frags());
        assert!(layer.flags.dont_frag());
        assert_eq!(layer.frag_offset, 0x203);
        assert_eq!(layer.ttl, 0x1a);
        assert_eq!(layer.protocol, Protocol::Icmp);
        assert_eq!(layer.checksum, 0xd56e);
        assert_eq!(layer.src_addr, Ipv4Addr::new(0x11, 0x12, 0x13, 0x14));
        assert_eq!(layer.dst_addr, Ipv4Addr::new(0x21, 0x22, 0x23, 0x24));
        assert_eq!(layer.base().payload, 20..30);
        // A fragment is not decoded further.
        assert_eq!(layer.next_layer_type(), LayerType::Payload);
    }

    #[test]
    fn test_padding_excluded() {
        let mut bytes = REPR_PACKET_BYTES.to_vec();
        bytes.extend_from_slice(&[0; 6]);
        let (layer, truncated) = decode(&bytes);
        assert!(!truncated);
        assert_eq!(layer.unwrap().base().payload, 20..24);
    }

    #[test]
    fn test_total_len_beyond_capture() {
        let mut bytes = REPR_PACKET_BYTES;
        bytes[3] = 0x80;
        let (layer, truncated) = decode(&bytes);
        assert!(truncated);
        assert_eq!(layer.unwrap().base().payload, 20..24);
    }

    #[test]
    fn test_malformed_header_len() {
        let mut bytes = REPR_PACKET_BYTES;
        bytes[0] = 0x44;
        let (layer, truncated) = decode(&bytes);
        assert!(matches!(layer, Err(DecodeError::Malformed { layer: LayerType::Ipv4, .. })));
        assert!(!truncated);

        let mut bytes = REPR_PACKET_BYTES;
        bytes[0] = 0x4f;
        bytes[3] = 0x40;
        let (layer, truncated) = decode(&bytes);
        assert_eq!(layer, Err(DecodeError::truncated(LayerType::Ipv4, 60, 24)));
        assert!(truncated);
    }

    #[test]
    fn test_options() {
        let mut bytes = vec![
            0x47, 0x00, 0x00, 0x20,
            0x00, 0x00, 0x40, 0x00,
            0x40, 0x11, 0x00, 0x00,
            0x0a, 0x00, 0x00, 0x01,
            0x0a, 0x00, 0x00, 0x02,
            0x94, 0x04, 0x00, 0x00, // router alert
            0x01, 0x00, 0x00, 0x00, // nop, end of list, padding
        ];
        bytes.extend_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd]);
        let (layer, _) = decode(&bytes);
        let layer = layer.unwrap();
        assert_eq!(layer.options, vec![
            Ipv4Option { kind: 0x94, data: vec![0, 0] },
            Ipv4Option { kind: 0x01, data: vec![] },
            Ipv4Option { kind: 0x00, data: vec![] },
        ]);
        assert_eq!(layer.base().contents, 0..28);
        assert_eq!(layer.next_layer_type(), LayerType::Udp);

        bytes[21] = 0x09;
        let (layer, truncated) = decode(&bytes);
        assert!(layer.unwrap_err().is_truncated());
        assert!(truncated);
    }

    #[test]
    fn test_construct() {
        let mut ip = Ipv4 {
            flags: Flags::DONT_FRAGMENT,
            protocol: Protocol::Icmp,
            src_addr: Ipv4Addr::new(0x11, 0x12, 0x13, 0x14),
            dst_addr: Ipv4Addr::new(0x21, 0x22, 0x23, 0x24),
            ..Ipv4::default()
        };
        let mut payload = Payload::new(vec![0xaa, 0x00, 0x00, 0xff]);
        let bytes = serialize_layers(SerializeOptions::FIX_ALL, &mut [&mut ip, &mut payload]).unwrap();
        assert_eq!(&bytes[..], &REPR_PACKET_BYTES[..]);
        assert_eq!(ip.length, 24);
        assert_eq!(ip.checksum, 0xd279);
    }
}
