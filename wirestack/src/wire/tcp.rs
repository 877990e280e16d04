use core::any::Any;
use core::fmt;

use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{DecodeError, SerializeError};
use crate::flow::{EndpointType, Flow};
use crate::layer::{BaseLayer, DecodeFeedback, Layer, LayerType, SerializeBuffer, SerializeOptions};
use super::ip::{checksum, Protocol, PseudoHeader};
use super::option::{self, KindLength};

byte_wrapper! {
    /// A byte sequence representing a TCP segment.
    #[derive(Debug, PartialEq, Eq)]
    pub struct tcp([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const SRC_PORT: Field = 0..2;
    pub(crate) const DST_PORT: Field = 2..4;
    pub(crate) const SEQ_NUM:  Field = 4..8;
    pub(crate) const ACK_NUM:  Field = 8..12;
    pub(crate) const FLAGS:    Field = 12..14;
    pub(crate) const WIN_SIZE: Field = 14..16;
    pub(crate) const CHECKSUM: Field = 16..18;
    pub(crate) const URGENT:   Field = 18..20;

    pub(crate) const FLG_FIN: u16 = 0x001;
    pub(crate) const FLG_SYN: u16 = 0x002;
    pub(crate) const FLG_RST: u16 = 0x004;
    pub(crate) const FLG_PSH: u16 = 0x008;
    pub(crate) const FLG_ACK: u16 = 0x010;
    pub(crate) const FLG_URG: u16 = 0x020;
    pub(crate) const FLG_ECE: u16 = 0x040;
    pub(crate) const FLG_CWR: u16 = 0x080;
    pub(crate) const FLG_NS:  u16 = 0x100;
}

/// Length of a header without options.
pub const MIN_HEADER_LEN: usize = field::URGENT.end;

/// The EtherNet/IP explicit messaging port.
pub const ENIP_PORT: u16 = 44818;

impl tcp {
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    pub fn new_checked(data: &[u8]) -> Result<&Self, DecodeError> {
        if data.len() < MIN_HEADER_LEN {
            return Err(DecodeError::truncated(LayerType::Tcp, MIN_HEADER_LEN, data.len()));
        }
        Ok(Self::new_unchecked(data))
    }

    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::SRC_PORT])
    }

    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::DST_PORT])
    }

    pub fn seq_number(&self) -> u32 {
        NetworkEndian::read_u32(&self.0[field::SEQ_NUM])
    }

    pub fn ack_number(&self) -> u32 {
        NetworkEndian::read_u32(&self.0[field::ACK_NUM])
    }

    /// The data offset in 32-bit words.
    pub fn data_offset(&self) -> u8 {
        self.0[field::FLAGS.start] >> 4
    }

    pub fn flags(&self) -> Flags {
        Flags(NetworkEndian::read_u16(&self.0[field::FLAGS]) & 0x1ff)
    }

    pub fn window_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::WIN_SIZE])
    }

    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    pub fn urgent_at(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::URGENT])
    }

    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::SRC_PORT], value)
    }

    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::DST_PORT], value)
    }

    pub fn set_seq_number(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.0[field::SEQ_NUM], value)
    }

    pub fn set_ack_number(&mut self, value: u32) {
        NetworkEndian::write_u32(&mut self.0[field::ACK_NUM], value)
    }

    pub fn set_offset_flags(&mut self, data_offset: u8, Flags(flags): Flags) {
        let raw = (u16::from(data_offset) << 12) | (flags & 0x1ff);
        NetworkEndian::write_u16(&mut self.0[field::FLAGS], raw)
    }

    pub fn set_window_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::WIN_SIZE], value)
    }

    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    pub fn set_urgent_at(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::URGENT], value)
    }
}

/// The nine control bits of a segment.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub struct Flags(pub u16);

impl Flags {
    pub const FIN: Flags = Flags(field::FLG_FIN);
    pub const SYN: Flags = Flags(field::FLG_SYN);
    pub const RST: Flags = Flags(field::FLG_RST);
    pub const PSH: Flags = Flags(field::FLG_PSH);
    pub const ACK: Flags = Flags(field::FLG_ACK);
    pub const URG: Flags = Flags(field::FLG_URG);
    pub const ECE: Flags = Flags(field::FLG_ECE);
    pub const CWR: Flags = Flags(field::FLG_CWR);
    pub const NS: Flags = Flags(field::FLG_NS);

    /// Whether all bits of `other` are set.
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, other: Flags) -> Flags {
        Flags(self.0 | other.0)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        const NAMES: [(Flags, &str); 9] = [
            (Flags::FIN, "FIN"), (Flags::SYN, "SYN"), (Flags::RST, "RST"),
            (Flags::PSH, "PSH"), (Flags::ACK, "ACK"), (Flags::URG, "URG"),
            (Flags::ECE, "ECE"), (Flags::CWR, "CWR"), (Flags::NS, "NS"),
        ];
        let mut first = true;
        for (flag, name) in NAMES.iter() {
            if self.contains(*flag) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

enum_with_unknown! {
    /// TCP option kind.
    #[derive(Hash)]
    pub enum OptionKind(u8) {
        EndOfList = 0,
        NoOperation = 1,
        MaxSegmentSize = 2,
        WindowScale = 3,
        SackPermitted = 4,
        SackRange = 5,
        Timestamps = 8,
    }
}

/// One entry of the TCP option list.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct TcpOption {
    pub kind: OptionKind,
    /// Option data following kind and length.
    pub data: Vec<u8>,
}

/// A decoded TCP header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Tcp {
    base: BaseLayer,
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    /// Header length in 32-bit words.
    pub data_offset: u8,
    pub flags: Flags,
    pub window: u16,
    pub checksum: u16,
    pub urgent: u16,
    pub options: Vec<TcpOption>,
    network: Option<PseudoHeader>,
    stream_payloads: bool,
}

impl Tcp {
    pub fn new(src_port: u16, dst_port: u16) -> Self {
        Tcp { src_port, dst_port, data_offset: 5, ..Tcp::default() }
    }

    /// A decoder that hands segment payloads to application decoders.
    ///
    /// Without stream reassembly this is only correct if every message fits a single segment.
    pub fn with_stream_payloads() -> Self {
        Tcp { stream_payloads: true, ..Tcp::default() }
    }

    /// Provide the enclosing IP addresses so that serialization can compute the checksum.
    pub fn set_network_for_checksum(&mut self, network: PseudoHeader) {
        self.network = Some(network);
    }

    fn encoded_options(&self) -> Result<Vec<u8>, SerializeError> {
        let mut encoded = Vec::new();
        option::emit_kind_length(
            self.options.iter().map(|opt| (opt.kind.into(), &opt.data[..])),
            &mut encoded,
        ).map_err(|reason| SerializeError::invalid(LayerType::Tcp, reason))?;
        Ok(encoded)
    }
}

impl Layer for Tcp {
    fn layer_type(&self) -> LayerType {
        LayerType::Tcp
    }

    fn decode_from_bytes(&mut self, data: &[u8], df: &mut dyn DecodeFeedback)
        -> Result<(), DecodeError>
    {
        let packet = tcp::new_checked(data).map_err(|err| err.report(df))?;
        self.src_port = packet.src_port();
        self.dst_port = packet.dst_port();
        self.seq = packet.seq_number();
        self.ack = packet.ack_number();
        self.data_offset = packet.data_offset();
        self.flags = packet.flags();
        self.window = packet.window_len();
        self.checksum = packet.checksum();
        self.urgent = packet.urgent_at();
        self.options.clear();

        if self.data_offset < 5 {
            return Err(DecodeError::malformed(LayerType::Tcp, format!("invalid data offset {}", self.data_offset)));
        }
        let header_len = usize::from(self.data_offset) * 4;
        if header_len > data.len() {
            return Err(DecodeError::truncated(LayerType::Tcp, header_len, data.len()).report(df));
        }

        let options = &mut self.options;
        option::for_each::<KindLength>(&data[MIN_HEADER_LEN..header_len], LayerType::Tcp, df, |opt| {
            options.push(TcpOption { kind: (opt.tag as u8).into(), data: opt.data.to_vec() });
            Ok(())
        })?;

        self.base = BaseLayer::split(header_len, data.len());
        Ok(())
    }

    fn base(&self) -> &BaseLayer {
        &self.base
    }

    fn next_layer_type(&self) -> LayerType {
        let enip = self.src_port == ENIP_PORT || self.dst_port == ENIP_PORT;
        if self.stream_payloads && enip {
            LayerType::Enip
        } else {
            LayerType::Payload
        }
    }

    fn serialize_to(&mut self, buffer: &mut SerializeBuffer, options: SerializeOptions)
        -> Result<(), SerializeError>
    {
        let encoded = self.encoded_options()?;
        let header_len = MIN_HEADER_LEN + encoded.len();
        if header_len > 60 {
            return Err(SerializeError::invalid(LayerType::Tcp, "options exceed 40 octets"));
        }
        if options.fix_lengths {
            self.data_offset = (header_len / 4) as u8;
        }

        let header = buffer.prepend_bytes(header_len);
        header[MIN_HEADER_LEN..].copy_from_slice(&encoded);
        let packet = tcp::new_unchecked_mut(header);
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_seq_number(self.seq);
        packet.set_ack_number(self.ack);
        packet.set_offset_flags(self.data_offset, self.flags);
        packet.set_window_len(self.window);
        packet.set_urgent_at(self.urgent);

        if options.compute_checksums {
            if let Some(network) = &self.network {
                self.checksum = checksum::transport(network, Protocol::Tcp, buffer.bytes())
                    .ok_or_else(|| SerializeError::invalid(LayerType::Tcp, "mixed address families"))?;
            }
        }
        tcp::new_unchecked_mut(buffer.bytes_mut()).set_checksum(self.checksum);
        Ok(())
    }

    fn flow(&self) -> Option<Flow> {
        Flow::new(EndpointType::TCP_PORT, &self.src_port.to_be_bytes(), &self.dst_port.to_be_bytes()).ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
