use core::any::Any;
use std::net::Ipv6Addr;

use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{DecodeError, SerializeError};
use crate::flow::{EndpointType, Flow};
use crate::layer::{BaseLayer, DecodeFeedback, Layer, LayerType, SerializeBuffer, SerializeOptions};
use super::ip::{Protocol, PseudoHeader};

byte_wrapper! {
    /// A byte sequence representing an IPv6 packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct ipv6([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const VER_TC_FLOW: Field = 0..4;
    pub(crate) const LENGTH:      Field = 4..6;
    pub(crate) const NXT_HDR:     usize = 6;
    pub(crate) const HOP_LIMIT:   usize = 7;
    pub(crate) const SRC_ADDR:    Field = 8..24;
    pub(crate) const DST_ADDR:    Field = 24..40;
}

/// Length of the fixed header.
pub const HEADER_LEN: usize = field::DST_ADDR.end;

impl ipv6 {
    pub fn new_unchecked(buffer: &[u8]) -> &ipv6 {
        Self::__from_macro_new_unchecked(buffer)
    }

    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut ipv6 {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    pub fn new_checked(data: &[u8]) -> Result<&ipv6, DecodeError> {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::truncated(LayerType::Ipv6, HEADER_LEN, data.len()));
        }
        Ok(Self::new_unchecked(data))
    }

    fn ver_tc_flow(&self) -> u32 {
        NetworkEndian::read_u32(&self.0[field::VER_TC_FLOW])
    }

    pub fn version(&self) -> u8 {
        (self.ver_tc_flow() >> 28) as u8
    }

    pub fn traffic_class(&self) -> u8 {
        (self.ver_tc_flow() >> 20) as u8
    }

    pub fn flow_label(&self) -> u32 {
        self.ver_tc_flow() & 0x000f_ffff
    }

    pub fn payload_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::LENGTH])
    }

    pub fn next_header(&self) -> Protocol {
        self.0[field::NXT_HDR].into()
    }

    pub fn hop_limit(&self) -> u8 {
        self.0[field::HOP_LIMIT]
    }

    pub fn src_addr(&self) -> Ipv6Addr {
        let mut octets = [0; 16];
        octets.copy_from_slice(&self.0[field::SRC_ADDR]);
        octets.into()
    }

    pub fn dst_addr(&self) -> Ipv6Addr {
        let mut octets = [0; 16];
        octets.copy_from_slice(&self.0[field::DST_ADDR]);
        octets.into()
    }

    pub fn set_ver_tc_flow(&mut self, version: u8, traffic_class: u8, flow_label: u32) {
        let raw = (u32::from(version) << 28)
            | (u32::from(traffic_class) << 20)
            | (flow_label & 0x000f_ffff);
        NetworkEndian::write_u32(&mut self.0[field::VER_TC_FLOW], raw)
    }

    pub fn set_payload_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::LENGTH], value)
    }

    pub fn set_next_header(&mut self, value: Protocol) {
        self.0[field::NXT_HDR] = value.into();
    }

    pub fn set_hop_limit(&mut self, value: u8) {
        self.0[field::HOP_LIMIT] = value;
    }

    pub fn set_src_addr(&mut self, value: Ipv6Addr) {
        self.0[field::SRC_ADDR].copy_from_slice(&value.octets())
    }

    pub fn set_dst_addr(&mut self, value: Ipv6Addr) {
        self.0[field::DST_ADDR].copy_from_slice(&value.octets())
    }
}

/// A decoded IPv6 fixed header.
///
/// Extension headers are not decoded, a packet carrying them continues with an opaque payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ipv6 {
    base: BaseLayer,
    pub version: u8,
    pub traffic_class: u8,
    pub flow_label: u32,
    /// Length of the payload following the fixed header.
    pub length: u16,
    pub next_header: Protocol,
    pub hop_limit: u8,
    pub src_addr: Ipv6Addr,
    pub dst_addr: Ipv6Addr,
}

impl Default for Ipv6 {
    fn default() -> Self {
        Ipv6 {
            base: BaseLayer::default(),
            version: 6,
            traffic_class: 0,
            flow_label: 0,
            length: 0,
            next_header: Protocol::Ipv6NoNxt,
            hop_limit: 64,
            src_addr: Ipv6Addr::UNSPECIFIED,
            dst_addr: Ipv6Addr::UNSPECIFIED,
        }
    }
}

impl Ipv6 {
    /// The addresses for checksums of the carried transport segment.
    pub fn pseudo_header(&self) -> PseudoHeader {
        PseudoHeader {
            src_addr: self.src_addr.into(),
            dst_addr: self.dst_addr.into(),
        }
    }
}

impl Layer for Ipv6 {
    fn layer_type(&self) -> LayerType {
        LayerType::Ipv6
    }

    fn decode_from_bytes(&mut self, data: &[u8], df: &mut dyn DecodeFeedback)
        -> Result<(), DecodeError>
    {
        let packet = ipv6::new_checked(data).map_err(|err| err.report(df))?;
        self.version = packet.version();
        self.traffic_class = packet.traffic_class();
        self.flow_label = packet.flow_label();
        self.length = packet.payload_len();
        self.next_header = packet.next_header();
        self.hop_limit = packet.hop_limit();
        self.src_addr = packet.src_addr();
        self.dst_addr = packet.dst_addr();

        if self.version != 6 {
            return Err(DecodeError::malformed(LayerType::Ipv6, format!("invalid version {}", self.version)));
        }

        let end = match usize::from(self.length) {
            // Jumbograms and segmentation offload leave the length unset.
            0 => data.len(),
            len if HEADER_LEN + len > data.len() => {
                df.set_truncated();
                data.len()
            },
            len => HEADER_LEN + len,
        };

        self.base = BaseLayer::split(HEADER_LEN, end);
        Ok(())
    }

    fn base(&self) -> &BaseLayer {
        &self.base
    }

    fn next_layer_type(&self) -> LayerType {
        self.next_header.layer_type()
    }

    fn serialize_to(&mut self, buffer: &mut SerializeBuffer, options: SerializeOptions)
        -> Result<(), SerializeError>
    {
        if options.fix_lengths {
            self.length = u16::try_from(buffer.len())
                .map_err(|_| SerializeError::length(LayerType::Ipv6, "payload exceeds 65535 octets"))?;
        }

        let packet = ipv6::new_unchecked_mut(buffer.prepend_bytes(HEADER_LEN));
        packet.set_ver_tc_flow(self.version, self.traffic_class, self.flow_label);
        packet.set_payload_len(self.length);
        packet.set_next_header(self.next_header);
        packet.set_hop_limit(self.hop_limit);
        packet.set_src_addr(self.src_addr);
        packet.set_dst_addr(self.dst_addr);
        Ok(())
    }

    fn flow(&self) -> Option<Flow> {
        Flow::new(EndpointType::IPV6, &self.src_addr.octets(), &self.dst_addr.octets()).ok()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
