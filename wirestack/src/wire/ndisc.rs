//! Neighbor discovery message bodies (RFC 4861).
//!
//! Each layer decodes the body following the four octet ICMPv6 header. The trailing options share
//! one format: a type octet and a length octet counting units of eight octets, header included.
//! These layers only decode.
use core::any::Any;
use std::net::Ipv6Addr;

use byteorder::{ByteOrder, NetworkEndian};

use crate::error::DecodeError;
use crate::layer::{BaseLayer, DecodeFeedback, Layer, LayerType};
use super::option::{self, NeighborDiscovery};

enum_with_unknown! {
    /// Type of a neighbor discovery option.
    #[derive(Hash)]
    pub enum OptionKind(u8) {
        SourceLinkLayerAddr = 1,
        TargetLinkLayerAddr = 2,
        PrefixInformation = 3,
        RedirectedHeader = 4,
        Mtu = 5,
    }
}

/// A neighbor discovery option.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct NdiscOption {
    pub kind: OptionKind,
    /// Octets the option occupies, header included.
    pub len: usize,
    /// The option data after type and length.
    pub data: Vec<u8>,
}

fn decode_options(data: &[u8], layer: LayerType, options: &mut Vec<NdiscOption>, df: &mut dyn DecodeFeedback)
    -> Result<(), DecodeError>
{
    options.clear();
    option::for_each::<NeighborDiscovery>(data, layer, df, |opt| {
        options.push(NdiscOption {
            kind: OptionKind::from(opt.tag as u8),
            len: opt.len,
            data: opt.data.to_vec(),
        });
        Ok(())
    })
}

/// Check the fixed body length, flagging truncation.
fn fixed_body(data: &[u8], layer: LayerType, len: usize, df: &mut dyn DecodeFeedback)
    -> Result<(), DecodeError>
{
    if data.len() < len {
        return Err(DecodeError::truncated(layer, len, data.len()).report(df));
    }
    Ok(())
}

fn address(data: &[u8]) -> Ipv6Addr {
    let mut octets = [0; 16];
    octets.copy_from_slice(&data[..16]);
    Ipv6Addr::from(octets)
}

macro_rules! ndisc_layer {
    ($name:ident, $layer_type:expr) => {
        impl $name {
            /// Options in order of appearance.
            pub fn options(&self) -> &[NdiscOption] {
                &self.options
            }

            /// The first option of the given kind.
            pub fn option(&self, kind: OptionKind) -> Option<&NdiscOption> {
                self.options.iter().find(|opt| opt.kind == kind)
            }
        }

        impl Layer for $name {
            fn layer_type(&self) -> LayerType {
                $layer_type
            }

            fn decode_from_bytes(&mut self, data: &[u8], df: &mut dyn DecodeFeedback)
                -> Result<(), DecodeError>
            {
                self.decode(data, df)?;
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
    };
}

/// Sent by hosts to request router advertisements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouterSolicitation {
    base: BaseLayer,
    options: Vec<NdiscOption>,
}

impl RouterSolicitation {
    const BODY_LEN: usize = 4;

    fn decode(&mut self, data: &[u8], df: &mut dyn DecodeFeedback) -> Result<(), DecodeError> {
        let layer = LayerType::Icmpv6RouterSolicitation;
        fixed_body(data, layer, Self::BODY_LEN, df)?;
        decode_options(&data[Self::BODY_LEN..], layer, &mut self.options, df)
    }
}

ndisc_layer!(RouterSolicitation, LayerType::Icmpv6RouterSolicitation);

/// Announces a router and the parameters of its link.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouterAdvertisement {
    base: BaseLayer,
    pub hop_limit: u8,
    pub flags: u8,
    /// Seconds the router may be used as default router.
    pub router_lifetime: u16,
    /// Milliseconds a neighbor is considered reachable.
    pub reachable_time: u32,
    /// Milliseconds between retransmitted solicitations.
    pub retrans_timer: u32,
    options: Vec<NdiscOption>,
}

impl RouterAdvertisement {
    const BODY_LEN: usize = 12;

    /// Addresses are available through DHCPv6.
    pub fn managed_address_config(&self) -> bool {
        self.flags & 0x80 != 0
    }

    /// Other configuration is available through DHCPv6.
    pub fn other_config(&self) -> bool {
        self.flags & 0x40 != 0
    }

    fn decode(&mut self, data: &[u8], df: &mut dyn DecodeFeedback) -> Result<(), DecodeError> {
        let layer = LayerType::Icmpv6RouterAdvertisement;
        fixed_body(data, layer, Self::BODY_LEN, df)?;
        self.hop_limit = data[0];
        self.flags = data[1];
        self.router_lifetime = NetworkEndian::read_u16(&data[2..4]);
        self.reachable_time = NetworkEndian::read_u32(&data[4..8]);
        self.retrans_timer = NetworkEndian::read_u32(&data[8..12]);
        decode_options(&data[Self::BODY_LEN..], layer, &mut self.options, df)
    }
}

ndisc_layer!(RouterAdvertisement, LayerType::Icmpv6RouterAdvertisement);

/// Asks for the link layer address of a target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighborSolicitation {
    base: BaseLayer,
    pub target_address: Ipv6Addr,
    options: Vec<NdiscOption>,
}

impl Default for NeighborSolicitation {
    fn default() -> Self {
        NeighborSolicitation {
            base: BaseLayer::default(),
            target_address: Ipv6Addr::UNSPECIFIED,
            options: Vec::new(),
        }
    }
}

impl NeighborSolicitation {
    const BODY_LEN: usize = 20;

    fn decode(&mut self, data: &[u8], df: &mut dyn DecodeFeedback) -> Result<(), DecodeError> {
        let layer = LayerType::Icmpv6NeighborSolicitation;
        fixed_body(data, layer, Self::BODY_LEN, df)?;
        self.target_address = address(&data[4..20]);
        decode_options(&data[Self::BODY_LEN..], layer, &mut self.options, df)
    }
}

ndisc_layer!(NeighborSolicitation, LayerType::Icmpv6NeighborSolicitation);

/// Answers a solicitation or announces a changed link layer address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NeighborAdvertisement {
    base: BaseLayer,
    pub flags: u8,
    pub target_address: Ipv6Addr,
    options: Vec<NdiscOption>,
}

impl Default for NeighborAdvertisement {
    fn default() -> Self {
        NeighborAdvertisement {
            base: BaseLayer::default(),
            flags: 0,
            target_address: Ipv6Addr::UNSPECIFIED,
            options: Vec::new(),
        }
    }
}

impl NeighborAdvertisement {
    const BODY_LEN: usize = 20;

    /// The sender is a router.
    pub fn router(&self) -> bool {
        self.flags & 0x80 != 0
    }

    /// Sent in response to a solicitation.
    pub fn solicited(&self) -> bool {
        self.flags & 0x40 != 0
    }

    /// Should replace an existing cache entry.
    pub fn override_flag(&self) -> bool {
        self.flags & 0x20 != 0
    }

    fn decode(&mut self, data: &[u8], df: &mut dyn DecodeFeedback) -> Result<(), DecodeError> {
        let layer = LayerType::Icmpv6NeighborAdvertisement;
        fixed_body(data, layer, Self::BODY_LEN, df)?;
        self.flags = data[0];
        self.target_address = address(&data[4..20]);
        decode_options(&data[Self::BODY_LEN..], layer, &mut self.options, df)
    }
}

ndisc_layer!(NeighborAdvertisement, LayerType::Icmpv6NeighborAdvertisement);

/// Informs a host of a better first hop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Redirect {
    base: BaseLayer,
    pub target_address: Ipv6Addr,
    pub destination_address: Ipv6Addr,
    options: Vec<NdiscOption>,
}

impl Default for Redirect {
    fn default() -> Self {
        Redirect {
            base: BaseLayer::default(),
            target_address: Ipv6Addr::UNSPECIFIED,
            destination_address: Ipv6Addr::UNSPECIFIED,
            options: Vec::new(),
        }
    }
}

impl Redirect {
    const BODY_LEN: usize = 36;

    fn decode(&mut self, data: &[u8], df: &mut dyn DecodeFeedback) -> Result<(), DecodeError> {
        let layer = LayerType::Icmpv6Redirect;
        fixed_body(data, layer, Self::BODY_LEN, df)?;
        self.target_address = address(&data[4..20]);
        self.destination_address = address(&data[20..36]);
        decode_options(&data[Self::BODY_LEN..], layer, &mut self.options, df)
    }
}

ndisc_layer!(Redirect, LayerType::Icmpv6Redirect);
