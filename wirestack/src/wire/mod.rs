/*! Decoders and encoders of concrete protocols.

Every protocol module follows the same shape. A lowercase byte wrapper, e.g. [`udp::udp`], gives
checked field access to a raw octet slice. An uppercase layer struct, e.g. [`udp::Udp`], holds the
decoded header values and implements [`Layer`](crate::layer::Layer), which ties it into the packet
pipeline.

Variable sized protocol data, such as DNS names or option lists, is copied into the layer
struct. The header and payload octets themselves stay in the packet buffer and are referenced by
range.

The TLV walker in [`option`] is shared by every protocol with a list of tag-length-value options:
IPv4 and TCP options, neighbor discovery options and the common packet format items of
EtherNet/IP.
*/
// Field accessors are documented by the protocol standards they follow.
#![allow(missing_docs)]

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
    pub(crate) type Rest = ::core::ops::RangeFrom<usize>;
}

pub mod ip;
pub mod option;

pub mod cip;
pub mod dns;
pub mod enip;
pub mod ethernet;
pub mod icmpv6;
pub mod ipv4;
pub mod ipv6;
pub mod loopback;
pub mod ndisc;
pub mod payload;
pub mod tcp;
pub mod udp;

pub use self::cip::Cip;
pub use self::dns::Dns;
pub use self::enip::Enip;
pub use self::ethernet::Ethernet;
pub use self::icmpv6::Icmpv6;
pub use self::ipv4::Ipv4;
pub use self::ipv6::Ipv6;
pub use self::loopback::Loopback;
pub use self::ndisc::{
    NeighborAdvertisement,
    NeighborSolicitation,
    Redirect,
    RouterAdvertisement,
    RouterSolicitation};
pub use self::payload::{DecodeFailure, Payload};
pub use self::tcp::Tcp;
pub use self::udp::Udp;
