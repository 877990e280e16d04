//! Definitions shared by IPv4, IPv6 and the protocols they carry.
use core::fmt;
use std::net::IpAddr;

use crate::layer::LayerType;

enum_with_unknown! {
    /// IP datagram encapsulated protocol.
    #[derive(Hash)]
    pub enum Protocol(u8) {
        HopByHop  = 0x00,
        Icmp      = 0x01,
        Igmp      = 0x02,
        Tcp       = 0x06,
        Udp       = 0x11,
        Ipv6Route = 0x2b,
        Ipv6Frag  = 0x2c,
        Icmpv6    = 0x3a,
        Ipv6NoNxt = 0x3b,
        Ipv6Opts  = 0x3c,
    }
}

impl Protocol {
    /// The decoder for the payload of a datagram carrying this protocol.
    pub fn layer_type(self) -> LayerType {
        match self {
            Protocol::Tcp => LayerType::Tcp,
            Protocol::Udp => LayerType::Udp,
            Protocol::Icmpv6 => LayerType::Icmpv6,
            _ => LayerType::Payload,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Protocol::HopByHop  => write!(f, "Hop-by-Hop"),
            Protocol::Icmp      => write!(f, "ICMP"),
            Protocol::Igmp      => write!(f, "IGMP"),
            Protocol::Tcp       => write!(f, "TCP"),
            Protocol::Udp       => write!(f, "UDP"),
            Protocol::Ipv6Route => write!(f, "IPv6-Route"),
            Protocol::Ipv6Frag  => write!(f, "IPv6-Frag"),
            Protocol::Icmpv6    => write!(f, "ICMPv6"),
            Protocol::Ipv6NoNxt => write!(f, "IPv6-NoNxt"),
            Protocol::Ipv6Opts  => write!(f, "IPv6-Opts"),
            Protocol::Unknown(id) => write!(f, "0x{:02x}", id),
        }
    }
}

/// The addresses of the enclosing IP header, needed for transport checksums.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct PseudoHeader {
    pub src_addr: IpAddr,
    pub dst_addr: IpAddr,
}

pub(crate) mod checksum {
    use byteorder::{ByteOrder, NetworkEndian};
    use std::net::IpAddr;

    use super::{Protocol, PseudoHeader};

    fn propagate_carries(word: u32) -> u16 {
        let sum = (word >> 16) + (word & 0xffff);
        ((sum >> 16) as u16) + (sum as u16)
    }

    /// Compute an RFC 1071 compliant checksum (without the final complement).
    pub(crate) fn data(mut data: &[u8]) -> u16 {
        let mut accum = 0;

        const CHUNK_SIZE: usize = 32;
        while data.len() >= CHUNK_SIZE {
            accum += data[..CHUNK_SIZE]
                .chunks_exact(2)
                .map(|word| u32::from(NetworkEndian::read_u16(word)))
                .sum::<u32>();
            data = &data[CHUNK_SIZE..];
        }

        while data.len() >= 2 {
            accum += u32::from(NetworkEndian::read_u16(data));
            data = &data[2..];
        }

        // An odd trailing octet is padded with zero.
        if let Some(&value) = data.first() {
            accum += u32::from(value) << 8;
        }

        propagate_carries(accum)
    }

    /// Combine several RFC 1071 compliant checksums.
    pub(crate) fn combine(checksums: &[u16]) -> u16 {
        let accum = checksums.iter().map(|&word| u32::from(word)).sum();
        propagate_carries(accum)
    }

    /// Compute an IP pseudo header checksum.
    ///
    /// Returns `None` when the two addresses are of different families.
    pub(crate) fn pseudo_header(header: &PseudoHeader, protocol: Protocol, length: u32)
        -> Option<u16>
    {
        match (header.src_addr, header.dst_addr) {
            (IpAddr::V4(src_addr), IpAddr::V4(dst_addr)) => {
                let mut proto_len = [0u8; 4];
                proto_len[1] = protocol.into();
                NetworkEndian::write_u16(&mut proto_len[2..4], length as u16);

                Some(combine(&[
                    data(&src_addr.octets()),
                    data(&dst_addr.octets()),
                    data(&proto_len[..]),
                ]))
            },
            (IpAddr::V6(src_addr), IpAddr::V6(dst_addr)) => {
                let mut proto_len = [0u8; 8];
                proto_len[7] = protocol.into();
                NetworkEndian::write_u32(&mut proto_len[0..4], length);

                Some(combine(&[
                    data(&src_addr.octets()),
                    data(&dst_addr.octets()),
                    data(&proto_len[..]),
                ]))
            },
            _ => None,
        }
    }

    /// The final transport checksum over pseudo header and segment.
    ///
    /// A result of zero is sent as all ones, as zero means "no checksum" in UDP.
    pub(crate) fn transport(header: &PseudoHeader, protocol: Protocol, segment: &[u8])
        -> Option<u16>
    {
        let pseudo = pseudo_header(header, protocol, segment.len() as u32)?;
        match !combine(&[pseudo, data(segment)]) {
            0 => Some(0xffff),
            sum => Some(sum),
        }
    }
}

#[cfg(test)]
mod test {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use super::*;

    #[test]
    fn checksum_of_words() {
        assert_eq!(checksum::data(&[0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7]), 0xddf2);
        assert_eq!(checksum::data(&[0xff]), 0xff00);
        assert_eq!(checksum::combine(&[0xffff, 0x0001]), 0x0001);
    }

    #[test]
    fn mixed_families_have_no_pseudo_header() {
        let header = PseudoHeader {
            src_addr: Ipv4Addr::LOCALHOST.into(),
            dst_addr: Ipv6Addr::LOCALHOST.into(),
        };
        assert_eq!(checksum::pseudo_header(&header, Protocol::Udp, 8), None);
    }

    #[test]
    fn protocol_layers() {
        assert_eq!(Protocol::from(17u8).layer_type(), LayerType::Udp);
        assert_eq!(Protocol::Icmp.layer_type(), LayerType::Payload);
        assert_eq!(Protocol::Unknown(0xfe).to_string(), "0xfe");
    }
}
