//! A walker over tag-length-value option lists.
//!
//! Options lists are everywhere: IPv4 and TCP options, neighbor discovery options, the item list
//! of the EtherNet/IP common packet format. They differ only in how the header is laid out and in
//! what unit the length is counted, which a [`Format`] describes. The walker itself then applies
//! the same rules to all of them:
//!
//! * The header must be present, otherwise the option is truncated.
//! * The length is converted to octets first and only then compared against the remaining data.
//! * A length shorter than the header is malformed, as the walk could not advance.
//! * A length beyond the remaining data is truncated.
//!
//! After the first error the walker yields nothing more.
use core::marker::PhantomData;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::DecodeError;
use crate::layer::{DecodeFeedback, LayerType};

/// The header layout of one kind of option list.
pub trait Format {
    /// Octets of tag and length preceding the option data.
    const HEADER_LEN: usize;

    /// Read the tag from a header of `HEADER_LEN` octets.
    fn tag(header: &[u8]) -> u16;

    /// Total length of the option in octets, header included, as declared in `header`.
    fn total_len(header: &[u8]) -> usize;

    /// Whether an option starting with `first` is a lone tag octet without length field.
    fn single_octet(first: u8) -> bool {
        let _ = first;
        false
    }

    /// Whether a single octet option ends the list.
    fn is_end(first: u8) -> bool {
        let _ = first;
        false
    }
}

/// One kind octet, one length octet counting the whole option, as in IPv4 and TCP.
///
/// The kinds zero (end of list) and one (no operation) are single octets.
#[derive(Clone, Copy, Debug)]
pub enum KindLength {}

/// One type octet, one length octet counting eight octet units, as in neighbor discovery.
#[derive(Clone, Copy, Debug)]
pub enum NeighborDiscovery {}

/// Little-endian 16-bit type and 16-bit data length, as in the EtherNet/IP item list.
#[derive(Clone, Copy, Debug)]
pub enum CommonPacketFormat {}

impl Format for KindLength {
    const HEADER_LEN: usize = 2;

    fn tag(header: &[u8]) -> u16 {
        header[0].into()
    }

    fn total_len(header: &[u8]) -> usize {
        header[1].into()
    }

    fn single_octet(first: u8) -> bool {
        first <= 1
    }

    fn is_end(first: u8) -> bool {
        first == 0
    }
}

impl Format for NeighborDiscovery {
    const HEADER_LEN: usize = 2;

    fn tag(header: &[u8]) -> u16 {
        header[0].into()
    }

    fn total_len(header: &[u8]) -> usize {
        usize::from(header[1]) * 8
    }
}

impl Format for CommonPacketFormat {
    const HEADER_LEN: usize = 4;

    fn tag(header: &[u8]) -> u16 {
        LittleEndian::read_u16(&header[0..2])
    }

    fn total_len(header: &[u8]) -> usize {
        usize::from(LittleEndian::read_u16(&header[2..4])) + Self::HEADER_LEN
    }
}

/// A single option as found in the list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawOption<'a> {
    /// The tag or kind.
    pub tag: u16,
    /// Octets the option occupies, header included.
    pub len: usize,
    /// The option data following the header.
    pub data: &'a [u8],
}

/// Iterator over the options of a list.
#[derive(Clone, Debug)]
pub struct Options<'a, F> {
    data: &'a [u8],
    offset: usize,
    layer: LayerType,
    done: bool,
    format: PhantomData<F>,
}

impl<'a, F: Format> Options<'a, F> {
    /// Walk the options in `data`, reporting errors against `layer`.
    pub fn new(data: &'a [u8], layer: LayerType) -> Self {
        Options {
            data,
            offset: 0,
            layer,
            done: false,
            format: PhantomData,
        }
    }

    /// The octets not yet walked.
    ///
    /// After an end of list option these are padding.
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.offset..]
    }

    /// Offset of the next option relative to the start of the list.
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn fail(&mut self, err: DecodeError) -> Option<Result<RawOption<'a>, DecodeError>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<'a, F: Format> Iterator for Options<'a, F> {
    type Item = Result<RawOption<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = self.remaining();
        let &first = match rest.first() {
            Some(first) if !self.done => first,
            _ => return None,
        };

        if F::single_octet(first) {
            self.offset += 1;
            self.done = F::is_end(first);
            return Some(Ok(RawOption { tag: first.into(), len: 1, data: &[] }));
        }

        let header = match rest.get(..F::HEADER_LEN) {
            Some(header) => header,
            None => {
                let err = DecodeError::truncated(self.layer, F::HEADER_LEN, rest.len());
                return self.fail(err);
            },
        };

        let len = F::total_len(header);
        if len < F::HEADER_LEN {
            let err = DecodeError::malformed(self.layer, "option length shorter than its header");
            return self.fail(err);
        }

        let data = match rest.get(F::HEADER_LEN..len) {
            Some(data) => data,
            None => return self.fail(DecodeError::truncated(self.layer, len, rest.len())),
        };

        self.offset += len;
        Some(Ok(RawOption { tag: F::tag(header), len, data }))
    }
}

/// Walk all options of a list, handing each to `visit`.
///
/// Errors are reported on `df` before being returned.
pub fn for_each<'a, F: Format>(
    data: &'a [u8],
    layer: LayerType,
    df: &mut dyn DecodeFeedback,
    mut visit: impl FnMut(RawOption<'a>) -> Result<(), DecodeError>,
) -> Result<(), DecodeError> {
    for option in Options::<F>::new(data, layer) {
        visit(option.map_err(|err| err.report(df))?)?;
    }
    Ok(())
}

/// Append kind-length options to `out`, padded with end of list octets to a multiple of four.
pub(crate) fn emit_kind_length<'a>(
    options: impl IntoIterator<Item = (u8, &'a [u8])>,
    out: &mut Vec<u8>,
) -> Result<(), &'static str> {
    for (kind, data) in options {
        if KindLength::single_octet(kind) {
            out.push(kind);
            continue;
        }
        let len = u8::try_from(data.len() + 2).map_err(|_| "option data too long")?;
        out.push(kind);
        out.push(len);
        out.extend_from_slice(data);
    }

    while out.len() % 4 != 0 {
        out.push(0);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layer::Truncation;

    static TCP_OPTIONS: [u8; 12] = [
        0x02, 0x04, 0x05, 0xb4, // mss 1460
        0x01,                   // nop
        0x03, 0x03, 0x07,       // window scale 7
        0x00,                   // end of list
        0x00, 0x00, 0x00,
    ];

    #[test]
    fn test_kind_length() {
        let mut walk = Options::<KindLength>::new(&TCP_OPTIONS, LayerType::Tcp);
        assert_eq!(walk.next(), Some(Ok(RawOption { tag: 2, len: 4, data: &[0x05, 0xb4] })));
        assert_eq!(walk.next(), Some(Ok(RawOption { tag: 1, len: 1, data: &[] })));
        assert_eq!(walk.next(), Some(Ok(RawOption { tag: 3, len: 3, data: &[0x07] })));
        assert_eq!(walk.next(), Some(Ok(RawOption { tag: 0, len: 1, data: &[] })));
        assert_eq!(walk.next(), None);
        assert_eq!(walk.remaining(), &[0, 0, 0]);
    }

    #[test]
    fn test_every_prefix_truncated() {
        // Cutting the list anywhere inside the first option must be reported as truncation.
        for cut in 1..4 {
            let options: Result<Vec<_>, _> =
                Options::<KindLength>::new(&TCP_OPTIONS[..cut], LayerType::Tcp).collect();
            assert!(options.unwrap_err().is_truncated(), "cut at {}", cut);
        }
        for cut in [6, 7] {
            let options: Result<Vec<_>, _> =
                Options::<KindLength>::new(&TCP_OPTIONS[..cut], LayerType::Tcp).collect();
            assert!(options.unwrap_err().is_truncated(), "cut at {}", cut);
        }
    }

    #[test]
    fn test_item_list_prefixes() {
        // A null address item followed by three octets of unconnected data.
        let items = [0x00, 0x00, 0x00, 0x00, 0xb2, 0x00, 0x03, 0x00, 0x01, 0x02, 0x03];
        for cut in 0..=items.len() {
            let result: Result<Vec<_>, _> =
                Options::<CommonPacketFormat>::new(&items[..cut], LayerType::Enip).collect();
            match result {
                Ok(_) => assert!(matches!(cut, 0 | 4 | 11), "cut at {}", cut),
                Err(err) => assert!(err.is_truncated(), "cut at {}", cut),
            }
        }
    }

    #[test]
    fn test_shorter_than_header() {
        let data = [0x08, 0x01, 0xff, 0xff];
        let err = Options::<KindLength>::new(&data, LayerType::Ipv4)
            .next()
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { layer: LayerType::Ipv4, .. }));
    }

    #[test]
    fn test_neighbor_discovery_units() {
        let data = [
            0x01, 0x01, 0x00, 0x1f, 0x16, 0xaa, 0x0b, 0xff,
            0x05, 0x01, 0x00, 0x00, 0x00, 0x00, 0x05, 0xdc,
        ];
        let options: Vec<_> = Options::<NeighborDiscovery>::new(&data, LayerType::Icmpv6)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].tag, 1);
        assert_eq!(options[0].data, &data[2..8]);
        assert_eq!(options[1].len, 8);
    }

    #[test]
    fn test_zero_units_is_malformed() {
        let data = [0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
        let mut feedback = Truncation::default();
        let result = for_each::<NeighborDiscovery>(&data, LayerType::Icmpv6, &mut feedback, |_| {
            panic!("no option should be produced")
        });
        assert!(matches!(result, Err(DecodeError::Malformed { .. })));
        assert!(!feedback.is_truncated());
    }

    #[test]
    fn test_units_beyond_data() {
        let data = [0x03, 0x04, 0x40, 0xc0];
        let mut feedback = Truncation::default();
        let result = for_each::<NeighborDiscovery>(&data, LayerType::Icmpv6, &mut feedback, |_| Ok(()));
        assert_eq!(result, Err(DecodeError::truncated(LayerType::Icmpv6, 32, 4)));
        assert!(feedback.is_truncated());
    }

    #[test]
    fn test_common_packet_format() {
        let data = [
            0x00, 0x00, 0x00, 0x00,
            0xb2, 0x00, 0x02, 0x00, 0xaa, 0xbb,
        ];
        let mut walk = Options::<CommonPacketFormat>::new(&data, LayerType::Enip);
        assert_eq!(walk.next(), Some(Ok(RawOption { tag: 0, len: 4, data: &[] })));
        assert_eq!(walk.offset(), 4);
        assert_eq!(walk.next(), Some(Ok(RawOption { tag: 0xb2, len: 6, data: &[0xaa, 0xbb] })));
        assert_eq!(walk.next(), None);
    }

    #[test]
    fn test_emit_pads() {
        let mut out = Vec::new();
        emit_kind_length([(2u8, &[0x05, 0xb4][..]), (1, &[][..]), (3, &[0x07][..])], &mut out)
            .unwrap();
        assert_eq!(out, [0x02, 0x04, 0x05, 0xb4, 0x01, 0x03, 0x03, 0x07]);

        let mut out = Vec::new();
        emit_kind_length([(4u8, &[][..])], &mut out).unwrap();
        assert_eq!(out, [0x04, 0x02, 0x00, 0x00]);
    }
}
