//! Reading and writing domain names.
//!
//! Names are sequences of length prefixed labels ending in the empty root label. To save space a
//! name may end in a two octet pointer instead, continuing with the labels at an earlier position of
//! the message (RFC 1035, section 4.1.4). Names are decoded into the dotted text form without the
//! trailing dot, the root name decodes to an empty name.
//!
//! Decoding is iterative. Every pointer must target a position strictly before itself and strictly
//! before every target followed so far while reading the same name. Targets thus decrease
//! monotonically and the walk ends after at most as many jumps as the message has octets, no matter
//! how the pointers are arranged.
use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{NameError, SerializeError};
use crate::layer::LayerType;

/// Longest name in its dotted text form.
pub const MAX_NAME_LEN: usize = 255;

/// Longest single label.
pub const MAX_LABEL_LEN: usize = 63;

const POINTER: u8 = 0xc0;

/// Decode the name starting at `offset` of `message`.
///
/// Returns the dotted name and the offset just after the name where it started, that is after its
/// root label or after the first pointer.
pub fn decode(message: &[u8], offset: usize) -> Result<(Vec<u8>, usize), NameError> {
    if offset >= message.len() {
        return Err(NameError::OffsetTooHigh { offset, len: message.len() });
    }

    let mut name = Vec::new();
    let mut index = offset;
    // Offset after the name in its original position, fixed by the first pointer.
    let mut end = None;
    // Every pointer must target strictly below this.
    let mut limit = usize::MAX;

    loop {
        let &length = message.get(index).ok_or(NameError::IndexOutOfRange)?;
        match length & POINTER {
            0x00 if length == 0 => {
                if name.is_empty() && end.is_some() {
                    return Err(NameError::NoData);
                }
                return Ok((name, end.unwrap_or(index + 1)));
            },
            0x00 => {
                let start = index + 1;
                let stop = start + usize::from(length);
                let label = message.get(start..stop).ok_or(NameError::InvalidIndex { index })?;
                let separator = usize::from(!name.is_empty());
                if name.len() + separator + label.len() > MAX_NAME_LEN {
                    return Err(NameError::NameTooLong);
                }
                if separator != 0 {
                    name.push(b'.');
                }
                name.extend_from_slice(label);
                index = stop;
            },
            POINTER => {
                let raw = message.get(index..index + 2).ok_or(NameError::PointerTooHigh { at: index })?;
                let target = usize::from(NetworkEndian::read_u16(raw) & 0x3fff);
                if target >= message.len() {
                    return Err(NameError::PointerTooHigh { at: index });
                }
                if target >= index || target >= limit {
                    return Err(NameError::PointerLoop { at: index, target });
                }
                end.get_or_insert(index + 2);
                limit = target;
                index = target;
            },
            other => return Err(NameError::UnsupportedLabel(other)),
        }
    }
}

/// Number of octets `name` occupies when encoded without compression.
pub fn encoded_len(name: &[u8]) -> usize {
    let name = trim_root(name);
    if name.is_empty() {
        1
    } else {
        // One length octet per label replaces the dots, plus the leading length and the root.
        name.len() + 2
    }
}

/// Append `name` to `out` without compression.
pub fn encode(name: &[u8], out: &mut Vec<u8>) -> Result<(), SerializeError> {
    let name = trim_root(name);
    if encoded_len(name) > MAX_NAME_LEN {
        return Err(SerializeError::invalid(LayerType::Dns, "name longer than 255 octets"));
    }

    if !name.is_empty() {
        for label in name.split(|&b| b == b'.') {
            if label.is_empty() {
                return Err(SerializeError::invalid(LayerType::Dns, "empty label in name"));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(SerializeError::invalid(LayerType::Dns, "label longer than 63 octets"));
            }
            out.push(label.len() as u8);
            out.extend_from_slice(label);
        }
    }
    out.push(0);
    Ok(())
}

fn trim_root(name: &[u8]) -> &[u8] {
    name.strip_suffix(b".").unwrap_or(name)
}

#[cfg(test)]
mod test {
    use super::*;

    /// A message with `example.com` at 12 and `www` plus a pointer to it at 25.
    fn message() -> Vec<u8> {
        let mut message = vec![0; 12];
        message.extend_from_slice(b"\x07example\x03com\x00");
        message.extend_from_slice(b"\x03www\xc0\x0c");
        message
    }

    #[test]
    fn test_plain_name() {
        let (name, end) = decode(&message(), 12).unwrap();
        assert_eq!(name, b"example.com");
        assert_eq!(end, 25);
    }

    #[test]
    fn test_compressed_name() {
        let (name, end) = decode(&message(), 25).unwrap();
        assert_eq!(name, b"www.example.com");
        assert_eq!(end, 31);

        let (name, end) = decode(&message(), 29).unwrap();
        assert_eq!(name, b"example.com");
        assert_eq!(end, 31);
    }

    #[test]
    fn test_root_name() {
        let message = [0, 0, 0];
        assert_eq!(decode(&message, 1), Ok((Vec::new(), 2)));
    }

    #[test]
    fn test_pointer_to_root() {
        let message = [0x00, 0xc0, 0x00];
        assert_eq!(decode(&message, 1), Err(NameError::NoData));
    }

    #[test]
    fn test_self_pointer() {
        let mut message = vec![0; 12];
        message.extend_from_slice(&[0xc0, 0x0c]);
        assert_eq!(decode(&message, 12), Err(NameError::PointerLoop { at: 12, target: 12 }));
    }

    #[test]
    fn test_forward_pointer() {
        let mut message = vec![0; 12];
        message.extend_from_slice(&[0xc0, 0x0e, 0x01, b'a', 0x00]);
        assert_eq!(decode(&message, 12), Err(NameError::PointerLoop { at: 12, target: 14 }));
    }

    #[test]
    fn test_pointer_cycle() {
        // 12: "a" then pointer to 16, 16: "b" then pointer to 12.
        let mut message = vec![0; 12];
        message.extend_from_slice(&[0x01, b'a', 0xc0, 0x10, 0x01, b'b', 0xc0, 0x0c]);
        assert_eq!(decode(&message, 16), Err(NameError::PointerLoop { at: 14, target: 16 }));
    }

    #[test]
    fn test_pointer_out_of_range() {
        let message = [0x00, 0xc0, 0x20];
        assert_eq!(decode(&message, 1), Err(NameError::PointerTooHigh { at: 1 }));
        let message = [0x00, 0xc0];
        assert_eq!(decode(&message, 1), Err(NameError::PointerTooHigh { at: 1 }));
    }

    #[test]
    fn test_label_out_of_range() {
        let message = [0x05, b'a', b'b'];
        assert_eq!(decode(&message, 0), Err(NameError::InvalidIndex { index: 0 }));
        let message = [0x01, b'a'];
        assert_eq!(decode(&message, 0), Err(NameError::IndexOutOfRange));
        assert_eq!(decode(&message, 2), Err(NameError::OffsetTooHigh { offset: 2, len: 2 }));
    }

    #[test]
    fn test_reserved_label_types() {
        assert_eq!(decode(&[0x41, 0x00], 0), Err(NameError::UnsupportedLabel(0x40)));
        assert_eq!(decode(&[0x81, 0x00], 0), Err(NameError::UnsupportedLabel(0x80)));
    }

    #[test]
    fn test_name_too_long() {
        let mut message = Vec::new();
        for _ in 0..5 {
            message.push(63);
            message.extend_from_slice(&[b'x'; 63]);
        }
        message.push(0);
        assert_eq!(decode(&message, 0), Err(NameError::NameTooLong));
    }

    #[test]
    fn test_encode() {
        let mut out = Vec::new();
        encode(b"www.example.com", &mut out).unwrap();
        assert_eq!(out, b"\x03www\x07example\x03com\x00");
        assert_eq!(encoded_len(b"www.example.com"), out.len());

        let mut out = Vec::new();
        encode(b"example.com.", &mut out).unwrap();
        assert_eq!(out, b"\x07example\x03com\x00");

        let mut out = Vec::new();
        encode(b"", &mut out).unwrap();
        assert_eq!(out, [0]);
        assert_eq!(encoded_len(b"."), 1);

        assert!(encode(b"a..b", &mut Vec::new()).is_err());
        assert!(encode(&[b'x'; 64], &mut Vec::new()).is_err());
    }
}
