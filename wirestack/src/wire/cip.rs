//! Common Industrial Protocol messages as carried by EtherNet/IP.
//!
//! A request names its target object by a path of logical segments, class then instance and
//! optionally attribute, counted in 16-bit words. A response echoes the service with the high bit
//! set and reports a general status plus optional additional status words.
use core::any::Any;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::DecodeError;
use crate::layer::{BaseLayer, DecodeFeedback, Layer, LayerType};

enum_with_unknown! {
    /// Service code, without the response bit.
    #[derive(Hash)]
    pub enum Service(u8) {
        GetAttributesAll = 0x01,
        SetAttributesAll = 0x02,
        GetAttributeList = 0x03,
        SetAttributeList = 0x04,
        Reset = 0x05,
        Start = 0x06,
        Stop = 0x07,
        Create = 0x08,
        Delete = 0x09,
        MultipleServicePacket = 0x0a,
        ApplyAttributes = 0x0d,
        GetAttributeSingle = 0x0e,
        SetAttributeSingle = 0x10,
        FindNextObjectInstance = 0x11,
        Restore = 0x15,
        Save = 0x16,
        Nop = 0x17,
        GetMember = 0x18,
        SetMember = 0x19,
        InsertMember = 0x1a,
        RemoveMember = 0x1b,
        GroupSync = 0x1c,
        ForwardClose = 0x4e,
        UnconnectedSend = 0x52,
        ForwardOpen = 0x54,
        LargeForwardOpen = 0x5b,
    }
}

impl Default for Service {
    fn default() -> Self {
        Service::Nop
    }
}

const RESPONSE: u8 = 0x80;
const SERVICE_MASK: u8 = 0x7f;

const SEGMENT_CLASS: u8 = 0x20;
const SEGMENT_INSTANCE: u8 = 0x24;
const SEGMENT_ATTRIBUTE: u8 = 0x30;
/// Set in a logical segment whose value is a padded 16-bit word.
const SEGMENT_WIDE: u8 = 0x01;

/// A decoded CIP request or response.
///
/// The layer covers the whole message; the service data is copied into `data`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Cip {
    base: BaseLayer,
    pub response: bool,
    pub service: Service,
    /// Length of the request path in 16-bit words.
    pub path_size: u8,
    pub class_id: Option<u16>,
    pub instance_id: Option<u16>,
    pub attribute_id: Option<u16>,
    /// General status of a response.
    pub status: u8,
    /// Additional status words of a response.
    pub additional_status: Vec<u16>,
    /// Request or response data following the header.
    pub data: Vec<u8>,
}

fn truncated(needed: usize, data: &[u8], df: &mut dyn DecodeFeedback) -> DecodeError {
    DecodeError::truncated(LayerType::Cip, needed, data.len()).report(df)
}

impl Cip {
    fn decode_response(&mut self, data: &[u8], df: &mut dyn DecodeFeedback) -> Result<(), DecodeError> {
        if data.len() < 4 {
            return Err(truncated(4, data, df));
        }
        self.status = data[2];
        let words = usize::from(data[3]);
        let status_end = 4 + words * 2;
        let status = data.get(4..status_end).ok_or_else(|| truncated(status_end, data, df))?;
        self.additional_status = status.chunks_exact(2).map(LittleEndian::read_u16).collect();
        self.data = data[status_end..].to_vec();
        Ok(())
    }

    fn decode_request(&mut self, data: &[u8], df: &mut dyn DecodeFeedback) -> Result<(), DecodeError> {
        if data.len() < 2 {
            return Err(truncated(2, data, df));
        }
        self.path_size = data[1];
        let path_end = 2 + usize::from(self.path_size) * 2;
        let path = data.get(2..path_end).ok_or_else(|| truncated(path_end, data, df))?;
        self.decode_path(path)?;
        self.data = data[path_end..].to_vec();
        Ok(())
    }

    fn decode_path(&mut self, mut path: &[u8]) -> Result<(), DecodeError> {
        while let Some(&segment) = path.first() {
            let (value, len) = if segment & SEGMENT_WIDE == 0 {
                let value = path.get(1).ok_or_else(|| short_segment(segment))?;
                (u16::from(*value), 2)
            } else {
                // A pad octet precedes the little-endian word.
                let value = path.get(2..4).ok_or_else(|| short_segment(segment))?;
                (LittleEndian::read_u16(value), 4)
            };
            match segment & !SEGMENT_WIDE {
                SEGMENT_CLASS => self.class_id = Some(value),
                SEGMENT_INSTANCE => self.instance_id = Some(value),
                SEGMENT_ATTRIBUTE => self.attribute_id = Some(value),
                _ => return Err(DecodeError::malformed(LayerType::Cip,
                    format!("unsupported path segment {:#04x}", segment))),
            }
            path = &path[len..];
        }
        Ok(())
    }
}

fn short_segment(segment: u8) -> DecodeError {
    DecodeError::malformed(LayerType::Cip, format!("path segment {:#04x} exceeds path", segment))
}

impl Layer for Cip {
    fn layer_type(&self) -> LayerType {
        LayerType::Cip
    }

    fn decode_from_bytes(&mut self, data: &[u8], df: &mut dyn DecodeFeedback)
        -> Result<(), DecodeError>
    {
        let &first = data.first().ok_or_else(|| truncated(1, data, df))?;
        self.response = first & RESPONSE != 0;
        self.service = Service::from(first & SERVICE_MASK);
        self.path_size = 0;
        self.class_id = None;
        self.instance_id = None;
        self.attribute_id = None;
        self.status = 0;
        self.additional_status.clear();

        if self.response {
            self.decode_response(data, df)?;
        } else {
            self.decode_request(data, df)?;
        }
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

#[cfg(test)]
mod test {
    use super::*;
    use crate::layer::{NilDecodeFeedback, Truncation};

    #[test]
    fn test_request() {
        // Get attribute single of class 1, instance 1, attribute 7.
        let data = [0x0e, 0x03, 0x20, 0x01, 0x24, 0x01, 0x30, 0x07];
        let mut layer = Cip::default();
        layer.decode_from_bytes(&data, &mut NilDecodeFeedback).unwrap();
        assert!(!layer.response);
        assert_eq!(layer.service, Service::GetAttributeSingle);
        assert_eq!(layer.class_id, Some(1));
        assert_eq!(layer.instance_id, Some(1));
        assert_eq!(layer.attribute_id, Some(7));
        assert!(layer.data.is_empty());
        assert_eq!(layer.base().contents, 0..8);
    }

    #[test]
    fn test_wide_segments() {
        let data = [0x4c, 0x04, 0x21, 0x00, 0x00, 0x03, 0x25, 0x00, 0x34, 0x12, 0xaa];
        let mut layer = Cip::default();
        layer.decode_from_bytes(&data, &mut NilDecodeFeedback).unwrap();
        assert_eq!(layer.service, Service::Unknown(0x4c));
        assert_eq!(layer.class_id, Some(0x300));
        assert_eq!(layer.instance_id, Some(0x1234));
        assert_eq!(layer.attribute_id, None);
        assert_eq!(layer.data, [0xaa]);
    }

    #[test]
    fn test_response() {
        let data = [0x8e, 0x00, 0x05, 0x01, 0x34, 0x12, 0xde, 0xad];
        let mut layer = Cip::default();
        layer.decode_from_bytes(&data, &mut NilDecodeFeedback).unwrap();
        assert!(layer.response);
        assert_eq!(layer.service, Service::GetAttributeSingle);
        assert_eq!(layer.status, 5);
        assert_eq!(layer.additional_status, [0x1234]);
        assert_eq!(layer.data, [0xde, 0xad]);
    }

    #[test]
    fn test_path_past_end() {
        // The path size claims eight words.
        let data = [0x0e, 0x08, 0x20, 0x01];
        let mut feedback = Truncation::default();
        let err = Cip::default().decode_from_bytes(&data, &mut feedback).unwrap_err();
        assert_eq!(err, DecodeError::truncated(LayerType::Cip, 18, 4));
        assert!(feedback.is_truncated());
    }

    #[test]
    fn test_bad_segment() {
        let data = [0x0e, 0x01, 0x91, 0x00];
        let err = Cip::default().decode_from_bytes(&data, &mut NilDecodeFeedback).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { layer: LayerType::Cip, .. }));

        let data = [0x0e, 0x01, 0x21, 0x00];
        let err = Cip::default().decode_from_bytes(&data, &mut NilDecodeFeedback).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { layer: LayerType::Cip, .. }));
    }

    #[test]
    fn test_empty() {
        let mut feedback = Truncation::default();
        assert!(Cip::default().decode_from_bytes(&[], &mut feedback).unwrap_err().is_truncated());
        assert!(feedback.is_truncated());
    }
}
