//! EtherNet/IP encapsulation.
//!
//! Every message starts with a 24 octet header in little-endian byte order. The explicit messaging
//! commands `SendRRData` and `SendUnitData` carry a list of common packet format items after a
//! short prefix, and the data item among them holds a CIP message, which becomes the payload.
use core::any::Any;
use core::ops::Range;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::DecodeError;
use crate::layer::{BaseLayer, DecodeFeedback, Layer, LayerType};
use super::option::{CommonPacketFormat, Format, Options};

enum_with_unknown! {
    /// Encapsulation command.
    #[derive(Hash)]
    pub enum Command(u16) {
        Nop = 0x0000,
        ListServices = 0x0004,
        ListIdentity = 0x0063,
        ListInterfaces = 0x0064,
        RegisterSession = 0x0065,
        UnregisterSession = 0x0066,
        /// Unconnected request and reply.
        SendRRData = 0x006f,
        /// Connected transport.
        SendUnitData = 0x0070,
        IndicateStatus = 0x0072,
        Cancel = 0x0073,
    }
}

enum_with_unknown! {
    /// Encapsulation status.
    #[derive(Hash)]
    pub enum Status(u32) {
        Success = 0x0000,
        InvalidCommand = 0x0001,
        InsufficientMemory = 0x0002,
        IncorrectData = 0x0003,
        InvalidSessionHandle = 0x0064,
        InvalidLength = 0x0065,
        UnsupportedProtocol = 0x0069,
    }
}

enum_with_unknown! {
    /// Type of a common packet format item.
    #[derive(Hash)]
    pub enum ItemType(u16) {
        NullAddress = 0x0000,
        ListIdentity = 0x000c,
        ConnectedAddress = 0x00a1,
        /// Connected transport data, prefixed by a sequence count.
        ConnectedData = 0x00b1,
        UnconnectedData = 0x00b2,
        ListServices = 0x0100,
        SockaddrOtoT = 0x8000,
        SockaddrTtoO = 0x8001,
        SequencedAddress = 0x8002,
    }
}

impl Default for Command {
    fn default() -> Self {
        Command::Nop
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Success
    }
}

byte_wrapper! {
    /// A byte sequence starting with an encapsulation header.
    #[derive(Debug, PartialEq, Eq)]
    pub struct enip([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const COMMAND:        Field = 0..2;
    pub(crate) const LENGTH:         Field = 2..4;
    pub(crate) const SESSION_HANDLE: Field = 4..8;
    pub(crate) const STATUS:         Field = 8..12;
    pub(crate) const SENDER_CONTEXT: Field = 12..20;
    pub(crate) const OPTIONS:        Field = 20..24;

    // Relative to the command specific data of explicit messages.
    pub(crate) const INTERFACE_HANDLE: Field = 0..4;
    pub(crate) const TIMEOUT:          Field = 4..6;
    pub(crate) const ITEM_COUNT:       Field = 6..8;
}

/// Length of the encapsulation header.
pub const HEADER_LEN: usize = field::OPTIONS.end;

/// Length of the prefix before the item list of explicit messages.
const EXPLICIT_PREFIX_LEN: usize = field::ITEM_COUNT.end;

impl enip {
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    pub fn new_checked(data: &[u8]) -> Result<&Self, DecodeError> {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::truncated(LayerType::Enip, HEADER_LEN, data.len()));
        }
        Ok(Self::new_unchecked(data))
    }

    pub fn command(&self) -> Command {
        LittleEndian::read_u16(&self.0[field::COMMAND]).into()
    }

    /// Length of the command specific data.
    pub fn len(&self) -> u16 {
        LittleEndian::read_u16(&self.0[field::LENGTH])
    }

    pub fn session_handle(&self) -> u32 {
        LittleEndian::read_u32(&self.0[field::SESSION_HANDLE])
    }

    pub fn status(&self) -> Status {
        LittleEndian::read_u32(&self.0[field::STATUS]).into()
    }

    pub fn sender_context(&self) -> [u8; 8] {
        let mut context = [0; 8];
        context.copy_from_slice(&self.0[field::SENDER_CONTEXT]);
        context
    }

    pub fn options(&self) -> u32 {
        LittleEndian::read_u32(&self.0[field::OPTIONS])
    }
}

/// An item of the common packet format list, other than the data item.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct CpfItem {
    pub item_type: ItemType,
    pub data: Vec<u8>,
}

/// The command specific data of a message.
///
/// For explicit messages this ends before the encapsulated CIP message.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct CommandSpecific {
    pub command: Command,
    pub data: Vec<u8>,
}

/// A decoded encapsulation header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Enip {
    base: BaseLayer,
    pub command: Command,
    /// Length of the command specific data.
    pub length: u16,
    pub session_handle: u32,
    pub status: Status,
    pub sender_context: [u8; 8],
    pub options: u32,
    pub command_specific: CommandSpecific,
    /// Interface handle of explicit messages.
    pub interface_handle: u32,
    /// Timeout of explicit messages.
    pub timeout: u16,
    /// Items of explicit messages except for the data item.
    pub items: Vec<CpfItem>,
    /// The data item type of explicit messages.
    pub data_item: Option<ItemType>,
    /// Sequence count of connected data.
    pub sequence_count: Option<u16>,
}

impl Enip {
    /// Whether the command carries an item list with an encapsulated message.
    fn is_explicit(command: Command) -> bool {
        matches!(command, Command::SendRRData | Command::SendUnitData)
    }

    /// Walk the items of an explicit message, returning the range of the encapsulated message.
    fn decode_items(&mut self, specific: &[u8], df: &mut dyn DecodeFeedback)
        -> Result<Option<Range<usize>>, DecodeError>
    {
        let prefix = specific.get(..EXPLICIT_PREFIX_LEN).ok_or_else(|| {
            DecodeError::malformed(LayerType::Enip, "command data shorter than item list prefix")
        })?;
        self.interface_handle = LittleEndian::read_u32(&prefix[field::INTERFACE_HANDLE]);
        self.timeout = LittleEndian::read_u16(&prefix[field::TIMEOUT]);
        let count = LittleEndian::read_u16(&prefix[field::ITEM_COUNT]);

        let list = &specific[EXPLICIT_PREFIX_LEN..];
        let mut walker = Options::<CommonPacketFormat>::new(list, LayerType::Enip);
        let mut message = None;
        for _ in 0..count {
            let start = EXPLICIT_PREFIX_LEN + walker.offset();
            let item = match walker.next() {
                Some(item) => item.map_err(|err| err.report(df))?,
                None => return Err(DecodeError::malformed(LayerType::Enip, "fewer items than announced")),
            };
            let item_type = ItemType::from(item.tag);
            let data_start = start + CommonPacketFormat::HEADER_LEN;
            match item_type {
                ItemType::ConnectedData => {
                    let sequence = item.data.get(..2).ok_or_else(|| {
                        DecodeError::malformed(LayerType::Enip, "connected data without sequence count")
                    })?;
                    self.sequence_count = Some(LittleEndian::read_u16(sequence));
                    self.data_item = Some(item_type);
                    message = Some(data_start + 2..start + item.len);
                },
                ItemType::UnconnectedData => {
                    self.data_item = Some(item_type);
                    message = Some(data_start..start + item.len);
                },
                _ => self.items.push(CpfItem { item_type, data: item.data.to_vec() }),
            }
        }
        Ok(message)
    }
}

impl Layer for Enip {
    fn layer_type(&self) -> LayerType {
        LayerType::Enip
    }

    fn decode_from_bytes(&mut self, data: &[u8], df: &mut dyn DecodeFeedback)
        -> Result<(), DecodeError>
    {
        let header = enip::new_checked(data).map_err(|err| err.report(df))?;
        self.command = header.command();
        self.length = header.len();
        self.session_handle = header.session_handle();
        self.status = header.status();
        self.sender_context = header.sender_context();
        self.options = header.options();
        self.interface_handle = 0;
        self.timeout = 0;
        self.items.clear();
        self.data_item = None;
        self.sequence_count = None;

        let end = HEADER_LEN + usize::from(self.length);
        let specific = data.get(HEADER_LEN..end)
            .ok_or_else(|| DecodeError::truncated(LayerType::Enip, end, data.len()).report(df))?;

        let message = if Self::is_explicit(self.command) {
            self.decode_items(specific, df)?
        } else {
            None
        };

        let (contents_end, payload) = match message {
            Some(range) => (HEADER_LEN + range.start, HEADER_LEN + range.start..HEADER_LEN + range.end),
            None => (end, end..end),
        };
        self.command_specific = CommandSpecific {
            command: self.command,
            data: data[HEADER_LEN..contents_end].to_vec(),
        };
        net_trace!("ENIP {:?} with {} octets of encapsulated data", self.command, payload.len());
        self.base = BaseLayer { contents: 0..contents_end, payload };
        Ok(())
    }

    fn base(&self) -> &BaseLayer {
        &self.base
    }

    fn next_layer_type(&self) -> LayerType {
        match self.data_item {
            Some(_) => LayerType::Cip,
            None => LayerType::Payload,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::layer::{NilDecodeFeedback, Truncation};

    static REGISTER_SESSION: [u8; 28] = [
        0x65, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x01, 0x00, 0x00, 0x00,
    ];

    fn explicit(items: &[u8], count: u16) -> Vec<u8> {
        let mut data = vec![0x6f, 0x00, 0, 0, 0x00, 0x11, 0x02, 0x0a];
        data.extend_from_slice(&[0; 16]);
        data.extend_from_slice(&[0, 0, 0, 0, 0, 0]);
        data.extend_from_slice(&count.to_le_bytes());
        data.extend_from_slice(items);
        let length = (data.len() - HEADER_LEN) as u16;
        data[2..4].copy_from_slice(&length.to_le_bytes());
        data
    }

    #[test]
    fn test_register_session() {
        let mut layer = Enip::default();
        layer.decode_from_bytes(&REGISTER_SESSION, &mut NilDecodeFeedback).unwrap();
        assert_eq!(layer.command, Command::RegisterSession);
        assert_eq!(layer.length, 4);
        assert_eq!(layer.session_handle, 0);
        assert_eq!(layer.status, Status::Success);
        assert_eq!(layer.command_specific.data, [1, 0, 0, 0]);
        assert_eq!(layer.base().contents, 0..28);
        assert!(layer.base().payload.is_empty());
        assert_eq!(layer.next_layer_type(), LayerType::Payload);
    }

    #[test]
    fn test_unconnected_data() {
        let data = explicit(&[0, 0, 0, 0, 0xb2, 0, 3, 0, 0x01, 0x02, 0x03], 2);
        let mut layer = Enip::default();
        layer.decode_from_bytes(&data, &mut NilDecodeFeedback).unwrap();
        assert_eq!(layer.session_handle, 0x0a021100);
        assert_eq!(layer.items, [CpfItem { item_type: ItemType::NullAddress, data: vec![] }]);
        assert_eq!(layer.data_item, Some(ItemType::UnconnectedData));
        assert_eq!(layer.sequence_count, None);
        assert_eq!(layer.base().contents, 0..40);
        assert_eq!(layer.base().payload, 40..43);
        assert_eq!(layer.next_layer_type(), LayerType::Cip);
    }

    #[test]
    fn test_missing_items() {
        let data = explicit(&[0, 0, 0, 0], 2);
        let err = Enip::default().decode_from_bytes(&data, &mut NilDecodeFeedback).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { layer: LayerType::Enip, .. }));
    }

    #[test]
    fn test_item_overrun() {
        let data = explicit(&[0xb2, 0, 9, 0, 0x01], 1);
        let mut feedback = Truncation::default();
        let err = Enip::default().decode_from_bytes(&data, &mut feedback).unwrap_err();
        assert!(err.is_truncated());
        assert!(feedback.is_truncated());
    }

    #[test]
    fn test_length_beyond_data() {
        let mut feedback = Truncation::default();
        let err = Enip::default().decode_from_bytes(&REGISTER_SESSION[..26], &mut feedback).unwrap_err();
        assert_eq!(err, DecodeError::truncated(LayerType::Enip, 28, 26));
        assert!(feedback.is_truncated());
    }
}
