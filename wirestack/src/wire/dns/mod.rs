//! Domain name system messages (RFC 1035).
//!
//! The decoder reads the fixed header, then the four sections whose lengths the header counts.
//! Names inside resource data are decompressed against the whole message. Trailing octets beyond
//! the announced records are ignored.
use core::any::Any;
use core::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use byteorder::{ByteOrder, NetworkEndian};

use crate::error::{DecodeError, NameError, SerializeError};
use crate::layer::{BaseLayer, DecodeFeedback, Layer, LayerType, SerializeBuffer, SerializeOptions};

pub mod name;

enum_with_unknown! {
    /// Resource record type.
    #[derive(Hash)]
    pub enum Type(u16) {
        A = 1,
        Ns = 2,
        Md = 3,
        Mf = 4,
        Cname = 5,
        Soa = 6,
        Mb = 7,
        Mg = 8,
        Mr = 9,
        Null = 10,
        Wks = 11,
        Ptr = 12,
        Hinfo = 13,
        Minfo = 14,
        Mx = 15,
        Txt = 16,
        Aaaa = 28,
        Srv = 33,
        /// EDNS pseudo record.
        Opt = 41,
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::A => f.write_str("A"),
            Type::Ns => f.write_str("NS"),
            Type::Cname => f.write_str("CNAME"),
            Type::Soa => f.write_str("SOA"),
            Type::Ptr => f.write_str("PTR"),
            Type::Mx => f.write_str("MX"),
            Type::Txt => f.write_str("TXT"),
            Type::Aaaa => f.write_str("AAAA"),
            Type::Srv => f.write_str("SRV"),
            Type::Opt => f.write_str("OPT"),
            other => write!(f, "TYPE{}", u16::from(*other)),
        }
    }
}

enum_with_unknown! {
    /// Resource record class.
    #[derive(Hash)]
    pub enum Class(u16) {
        In = 1,
        Cs = 2,
        Ch = 3,
        Hs = 4,
        Any = 255,
    }
}

enum_with_unknown! {
    /// Kind of query.
    #[derive(Hash)]
    pub enum OpCode(u8) {
        Query = 0,
        IQuery = 1,
        Status = 2,
        Notify = 4,
        Update = 5,
    }
}

enum_with_unknown! {
    /// Outcome reported by a response.
    #[derive(Hash)]
    pub enum ResponseCode(u8) {
        NoError = 0,
        FormErr = 1,
        ServFail = 2,
        NxDomain = 3,
        NotImp = 4,
        Refused = 5,
        YxDomain = 6,
        YxRrSet = 7,
        NxRrSet = 8,
        NotAuth = 9,
        NotZone = 10,
    }
}

impl Default for OpCode {
    fn default() -> Self {
        OpCode::Query
    }
}

impl Default for ResponseCode {
    fn default() -> Self {
        ResponseCode::NoError
    }
}

byte_wrapper! {
    /// A byte sequence starting with a DNS message header.
    #[derive(Debug, PartialEq, Eq)]
    pub struct dns([u8]);
}

mod field {
    use crate::wire::field::Field;

    pub(crate) const ID:      Field = 0..2;
    pub(crate) const FLAGS_0: usize = 2;
    pub(crate) const FLAGS_1: usize = 3;
    pub(crate) const QDCOUNT: Field = 4..6;
    pub(crate) const ANCOUNT: Field = 6..8;
    pub(crate) const NSCOUNT: Field = 8..10;
    pub(crate) const ARCOUNT: Field = 10..12;
}

/// Length of the message header.
pub const HEADER_LEN: usize = field::ARCOUNT.end;

impl dns {
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    pub fn new_checked(data: &[u8]) -> Result<&Self, DecodeError> {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::truncated(LayerType::Dns, HEADER_LEN, data.len()));
        }
        Ok(Self::new_unchecked(data))
    }

    pub fn id(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::ID])
    }

    pub fn qr(&self) -> bool {
        self.0[field::FLAGS_0] & 0x80 != 0
    }

    pub fn opcode(&self) -> OpCode {
        ((self.0[field::FLAGS_0] >> 3) & 0x0f).into()
    }

    pub fn aa(&self) -> bool {
        self.0[field::FLAGS_0] & 0x04 != 0
    }

    pub fn tc(&self) -> bool {
        self.0[field::FLAGS_0] & 0x02 != 0
    }

    pub fn rd(&self) -> bool {
        self.0[field::FLAGS_0] & 0x01 != 0
    }

    pub fn ra(&self) -> bool {
        self.0[field::FLAGS_1] & 0x80 != 0
    }

    pub fn z(&self) -> u8 {
        (self.0[field::FLAGS_1] >> 4) & 0x07
    }

    pub fn response_code(&self) -> ResponseCode {
        (self.0[field::FLAGS_1] & 0x0f).into()
    }

    pub fn counts(&self) -> [u16; 4] {
        [
            NetworkEndian::read_u16(&self.0[field::QDCOUNT]),
            NetworkEndian::read_u16(&self.0[field::ANCOUNT]),
            NetworkEndian::read_u16(&self.0[field::NSCOUNT]),
            NetworkEndian::read_u16(&self.0[field::ARCOUNT]),
        ]
    }

    pub fn set_id(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::ID], value)
    }

    pub fn set_flags(&mut self, first: u8, second: u8) {
        self.0[field::FLAGS_0] = first;
        self.0[field::FLAGS_1] = second;
    }

    pub fn set_counts(&mut self, [qd, an, ns, ar]: [u16; 4]) {
        NetworkEndian::write_u16(&mut self.0[field::QDCOUNT], qd);
        NetworkEndian::write_u16(&mut self.0[field::ANCOUNT], an);
        NetworkEndian::write_u16(&mut self.0[field::NSCOUNT], ns);
        NetworkEndian::write_u16(&mut self.0[field::ARCOUNT], ar);
    }
}

/// An entry of the question section.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Question {
    /// Dotted name without trailing dot.
    pub name: Vec<u8>,
    pub ty: Type,
    pub class: Class,
}

/// Start of authority data.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct Soa {
    pub mname: Vec<u8>,
    pub rname: Vec<u8>,
    pub serial: u32,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

/// Service location data.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct Srv {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub name: Vec<u8>,
}

/// Mail exchange data.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq)]
pub struct Mx {
    pub preference: u16,
    pub name: Vec<u8>,
}

/// Interpreted resource data.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum RData {
    /// The address of an `A` or `AAAA` record.
    Address(IpAddr),
    Ns(Vec<u8>),
    Cname(Vec<u8>),
    Ptr(Vec<u8>),
    Mx(Mx),
    /// The character strings of a `TXT` record.
    Txt(Vec<Vec<u8>>),
    Soa(Soa),
    Srv(Srv),
    /// Data of a type without interpretation, written from the record's raw data.
    Opaque,
}

/// An entry of the answer, authority or additional section.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Dotted name without trailing dot.
    pub name: Vec<u8>,
    pub ty: Type,
    pub class: Class,
    pub ttl: u32,
    /// Length of the resource data as announced.
    pub data_length: u16,
    /// The raw resource data.
    pub data: Vec<u8>,
    pub rdata: RData,
}

/// Octets following a question name.
const QUESTION_FIXED: usize = 4;
/// Octets following a record name before the data.
const RECORD_FIXED: usize = 10;

fn fixed_fields<'a>(message: &'a [u8], at: usize, len: usize, df: &mut dyn DecodeFeedback)
    -> Result<&'a [u8], DecodeError>
{
    message.get(at..at + len)
        .ok_or_else(|| DecodeError::truncated(LayerType::Dns, at + len, message.len()).report(df))
}

impl Question {
    pub fn new(name: impl Into<Vec<u8>>, ty: Type, class: Class) -> Self {
        Question { name: name.into(), ty, class }
    }

    fn decode(message: &[u8], offset: usize, df: &mut dyn DecodeFeedback)
        -> Result<(Self, usize), DecodeError>
    {
        if offset >= message.len() {
            return Err(NameError::NoData.into());
        }
        let (name, end) = name::decode(message, offset)?;
        let fixed = fixed_fields(message, end, QUESTION_FIXED, df)?;
        let question = Question {
            name,
            ty: NetworkEndian::read_u16(&fixed[0..2]).into(),
            class: NetworkEndian::read_u16(&fixed[2..4]).into(),
        };
        Ok((question, end + QUESTION_FIXED))
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<(), SerializeError> {
        name::encode(&self.name, out)?;
        out.extend_from_slice(&u16::from(self.ty).to_be_bytes());
        out.extend_from_slice(&u16::from(self.class).to_be_bytes());
        Ok(())
    }
}

impl ResourceRecord {
    /// A record whose raw data is derived from `rdata` when serialized.
    pub fn new(name: impl Into<Vec<u8>>, ty: Type, class: Class, ttl: u32, rdata: RData) -> Self {
        ResourceRecord {
            name: name.into(),
            ty,
            class,
            ttl,
            data_length: 0,
            data: Vec::new(),
            rdata,
        }
    }

    fn decode(message: &[u8], offset: usize, df: &mut dyn DecodeFeedback)
        -> Result<(Self, usize), DecodeError>
    {
        if offset >= message.len() {
            return Err(NameError::NoData.into());
        }
        let (name, end) = name::decode(message, offset)?;
        let fixed = fixed_fields(message, end, RECORD_FIXED, df)?;
        let ty = Type::from(NetworkEndian::read_u16(&fixed[0..2]));
        let data_length = NetworkEndian::read_u16(&fixed[8..10]);

        let data_start = end + RECORD_FIXED;
        let data = fixed_fields(message, data_start, usize::from(data_length), df)?;
        let rdata = RData::decode(ty, message, data_start, data)?;

        let record = ResourceRecord {
            name,
            ty,
            class: NetworkEndian::read_u16(&fixed[2..4]).into(),
            ttl: NetworkEndian::read_u32(&fixed[4..8]),
            data_length,
            data: data.to_vec(),
            rdata,
        };
        Ok((record, data_start + data.len()))
    }

    /// The encoded resource data.
    fn encode_data(&self) -> Result<Vec<u8>, SerializeError> {
        let mut out = Vec::new();
        match &self.rdata {
            RData::Address(IpAddr::V4(addr)) if self.ty == Type::A => out.extend_from_slice(&addr.octets()),
            RData::Address(IpAddr::V6(addr)) if self.ty == Type::Aaaa => out.extend_from_slice(&addr.octets()),
            RData::Address(_) => {
                return Err(SerializeError::invalid(LayerType::Dns, "address family does not match record type"));
            },
            RData::Ns(name) | RData::Cname(name) | RData::Ptr(name) => name::encode(name, &mut out)?,
            RData::Mx(mx) => {
                out.extend_from_slice(&mx.preference.to_be_bytes());
                name::encode(&mx.name, &mut out)?;
            },
            RData::Txt(strings) => for string in strings {
                let len = u8::try_from(string.len())
                    .map_err(|_| SerializeError::invalid(LayerType::Dns, "TXT string longer than 255 octets"))?;
                out.push(len);
                out.extend_from_slice(string);
            },
            RData::Soa(soa) => {
                name::encode(&soa.mname, &mut out)?;
                name::encode(&soa.rname, &mut out)?;
                for value in [soa.serial, soa.refresh, soa.retry, soa.expire, soa.minimum] {
                    out.extend_from_slice(&value.to_be_bytes());
                }
            },
            RData::Srv(srv) => {
                for value in [srv.priority, srv.weight, srv.port] {
                    out.extend_from_slice(&value.to_be_bytes());
                }
                name::encode(&srv.name, &mut out)?;
            },
            RData::Opaque => out.extend_from_slice(&self.data),
        }
        Ok(out)
    }
}

impl RData {
    /// Interpret the data of a record of type `ty` found at `offset` of `message`.
    fn decode(ty: Type, message: &[u8], offset: usize, data: &[u8]) -> Result<Self, DecodeError> {
        let malformed = |reason: &'static str| DecodeError::malformed(LayerType::Dns, reason);
        let rdata = match ty {
            Type::A => {
                let octets = <[u8; 4]>::try_from(data).map_err(|_| malformed("A record is not 4 octets"))?;
                RData::Address(Ipv4Addr::from(octets).into())
            },
            Type::Aaaa => {
                let octets = <[u8; 16]>::try_from(data).map_err(|_| malformed("AAAA record is not 16 octets"))?;
                RData::Address(Ipv6Addr::from(octets).into())
            },
            Type::Ns => RData::Ns(name::decode(message, offset)?.0),
            Type::Cname => RData::Cname(name::decode(message, offset)?.0),
            Type::Ptr => RData::Ptr(name::decode(message, offset)?.0),
            Type::Mx => {
                let preference = data.get(..2).ok_or_else(|| malformed("MX record too short"))?;
                RData::Mx(Mx {
                    preference: NetworkEndian::read_u16(preference),
                    name: name::decode(message, offset + 2)?.0,
                })
            },
            Type::Txt => {
                let mut strings = Vec::new();
                let mut rest = data;
                while let Some((&len, tail)) = rest.split_first() {
                    let len = usize::from(len);
                    let string = tail.get(..len).ok_or_else(|| malformed("TXT string exceeds record"))?;
                    strings.push(string.to_vec());
                    rest = &tail[len..];
                }
                RData::Txt(strings)
            },
            Type::Soa => {
                let (mname, end) = name::decode(message, offset)?;
                let (rname, end) = name::decode(message, end)?;
                let values = message.get(end..end + 20).ok_or_else(|| malformed("SOA record too short"))?;
                RData::Soa(Soa {
                    mname,
                    rname,
                    serial: NetworkEndian::read_u32(&values[0..4]),
                    refresh: NetworkEndian::read_u32(&values[4..8]),
                    retry: NetworkEndian::read_u32(&values[8..12]),
                    expire: NetworkEndian::read_u32(&values[12..16]),
                    minimum: NetworkEndian::read_u32(&values[16..20]),
                })
            },
            Type::Srv => {
                let values = data.get(..6).ok_or_else(|| malformed("SRV record too short"))?;
                RData::Srv(Srv {
                    priority: NetworkEndian::read_u16(&values[0..2]),
                    weight: NetworkEndian::read_u16(&values[2..4]),
                    port: NetworkEndian::read_u16(&values[4..6]),
                    name: name::decode(message, offset + 6)?.0,
                })
            },
            _ => RData::Opaque,
        };
        Ok(rdata)
    }
}

/// A decoded DNS message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dns {
    base: BaseLayer,
    pub id: u16,
    /// Set in responses.
    pub qr: bool,
    pub opcode: OpCode,
    /// Authoritative answer.
    pub aa: bool,
    /// Truncated message.
    pub tc: bool,
    /// Recursion desired.
    pub rd: bool,
    /// Recursion available.
    pub ra: bool,
    /// Reserved bits.
    pub z: u8,
    pub response_code: ResponseCode,
    pub qd_count: u16,
    pub an_count: u16,
    pub ns_count: u16,
    pub ar_count: u16,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
}

fn section_count(len: usize) -> Result<u16, SerializeError> {
    u16::try_from(len).map_err(|_| SerializeError::length(LayerType::Dns, "more than 65535 entries in a section"))
}

impl Dns {
    fn decode_records(
        message: &[u8],
        offset: &mut usize,
        count: u16,
        records: &mut Vec<ResourceRecord>,
        df: &mut dyn DecodeFeedback,
    ) -> Result<(), DecodeError> {
        for _ in 0..count {
            let (record, end) = ResourceRecord::decode(message, *offset, df)?;
            records.push(record);
            *offset = end;
        }
        Ok(())
    }
}

impl Layer for Dns {
    fn layer_type(&self) -> LayerType {
        LayerType::Dns
    }

    fn decode_from_bytes(&mut self, data: &[u8], df: &mut dyn DecodeFeedback)
        -> Result<(), DecodeError>
    {
        let header = dns::new_checked(data).map_err(|err| err.report(df))?;
        self.id = header.id();
        self.qr = header.qr();
        self.opcode = header.opcode();
        self.aa = header.aa();
        self.tc = header.tc();
        self.rd = header.rd();
        self.ra = header.ra();
        self.z = header.z();
        self.response_code = header.response_code();
        [self.qd_count, self.an_count, self.ns_count, self.ar_count] = header.counts();

        self.questions.clear();
        self.answers.clear();
        self.authorities.clear();
        self.additionals.clear();

        let mut offset = HEADER_LEN;
        for _ in 0..self.qd_count {
            let (question, end) = Question::decode(data, offset, df)?;
            self.questions.push(question);
            offset = end;
        }
        Self::decode_records(data, &mut offset, self.an_count, &mut self.answers, df)?;
        Self::decode_records(data, &mut offset, self.ns_count, &mut self.authorities, df)?;
        Self::decode_records(data, &mut offset, self.ar_count, &mut self.additionals, df)?;

        net_trace!("DNS id {} with {} questions and {} answers", self.id, self.questions.len(), self.answers.len());
        self.base = BaseLayer::whole(data.len());
        Ok(())
    }

    fn base(&self) -> &BaseLayer {
        &self.base
    }

    fn serialize_to(&mut self, buffer: &mut SerializeBuffer, options: SerializeOptions)
        -> Result<(), SerializeError>
    {
        if options.fix_lengths {
            self.qd_count = section_count(self.questions.len())?;
            self.an_count = section_count(self.answers.len())?;
            self.ns_count = section_count(self.authorities.len())?;
            self.ar_count = section_count(self.additionals.len())?;
        }

        let mut message = vec![0; HEADER_LEN];
        {
            let header = dns::new_unchecked_mut(&mut message);
            header.set_id(self.id);
            let first = (u8::from(self.qr) << 7)
                | ((u8::from(self.opcode) & 0x0f) << 3)
                | (u8::from(self.aa) << 2)
                | (u8::from(self.tc) << 1)
                | u8::from(self.rd);
            let second = (u8::from(self.ra) << 7)
                | ((self.z & 0x07) << 4)
                | (u8::from(self.response_code) & 0x0f);
            header.set_flags(first, second);
            header.set_counts([self.qd_count, self.an_count, self.ns_count, self.ar_count]);
        }

        for question in &self.questions {
            question.encode(&mut message)?;
        }

        let sections = [&mut self.answers, &mut self.authorities, &mut self.additionals];
        for record in sections.into_iter().flatten() {
            let data = record.encode_data()?;
            if options.fix_lengths {
                record.data_length = u16::try_from(data.len())
                    .map_err(|_| SerializeError::length(LayerType::Dns, "resource data exceeds 65535 octets"))?;
            }
            name::encode(&record.name, &mut message)?;
            message.extend_from_slice(&u16::from(record.ty).to_be_bytes());
            message.extend_from_slice(&u16::from(record.class).to_be_bytes());
            message.extend_from_slice(&record.ttl.to_be_bytes());
            message.extend_from_slice(&record.data_length.to_be_bytes());
            message.extend_from_slice(&data);
        }

        buffer.prepend_bytes(message.len()).copy_from_slice(&message);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
