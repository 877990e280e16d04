//! Hashable endpoints and flows.
//!
//! An [`Endpoint`] is a typed address of at most [`MAX_ENDPOINT_SIZE`] bytes: a MAC address, an
//! IP address or a port. A [`Flow`] pairs a source and destination endpoint of the same type.
//! Both are `Copy`, compare by value and can be used as map keys directly.
//!
//! Besides the usual `Hash` implementation both offer a `fast_hash`. For flows it is symmetric,
//! that is `A->B` and `B->A` hash to the same value, which makes it suitable for load balancing
//! the two directions of a conversation onto the same worker:
//!
//! ```
//! use wirestack::flow::{EndpointType, Flow};
//!
//! let flow = Flow::new(EndpointType::IPV4, &[10, 0, 0, 1], &[10, 0, 0, 2]).unwrap();
//! assert_eq!(flow.fast_hash(), flow.reverse().fast_hash());
//! assert_eq!(flow.to_string(), "10.0.0.1->10.0.0.2");
//! ```
use core::cmp::Ordering;
use core::fmt;
use core::hash::{Hash, Hasher};

use crate::error::ConstructionError;

mod registry;
#[cfg(test)]
mod tests;

pub use self::registry::{
    register_endpoint_type,
    try_register_endpoint_type,
    EndpointType,
    EndpointTypeMetadata,
    Formatter};

/// The largest raw address an endpoint can hold, enough for an IPv6 address.
pub const MAX_ENDPOINT_SIZE: usize = 16;

/// A typed network address.
///
/// The raw bytes are stored inline. Only the first `len` of them are meaningful, equality,
/// ordering and hashing consider exactly those.
#[derive(Clone, Copy)]
pub struct Endpoint {
    typ: EndpointType,
    len: u8,
    raw: [u8; MAX_ENDPOINT_SIZE],
}

/// A pair of endpoints of one type, from a source to a destination.
#[derive(Clone, Copy)]
pub struct Flow {
    typ: EndpointType,
    src_len: u8,
    dst_len: u8,
    src: [u8; MAX_ENDPOINT_SIZE],
    dst: [u8; MAX_ENDPOINT_SIZE],
}

/// The endpoint of the invalid type with no bytes.
pub const INVALID_ENDPOINT: Endpoint = Endpoint {
    typ: EndpointType::INVALID,
    len: 0,
    raw: [0; MAX_ENDPOINT_SIZE],
};

/// The flow of the invalid type between empty endpoints.
pub const INVALID_FLOW: Flow = Flow {
    typ: EndpointType::INVALID,
    src_len: 0,
    dst_len: 0,
    src: [0; MAX_ENDPOINT_SIZE],
    dst: [0; MAX_ENDPOINT_SIZE],
};

fn inline_raw(raw: &[u8]) -> Result<(u8, [u8; MAX_ENDPOINT_SIZE]), ConstructionError> {
    if raw.len() > MAX_ENDPOINT_SIZE {
        return Err(ConstructionError::AddressTooLong { len: raw.len() });
    }

    let mut storage = [0; MAX_ENDPOINT_SIZE];
    storage[..raw.len()].copy_from_slice(raw);
    Ok((raw.len() as u8, storage))
}

impl Endpoint {
    /// Create an endpoint from a type and its raw address bytes.
    ///
    /// Fails if `raw` is longer than [`MAX_ENDPOINT_SIZE`].
    pub fn new(typ: EndpointType, raw: &[u8]) -> Result<Self, ConstructionError> {
        let (len, raw) = inline_raw(raw)?;
        Ok(Endpoint { typ, len, raw })
    }

    /// The type of this endpoint.
    pub fn endpoint_type(&self) -> EndpointType {
        self.typ
    }

    /// The meaningful raw bytes.
    pub fn raw(&self) -> &[u8] {
        &self.raw[..usize::from(self.len)]
    }

    /// Compare by type first and then lexicographically by raw bytes.
    ///
    /// This is the same order as the `Ord` implementation.
    pub fn less_than(&self, other: &Endpoint) -> bool {
        self < other
    }

    /// A cheap non-cryptographic hash of the raw bytes.
    ///
    /// Equal endpoints hash equally. The value is stable across runs but no guarantee is given
    /// beyond that; the type does not enter the hash.
    pub fn fast_hash(&self) -> u64 {
        self.raw()
            .iter()
            .enumerate()
            .fold(0, |hash, (i, &b)| hash ^ (u64::from(b) << (8 * (i % 8))))
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.typ == other.typ && self.raw() == other.raw()
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.typ.hash(state);
        self.raw().hash(state);
    }
}

impl PartialOrd for Endpoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Endpoint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.typ.cmp(&other.typ)
            .then_with(|| self.raw().cmp(other.raw()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.typ.format(self.raw()))
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("typ", &self.typ)
            .field("raw", &self.raw())
            .finish()
    }
}

impl Flow {
    /// Create a flow from a type and the raw bytes of both endpoints.
    pub fn new(typ: EndpointType, src: &[u8], dst: &[u8]) -> Result<Self, ConstructionError> {
        let (src_len, src) = inline_raw(src)?;
        let (dst_len, dst) = inline_raw(dst)?;
        Ok(Flow { typ, src_len, dst_len, src, dst })
    }

    /// Create a flow between two endpoints of the same type.
    pub fn from_endpoints(src: Endpoint, dst: Endpoint) -> Result<Self, ConstructionError> {
        if src.typ != dst.typ {
            return Err(ConstructionError::EndpointTypeMismatch { src: src.typ, dst: dst.typ });
        }

        Ok(Flow {
            typ: src.typ,
            src_len: src.len,
            dst_len: dst.len,
            src: src.raw,
            dst: dst.raw,
        })
    }

    /// The type of both endpoints.
    pub fn endpoint_type(&self) -> EndpointType {
        self.typ
    }

    /// The source endpoint.
    pub fn src(&self) -> Endpoint {
        Endpoint { typ: self.typ, len: self.src_len, raw: self.src }
    }

    /// The destination endpoint.
    pub fn dst(&self) -> Endpoint {
        Endpoint { typ: self.typ, len: self.dst_len, raw: self.dst }
    }

    /// Source and destination endpoints.
    pub fn endpoints(&self) -> (Endpoint, Endpoint) {
        (self.src(), self.dst())
    }

    /// The same flow in the opposite direction.
    pub fn reverse(&self) -> Flow {
        Flow {
            typ: self.typ,
            src_len: self.dst_len,
            dst_len: self.src_len,
            src: self.dst,
            dst: self.src,
        }
    }

    /// A cheap hash that is symmetric in the direction of the flow.
    ///
    /// Guarantees `f.fast_hash() == f.reverse().fast_hash()`. Equal flows hash equally.
    pub fn fast_hash(&self) -> u64 {
        let a = fold_reversed(&self.src[..usize::from(self.src_len)]);
        let b = fold_reversed(&self.dst[..usize::from(self.dst_len)]);
        // Ordering the two halves first makes the result independent of direction.
        if a > b {
            a.wrapping_add(b << 8)
        } else {
            b.wrapping_add(a << 8)
        }
    }
}

/// Xor the bytes, last byte first, into four 16-bit lanes.
fn fold_reversed(raw: &[u8]) -> u64 {
    raw.iter()
        .rev()
        .enumerate()
        .fold(0, |hash, (i, &b)| hash ^ (u64::from(b) << (16 * (i % 4))))
}

impl PartialEq for Flow {
    fn eq(&self, other: &Self) -> bool {
        self.typ == other.typ
            && self.src().raw() == other.src().raw()
            && self.dst().raw() == other.dst().raw()
    }
}

impl Eq for Flow {}

impl Hash for Flow {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.src().hash(state);
        self.dst().hash(state);
    }
}

impl PartialOrd for Flow {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Flow {
    fn cmp(&self, other: &Self) -> Ordering {
        self.src().cmp(&other.src())
            .then_with(|| self.dst().cmp(&other.dst()))
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}->{}", self.src(), self.dst())
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Flow")
            .field("typ", &self.typ)
            .field("src", &self.src().raw())
            .field("dst", &self.dst().raw())
            .finish()
    }
}
