use std::collections::BTreeMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Once;

use parking_lot::{const_rwlock, RwLock};

use crate::error::RegistrationError;

/// Number identifying the kind of address an endpoint carries.
///
/// Numbers below [`EndpointType::FIRST_CUSTOM`] are reserved for the types this crate registers
/// itself. Additional types are added with [`register_endpoint_type`], usually during program
/// startup before any packet is decoded.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct EndpointType(pub u16);

/// Renders the raw bytes of an endpoint.
pub type Formatter = fn(&[u8]) -> String;

/// What the registry knows about an endpoint type.
#[derive(Clone, Copy, Debug)]
pub struct EndpointTypeMetadata {
    /// Display name of the type, e.g. `IPv4`.
    pub name: &'static str,
    /// Renders raw bytes of the type for display.
    pub formatter: Formatter,
}

impl EndpointType {
    /// Type of the zero endpoint, registered as `invalid`.
    pub const INVALID: EndpointType = EndpointType(0);
    /// Four byte IPv4 addresses.
    pub const IPV4: EndpointType = EndpointType(1);
    /// Sixteen byte IPv6 addresses.
    pub const IPV6: EndpointType = EndpointType(2);
    /// Six byte ethernet MAC addresses.
    pub const MAC: EndpointType = EndpointType(3);
    /// Big-endian two byte TCP ports.
    pub const TCP_PORT: EndpointType = EndpointType(4);
    /// Big-endian two byte UDP ports.
    pub const UDP_PORT: EndpointType = EndpointType(5);

    /// The first number available to [`register_endpoint_type`].
    pub const FIRST_CUSTOM: u16 = 1000;

    /// The registered metadata, if any.
    pub fn metadata(self) -> Option<EndpointTypeMetadata> {
        registry().read().get(&self.0).copied()
    }

    /// Render raw bytes with the registered formatter of this type.
    ///
    /// Unregistered types fall back to `<number>:<bytes>`.
    pub fn format(self, raw: &[u8]) -> String {
        match self.metadata() {
            Some(meta) => (meta.formatter)(raw),
            None => format!("{}:{:?}", self.0, raw),
        }
    }
}

impl fmt::Display for EndpointType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.metadata() {
            Some(meta) => f.write_str(meta.name),
            None => write!(f, "{}", self.0),
        }
    }
}

impl From<u16> for EndpointType {
    fn from(num: u16) -> Self {
        EndpointType(num)
    }
}

static REGISTRY: RwLock<BTreeMap<u16, EndpointTypeMetadata>> = const_rwlock(BTreeMap::new());
static BUILTIN: Once = Once::new();

fn registry() -> &'static RwLock<BTreeMap<u16, EndpointTypeMetadata>> {
    BUILTIN.call_once(|| {
        let mut table = REGISTRY.write();
        table.insert(EndpointType::INVALID.0, EndpointTypeMetadata { name: "invalid", formatter: format_bytes });
        table.insert(EndpointType::IPV4.0, EndpointTypeMetadata { name: "IPv4", formatter: format_ipv4 });
        table.insert(EndpointType::IPV6.0, EndpointTypeMetadata { name: "IPv6", formatter: format_ipv6 });
        table.insert(EndpointType::MAC.0, EndpointTypeMetadata { name: "MAC", formatter: format_mac });
        table.insert(EndpointType::TCP_PORT.0, EndpointTypeMetadata { name: "TCP", formatter: format_port });
        table.insert(EndpointType::UDP_PORT.0, EndpointTypeMetadata { name: "UDP", formatter: format_port });
    });
    &REGISTRY
}

/// Register a new endpoint type, failing if the number is already taken.
///
/// Registration mutates process-wide state. It is meant to happen during startup; endpoints that
/// were already rendered keep their earlier text.
pub fn try_register_endpoint_type(num: u16, metadata: EndpointTypeMetadata)
    -> Result<EndpointType, RegistrationError>
{
    let mut table = registry().write();
    if table.contains_key(&num) {
        return Err(RegistrationError::Duplicate(num));
    }

    net_debug!("registering endpoint type {} as {}", num, metadata.name);
    table.insert(num, metadata);
    Ok(EndpointType(num))
}

/// Register a new endpoint type.
///
/// # Panics
/// This function panics if the number was already registered, such as any of the builtin types.
/// Use [`try_register_endpoint_type`] for a fallible variant.
pub fn register_endpoint_type(num: u16, metadata: EndpointTypeMetadata) -> EndpointType {
    match try_register_endpoint_type(num, metadata) {
        Ok(typ) => typ,
        Err(err) => panic!("{}", err),
    }
}

fn format_bytes(raw: &[u8]) -> String {
    format!("{:?}", raw)
}

fn format_ipv4(raw: &[u8]) -> String {
    match <[u8; 4]>::try_from(raw) {
        Ok(octets) => Ipv4Addr::from(octets).to_string(),
        Err(_) => format!("{:?}", raw),
    }
}

fn format_ipv6(raw: &[u8]) -> String {
    match <[u8; 16]>::try_from(raw) {
        Ok(octets) => Ipv6Addr::from(octets).to_string(),
        Err(_) => format!("{:?}", raw),
    }
}

fn format_mac(raw: &[u8]) -> String {
    let parts: Vec<String> = raw.iter().map(|b| format!("{:02x}", b)).collect();
    parts.join(":")
}

fn format_port(raw: &[u8]) -> String {
    match <[u8; 2]>::try_from(raw) {
        Ok(port) => u16::from_be_bytes(port).to_string(),
        Err(_) => format!("{:?}", raw),
    }
}
