use std::collections::{BTreeSet, HashMap};
use std::net::Ipv6Addr;

use proptest::prelude::*;

use super::*;
use crate::error::RegistrationError;

fn ipv4(raw: [u8; 4]) -> Endpoint {
    Endpoint::new(EndpointType::IPV4, &raw).unwrap()
}

#[test]
fn endpoint_too_long() {
    let raw = [0u8; 17];
    assert_eq!(
        Endpoint::new(EndpointType::IPV6, &raw),
        Err(ConstructionError::AddressTooLong { len: 17 }));
    assert_eq!(
        Flow::new(EndpointType::IPV6, &raw[..16], &raw).map(|_| ()),
        Err(ConstructionError::AddressTooLong { len: 17 }));
    assert!(Endpoint::new(EndpointType::IPV6, &raw[..16]).is_ok());
}

#[test]
fn endpoint_ordering() {
    let low = ipv4([10, 0, 0, 1]);
    let high = ipv4([10, 0, 0, 2]);
    assert!(low.less_than(&high));
    assert!(!high.less_than(&low));
    assert!(!low.less_than(&low));

    // The type takes precedence over the address.
    let mac = Endpoint::new(EndpointType::MAC, &[0; 6]).unwrap();
    assert!(high.less_than(&mac));

    // A shorter prefix sorts first.
    let short = Endpoint::new(EndpointType::IPV4, &[10, 0]).unwrap();
    assert!(short.less_than(&low));
}

#[test]
fn endpoint_as_key() {
    let mut seen = HashMap::new();
    *seen.entry(ipv4([1, 2, 3, 4])).or_insert(0) += 1;
    *seen.entry(ipv4([1, 2, 3, 4])).or_insert(0) += 1;
    *seen.entry(ipv4([4, 3, 2, 1])).or_insert(0) += 1;
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[&ipv4([1, 2, 3, 4])], 2);

    let tree: BTreeSet<_> = seen.keys().copied().collect();
    assert_eq!(tree.iter().next(), Some(&ipv4([1, 2, 3, 4])));
}

#[test]
fn endpoint_display() {
    assert_eq!(ipv4([192, 168, 1, 1]).to_string(), "192.168.1.1");
    let mac = Endpoint::new(EndpointType::MAC, &[0x00, 0x1f, 0x16, 0xaa, 0x0b, 0xff]).unwrap();
    assert_eq!(mac.to_string(), "00:1f:16:aa:0b:ff");
    let port = Endpoint::new(EndpointType::TCP_PORT, &[0xaf, 0x12]).unwrap();
    assert_eq!(port.to_string(), "44818");
    let v6 = Endpoint::new(EndpointType::IPV6, &Ipv6Addr::LOCALHOST.octets()).unwrap();
    assert_eq!(v6.to_string(), "::1");

    let unknown = Endpoint::new(EndpointType(999), &[1, 2]).unwrap();
    assert_eq!(unknown.to_string(), "999:[1, 2]");
    assert_eq!(INVALID_ENDPOINT.to_string(), "[]");
}

#[test]
fn flow_from_endpoints() {
    let src = ipv4([10, 0, 0, 1]);
    let dst = ipv4([10, 0, 0, 2]);
    let flow = Flow::from_endpoints(src, dst).unwrap();
    assert_eq!(flow.endpoints(), (src, dst));
    assert_eq!(flow.endpoint_type(), EndpointType::IPV4);
    assert_eq!(flow, Flow::new(EndpointType::IPV4, &[10, 0, 0, 1], &[10, 0, 0, 2]).unwrap());
    assert_eq!(flow.to_string(), "10.0.0.1->10.0.0.2");

    let port = Endpoint::new(EndpointType::UDP_PORT, &[0, 53]).unwrap();
    assert_eq!(
        Flow::from_endpoints(src, port),
        Err(ConstructionError::EndpointTypeMismatch {
            src: EndpointType::IPV4,
            dst: EndpointType::UDP_PORT,
        }));
}

#[test]
fn flow_reverse() {
    let flow = Flow::new(EndpointType::TCP_PORT, &[0xbf, 0x00], &[0x00, 0x50]).unwrap();
    let reverse = flow.reverse();
    assert_eq!(reverse.src(), flow.dst());
    assert_eq!(reverse.dst(), flow.src());
    assert_eq!(reverse.reverse(), flow);
    assert_ne!(reverse, flow);
    assert_eq!(reverse.fast_hash(), flow.fast_hash());
}

#[test]
fn invalid_constants() {
    assert_eq!(INVALID_ENDPOINT.endpoint_type(), EndpointType::INVALID);
    assert!(INVALID_ENDPOINT.raw().is_empty());
    assert_eq!(INVALID_FLOW.endpoints(), (INVALID_ENDPOINT, INVALID_ENDPOINT));
    assert_eq!(INVALID_FLOW.fast_hash(), 0);
    assert_eq!(EndpointType::INVALID.to_string(), "invalid");
    assert_eq!(EndpointType::INVALID.metadata().map(|meta| meta.name), Some("invalid"));
    assert_eq!(INVALID_FLOW.to_string(), "[]->[]");
}

#[test]
fn register_custom_type() {
    fn hex(raw: &[u8]) -> String {
        raw.iter().map(|b| format!("{:02x}", b)).collect()
    }

    let meta = EndpointTypeMetadata { name: "Custom", formatter: hex };
    let typ = try_register_endpoint_type(4711, meta).unwrap();
    assert_eq!(typ, EndpointType(4711));
    assert_eq!(typ.to_string(), "Custom");
    assert_eq!(Endpoint::new(typ, &[0xde, 0xad]).unwrap().to_string(), "dead");

    assert_eq!(
        try_register_endpoint_type(4711, meta).map(|_| ()),
        Err(RegistrationError::Duplicate(4711)));
    assert_eq!(
        try_register_endpoint_type(EndpointType::IPV4.0, meta).map(|_| ()),
        Err(RegistrationError::Duplicate(1)));
}

#[test]
#[should_panic(expected = "already in use")]
fn register_builtin_panics() {
    fn plain(raw: &[u8]) -> String {
        format!("{:?}", raw)
    }

    register_endpoint_type(EndpointType::MAC.0, EndpointTypeMetadata { name: "Mac", formatter: plain });
}

fn raw_address() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u8>(), 0..=MAX_ENDPOINT_SIZE)
}

proptest! {
    #[test]
    fn fast_hash_is_symmetric(src in raw_address(), dst in raw_address()) {
        let flow = Flow::new(EndpointType::IPV6, &src, &dst).unwrap();
        prop_assert_eq!(flow.fast_hash(), flow.reverse().fast_hash());
    }

    #[test]
    fn endpoint_keeps_raw_bytes(raw in raw_address()) {
        let endpoint = Endpoint::new(EndpointType::MAC, &raw).unwrap();
        prop_assert_eq!(endpoint.raw(), &raw[..]);
    }

    #[test]
    fn reverse_is_involution(src in raw_address(), dst in raw_address()) {
        let flow = Flow::new(EndpointType::UDP_PORT, &src, &dst).unwrap();
        prop_assert_eq!(flow.reverse().reverse(), flow);
    }

    #[test]
    fn equal_endpoints_hash_equal(raw in raw_address()) {
        let a = Endpoint::new(EndpointType::IPV6, &raw).unwrap();
        let b = Endpoint::new(EndpointType::IPV6, &raw.clone()).unwrap();
        prop_assert_eq!(a, b);
        prop_assert_eq!(a.fast_hash(), b.fast_hash());
    }

    #[test]
    fn less_than_is_strict(a in raw_address(), b in raw_address()) {
        let a = Endpoint::new(EndpointType::MAC, &a).unwrap();
        let b = Endpoint::new(EndpointType::MAC, &b).unwrap();
        prop_assert!(!(a.less_than(&b) && b.less_than(&a)));
        prop_assert_eq!(!a.less_than(&b) && !b.less_than(&a), a == b);
    }
}
