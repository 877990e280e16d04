use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::layer::{Layer, LayerType};
use crate::wire::{
    Cip, Dns, Enip, Ethernet, Icmpv6, Ipv4, Ipv6, Loopback, Payload, Tcp, Udp,
    NeighborAdvertisement, NeighborSolicitation, Redirect, RouterAdvertisement, RouterSolicitation,
};
use super::DecodeOptions;

/// Creates a fresh decoder for one layer type.
pub type Factory = fn(&DecodeOptions) -> Box<dyn Layer>;

/// The table of decoders a packet consults for each layer type.
///
/// The table is immutable once shared with packets. Register additional layer types on an owned
/// table, usually one started from [`Decoders::with_builtin`], then wrap it in an `Arc`.
#[derive(Clone, Default)]
pub struct Decoders {
    factories: BTreeMap<LayerType, Factory>,
}

fn boxed<T: Layer + Default>(_: &DecodeOptions) -> Box<dyn Layer> {
    Box::new(T::default())
}

fn tcp(options: &DecodeOptions) -> Box<dyn Layer> {
    if options.decode_streams_as_datagrams {
        Box::new(Tcp::with_stream_payloads())
    } else {
        Box::new(Tcp::default())
    }
}

impl Decoders {
    /// An empty table.
    pub fn new() -> Self {
        Decoders::default()
    }

    /// A table with a decoder for every layer of this crate.
    pub fn with_builtin() -> Self {
        let mut decoders = Decoders::new();
        decoders.register(LayerType::Payload, boxed::<Payload>);
        decoders.register(LayerType::Ethernet, boxed::<Ethernet>);
        decoders.register(LayerType::Loopback, boxed::<Loopback>);
        decoders.register(LayerType::Ipv4, boxed::<Ipv4>);
        decoders.register(LayerType::Ipv6, boxed::<Ipv6>);
        decoders.register(LayerType::Icmpv6, boxed::<Icmpv6>);
        decoders.register(LayerType::Icmpv6RouterSolicitation, boxed::<RouterSolicitation>);
        decoders.register(LayerType::Icmpv6RouterAdvertisement, boxed::<RouterAdvertisement>);
        decoders.register(LayerType::Icmpv6NeighborSolicitation, boxed::<NeighborSolicitation>);
        decoders.register(LayerType::Icmpv6NeighborAdvertisement, boxed::<NeighborAdvertisement>);
        decoders.register(LayerType::Icmpv6Redirect, boxed::<Redirect>);
        decoders.register(LayerType::Tcp, tcp);
        decoders.register(LayerType::Udp, boxed::<Udp>);
        decoders.register(LayerType::Dns, boxed::<Dns>);
        decoders.register(LayerType::Enip, boxed::<Enip>);
        decoders.register(LayerType::Cip, boxed::<Cip>);
        decoders
    }

    /// The shared table of builtin decoders.
    pub fn builtin() -> Arc<Decoders> {
        static BUILTIN: OnceLock<Arc<Decoders>> = OnceLock::new();
        BUILTIN.get_or_init(|| Arc::new(Decoders::with_builtin())).clone()
    }

    /// Set the decoder of a layer type, returning the one it replaces.
    pub fn register(&mut self, layer_type: LayerType, factory: Factory) -> Option<Factory> {
        self.factories.insert(layer_type, factory)
    }

    /// Whether a decoder for the layer type exists.
    pub fn contains(&self, layer_type: LayerType) -> bool {
        self.factories.contains_key(&layer_type)
    }

    /// A new decoder for the layer type.
    pub fn create(&self, layer_type: LayerType, options: &DecodeOptions) -> Option<Box<dyn Layer>> {
        self.factories.get(&layer_type).map(|factory| factory(options))
    }
}

impl fmt::Debug for Decoders {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.factories.keys()).finish()
    }
}
