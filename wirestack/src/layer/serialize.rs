use bytes::Bytes;

use crate::error::SerializeError;
use super::Layer;

/// Headroom reserved whenever the buffer has to grow at the front.
const HEADROOM: usize = 128;

/// Controls how layers fill derived fields while serializing.
#[derive(Clone, Copy, Debug, Default, Hash, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Overwrite length and count fields with the values implied by the data.
    pub fix_lengths: bool,
    /// Compute checksums instead of writing the stored values.
    pub compute_checksums: bool,
}

impl SerializeOptions {
    /// Fix lengths and compute checksums.
    pub const FIX_ALL: SerializeOptions = SerializeOptions {
        fix_lengths: true,
        compute_checksums: true,
    };
}

/// A byte buffer growing at both ends.
///
/// Layers are serialized innermost first. Each one prepends its header in front of the bytes
/// written so far; trailers such as link padding are appended.
#[derive(Clone, Debug, Default)]
pub struct SerializeBuffer {
    data: Vec<u8>,
    start: usize,
}

impl SerializeBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        SerializeBuffer::default()
    }

    /// The bytes written so far.
    pub fn bytes(&self) -> &[u8] {
        &self.data[self.start..]
    }

    /// The bytes written so far, mutably.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.start..]
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.data.len() - self.start
    }

    /// Whether nothing was written yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve `num` zeroed bytes in front of the current contents and return them.
    pub fn prepend_bytes(&mut self, num: usize) -> &mut [u8] {
        if self.start < num {
            let extra = num - self.start + HEADROOM;
            let mut grown = vec![0; extra + self.data.len()];
            grown[extra..].copy_from_slice(&self.data);
            self.data = grown;
            self.start += extra;
        }

        self.start -= num;
        let region = &mut self.data[self.start..self.start + num];
        region.fill(0);
        region
    }

    /// Reserve `num` zeroed bytes behind the current contents and return them.
    pub fn append_bytes(&mut self, num: usize) -> &mut [u8] {
        let end = self.data.len();
        self.data.resize(end + num, 0);
        &mut self.data[end..]
    }

    /// Convert the contents into shared bytes.
    pub fn freeze(self) -> Bytes {
        Bytes::from(self.data).slice(self.start..)
    }
}

/// Serialize a stack of layers, outermost first, into a fresh buffer.
///
/// The layers are written in reverse order so that each one sees its complete payload. Mutable
/// access lets layers store fixed lengths and computed checksums back into their fields.
pub fn serialize_layers(options: SerializeOptions, layers: &mut [&mut dyn Layer])
    -> Result<Bytes, SerializeError>
{
    let mut buffer = SerializeBuffer::new();
    for layer in layers.iter_mut().rev() {
        net_trace!("serializing {} over {} payload octets", layer.layer_type(), buffer.len());
        layer.serialize_to(&mut buffer, options)?;
    }
    Ok(buffer.freeze())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prepend_and_append() {
        let mut buffer = SerializeBuffer::new();
        buffer.append_bytes(2).copy_from_slice(&[3, 4]);
        buffer.prepend_bytes(2).copy_from_slice(&[1, 2]);
        buffer.append_bytes(1)[0] = 5;
        assert_eq!(buffer.bytes(), &[1, 2, 3, 4, 5]);
        assert_eq!(buffer.len(), 5);

        let big = buffer.prepend_bytes(300);
        assert_eq!(big.len(), 300);
        assert!(big.iter().all(|&b| b == 0));
        assert_eq!(&buffer.bytes()[300..], &[1, 2, 3, 4, 5]);

        let frozen = buffer.freeze();
        assert_eq!(frozen.len(), 305);
    }
}
