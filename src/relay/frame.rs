//! Relay frame types

use bytes::Bytes;

/// A JPEG frame travelling through the relay
///
/// Cheap to clone: `data` is reference counted and shared by every consumer.
#[derive(Debug, Clone)]
pub struct RelayFrame {
    /// Position in the session's frame sequence, starting at 0
    pub index: u64,
    /// Complete JPEG image, SOI through EOI
    pub data: Bytes,
}

impl RelayFrame {
    pub fn new(index: u64, data: Bytes) -> Self {
        Self { index, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
