use std::sync::Arc;

/// A shared window into an immutable byte buffer.
///
/// Fragments of one datagram point into the same buffer, so the simulated
/// internet can copy a datagram to many interfaces without duplicating its
/// bytes.
#[derive(Debug, Clone)]
pub struct Chunk {
    start: usize,
    end: usize,
    bytes: Arc<[u8]>,
}

impl Chunk {
    /// Returns a new chunk containing the given bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            start: 0,
            end: bytes.len(),
            bytes: bytes.into(),
        }
    }

    /// The visible bytes of the chunk.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[self.start..self.end]
    }

    /// The number of visible bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits after the first `at` visible bytes. Both halves share the
    /// buffer.
    pub(super) fn split_at(&self, at: usize) -> (Self, Self) {
        let middle = self.start + at;
        (
            Self {
                start: self.start,
                end: middle,
                bytes: self.bytes.clone(),
            },
            Self {
                start: middle,
                end: self.end,
                bytes: self.bytes.clone(),
            },
        )
    }
}

impl PartialEq for Chunk {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice().eq(other.as_slice())
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(vector: Vec<u8>) -> Self {
        Self::new(vector)
    }
}

impl From<&[u8]> for Chunk {
    fn from(slice: &[u8]) -> Self {
        slice.to_vec().into()
    }
}

impl<const N: usize> From<&[u8; N]> for Chunk {
    fn from(array: &[u8; N]) -> Self {
        array.as_slice().into()
    }
}

impl<const N: usize> From<[u8; N]> for Chunk {
    fn from(array: [u8; N]) -> Self {
        array.as_slice().into()
    }
}

impl From<&str> for Chunk {
    fn from(string: &str) -> Self {
        string.as_bytes().into()
    }
}
