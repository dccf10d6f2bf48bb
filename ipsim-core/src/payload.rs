//! Byte containers for datagram payloads.
//!
//! Fragmentation splits a payload into byte ranges and reassembly stitches
//! those ranges back together. Both operations happen on every hop of a
//! simulated internet, so a [`Payload`] shares its underlying buffers and
//! only tracks which window of them it covers. Cutting a payload into
//! fragments never copies bytes.

use std::{
    collections::VecDeque,
    fmt::{self, Display},
};

mod chunk;
pub use chunk::Chunk;

mod payload_bytes;
pub use payload_bytes::PayloadBytes;

/// The data carried by a datagram or by one fragment of a datagram.
#[derive(Debug, Clone, Default)]
pub struct Payload {
    chunks: VecDeque<Chunk>,
    len: usize,
}

impl Payload {
    /// Creates a payload holding the given bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// # use ipsim_core::payload::Payload;
    /// let payload = Payload::new(b"transport segment");
    /// assert_eq!(payload.len(), 17);
    /// ```
    pub fn new(body: impl Into<Chunk>) -> Self {
        let body = body.into();
        let len = body.len();
        let mut chunks = VecDeque::new();
        if len > 0 {
            chunks.push_back(body);
        }
        Self { chunks, len }
    }

    /// Appends `other` to the end of this payload.
    pub fn concatenate(&mut self, other: Payload) {
        self.len += other.len;
        self.chunks.extend(other.chunks);
    }

    /// Discards the first `len` bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// # use ipsim_core::payload::Payload;
    /// let mut payload = Payload::new(b"fragment");
    /// payload.advance(4);
    /// assert_eq!(payload.to_vec(), b"ment");
    /// ```
    pub fn advance(&mut self, len: usize) {
        self.cut(len);
    }

    /// Removes the first `len` bytes and returns them as a new payload.
    ///
    /// # Examples
    ///
    /// ```
    /// # use ipsim_core::payload::Payload;
    /// let mut rest = Payload::new(b"headtail");
    /// let head = rest.cut(4);
    /// assert_eq!(head.to_vec(), b"head");
    /// assert_eq!(rest.to_vec(), b"tail");
    /// ```
    pub fn cut(&mut self, len: usize) -> Self {
        assert!(len <= self.len, "Cut extends past the payload");
        let mut front = Self::default();
        while front.len < len {
            let Some(chunk) = self.chunks.pop_front() else {
                break;
            };
            let wanted = len - front.len;
            let chunk = if chunk.len() > wanted {
                let (head, tail) = chunk.split_at(wanted);
                self.chunks.push_front(tail);
                head
            } else {
                chunk
            };
            front.len += chunk.len();
            front.chunks.push_back(chunk);
        }
        self.len -= len;
        front
    }

    /// The number of bytes in the payload.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the payload holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over the bytes of the payload.
    pub fn iter(&self) -> PayloadBytes {
        PayloadBytes::new(&self.chunks)
    }

    /// Copies the payload into a contiguous vector.
    pub fn to_vec(&self) -> Vec<u8> {
        self.iter().collect()
    }
}

impl Display for Payload {
    /// Hex bytes, separated by spaces
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = self.iter();
        if let Some(first) = bytes.next() {
            write!(f, "{first:02x}")?;
        }
        bytes.try_for_each(|byte| write!(f, " {byte:02x}"))
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl Eq for Payload {}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl From<Chunk> for Payload {
    fn from(chunk: Chunk) -> Self {
        Self::new(chunk)
    }
}
