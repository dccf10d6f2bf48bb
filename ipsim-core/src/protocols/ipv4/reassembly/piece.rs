use crate::payload::Payload;
use std::cmp::Ordering;

/// The bytes of one received fragment. Ordered so that a max-heap pops the
/// lowest offset first, which lets completed datagrams be assembled by
/// draining the heap.
#[derive(Debug, Clone)]
pub struct Piece {
    payload: Payload,
    /// Byte offset of the first byte of `payload` in the original datagram
    offset: u32,
}

impl Piece {
    pub fn new(payload: Payload, offset: u32) -> Self {
        Self { payload, offset }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn end(&self) -> u32 {
        self.offset + self.payload.len() as u32
    }

    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

impl PartialEq for Piece {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset
    }
}

impl Eq for Piece {}

impl PartialOrd for Piece {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Piece {
    fn cmp(&self, other: &Self) -> Ordering {
        self.offset.cmp(&other.offset).reverse()
    }
}
