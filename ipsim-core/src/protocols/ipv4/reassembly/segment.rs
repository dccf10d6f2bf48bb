use super::{piece::Piece, ranges::ReceivedRanges};
use crate::{
    payload::Payload,
    protocols::ipv4::datagram::{Datagram, Ipv4Header},
    SimTime,
};
use std::collections::BinaryHeap;
use tracing::warn;

/// Reassembly resources for a given [`BufId`](super::BufId).
#[derive(Debug, Clone)]
pub struct Segment {
    /// Header of the first fragment to arrive, replaced by the offset zero
    /// fragment's header once that arrives. Supplies the fields of the
    /// reassembled datagram.
    header: Ipv4Header,
    /// The most recent fragment that carried payload bytes
    representative: Option<Datagram>,
    /// Which bytes of the original datagram have been received
    received: ReceivedRanges,
    /// Payload-bearing pieces, popped in offset order on completion
    pieces: BinaryHeap<Piece>,
    /// Data length of the original datagram, known once the last fragment
    /// arrives
    total: Option<u32>,
    bit_error: bool,
    last_update: SimTime,
}

/// What adding a fragment did to a [`Segment`]
#[derive(Debug)]
pub enum SegmentStatus {
    /// More fragments are needed
    Incomplete,
    /// Every byte has arrived
    Complete(Datagram),
    /// The fragments disagree about the datagram's length, or the result
    /// would not fit a datagram
    Invalid,
}

impl Segment {
    pub fn new(header: Ipv4Header, now: SimTime) -> Self {
        Self {
            header,
            representative: None,
            received: ReceivedRanges::new(),
            pieces: BinaryHeap::new(),
            total: None,
            bit_error: false,
            last_update: now,
        }
    }

    pub fn last_update(&self) -> SimTime {
        self.last_update
    }

    pub fn add_fragment(&mut self, fragment: Datagram, now: SimTime) -> SegmentStatus {
        let header = fragment.header;
        let start = header.fragment_offset as u32;
        let end = start + header.payload_length() as u32;
        let is_last = !header.flags.more_fragments();

        // The first fragment without more-fragments fixes the length. Any
        // fragment that disagrees with it spoils the whole datagram.
        match self.total {
            Some(total) if end > total || (is_last && end != total) => {
                warn!(total, end, "Fragment contradicts the known datagram length");
                return SegmentStatus::Invalid;
            }
            None if is_last => {
                if let Some(&(_, received)) = self.received.ranges().last() {
                    if received > end {
                        warn!(end, received, "Last fragment ends before data already received");
                        return SegmentStatus::Invalid;
                    }
                }
                self.total = Some(end);
            }
            _ => {}
        }

        self.received.insert(start, end);
        if header.fragment_offset == 0 {
            self.header = header;
        }
        self.bit_error |= fragment.bit_error;
        if let Some(payload) = &fragment.payload {
            self.pieces.push(Piece::new(payload.clone(), start));
            self.representative = Some(fragment);
        }
        self.last_update = now;

        match self.total {
            Some(total) if self.received.is_complete(total) => self.finish(total),
            _ => SegmentStatus::Incomplete,
        }
    }

    fn finish(&mut self, total: u32) -> SegmentStatus {
        let mut header = self.header;
        let Some(total_length) = u16::try_from(total + header.header_length as u32).ok() else {
            warn!(total, "Reassembled datagram exceeds the maximum datagram size");
            return SegmentStatus::Invalid;
        };
        header.total_length = total_length;
        header.fragment_offset = 0;
        header.flags.set_more_fragments(false);

        let payload = self.assemble_payload(total);
        SegmentStatus::Complete(Datagram {
            header,
            payload,
            bit_error: self.bit_error,
        })
    }

    /// Stitches the received pieces together, trimming the bytes of any
    /// overlap. Returns `None` unless every byte arrived with data.
    fn assemble_payload(&mut self, total: u32) -> Option<Payload> {
        let mut payload = Payload::default();
        let mut next = 0u32;
        while let Some(piece) = self.pieces.pop() {
            if piece.end() <= next {
                continue;
            }
            if piece.offset() > next {
                return None;
            }
            let skip = (next - piece.offset()) as usize;
            next = piece.end();
            let mut bytes = piece.into_payload();
            bytes.advance(skip);
            payload.concatenate(bytes);
        }
        (next == total).then_some(payload)
    }

    /// The datagram to report when this segment times out: the latest
    /// payload-bearing fragment or, when none arrived, a header-only stand-in.
    pub fn into_timeout_report(self) -> Datagram {
        self.representative
            .unwrap_or_else(|| Datagram::length_only(self.header))
    }
}
