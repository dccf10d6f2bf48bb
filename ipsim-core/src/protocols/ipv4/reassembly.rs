//! Collects fragments until their datagram is complete, adapting the
//! reassembly procedure from RFC 791, section 3.2, page 27: An Example
//! Reassembly Procedure <https://www.rfc-editor.org/rfc/rfc791>
//!
//! The buffer keeps no timers. Whoever owns it calls
//! [`Reassembly::purge_stale_fragments`] periodically with a threshold
//! derived from the current simulation time.

use super::{
    datagram::Datagram,
    icmp::{IcmpError, TimeExceededCode},
    ErrorSignal,
};
use crate::SimTime;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

mod buf_id;
pub use buf_id::BufId;

mod piece;

mod ranges;
pub use ranges::ReceivedRanges;

mod segment;
use segment::{Segment, SegmentStatus};

/// Pending reassemblies, keyed by source, destination and identification.
#[derive(Debug, Default, Clone)]
pub struct Reassembly {
    pending: FxHashMap<BufId, Segment>,
}

impl Reassembly {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a received datagram to the buffer. Returns the complete datagram
    /// once every fragment has arrived. Unfragmented datagrams are returned
    /// immediately and never stored.
    pub fn add_fragment(&mut self, datagram: Datagram, now: SimTime) -> Option<Datagram> {
        if !datagram.is_fragment() {
            return Some(datagram);
        }

        let buf_id = BufId::from_header(&datagram.header);
        let header = datagram.header;
        let status = self
            .pending
            .entry(buf_id)
            .or_insert_with(|| Segment::new(header, now))
            .add_fragment(datagram, now);

        match status {
            SegmentStatus::Incomplete => None,
            SegmentStatus::Complete(complete) => {
                self.pending.remove(&buf_id);
                debug!(?buf_id, length = complete.total_length(), "Reassembled datagram");
                Some(complete)
            }
            SegmentStatus::Invalid => {
                self.pending.remove(&buf_id);
                warn!(?buf_id, "Discarding invalid reassembly");
                None
            }
        }
    }

    /// Discards every reassembly that has not seen a fragment since
    /// `threshold`, reporting each to `errors` as a reassembly timeout.
    /// Returns how many were discarded.
    pub fn purge_stale_fragments(
        &mut self,
        threshold: SimTime,
        errors: &mut impl ErrorSignal,
    ) -> usize {
        let mut stale: Vec<BufId> = self
            .pending
            .iter()
            .filter(|(_, segment)| segment.last_update() < threshold)
            .map(|(buf_id, _)| *buf_id)
            .collect();
        // Report in a stable order regardless of hashing
        stale.sort_unstable();

        for buf_id in stale.iter() {
            if let Some(segment) = self.pending.remove(buf_id) {
                debug!(?buf_id, "Reassembly timed out");
                errors.signal_error(
                    segment.into_timeout_report(),
                    IcmpError::TimeExceeded(TimeExceededCode::ReassemblyTimeout),
                );
            }
        }
        stale.len()
    }

    /// The number of datagrams waiting on more fragments.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        payload::Payload,
        protocols::ipv4::{
            datagram::{ControlFlags, Ipv4HeaderBuilder},
            fragmentation::{fragment, Fragments},
            interfaces::Mtu,
            Ipv4Address,
        },
    };
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct RecordErrors(Vec<(Datagram, IcmpError)>);

    impl ErrorSignal for RecordErrors {
        fn signal_error(&mut self, datagram: Datagram, error: IcmpError) {
            self.0.push((datagram, error));
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn original(payload_length: usize, identification: u16) -> Datagram {
        let header = Ipv4HeaderBuilder::new(
            Ipv4Address::new([10, 0, 0, 1]),
            Ipv4Address::new([10, 0, 1, 1]),
            17,
            payload_length,
        )
        .identification(identification)
        .build()
        .unwrap();
        let bytes: Vec<u8> = (0..payload_length).map(|i| (i * 7) as u8).collect();
        Datagram::new(header, Payload::new(bytes))
    }

    fn fragments(datagram: Datagram, mtu: Mtu) -> Vec<Datagram> {
        match fragment(datagram, mtu).unwrap() {
            Fragments::Fragmented(fragments) => fragments,
            other => panic!("Expected fragments, got {other:?}"),
        }
    }

    fn feed(
        reassembly: &mut Reassembly,
        fragments: &[Datagram],
        order: &[usize],
    ) -> Vec<Option<Datagram>> {
        order
            .iter()
            .map(|i| reassembly.add_fragment(fragments[*i].clone(), Duration::ZERO))
            .collect()
    }

    #[test]
    fn completes_on_last_arrival_out_of_order() {
        let expected = original(3000, 1);
        let pieces = fragments(expected.clone(), 1000);
        assert_eq!(pieces.len(), 4);

        let mut reassembly = Reassembly::new();
        let results = feed(&mut reassembly, &pieces, &[2, 0, 3, 1]);
        assert!(results[..3].iter().all(Option::is_none));
        let complete = results[3].clone().expect("Reassembly should be complete");
        assert_eq!(complete.total_length(), 3020);
        assert_eq!(complete, expected);
        assert!(reassembly.is_empty());
    }

    #[test]
    fn any_order_reassembles() {
        let expected = original(2500, 2);
        let pieces = fragments(expected.clone(), 576);
        let n = pieces.len();
        let orders: Vec<Vec<usize>> = vec![
            (0..n).collect(),
            (0..n).rev().collect(),
            (0..n).map(|i| (i * 3) % n).collect(),
        ];
        for order in orders {
            let mut reassembly = Reassembly::new();
            let results = feed(&mut reassembly, &pieces, &order);
            assert_eq!(results.last().cloned().flatten(), Some(expected.clone()));
            assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
        }
    }

    #[test]
    fn duplicates_do_not_complete_early() {
        let expected = original(3000, 3);
        let pieces = fragments(expected.clone(), 1000);
        let mut reassembly = Reassembly::new();
        let results = feed(&mut reassembly, &pieces, &[0, 0, 3, 3, 1, 1, 2]);
        assert!(results[..6].iter().all(Option::is_none));
        assert_eq!(results[6], Some(expected));
        assert!(reassembly.is_empty());
    }

    #[test]
    fn overlapping_fragments_are_trimmed() {
        let expected = original(2000, 4);
        let large = fragments(expected.clone(), 1020);
        let small = fragments(expected.clone(), 520);
        let mut reassembly = Reassembly::new();
        // 0..1000 then 500..1000, 1000..1500 and 1500..2000
        assert!(reassembly.add_fragment(large[0].clone(), Duration::ZERO).is_none());
        assert!(reassembly.add_fragment(small[1].clone(), Duration::ZERO).is_none());
        assert!(reassembly.add_fragment(small[2].clone(), Duration::ZERO).is_none());
        let complete = reassembly.add_fragment(small[3].clone(), Duration::ZERO);
        assert_eq!(complete, Some(expected));
    }

    #[test]
    fn length_only_fragments_reassemble_without_payload() {
        let header = original(3000, 5).header;
        let pieces = fragments(Datagram::length_only(header), 1000);
        let mut reassembly = Reassembly::new();
        let results = feed(&mut reassembly, &pieces, &[3, 2, 1, 0]);
        let complete = results[3].clone().unwrap();
        assert_eq!(complete.header, header);
        assert_eq!(complete.payload, None);
    }

    #[test]
    #[tracing_test::traced_test]
    fn conflicting_last_fragments_discard_the_reassembly() {
        let pieces = fragments(original(3000, 12), 1000);
        let mut reassembly = Reassembly::new();
        assert!(feed(&mut reassembly, &pieces, &[0, 3]).iter().all(Option::is_none));

        // Claims the datagram ends at 2940 although 3000 is already known
        let mut early_end = pieces[2].clone();
        early_end.header.flags.set_more_fragments(false);
        assert!(reassembly.add_fragment(early_end, Duration::ZERO).is_none());
        assert!(reassembly.is_empty());
        assert!(logs_contain("Discarding invalid reassembly"));

        // The rest no longer completes anything
        assert!(feed(&mut reassembly, &pieces, &[1, 2]).iter().all(Option::is_none));
        assert_eq!(reassembly.len(), 1);
    }

    #[test]
    fn data_past_the_known_end_discards_the_reassembly() {
        let short = fragments(original(3000, 13), 1000);
        let long = fragments(original(4000, 13), 1000);
        let mut reassembly = Reassembly::new();
        assert!(reassembly.add_fragment(short[3].clone(), Duration::ZERO).is_none());
        // 2940..3920, beyond the 3000 bytes the last fragment announced
        assert!(reassembly.add_fragment(long[3].clone(), Duration::ZERO).is_none());
        assert!(reassembly.is_empty());
    }

    #[test]
    fn last_fragment_before_received_data_discards_the_reassembly() {
        let pieces = fragments(original(3000, 14), 1000);
        let mut reassembly = Reassembly::new();
        assert!(reassembly.add_fragment(pieces[2].clone(), Duration::ZERO).is_none());
        let mut early_end = pieces[1].clone();
        early_end.header.flags.set_more_fragments(false);
        assert!(reassembly.add_fragment(early_end, Duration::ZERO).is_none());
        assert!(reassembly.is_empty());
    }

    #[test]
    fn unfragmented_passes_through() {
        let whole = original(100, 6);
        let mut reassembly = Reassembly::new();
        assert_eq!(
            reassembly.add_fragment(whole.clone(), Duration::ZERO),
            Some(whole)
        );
        assert_eq!(reassembly.len(), 0);
    }

    #[test]
    fn separate_identifications_do_not_mix() {
        let a = fragments(original(1500, 7), 1000);
        let b = fragments(original(1500, 8), 1000);
        let mut reassembly = Reassembly::new();
        assert!(reassembly.add_fragment(a[0].clone(), Duration::ZERO).is_none());
        assert!(reassembly.add_fragment(b[1].clone(), Duration::ZERO).is_none());
        assert_eq!(reassembly.len(), 2);
        assert!(reassembly.add_fragment(a[1].clone(), Duration::ZERO).is_some());
        assert_eq!(reassembly.len(), 1);
    }

    #[test]
    fn purge_respects_threshold() {
        let created = Duration::from_secs(100);
        let epsilon = Duration::from_millis(1);
        let pieces = fragments(original(3000, 9), 1000);

        let mut reassembly = Reassembly::new();
        assert!(reassembly.add_fragment(pieces[1].clone(), created).is_none());
        let mut errors = RecordErrors::default();

        let early = created + TIMEOUT - epsilon;
        assert_eq!(reassembly.purge_stale_fragments(early - TIMEOUT, &mut errors), 0);
        assert_eq!(reassembly.len(), 1);
        assert!(errors.0.is_empty());

        let late = created + TIMEOUT + epsilon;
        assert_eq!(reassembly.purge_stale_fragments(late - TIMEOUT, &mut errors), 1);
        assert!(reassembly.is_empty());
        assert_eq!(
            errors.0,
            vec![(
                pieces[1].clone(),
                IcmpError::TimeExceeded(TimeExceededCode::ReassemblyTimeout)
            )]
        );
    }

    #[test]
    fn new_fragments_refresh_the_entry() {
        let pieces = fragments(original(3000, 10), 1000);
        let mut reassembly = Reassembly::new();
        let mut errors = RecordErrors::default();
        reassembly.add_fragment(pieces[0].clone(), Duration::from_secs(0));
        reassembly.add_fragment(pieces[1].clone(), Duration::from_secs(50));
        assert_eq!(
            reassembly.purge_stale_fragments(Duration::from_secs(30), &mut errors),
            0
        );
        assert_eq!(reassembly.len(), 1);
    }

    #[test]
    fn purge_without_payload_reports_placeholder() {
        let header = Ipv4HeaderBuilder::new(
            Ipv4Address::new([10, 0, 0, 1]),
            Ipv4Address::new([10, 0, 1, 1]),
            17,
            500,
        )
        .identification(11)
        .fragment_offset(1000)
        .flags(ControlFlags::new(false, false))
        .build()
        .unwrap();
        let mut reassembly = Reassembly::new();
        let mut errors = RecordErrors::default();
        assert!(reassembly
            .add_fragment(Datagram::length_only(header), Duration::ZERO)
            .is_none());
        assert_eq!(
            reassembly.purge_stale_fragments(Duration::from_secs(1), &mut errors),
            1
        );
        let (report, error) = &errors.0[0];
        assert_eq!(report.header, header);
        assert!(report.payload.is_none());
        assert_eq!(
            *error,
            IcmpError::TimeExceeded(TimeExceededCode::ReassemblyTimeout)
        );
    }
}
