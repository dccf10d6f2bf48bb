//! Splits datagrams that are too large for an interface's MTU, following the
//! fragmentation procedure of RFC 791 section 3.2
//! <https://www.rfc-editor.org/rfc/rfc791>.
//!
//! Offsets are byte counts, so fragment data lengths need not be multiples of
//! eight.

use super::{datagram::Datagram, interfaces::Mtu};
use thiserror::Error as ThisError;

/// The result of fitting a datagram to an MTU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragments {
    /// The datagram fits as it is
    Whole(Datagram),
    /// The datagram is too large but has the don't-fragment flag set
    Discard(Datagram),
    /// The datagram was split, in offset order
    Fragmented(Vec<Datagram>),
}

#[derive(Debug, ThisError, Clone, Copy, PartialEq, Eq)]
pub enum FragmentError {
    #[error("An MTU of {mtu} bytes leaves no room for data behind a {header_length} byte header")]
    MtuTooSmall { mtu: Mtu, header_length: u16 },
    #[error("A fragment would start beyond the largest representable offset")]
    OffsetOverflow,
}

/// Divides the datagram into pieces that fit within `mtu`.
///
/// Every fragment carries a copy of the original header with its length,
/// offset and more-fragments flag corrected. The last fragment keeps the
/// original more-fragments value so that fragments of fragments reassemble
/// correctly.
pub fn fragment(datagram: Datagram, mtu: Mtu) -> Result<Fragments, FragmentError> {
    if datagram.header.total_length <= mtu {
        return Ok(Fragments::Whole(datagram));
    }
    if datagram.header.flags.dont_fragment() {
        return Ok(Fragments::Discard(datagram));
    }
    let header_length = datagram.header.header_length;
    if mtu <= header_length {
        Err(FragmentError::MtuTooSmall { mtu, header_length })?
    }

    let Datagram {
        header: original,
        mut payload,
        bit_error,
    } = datagram;
    let data_per_fragment = mtu - header_length;
    let mut remaining = original.payload_length();
    let mut offset = original.fragment_offset;
    let mut fragments = vec![];

    while remaining > 0 {
        let is_last = remaining <= data_per_fragment;
        let data_length = remaining.min(data_per_fragment);

        let mut header = original;
        header.total_length = header_length + data_length;
        header.fragment_offset = offset;
        header
            .flags
            .set_more_fragments(!is_last || original.flags.more_fragments());

        fragments.push(Datagram {
            header,
            payload: payload
                .as_mut()
                .map(|payload| payload.cut(usize::from(data_length))),
            bit_error,
        });

        remaining -= data_length;
        if !is_last {
            offset = offset
                .checked_add(data_length)
                .ok_or(FragmentError::OffsetOverflow)?;
        }
    }

    Ok(Fragments::Fragmented(fragments))
}
