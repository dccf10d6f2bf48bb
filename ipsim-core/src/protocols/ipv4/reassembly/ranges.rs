/// The set of byte ranges received so far, kept sorted and coalesced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceivedRanges {
    /// Half-open `[start, end)` intervals, sorted by start, never touching
    ranges: Vec<(u32, u32)>,
}

impl ReceivedRanges {
    pub fn new() -> Self {
        Default::default()
    }

    /// Records `[start, end)`. Overlapping and adjacent ranges are merged, so
    /// adding a range twice changes nothing.
    pub fn insert(&mut self, start: u32, end: u32) {
        if start >= end {
            return;
        }
        let (mut start, mut end) = (start, end);
        // First range that ends at or after `start`; everything before it is
        // strictly to the left and unaffected
        let first = self.ranges.partition_point(|&(_, e)| e < start);
        let mut last = first;
        while let Some(&(s, e)) = self.ranges.get(last) {
            if s > end {
                break;
            }
            start = start.min(s);
            end = end.max(e);
            last += 1;
        }
        self.ranges.splice(first..last, [(start, end)]);
    }

    /// Whether the received bytes are exactly `[0, total)` with no gaps.
    pub fn is_complete(&self, total: u32) -> bool {
        match self.ranges.as_slice() {
            [] => total == 0,
            [(0, end)] => *end == total,
            _ => false,
        }
    }

    pub fn ranges(&self) -> &[(u32, u32)] {
        &self.ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesces_adjacent_and_overlapping() {
        let mut ranges = ReceivedRanges::new();
        ranges.insert(1960, 2940);
        ranges.insert(0, 980);
        assert_eq!(ranges.ranges(), &[(0, 980), (1960, 2940)]);
        ranges.insert(2940, 3000);
        assert_eq!(ranges.ranges(), &[(0, 980), (1960, 3000)]);
        ranges.insert(900, 2000);
        assert_eq!(ranges.ranges(), &[(0, 3000)]);
        assert!(ranges.is_complete(3000));
        assert!(!ranges.is_complete(3020));
    }

    #[test]
    fn duplicates_change_nothing() {
        let mut ranges = ReceivedRanges::new();
        ranges.insert(100, 200);
        let before = ranges.clone();
        ranges.insert(100, 200);
        ranges.insert(120, 180);
        ranges.insert(5, 5);
        assert_eq!(ranges, before);
    }

    #[test]
    fn bridges_several_ranges_at_once() {
        let mut ranges = ReceivedRanges::new();
        ranges.insert(10, 20);
        ranges.insert(30, 40);
        ranges.insert(50, 60);
        ranges.insert(70, 80);
        ranges.insert(15, 55);
        assert_eq!(ranges.ranges(), &[(10, 60), (70, 80)]);
    }

    #[test]
    fn gap_is_incomplete() {
        let mut ranges = ReceivedRanges::new();
        ranges.insert(0, 10);
        ranges.insert(11, 20);
        assert!(!ranges.is_complete(20));
    }
}
