// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use quill_quic_core::varint::VarInt;
use smallvec::SmallVec;

/// The most ranges retained for ACK generation; when exceeded, the oldest
/// (smallest) ranges are forgotten
const MAX_RANGES: usize = 64;

/// The set of packet numbers received in one packet number space
///
/// Stored as sorted, disjoint, inclusive ranges. Used both for duplicate
/// detection and for synthesizing ACK frames.
#[derive(Clone, Debug, Default)]
pub struct Received {
    /// ascending by start, non-adjacent, non-overlapping
    ranges: SmallVec<[(u64, u64); 8]>,
}

impl Received {
    /// Records a packet number, returning `false` if it was already present
    pub fn insert(&mut self, packet_number: u64) -> bool {
        let index = self.ranges.partition_point(|range| range.1 < packet_number);

        if let Some(range) = self.ranges.get_mut(index) {
            if range.0 <= packet_number {
                // already inside this range
                return false;
            }

            if range.0 == packet_number + 1 {
                // extends this range downward
                range.0 = packet_number;
                self.merge_down(index);
                self.enforce_limit();
                return true;
            }
        }

        if index > 0 && self.ranges[index - 1].1 + 1 == packet_number {
            // extends the previous range upward
            self.ranges[index - 1].1 = packet_number;
            self.merge_down(index);
            self.enforce_limit();
            return true;
        }

        self.ranges.insert(index, (packet_number, packet_number));
        self.enforce_limit();
        true
    }

    /// Joins `ranges[index - 1]` and `ranges[index]` if they became adjacent
    fn merge_down(&mut self, index: usize) {
        if index == 0 || index >= self.ranges.len() {
            return;
        }

        if self.ranges[index - 1].1 + 1 >= self.ranges[index].0 {
            self.ranges[index - 1].1 = self.ranges[index].1;
            self.ranges.remove(index);
        }
    }

    fn enforce_limit(&mut self) {
        while self.ranges.len() > MAX_RANGES {
            self.ranges.remove(0);
        }
    }

    #[inline]
    pub fn contains(&self, packet_number: u64) -> bool {
        self.ranges
            .iter()
            .any(|range| range.0 <= packet_number && packet_number <= range.1)
    }

    /// The largest packet number seen so far
    #[inline]
    pub fn largest(&self) -> Option<u64> {
        self.ranges.last().map(|range| range.1)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns `(smallest, largest)` pairs in descending order, ready for an
    /// ACK frame
    pub fn ack_ranges(&self) -> SmallVec<[(VarInt, VarInt); 8]> {
        self.ranges
            .iter()
            .rev()
            .map(|range| {
                (
                    VarInt::new(range.0).unwrap_or(VarInt::MAX),
                    VarInt::new(range.1).unwrap_or(VarInt::MAX),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_merge_test() {
        let mut received = Received::default();

        assert!(received.insert(3));
        assert!(received.insert(1));
        assert!(received.insert(5));
        assert_eq!(received.ranges.as_slice(), &[(1, 1), (3, 3), (5, 5)]);

        // fills the gap, merging all three
        assert!(received.insert(2));
        assert!(received.insert(4));
        assert_eq!(received.ranges.as_slice(), &[(1, 5)]);
        assert_eq!(received.largest(), Some(5));
    }

    #[test]
    fn duplicate_test() {
        let mut received = Received::default();
        assert!(received.insert(7));
        assert!(!received.insert(7));
        assert!(received.contains(7));
        assert!(!received.contains(6));
    }

    #[test]
    fn ack_ranges_test() {
        let mut received = Received::default();
        for pn in [0u64, 1, 4, 5, 6, 9] {
            received.insert(pn);
        }

        let ranges = received.ack_ranges();
        let ranges: Vec<(u64, u64)> = ranges
            .iter()
            .map(|(smallest, largest)| (smallest.as_u64(), largest.as_u64()))
            .collect();
        assert_eq!(ranges, vec![(9, 9), (4, 6), (0, 1)]);
    }

    #[test]
    fn random_insert_test() {
        use bolero::check;

        check!().with_type::<Vec<u8>>().for_each(|values| {
            let mut received = Received::default();
            let mut reference = std::collections::BTreeSet::new();

            for value in values {
                let value = *value as u64;
                assert_eq!(received.insert(value), reference.insert(value));
            }

            for value in 0..=255u64 {
                assert_eq!(received.contains(value), reference.contains(&value));
            }

            assert_eq!(received.largest(), reference.iter().next_back().copied());
        });
    }
}
