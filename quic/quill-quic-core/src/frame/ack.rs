// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::varint::VarInt;
use quill_codec::{DecoderBuffer, DecoderError, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.3
//# Receivers send ACK frames (types 0x02 and 0x03) to inform senders of
//# packets they have received and processed.

pub(crate) const TAG: u8 = 0x02;
pub(crate) const TAG_ECN: u8 = 0x03;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.3
//# ACK Frame {
//#   Type (i) = 0x02..0x03,
//#   Largest Acknowledged (i),
//#   ACK Delay (i),
//#   ACK Range Count (i),
//#   First ACK Range (i),
//#   ACK Range (..) ...,
//#   [ECN Counts (..)],
//# }

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.3.2
//# ECN Counts {
//#   ECT0 Count (i),
//#   ECT1 Count (i),
//#   ECN-CE Count (i),
//# }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EcnCounts {
    pub ect_0_count: VarInt,
    pub ect_1_count: VarInt,
    pub ce_count: VarInt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ack<'a> {
    pub largest_acknowledged: VarInt,

    /// Time delta (scaled by the peer's ack_delay_exponent) between the
    /// receipt of the largest acknowledged packet and this frame
    pub ack_delay: VarInt,

    pub ack_ranges: AckRanges<'a>,

    pub ecn_counts: Option<EcnCounts>,
}

impl Ack<'_> {
    #[inline]
    pub fn tag(&self) -> u8 {
        if self.ecn_counts.is_some() {
            TAG_ECN
        } else {
            TAG
        }
    }
}

// ACK frames borrow their still-encoded ranges, so they only decode from an
// immutable buffer
impl<'a> quill_codec::DecoderParameterizedValue<'a> for Ack<'a> {
    type Parameter = crate::frame::Tag;

    #[inline]
    fn decode_parameterized(
        tag: crate::frame::Tag,
        buffer: DecoderBuffer<'a>,
    ) -> quill_codec::DecoderBufferResult<'a, Self> {
        let (largest_acknowledged, buffer) = buffer.decode::<VarInt>()?;
        let (ack_delay, buffer) = buffer.decode::<VarInt>()?;
        let (ack_ranges, buffer) = AckRanges::decode(largest_acknowledged, buffer)?;

        let (ecn_counts, buffer) = if tag == TAG_ECN {
            let (ect_0_count, buffer) = buffer.decode()?;
            let (ect_1_count, buffer) = buffer.decode()?;
            let (ce_count, buffer) = buffer.decode()?;
            (
                Some(EcnCounts {
                    ect_0_count,
                    ect_1_count,
                    ce_count,
                }),
                buffer,
            )
        } else {
            (None, buffer)
        };

        let frame = Ack {
            largest_acknowledged,
            ack_delay,
            ack_ranges,
            ecn_counts,
        };

        Ok((frame, buffer))
    }
}

/// The validated, still-encoded ACK ranges of a decoded ACK frame
///
/// The ranges are walked once with checked arithmetic at decode time; the
/// iterator afterwards cannot fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AckRanges<'a> {
    largest_acknowledged: VarInt,
    range_count: usize,
    first_ack_range: VarInt,
    ranges: DecoderBuffer<'a>,
}

impl<'a> AckRanges<'a> {
    fn decode(
        largest_acknowledged: VarInt,
        buffer: DecoderBuffer<'a>,
    ) -> Result<(Self, DecoderBuffer<'a>), DecoderError> {
        let (range_count, buffer) = buffer.decode::<VarInt>()?;
        let range_count: usize = range_count
            .try_into()
            .map_err(|_| DecoderError::InvariantViolation("invalid ack range count"))?;

        let (first_ack_range, buffer) = buffer.decode::<VarInt>()?;

        //= https://www.rfc-editor.org/rfc/rfc9000#section-19.3.1
        //# If any computed packet number is negative, an endpoint MUST
        //# generate a connection error of type FRAME_ENCODING_ERROR.
        let mut smallest = largest_acknowledged
            .checked_sub(first_ack_range)
            .ok_or(DecoderError::InvariantViolation("invalid ack range"))?;

        let ranges_start = buffer;
        let mut cursor = buffer;
        for _ in 0..range_count {
            let (gap, rest) = cursor.decode::<VarInt>()?;
            let (ack_range, rest) = rest.decode::<VarInt>()?;

            //= https://www.rfc-editor.org/rfc/rfc9000#section-19.3.1
            //# The value of the Gap field establishes the largest packet
            //# number value for the subsequent ACK Range using the following
            //# formula:
            //#
            //# largest = previous_smallest - gap - 2
            let largest = smallest
                .checked_sub(gap)
                .and_then(|value| value.checked_sub(VarInt::from_u8(2)))
                .ok_or(DecoderError::InvariantViolation("invalid ack range"))?;
            smallest = largest
                .checked_sub(ack_range)
                .ok_or(DecoderError::InvariantViolation("invalid ack range"))?;

            cursor = rest;
        }

        let ranges_len = ranges_start.len() - cursor.len();
        let (ranges, buffer) = ranges_start.decode_slice(ranges_len)?;

        Ok((
            Self {
                largest_acknowledged,
                range_count,
                first_ack_range,
                ranges,
            },
            buffer,
        ))
    }

    /// Iterates the acknowledged ranges in descending packet number order
    #[inline]
    pub fn iter(&self) -> AckRangesIter<'a> {
        AckRangesIter {
            next_largest: Some(self.largest_acknowledged),
            first_ack_range: self.first_ack_range,
            remaining: self.range_count,
            ranges: self.ranges,
        }
    }

    /// The number of ACK Range entries after the first range
    #[inline]
    pub fn range_count(&self) -> usize {
        self.range_count
    }
}

pub struct AckRangesIter<'a> {
    next_largest: Option<VarInt>,
    first_ack_range: VarInt,
    remaining: usize,
    ranges: DecoderBuffer<'a>,
}

impl Iterator for AckRangesIter<'_> {
    type Item = core::ops::RangeInclusive<u64>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let largest = self.next_largest.take()?;
        let smallest = largest.checked_sub(self.first_ack_range)?;

        if self.remaining > 0 {
            self.remaining -= 1;
            // validated at decode time; a failure here terminates iteration
            let (gap, rest) = self.ranges.decode::<VarInt>().ok()?;
            let (ack_range, rest) = rest.decode::<VarInt>().ok()?;
            self.ranges = rest;

            self.next_largest = smallest
                .checked_sub(gap)
                .and_then(|value| value.checked_sub(VarInt::from_u8(2)));
            self.first_ack_range = ack_range;
        }

        Some(smallest.as_u64()..=largest.as_u64())
    }
}

impl EncoderValue for Ack<'_> {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.encode(&self.tag());
        encoder.encode(&self.largest_acknowledged);
        encoder.encode(&self.ack_delay);
        encoder.encode(&VarInt::try_from(self.ack_ranges.range_count).unwrap_or(VarInt::MAX));
        encoder.encode(&self.ack_ranges.first_ack_range);
        encoder.write_slice(self.ack_ranges.ranges.as_less_safe_slice());

        if let Some(ecn_counts) = &self.ecn_counts {
            encoder.encode(&ecn_counts.ect_0_count);
            encoder.encode(&ecn_counts.ect_1_count);
            encoder.encode(&ecn_counts.ce_count);
        }
    }
}

/// Builds an ACK frame from descending `(smallest, largest)` range pairs
///
/// The first pair contains the largest acknowledged packet number.
#[derive(Clone, Copy, Debug)]
pub struct AckBuilder<'a> {
    pub ack_delay: VarInt,
    pub ranges: &'a [(VarInt, VarInt)],
}

impl EncoderValue for AckBuilder<'_> {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        debug_assert!(!self.ranges.is_empty(), "an ack frame needs a range");
        let Some(((smallest, largest), rest)) = self.ranges.split_first() else {
            return;
        };

        encoder.encode(&TAG);
        encoder.encode(largest);
        encoder.encode(&self.ack_delay);
        encoder.encode(&VarInt::try_from(rest.len()).unwrap_or(VarInt::MAX));
        encoder.encode(&(*largest - *smallest));

        let mut previous_smallest = *smallest;
        for (smallest, largest) in rest {
            let gap = previous_smallest - *largest - VarInt::from_u8(2);
            encoder.encode(&gap);
            encoder.encode(&(*largest - *smallest));
            previous_smallest = *smallest;
        }
    }
}
