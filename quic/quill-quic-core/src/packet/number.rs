// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Packet numbers, their spaces, and the truncated wire encoding

use crate::varint::VarInt;
use quill_codec::{DecoderBuffer, DecoderBufferResult, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-12.3
//# The packet number is an integer in the range 0 to 2^62-1.  This
//# number is used in determining the cryptographic nonce for packet
//# protection.  Each endpoint maintains a separate packet number for
//# sending and receiving.

/// The packet number len is the two least significant bits of the packet tag
pub(crate) const PACKET_NUMBER_LEN_MASK: u8 = 0b11;

//= https://www.rfc-editor.org/rfc/rfc9000#section-12.3
//# *  Initial space: All Initial packets (Section 17.2.2) are in this
//#    space.
//#
//# *  Handshake space: All Handshake packets (Section 17.2.4) are in
//#    this space.
//#
//# *  Application data space: All 0-RTT (Section 17.2.3) and 1-RTT
//#    (Section 17.3) encrypted packets are in this space.

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PacketNumberSpace {
    Initial,
    Handshake,
    ApplicationData,
}

impl PacketNumberSpace {
    /// Returns a `PacketNumber` for the given space
    #[inline]
    pub const fn new_packet_number(self, value: VarInt) -> PacketNumber {
        PacketNumber { space: self, value }
    }

    /// Returns the `PacketNumberLen` encoded in the low bits of an
    /// unprotected packet tag
    #[inline]
    pub const fn new_packet_number_len(self, packet_tag: u8) -> PacketNumberLen {
        PacketNumberLen {
            space: self,
            bytesize: (packet_tag & PACKET_NUMBER_LEN_MASK) + 1,
        }
    }

    #[inline]
    pub const fn is_initial(self) -> bool {
        matches!(self, Self::Initial)
    }

    #[inline]
    pub const fn is_handshake(self) -> bool {
        matches!(self, Self::Handshake)
    }

    #[inline]
    pub const fn is_application_data(self) -> bool {
        matches!(self, Self::ApplicationData)
    }
}

/// A full 62-bit packet number within a packet number space
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PacketNumber {
    space: PacketNumberSpace,
    value: VarInt,
}

impl PacketNumber {
    #[inline]
    pub const fn space(self) -> PacketNumberSpace {
        self.space
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.value.as_u64()
    }

    /// Returns the packet number as the 64-bit value XORed into the AEAD IV
    #[inline]
    pub const fn as_crypto_nonce(self) -> u64 {
        self.value.as_u64()
    }

    /// Returns the next packet number in the same space
    #[inline]
    pub fn next(self) -> Option<Self> {
        Some(Self {
            space: self.space,
            value: self.value.checked_add(VarInt::from_u8(1))?,
        })
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-17.1
    //# the sender MUST use a packet number size able to
    //# represent more than twice as large a range as the difference between
    //# the largest acknowledged packet number and the packet number being
    //# sent.
    #[inline]
    pub fn truncate(self, largest_acknowledged: PacketNumber) -> Option<TruncatedPacketNumber> {
        debug_assert_eq!(self.space, largest_acknowledged.space);

        let delta = self
            .value
            .checked_sub(largest_acknowledged.value)?
            .as_u64()
            .checked_mul(2)?;

        let bytesize = match delta {
            0..=0xff => 1,
            0x100..=0xffff => 2,
            0x1_0000..=0xff_ffff => 3,
            0x100_0000..=0xffff_ffff => 4,
            _ => return None,
        };

        let mask = (1u64 << (bytesize * 8)) - 1;

        Some(TruncatedPacketNumber {
            space: self.space,
            bytesize,
            value: (self.as_u64() & mask) as u32,
        })
    }
}

/// The length in bytes of a truncated packet number
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketNumberLen {
    space: PacketNumberSpace,
    bytesize: u8,
}

impl PacketNumberLen {
    //= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.2
    //# in sampling packet ciphertext for header protection, the Packet Number field is
    //# assumed to be 4 bytes long
    pub const MAX_LEN: usize = 4;

    #[inline]
    pub const fn bytesize(self) -> usize {
        self.bytesize as usize
    }

    #[inline]
    pub const fn space(self) -> PacketNumberSpace {
        self.space
    }

    /// Returns the bits encoded into the low 2 bits of the packet tag
    #[inline]
    pub const fn into_packet_tag_mask(self) -> u8 {
        self.bytesize - 1
    }

    /// Decodes a truncated packet number of this length
    #[inline]
    pub fn decode_truncated_packet_number<'a>(
        self,
        buffer: DecoderBuffer<'a>,
    ) -> DecoderBufferResult<'a, TruncatedPacketNumber> {
        let (bytes, buffer) = buffer.decode_slice(self.bytesize())?;
        let bytes = bytes.into_less_safe_slice();

        let mut value = 0u32;
        for byte in bytes {
            value = value << 8 | *byte as u32;
        }

        Ok((
            TruncatedPacketNumber {
                space: self.space,
                bytesize: self.bytesize,
                value,
            },
            buffer,
        ))
    }
}

/// A packet number truncated to its wire encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TruncatedPacketNumber {
    space: PacketNumberSpace,
    bytesize: u8,
    value: u32,
}

impl TruncatedPacketNumber {
    #[inline]
    pub const fn space(self) -> PacketNumberSpace {
        self.space
    }

    #[inline]
    pub const fn len(self) -> PacketNumberLen {
        PacketNumberLen {
            space: self.space,
            bytesize: self.bytesize,
        }
    }

    #[inline]
    pub const fn bytesize(self) -> usize {
        self.bytesize as usize
    }

    #[inline]
    pub const fn bitsize(self) -> usize {
        self.bytesize() * 8
    }

    #[inline]
    pub const fn into_u64(self) -> u64 {
        self.value as u64
    }

    /// Reconstructs the full packet number from the largest successfully
    /// processed packet number in the same space
    #[inline]
    pub fn expand(self, largest: PacketNumber) -> PacketNumber {
        decode_packet_number(largest, self)
    }

    #[cfg(test)]
    pub(crate) fn new_for_tests(space: PacketNumberSpace, value: u32, bytesize: u8) -> Self {
        Self {
            space,
            bytesize,
            value,
        }
    }
}

impl EncoderValue for TruncatedPacketNumber {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        let bytes = self.value.to_be_bytes();
        encoder.write_slice(&bytes[4 - self.bytesize()..]);
    }

    #[inline]
    fn encoding_size(&self) -> usize {
        self.bytesize()
    }

    #[inline]
    fn encoding_size_for_encoder<E: Encoder>(&self, _encoder: &E) -> usize {
        self.bytesize()
    }
}

//= https://www.rfc-editor.org/rfc/rfc9000#appendix-A.3
//# DecodePacketNumber(largest_pn, truncated_pn, pn_nbits):
//#    expected_pn  = largest_pn + 1
//#    pn_win       = 1 << pn_nbits
//#    pn_hwin      = pn_win / 2
//#    pn_mask      = pn_win - 1
//#    // The incoming packet number should be greater than
//#    // expected_pn - pn_hwin and less than or equal to
//#    // expected_pn + pn_hwin
//#    //
//#    // This means we cannot just strip the trailing bits from
//#    // expected_pn and add the truncated_pn because that might
//#    // yield a value outside the window.
//#    //
//#    // The following code calculates a candidate value and
//#    // makes sure it's within the packet number window.
//#    // Note the extra checks to prevent overflow and underflow.
//#    candidate_pn = (expected_pn & ~pn_mask) | truncated_pn
//#    if candidate_pn <= expected_pn - pn_hwin and
//#       candidate_pn < (1 << 62) - pn_win:
//#       return candidate_pn + pn_win
//#    if candidate_pn > expected_pn + pn_hwin and
//#       candidate_pn >= pn_win:
//#       return candidate_pn - pn_win
//#    return candidate_pn

fn decode_packet_number(largest_pn: PacketNumber, truncated_pn: TruncatedPacketNumber) -> PacketNumber {
    let space = largest_pn.space();
    debug_assert_eq!(space, truncated_pn.space());

    let pn_nbits = truncated_pn.bitsize();
    let expected_pn = largest_pn.as_u64() + 1;
    let pn_win = 1u64 << pn_nbits;
    let pn_hwin = pn_win / 2;
    let pn_mask = pn_win - 1;
    let candidate_pn = (expected_pn & !pn_mask) | truncated_pn.into_u64();

    // the comparisons are rearranged to stay within u64 without underflow
    let value = if candidate_pn + pn_hwin <= expected_pn
        && candidate_pn < (1u64 << 62) - pn_win
    {
        candidate_pn + pn_win
    } else if candidate_pn > expected_pn + pn_hwin && candidate_pn >= pn_win {
        candidate_pn - pn_win
    } else {
        candidate_pn
    };

    let value = VarInt::new(value).unwrap_or(VarInt::MAX);

    PacketNumber { space, value }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pn(value: u64) -> PacketNumber {
        PacketNumberSpace::ApplicationData.new_packet_number(VarInt::new(value).unwrap())
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-17.1
    //= type=test
    //# For example, if the highest successfully
    //# authenticated packet had a packet number of 0xa82f30ea, then a packet
    //# containing a 16-bit value of 0x9b32 will be decoded as 0xa82f9b32.
    #[test]
    fn packet_decoding_example_test() {
        let largest = pn(0xa82f_30ea);
        let truncated =
            TruncatedPacketNumber::new_for_tests(PacketNumberSpace::ApplicationData, 0x9b32, 2);
        assert_eq!(truncated.expand(largest), pn(0xa82f_9b32));
        assert_eq!(pn(0xa82f_9b32).truncate(largest).unwrap(), truncated);
    }

    //= https://www.rfc-editor.org/rfc/rfc9000#section-17.1
    //= type=test
    //# For example, if an endpoint has received an acknowledgment for packet
    //# 0xabe8b3, sending a packet with a number of 0xac5c02 requires a
    //# packet number encoding with 16 bits or more
    #[test]
    fn packet_number_len_example_test() {
        let largest = pn(0x00ab_e8b3);
        assert_eq!(pn(0x00ac_5c02).truncate(largest).unwrap().bitsize(), 16);
        assert_eq!(pn(0x00ac_e8fe).truncate(largest).unwrap().bitsize(), 24);
    }

    #[test]
    fn truncate_round_trip_test() {
        use bolero::check;

        check!()
            .with_type::<(u64, u64)>()
            .cloned()
            .for_each(|(largest, value)| {
                let largest = largest & crate::varint::MAX_VARINT_VALUE;
                let value = value & crate::varint::MAX_VARINT_VALUE;
                let (largest, value) = (largest.min(value), largest.max(value));

                let largest = pn(largest);
                let value = pn(value);

                if let Some(truncated) = value.truncate(largest) {
                    assert_eq!(truncated.expand(largest), value);
                }
            });
    }

    #[test]
    fn wire_round_trip_test() {
        use quill_codec::{DecoderBuffer, EncoderBuffer};

        for (value, bytesize) in [(0x7fu32, 1u8), (0xab12, 2), (0x00ab_12cd, 3), (0xab12_cd34, 4)] {
            let truncated = TruncatedPacketNumber::new_for_tests(
                PacketNumberSpace::Initial,
                value,
                bytesize,
            );

            let mut buffer = [0u8; 4];
            let len = {
                let mut encoder = EncoderBuffer::new(&mut buffer);
                encoder.encode(&truncated);
                encoder.len()
            };
            assert_eq!(len, bytesize as usize);

            let space = PacketNumberSpace::Initial;
            let pn_len = space.new_packet_number_len(bytesize - 1);
            let (decoded, _) = pn_len
                .decode_truncated_packet_number(DecoderBuffer::new(&buffer[..len]))
                .unwrap();
            assert_eq!(decoded, truncated);
        }
    }
}
