// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::varint::VarInt;
use core::convert::TryFrom;
use quill_codec::{Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.6
//# A CRYPTO frame (type=0x06) is used to transmit cryptographic
//# handshake messages.

pub(crate) const TAG: u8 = 0x06;

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.6
//# CRYPTO Frame {
//#   Type (i) = 0x06,
//#   Offset (i),
//#   Length (i),
//#   Crypto Data (..),
//# }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Crypto<Data> {
    /// The byte offset in the stream for the data in this frame
    pub offset: VarInt,

    /// The cryptographic message data
    pub data: Data,
}

pub type CryptoRef<'a> = Crypto<&'a [u8]>;

impl<Data> Crypto<Data> {
    #[inline]
    pub const fn tag(&self) -> u8 {
        TAG
    }
}

impl<'a> CryptoRef<'a> {
    /// Returns the number of data bytes that fit into `capacity`, or `None`
    /// if not even one byte fits after the frame overhead
    #[inline]
    pub fn max_data_len(offset: VarInt, data_len: usize, capacity: usize) -> Option<usize> {
        let mut fixed_len = 1;
        fixed_len += offset.encoding_size();

        let remaining_capacity = capacity.checked_sub(fixed_len)?;
        let max_data_len = remaining_capacity.min(data_len);

        let len_prefix_size = VarInt::try_from(max_data_len).ok()?.encoding_size();
        let prefixed_data_len = remaining_capacity.checked_sub(len_prefix_size)?;
        let data_len = prefixed_data_len.min(data_len);

        if data_len == 0 {
            None
        } else {
            Some(data_len)
        }
    }
}

quill_codec::decoder_parameterized_value!(
    impl<'a> CryptoRef<'a> {
        fn decode(_tag: crate::frame::Tag, buffer: Buffer) -> Result<Self> {
            let (offset, buffer) = buffer.decode()?;
            let (data, buffer) = buffer.decode_slice_with_len_prefix::<VarInt>()?;

            let frame = Crypto {
                offset,
                data: &*data.into_less_safe_slice(),
            };

            Ok((frame, buffer))
        }
    }
);

impl EncoderValue for CryptoRef<'_> {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.tag());
        buffer.encode(&self.offset);
        buffer.encode_with_len_prefix::<VarInt, _>(&self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_codec::{DecoderBuffer, EncoderBuffer};

    #[test]
    fn round_trip_test() {
        let frame = Crypto {
            offset: VarInt::from_u16(300),
            data: &b"hello"[..],
        };

        let mut bytes = [0u8; 16];
        let len = {
            let mut encoder = EncoderBuffer::new(&mut bytes);
            encoder.encode(&frame);
            encoder.len()
        };

        let buffer = DecoderBuffer::new(&bytes[..len]);
        let (tag, buffer) = buffer.decode::<u8>().unwrap();
        assert_eq!(tag, TAG);
        let (decoded, buffer): (CryptoRef, _) = buffer.decode_parameterized(tag).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(decoded, frame);
    }

    #[test]
    fn max_data_len_test() {
        // 1 tag byte + 1 offset byte + 1 length byte leaves 5 for data
        assert_eq!(CryptoRef::max_data_len(VarInt::ZERO, 100, 8), Some(5));
        // all data fits
        assert_eq!(CryptoRef::max_data_len(VarInt::ZERO, 3, 8), Some(3));
        // no room for any data
        assert_eq!(CryptoRef::max_data_len(VarInt::ZERO, 100, 2), None);
    }
}
