// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::varint::VarInt;
use quill_codec::{Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.8
//# STREAM frames implicitly create a stream and carry stream data.  The
//# Type field in the STREAM frame takes the form 0b00001XXX (or the set
//# of values from 0x08 to 0x0f).  The three low-order bits of the frame
//# type determine the fields that are present in the frame:
//#
//# *  The OFF bit (0x04) in the frame type is set to indicate that there
//#    is an Offset field present.
//#
//# *  The LEN bit (0x02) in the frame type is set to indicate that there
//#    is a Length field present.
//#
//# *  The FIN bit (0x01) indicates that the frame marks the end of the
//#    stream.

pub(crate) const TAG: u8 = 0x08;
const OFF_BIT: u8 = 0x04;
const LEN_BIT: u8 = 0x02;
const FIN_BIT: u8 = 0x01;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stream<Data> {
    pub stream_id: VarInt,

    /// The byte offset in the stream for the data in this frame
    pub offset: VarInt,

    pub data: Data,

    /// True if the frame marks the end of the stream
    pub is_fin: bool,
}

pub type StreamRef<'a> = Stream<&'a [u8]>;

impl<Data> Stream<Data> {
    #[inline]
    pub const fn tag(&self) -> u8 {
        // offset and length are always written explicitly
        let mut tag = TAG | OFF_BIT | LEN_BIT;
        if self.is_fin {
            tag |= FIN_BIT;
        }
        tag
    }
}

quill_codec::decoder_parameterized_value!(
    impl<'a> StreamRef<'a> {
        fn decode(tag: crate::frame::Tag, buffer: Buffer) -> Result<Self> {
            let is_fin = tag & FIN_BIT != 0;

            let (stream_id, buffer) = buffer.decode()?;

            let (offset, buffer) = if tag & OFF_BIT != 0 {
                buffer.decode()?
            } else {
                (VarInt::ZERO, buffer)
            };

            let (data, buffer) = if tag & LEN_BIT != 0 {
                buffer.decode_slice_with_len_prefix::<VarInt>()?
            } else {
                // the frame extends to the end of the packet
                let len = buffer.len();
                buffer.decode_slice(len)?
            };

            let frame = Stream {
                stream_id,
                offset,
                data: &*data.into_less_safe_slice(),
                is_fin,
            };

            Ok((frame, buffer))
        }
    }
);

impl EncoderValue for StreamRef<'_> {
    #[inline]
    fn encode<E: Encoder>(&self, buffer: &mut E) {
        buffer.encode(&self.tag());
        buffer.encode(&self.stream_id);
        buffer.encode(&self.offset);
        buffer.encode_with_len_prefix::<VarInt, _>(&self.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_codec::{DecoderBuffer, EncoderBuffer};

    fn decode(bytes: &[u8]) -> StreamRef<'_> {
        let buffer = DecoderBuffer::new(bytes);
        let (tag, buffer) = buffer.decode::<u8>().unwrap();
        let (frame, buffer): (StreamRef, _) = buffer.decode_parameterized(tag).unwrap();
        assert!(buffer.is_empty());
        frame
    }

    #[test]
    fn round_trip_test() {
        let frame = Stream {
            stream_id: VarInt::from_u8(0),
            offset: VarInt::ZERO,
            data: &b"abc"[..],
            is_fin: true,
        };

        let mut bytes = [0u8; 16];
        let len = {
            let mut encoder = EncoderBuffer::new(&mut bytes);
            encoder.encode(&frame);
            encoder.len()
        };

        assert_eq!(bytes[0], 0x0f);
        assert_eq!(decode(&bytes[..len]), frame);
    }

    #[test]
    fn implicit_fields_test() {
        // no OFF, no LEN: data runs to the end of the payload
        let frame = decode(&[0x08, 0x04, b'h', b'i']);
        assert_eq!(frame.stream_id, 4u64);
        assert_eq!(frame.offset, VarInt::ZERO);
        assert_eq!(frame.data, b"hi");
        assert!(!frame.is_fin);
    }
}
