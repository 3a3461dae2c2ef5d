// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use quill_codec::{Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-19.1
//# A PADDING frame (type=0x00) has no semantic value.  PADDING frames
//# can be used to increase the size of a packet.

pub(crate) const TAG: u8 = 0x00;

/// A run of consecutive PADDING frames
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Padding {
    pub length: usize,
}

impl Padding {
    #[inline]
    pub const fn tag(&self) -> u8 {
        TAG
    }
}

quill_codec::decoder_parameterized_value!(
    impl<'a> Padding {
        fn decode(_tag: crate::frame::Tag, buffer: Buffer) -> Result<Self> {
            // the tag itself is the first padding byte; consume the rest of
            // the run
            let mut length = 1;
            let mut buffer = buffer;

            while buffer.peek_byte(0) == Ok(TAG) {
                buffer = buffer.skip(1)?;
                length += 1;
            }

            Ok((Padding { length }, buffer))
        }
    }
);

impl EncoderValue for Padding {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.write_repeated(self.length, TAG)
    }

    #[inline]
    fn encoding_size(&self) -> usize {
        self.length
    }

    #[inline]
    fn encoding_size_for_encoder<E: Encoder>(&self, _encoder: &E) -> usize {
        self.length
    }
}
