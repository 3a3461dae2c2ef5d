// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::message::{encode_message, HandshakeType};
use quill_codec::{Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc8446#section-4.4.4
//# struct {
//#     opaque verify_data[Hash.length];
//# } Finished;

/// Builds a Finished message from precomputed verify data
#[derive(Debug)]
pub struct Finished<'a> {
    pub verify_data: &'a [u8; 32],
}

impl EncoderValue for Finished<'_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encode_message(encoder, HandshakeType::Finished, &&self.verify_data[..]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_test() {
        let verify_data = [0x5au8; 32];
        let message = Finished {
            verify_data: &verify_data,
        };

        let mut bytes = [0u8; 64];
        let len = {
            let mut encoder = quill_codec::EncoderBuffer::new(&mut bytes);
            encoder.encode(&message);
            encoder.len()
        };

        assert_eq!(len, 36);
        assert_eq!(&bytes[..4], &[20, 0, 0, 32]);
        assert_eq!(&bytes[4..36], &verify_data);
    }
}
