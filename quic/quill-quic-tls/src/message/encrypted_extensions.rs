// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    extension,
    message::{encode_message, HandshakeType},
};
use quill_codec::{Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc8446#section-4.3.1
//# struct {
//#     Extension extensions<0..2^16-1>;
//# } EncryptedExtensions;

/// Builds the EncryptedExtensions message carrying the server's QUIC
/// transport parameters
#[derive(Debug)]
pub struct EncryptedExtensions<'a> {
    pub transport_parameters: &'a [u8],
}

impl EncoderValue for EncryptedExtensions<'_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encode_message(encoder, HandshakeType::EncryptedExtensions, &Body(self));
    }
}

struct Body<'a, 'b>(&'b EncryptedExtensions<'a>);

impl EncoderValue for Body<'_, '_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.encode_with_len_prefix::<u16, _>(&Extensions(self.0));
    }
}

struct Extensions<'a, 'b>(&'b EncryptedExtensions<'a>);

impl EncoderValue for Extensions<'_, '_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.encode(&extension::id::QUIC_TRANSPORT_PARAMETERS);
        encoder.encode_with_len_prefix::<u16, _>(&self.0.transport_parameters);
    }
}
