// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    message::{encode_message, HandshakeType, U24},
    provider::SignatureScheme,
};
use quill_codec::{Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc8446#section-4.4.2
//# struct {
//#     opaque certificate_request_context<0..2^8-1>;
//#     CertificateEntry certificate_list<0..2^24-1>;
//# } Certificate;

/// Builds the server Certificate message from a DER chain, leaf first
#[derive(Debug)]
pub struct Certificate<'a> {
    pub chain: &'a [Vec<u8>],
}

impl EncoderValue for Certificate<'_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encode_message(encoder, HandshakeType::Certificate, &Body(self));
    }
}

struct Body<'a, 'b>(&'b Certificate<'a>);

impl EncoderValue for Body<'_, '_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        // certificate_request_context is empty for server authentication
        encoder.encode(&0u8);
        encoder.encode_with_len_prefix::<U24, _>(&List(self.0));
    }
}

struct List<'a, 'b>(&'b Certificate<'a>);

impl EncoderValue for List<'_, '_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        //= https://www.rfc-editor.org/rfc/rfc8446#section-4.4.2
        //# struct {
        //#     select (certificate_type) {
        //#         case X509:
        //#           opaque cert_data<1..2^24-1>;
        //#     };
        //#     Extension extensions<0..2^16-1>;
        //# } CertificateEntry;
        for cert in self.0.chain {
            encoder.encode_with_len_prefix::<U24, _>(&cert.as_slice());
            // no per-certificate extensions
            encoder.encode(&0u16);
        }
    }
}

//= https://www.rfc-editor.org/rfc/rfc8446#section-4.4.3
//# struct {
//#     SignatureScheme algorithm;
//#     opaque signature<0..2^16-1>;
//# } CertificateVerify;

/// Builds the CertificateVerify message from a provider-produced signature
#[derive(Debug)]
pub struct CertificateVerify<'a> {
    pub algorithm: SignatureScheme,
    pub signature: &'a [u8],
}

impl EncoderValue for CertificateVerify<'_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encode_message(encoder, HandshakeType::CertificateVerify, &Body2(self));
    }
}

struct Body2<'a, 'b>(&'b CertificateVerify<'a>);

impl EncoderValue for Body2<'_, '_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.encode(&self.0.algorithm.wire_value());
        encoder.encode_with_len_prefix::<u16, _>(&self.0.signature);
    }
}

//= https://www.rfc-editor.org/rfc/rfc8446#section-4.4.3
//# The digital signature is then computed over the concatenation of:
//# -  A string that consists of octet 32 (0x20) repeated 64 times
//# -  The context string
//# -  A single 0 byte which serves as the separator
//# -  The content to be signed

/// Builds the blob the provider signs for CertificateVerify
pub fn signature_content(transcript_hash: &[u8; 32]) -> [u8; 98 + 32] {
    const CONTEXT: &[u8] = b"TLS 1.3, server CertificateVerify";

    let mut content = [0x20u8; 98 + 32];
    content[64..64 + CONTEXT.len()].copy_from_slice(CONTEXT);
    content[64 + CONTEXT.len()] = 0;
    content[98..].copy_from_slice(transcript_hash);
    content
}
