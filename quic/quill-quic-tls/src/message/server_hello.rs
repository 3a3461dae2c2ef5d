// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    extension::{self, NAMED_GROUP_X25519, TLS_1_3, X25519_KEY_LEN},
    message::{encode_message, HandshakeType},
};
use quill_codec::{Encoder, EncoderValue};
use quill_quic_core::crypto::CipherSuite;

//= https://www.rfc-editor.org/rfc/rfc8446#section-4.1.3
//# struct {
//#     ProtocolVersion legacy_version = 0x0303;    /* TLS v1.2 */
//#     Random random;
//#     opaque legacy_session_id_echo<0..32>;
//#     CipherSuite cipher_suite;
//#     uint8 legacy_compression_method = 0;
//#     Extension extensions<6..2^16-1>;
//# } ServerHello;

const LEGACY_VERSION: u16 = 0x0303;

/// Builds the ServerHello answering a validated ClientHello
#[derive(Debug)]
pub struct ServerHello<'a> {
    pub random: &'a [u8; 32],
    pub session_id_echo: &'a [u8],
    pub cipher_suite: CipherSuite,
    pub key_share: &'a [u8; X25519_KEY_LEN],
}

impl EncoderValue for ServerHello<'_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        encode_message(encoder, HandshakeType::ServerHello, &Body(self));
    }
}

struct Body<'a, 'b>(&'b ServerHello<'a>);

impl EncoderValue for Body<'_, '_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        let hello = self.0;

        encoder.encode(&LEGACY_VERSION);
        encoder.write_slice(hello.random);
        encoder.encode_with_len_prefix::<u8, _>(&hello.session_id_echo);
        encoder.encode(&hello.cipher_suite.wire_value());
        // legacy_compression_method
        encoder.encode(&0u8);

        encoder.encode_with_len_prefix::<u16, _>(&Extensions(hello));
    }
}

struct Extensions<'a, 'b>(&'b ServerHello<'a>);

impl EncoderValue for Extensions<'_, '_> {
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        //= https://www.rfc-editor.org/rfc/rfc8446#section-4.2.8
        //# struct {
        //#     KeyShareEntry server_share;
        //# } KeyShareServerHello;
        encoder.encode(&extension::id::KEY_SHARE);
        encoder.encode(&(4 + X25519_KEY_LEN as u16));
        encoder.encode(&NAMED_GROUP_X25519);
        encoder.encode(&(X25519_KEY_LEN as u16));
        encoder.write_slice(self.0.key_share);

        //= https://www.rfc-editor.org/rfc/rfc8446#section-4.2.1
        //# A server which negotiates TLS 1.3 MUST respond by sending a
        //# "supported_versions" extension containing the selected version
        //# value (0x0304).
        encoder.encode(&extension::id::SUPPORTED_VERSIONS);
        encoder.encode(&2u16);
        encoder.encode(&TLS_1_3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    //= https://www.rfc-editor.org/rfc/rfc9001#appendix-A.3
    //= type=test
    //# 020000560303eefce7f7b37ba1d163 2e96677825ddf73988cfc79825df566d
    //# c5430b9a045a1200130100002e0033 0024001d00209d3c940d89690b84d08a
    //# 60993c144eca684d1081287c834d53 11bcf32bb9da1a002b00020304
    #[test]
    fn example_server_hello_test() {
        let random = hex!("eefce7f7b37ba1d1632e96677825ddf73988cfc79825df566dc5430b9a045a12");
        let key_share = hex!("9d3c940d89690b84d08a60993c144eca684d1081287c834d5311bcf32bb9da1a");

        let hello = ServerHello {
            random: &random,
            session_id_echo: &[],
            cipher_suite: CipherSuite::TlsAes128GcmSha256,
            key_share: &key_share,
        };

        let expected = hex!(
            "
            020000560303eefce7f7b37ba1d163 2e96677825ddf73988cfc79825df566d
            c5430b9a045a1200130100002e0033 0024001d00209d3c940d89690b84d08a
            60993c144eca684d1081287c834d53 11bcf32bb9da1a002b00020304
            "
        );

        let mut bytes = [0u8; 128];
        let len = {
            let mut encoder = quill_codec::EncoderBuffer::new(&mut bytes);
            encoder.encode(&hello);
            encoder.len()
        };

        assert_eq!(bytes[..len], expected[..]);
    }
}
