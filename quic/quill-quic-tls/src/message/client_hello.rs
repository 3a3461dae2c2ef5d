// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::Error,
    extension::{self, NAMED_GROUP_X25519, TLS_1_3, X25519_KEY_LEN},
};
use quill_codec::DecoderBuffer;
use quill_quic_core::crypto::CipherSuite;

//= https://www.rfc-editor.org/rfc/rfc8446#section-4.1.2
//# struct {
//#     ProtocolVersion legacy_version = 0x0303;    /* TLS v1.2 */
//#     Random random;
//#     opaque legacy_session_id<0..32>;
//#     CipherSuite cipher_suites<2..2^16-2>;
//#     opaque legacy_compression_methods<1..2^8-1>;
//#     Extension extensions<8..2^16-1>;
//# } ClientHello;

const LEGACY_VERSION: u16 = 0x0303;
const MAX_SESSION_ID_LEN: usize = 32;

/// A parsed and validated ClientHello
#[derive(Debug)]
pub struct ClientHello<'a> {
    pub random: [u8; 32],
    pub session_id: &'a [u8],
    pub cipher_suite: CipherSuite,
    pub key_share: [u8; X25519_KEY_LEN],
    pub transport_parameters: &'a [u8],
    pub server_name: Option<&'a [u8]>,
}

impl<'a> ClientHello<'a> {
    /// Decodes the message body (after the 4-byte handshake header)
    ///
    /// Every failure maps to the TLS alert the server must surface.
    pub fn decode(buffer: DecoderBuffer<'a>) -> Result<Self, Error> {
        let (legacy_version, buffer) = buffer.decode::<u16>()?;
        if legacy_version != LEGACY_VERSION {
            return Err(Error::protocol_version("legacy_version must be 0x0303"));
        }

        let (random, buffer) = buffer.decode_slice(32)?;
        let mut random_bytes = [0u8; 32];
        random_bytes.copy_from_slice(random.as_less_safe_slice());

        let (session_id, buffer) = buffer.decode_slice_with_len_prefix::<u8>()?;
        if session_id.len() > MAX_SESSION_ID_LEN {
            return Err(Error::decode_error("legacy_session_id too long"));
        }
        let session_id = session_id.into_less_safe_slice();

        //= https://www.rfc-editor.org/rfc/rfc9001#section-5.3
        //# QUIC can use any of the cipher suites defined in [TLS13] with the
        //# exception of TLS_AES_128_CCM_8_SHA256.
        let (cipher_suites, buffer) = buffer.decode_slice_with_len_prefix::<u16>()?;
        let cipher_suite = select_cipher_suite(cipher_suites)?;

        let (legacy_compression, buffer) = buffer.decode_slice_with_len_prefix::<u8>()?;
        if legacy_compression.as_less_safe_slice() != [0] {
            return Err(Error::illegal_parameter(
                "compression methods other than null are forbidden",
            ));
        }

        let (extensions, buffer) = buffer.decode_slice_with_len_prefix::<u16>()?;
        buffer.ensure_empty()?;

        let extensions = Extensions::decode(extensions)?;

        //= https://www.rfc-editor.org/rfc/rfc8446#section-4.2.1
        //# If this extension is not present, servers which are compliant with
        //# this specification and which also support TLS 1.3 MUST negotiate
        //# TLS 1.2 or prior as specified in [RFC5246]
        // earlier versions are not negotiable over QUIC
        if !extensions.offers_tls13 {
            return Err(Error::protocol_version("peer does not offer TLS 1.3"));
        }

        if !extensions.has_signature_algorithms {
            return Err(Error::missing_extension("missing signature_algorithms"));
        }

        let key_share = extensions
            .key_share
            .ok_or(Error::missing_extension("missing key_share"))?;

        //= https://www.rfc-editor.org/rfc/rfc9001#section-8.2
        //# endpoints that
        //# receive ClientHello or EncryptedExtensions messages without the
        //# quic_transport_parameters extension MUST close the connection with
        //# an error of type 0x016d (equivalent to a fatal TLS missing_extension
        //# alert
        let transport_parameters = extensions
            .transport_parameters
            .ok_or(Error::missing_extension("missing quic_transport_parameters"))?;

        Ok(Self {
            random: random_bytes,
            session_id,
            cipher_suite,
            key_share,
            transport_parameters,
            server_name: extensions.server_name,
        })
    }
}

fn select_cipher_suite(list: DecoderBuffer<'_>) -> Result<CipherSuite, Error> {
    let mut list = list;
    while !list.is_empty() {
        let (value, rest) = list.decode::<u16>()?;
        if let Some(suite) = CipherSuite::from_wire_value(value) {
            return Ok(suite);
        }
        list = rest;
    }

    Err(Error::handshake_failure("no common cipher suite"))
}

#[derive(Default)]
struct Extensions<'a> {
    offers_tls13: bool,
    has_signature_algorithms: bool,
    key_share: Option<[u8; X25519_KEY_LEN]>,
    transport_parameters: Option<&'a [u8]>,
    server_name: Option<&'a [u8]>,
}

impl<'a> Extensions<'a> {
    fn decode(buffer: DecoderBuffer<'a>) -> Result<Self, Error> {
        let mut extensions = Self::default();
        let mut buffer = buffer;

        while !buffer.is_empty() {
            let (extension_type, rest) = buffer.decode::<u16>()?;
            let (body, rest) = rest.decode_slice_with_len_prefix::<u16>()?;

            match extension_type {
                extension::id::SUPPORTED_VERSIONS => {
                    extensions.offers_tls13 = decode_supported_versions(body)?;
                }
                extension::id::KEY_SHARE => {
                    extensions.key_share = decode_key_share(body)?;
                }
                extension::id::SIGNATURE_ALGORITHMS => {
                    let (algorithms, body) = body.decode_slice_with_len_prefix::<u16>()?;
                    body.ensure_empty()?;
                    if algorithms.is_empty() {
                        return Err(Error::decode_error("empty signature_algorithms"));
                    }
                    extensions.has_signature_algorithms = true;
                }
                extension::id::QUIC_TRANSPORT_PARAMETERS
                | extension::id::QUIC_TRANSPORT_PARAMETERS_DRAFT => {
                    extensions.transport_parameters = Some(body.into_less_safe_slice());
                }
                extension::id::SERVER_NAME => {
                    extensions.server_name = decode_server_name(body)?;
                }
                // every other extension is skipped without inspection
                _ => {}
            }

            buffer = rest;
        }

        Ok(extensions)
    }
}

fn decode_supported_versions(buffer: DecoderBuffer<'_>) -> Result<bool, Error> {
    let (versions, buffer) = buffer.decode_slice_with_len_prefix::<u8>()?;
    buffer.ensure_empty()?;

    let mut versions = versions;
    while !versions.is_empty() {
        let (version, rest) = versions.decode::<u16>()?;
        if version == TLS_1_3 {
            return Ok(true);
        }
        versions = rest;
    }

    Ok(false)
}

//= https://www.rfc-editor.org/rfc/rfc8446#section-4.2.8
//# struct {
//#     NamedGroup group;
//#     opaque key_exchange<1..2^16-1>;
//# } KeyShareEntry;

fn decode_key_share(buffer: DecoderBuffer<'_>) -> Result<Option<[u8; X25519_KEY_LEN]>, Error> {
    let (entries, buffer) = buffer.decode_slice_with_len_prefix::<u16>()?;
    buffer.ensure_empty()?;

    let mut entries = entries;
    let mut selected = None;
    while !entries.is_empty() {
        let (group, rest) = entries.decode::<u16>()?;
        let (key_exchange, rest) = rest.decode_slice_with_len_prefix::<u16>()?;

        if group == NAMED_GROUP_X25519 && selected.is_none() {
            if key_exchange.len() != X25519_KEY_LEN {
                return Err(Error::illegal_parameter("malformed x25519 key share"));
            }
            let mut key = [0u8; X25519_KEY_LEN];
            key.copy_from_slice(key_exchange.as_less_safe_slice());
            selected = Some(key);
        }

        entries = rest;
    }

    // a client that only offered other groups would need HelloRetryRequest,
    // which this stack does not send
    if selected.is_none() {
        return Err(Error::handshake_failure("no x25519 key share offered"));
    }

    Ok(selected)
}

//= https://www.rfc-editor.org/rfc/rfc6066#section-3
//# struct {
//#     NameType name_type;
//#     select (name_type) {
//#         case host_name: HostName;
//#     } name;
//# } ServerName;

fn decode_server_name(buffer: DecoderBuffer<'_>) -> Result<Option<&[u8]>, Error> {
    let (list, buffer) = buffer.decode_slice_with_len_prefix::<u16>()?;
    buffer.ensure_empty()?;

    let mut list = list;
    while !list.is_empty() {
        let (name_type, rest) = list.decode::<u8>()?;
        let (name, rest) = rest.decode_slice_with_len_prefix::<u16>()?;

        // host_name
        if name_type == 0 {
            return Ok(Some(name.into_less_safe_slice()));
        }

        list = rest;
    }

    Ok(None)
}
