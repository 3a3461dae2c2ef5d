// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! TLS extension identifiers and wire helpers

//= https://www.rfc-editor.org/rfc/rfc8446#section-4.2
//# enum { ... } ExtensionType;

pub mod id {
    pub const SERVER_NAME: u16 = 0;
    pub const SIGNATURE_ALGORITHMS: u16 = 13;
    pub const ALPN: u16 = 16;
    pub const SUPPORTED_VERSIONS: u16 = 43;
    pub const KEY_SHARE: u16 = 51;

    //= https://www.rfc-editor.org/rfc/rfc9001#section-8.2
    //# The quic_transport_parameters extension is carried in the ClientHello
    //# and the EncryptedExtensions messages during the handshake.
    pub const QUIC_TRANSPORT_PARAMETERS: u16 = 0x39;

    /// The pre-standardization codepoint for `quic_transport_parameters`;
    /// still emitted by some clients and accepted on receipt
    pub const QUIC_TRANSPORT_PARAMETERS_DRAFT: u16 = 0xffa5;
}

//= https://www.rfc-editor.org/rfc/rfc8446#section-4.2.7
//# enum { ... x25519(0x001D), ... } NamedGroup;

pub const NAMED_GROUP_X25519: u16 = 0x001d;

//= https://www.rfc-editor.org/rfc/rfc8446#section-4.2.1
//# struct {
//#     select (Handshake.msg_type) {
//#         case client_hello:
//#              ProtocolVersion versions<2..254>;
//#         case server_hello: /* and HelloRetryRequest */
//#              ProtocolVersion selected_version;
//#     };
//# } SupportedVersions;

pub const TLS_1_3: u16 = 0x0304;

/// X25519 public keys are exactly 32 bytes on the wire
pub const X25519_KEY_LEN: usize = 32;
