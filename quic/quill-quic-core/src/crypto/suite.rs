// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.3
//# QUIC can use any of the cipher suites defined in [TLS13] with the
//# exception of TLS_AES_128_CCM_8_SHA256.

/// The negotiated AEAD and hash pairing.
///
/// New suites (e.g. ChaCha20-Poly1305) are added as variants here and in the
/// key containers; the packet pipeline selects the variant once at
/// key-install time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherSuite {
    TlsAes128GcmSha256,
}

impl CipherSuite {
    /// The IANA-registered cipher suite value
    #[inline]
    pub const fn wire_value(self) -> u16 {
        match self {
            Self::TlsAes128GcmSha256 => 0x1301,
        }
    }

    /// Length of the AEAD authentication tag
    #[inline]
    pub const fn tag_len(self) -> usize {
        match self {
            Self::TlsAes128GcmSha256 => 16,
        }
    }

    #[inline]
    pub fn from_wire_value(value: u16) -> Option<Self> {
        match value {
            0x1301 => Some(Self::TlsAes128GcmSha256),
            _ => None,
        }
    }
}
