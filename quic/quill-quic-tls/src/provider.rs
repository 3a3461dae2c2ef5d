// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The certificate and signing interface supplied by the embedding
//! configuration layer
//!
//! The handshake itself never touches a private key: it hands the
//! CertificateVerify content to the provider and receives a signature back.

//= https://www.rfc-editor.org/rfc/rfc8446#section-4.2.3
//# enum {
//#     ...
//#     ecdsa_secp256r1_sha256(0x0403),
//#     ...
//#     rsa_pss_rsae_sha256(0x0804),
//#     ...
//# } SignatureScheme;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureScheme {
    EcdsaSecp256r1Sha256,
    RsaPssRsaeSha256,
}

impl SignatureScheme {
    #[inline]
    pub const fn wire_value(self) -> u16 {
        match self {
            Self::EcdsaSecp256r1Sha256 => 0x0403,
            Self::RsaPssRsaeSha256 => 0x0804,
        }
    }
}

/// Supplies the server certificate chain, the signing function, and the
/// encoded QUIC transport parameters
pub trait Provider: Send {
    /// The certificate chain in DER form, leaf first
    fn certificate_chain(&self) -> &[Vec<u8>];

    /// The scheme `sign` produces signatures for
    fn signature_scheme(&self) -> SignatureScheme;

    /// Signs the CertificateVerify content with the leaf certificate's key
    fn sign(&self, message: &[u8]) -> Vec<u8>;

    /// The server's encoded `quic_transport_parameters` value
    fn transport_parameters(&self) -> &[u8];
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;

    /// A provider with a placeholder certificate and a keyless "signature"
    /// (the content hash), sufficient for driving the state machine in
    /// tests
    #[derive(Debug)]
    pub struct Provider {
        pub chain: Vec<Vec<u8>>,
        pub transport_parameters: Vec<u8>,
    }

    impl Default for Provider {
        fn default() -> Self {
            Self {
                chain: vec![b"test certificate".to_vec()],
                transport_parameters: vec![0x01, 0x02, 0x47, 0xd0],
            }
        }
    }

    impl super::Provider for Provider {
        fn certificate_chain(&self) -> &[Vec<u8>] {
            &self.chain
        }

        fn signature_scheme(&self) -> SignatureScheme {
            SignatureScheme::EcdsaSecp256r1Sha256
        }

        fn sign(&self, message: &[u8]) -> Vec<u8> {
            use sha2::{Digest, Sha256};
            Sha256::digest(message).to_vec()
        }

        fn transport_parameters(&self) -> &[u8] {
            &self.transport_parameters
        }
    }
}
