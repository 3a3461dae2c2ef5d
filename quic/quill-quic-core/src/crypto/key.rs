// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::crypto::{packet_protection, secret::Secret, CipherSuite, HeaderKey};
use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes128Gcm, Nonce, Tag,
};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of the AEAD authentication tag for all supported suites
pub const TAG_LEN: usize = 16;

/// Length of the packet protection IV
pub const IV_LEN: usize = 12;

/// A packet protection IV, zeroized on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Iv([u8; IV_LEN]);

impl Iv {
    //= https://www.rfc-editor.org/rfc/rfc9001#section-5.3
    //# The nonce, N, is formed by combining the packet
    //# protection IV with the packet number.  The 62 bits of the
    //# reconstructed QUIC packet number in network byte order are left-
    //# padded with zeros to the size of the IV.  The exclusive OR of the
    //# padded packet number and the IV forms the AEAD nonce.
    #[inline]
    fn nonce(&self, packet_number: u64) -> [u8; IV_LEN] {
        let mut nonce = self.0;
        for (nonce_byte, pn_byte) in nonce[IV_LEN - 8..]
            .iter_mut()
            .zip(packet_number.to_be_bytes())
        {
            *nonce_byte ^= pn_byte;
        }
        nonce
    }
}

/// A packet protection key for one direction of one encryption level
pub enum PacketKey {
    Aes128Gcm { cipher: Aes128Gcm, iv: Iv },
}

impl core::fmt::Debug for PacketKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("PacketKey(..)")
    }
}

impl PacketKey {
    /// Derives the AEAD key and IV from a traffic secret
    pub fn from_secret(secret: &Secret, suite: CipherSuite) -> Self {
        match suite {
            CipherSuite::TlsAes128GcmSha256 => {
                let mut key = [0u8; 16];
                secret.expand_label_into(&packet_protection::QUIC_KEY_LABEL, &[], &mut key);
                let mut iv = [0u8; IV_LEN];
                secret.expand_label_into(&packet_protection::QUIC_IV_LABEL, &[], &mut iv);

                let cipher = Aes128Gcm::new_from_slice(&key).expect("key length matches suite");
                key.zeroize();

                Self::Aes128Gcm {
                    cipher,
                    iv: Iv(iv),
                }
            }
        }
    }

    /// Encrypts `payload` in place, authenticating `header`.
    ///
    /// The final `TAG_LEN` bytes of `payload` are reserved for the
    /// authentication tag and must not contain plaintext.
    #[inline]
    pub fn encrypt(
        &self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error> {
        match self {
            Self::Aes128Gcm { cipher, iv } => {
                let split = payload
                    .len()
                    .checked_sub(TAG_LEN)
                    .ok_or(packet_protection::Error::INTERNAL_ERROR)?;
                let (body, tag) = payload.split_at_mut(split);

                let nonce = iv.nonce(packet_number);
                let out = cipher
                    .encrypt_in_place_detached(Nonce::from_slice(&nonce), header, body)
                    .map_err(|_| packet_protection::Error::INTERNAL_ERROR)?;
                tag.copy_from_slice(&out);
                Ok(())
            }
        }
    }

    /// Decrypts `payload` (ciphertext followed by the tag) in place.
    ///
    /// On success the plaintext occupies `payload[..payload.len() - TAG_LEN]`.
    #[inline]
    pub fn decrypt(
        &self,
        packet_number: u64,
        header: &[u8],
        payload: &mut [u8],
    ) -> Result<(), packet_protection::Error> {
        match self {
            Self::Aes128Gcm { cipher, iv } => {
                let split = payload
                    .len()
                    .checked_sub(TAG_LEN)
                    .ok_or(packet_protection::Error::DECRYPT_ERROR)?;
                let (body, tag) = payload.split_at_mut(split);

                let nonce = iv.nonce(packet_number);
                cipher
                    .decrypt_in_place_detached(
                        Nonce::from_slice(&nonce),
                        header,
                        body,
                        Tag::from_slice(tag),
                    )
                    .map_err(|_| packet_protection::Error::DECRYPT_ERROR)
            }
        }
    }

    #[inline]
    pub const fn tag_len(&self) -> usize {
        match self {
            Self::Aes128Gcm { .. } => TAG_LEN,
        }
    }

    #[inline]
    pub const fn cipher_suite(&self) -> CipherSuite {
        match self {
            Self::Aes128Gcm { .. } => CipherSuite::TlsAes128GcmSha256,
        }
    }
}

/// The packet and header protection keys for one direction of one level
#[derive(Debug)]
pub struct Keys {
    pub packet: PacketKey,
    pub header: HeaderKey,
}

impl Keys {
    pub fn from_secret(secret: &Secret, suite: CipherSuite) -> Self {
        Self {
            packet: PacketKey::from_secret(secret, suite),
            header: HeaderKey::from_secret(secret, suite),
        }
    }
}
