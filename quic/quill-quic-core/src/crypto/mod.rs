// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! QUIC packet protection primitives
//!
//! The lifecycle of a protected payload follows this flow on ingress:
//!
//! ```text
//! ProtectedPayload --unprotect()--> (TruncatedPacketNumber, EncryptedPayload)
//! TruncatedPacketNumber --expand(largest)--> PacketNumber
//! (PacketNumber, EncryptedPayload) --decrypt()--> cleartext
//! ```
//!
//! and the reverse on egress: the cleartext packet (with the tag region
//! reserved) is `encrypt()`ed and then `protect()`ed. The ordering is
//! inviolable because the header protection mask is sampled from the
//! ciphertext.

pub mod header;
pub mod initial;
pub mod key;
pub mod label;
pub mod packet_protection;
pub mod payload;
pub mod secret;
pub mod suite;


pub use header::{HeaderKey, HeaderProtectionMask, HEADER_PROTECTION_MASK_LEN};
pub use initial::InitialSecrets;
pub use key::{Keys, PacketKey, TAG_LEN};
pub use payload::{EncryptedPayload, ProtectedPayload};
pub use secret::Secret;
pub use suite::CipherSuite;

use crate::packet::number::{PacketNumber, PacketNumberLen, PacketNumberSpace, TruncatedPacketNumber};
use quill_codec::DecoderError;

//= https://www.rfc-editor.org/rfc/rfc9001#section-2.1
//# Data is protected using a number of encryption levels:
//# *  Initial keys
//# *  Early data (0-RTT) keys
//# *  Handshake keys
//# *  1-RTT keys

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EncryptionLevel {
    Initial,
    Handshake,
    ZeroRtt,
    OneRtt,
}

impl EncryptionLevel {
    /// Returns the packet number space packets at this level occupy
    #[inline]
    pub fn packet_number_space(self) -> PacketNumberSpace {
        match self {
            Self::Initial => PacketNumberSpace::Initial,
            Self::Handshake => PacketNumberSpace::Handshake,
            Self::ZeroRtt | Self::OneRtt => PacketNumberSpace::ApplicationData,
        }
    }
}

/// Protects an `EncryptedPayload` into a `ProtectedPayload`
#[inline]
pub fn protect<'a>(
    crypto: &HeaderKey,
    payload: EncryptedPayload<'a>,
) -> Result<ProtectedPayload<'a>, DecoderError> {
    let sample = payload.header_protection_sample(crypto.sample_len())?;
    let mask = crypto.mask(sample);

    Ok(header::apply_header_protection(mask, payload))
}

/// Removes header protection from a `ProtectedPayload`, yielding the
/// truncated packet number and an `EncryptedPayload`
#[inline]
pub fn unprotect<'a>(
    crypto: &HeaderKey,
    space: PacketNumberSpace,
    payload: ProtectedPayload<'a>,
) -> Result<(TruncatedPacketNumber, EncryptedPayload<'a>), DecoderError> {
    let sample = payload.header_protection_sample(crypto.sample_len())?;
    let mask = crypto.mask(sample);

    header::remove_header_protection(space, mask, payload)
}

/// Encrypts a cleartext payload in place
///
/// The buffer layout is `header || packet number || plaintext || tag region`;
/// the header through the packet number is authenticated as additional data.
#[inline]
pub fn encrypt<'a>(
    key: &PacketKey,
    packet_number: PacketNumber,
    packet_number_len: PacketNumberLen,
    header_len: usize,
    payload: &'a mut [u8],
) -> Result<EncryptedPayload<'a>, packet_protection::Error> {
    let header_with_pn_len = header_len + packet_number_len.bytesize();

    if payload.len() < header_with_pn_len + key.tag_len() {
        return Err(packet_protection::Error::INTERNAL_ERROR);
    }

    let (header, body) = payload.split_at_mut(header_with_pn_len);
    key.encrypt(packet_number.as_crypto_nonce(), header, body)?;

    Ok(EncryptedPayload::new(header_len, packet_number_len, payload))
}

/// Decrypts an `EncryptedPayload` in place, returning the header and the
/// cleartext (with the tag stripped)
#[inline]
pub fn decrypt<'a>(
    key: &PacketKey,
    packet_number: PacketNumber,
    payload: EncryptedPayload<'a>,
) -> Result<(&'a mut [u8], &'a mut [u8]), packet_protection::Error> {
    let (header, payload) = payload.split_mut();
    key.decrypt(packet_number.as_crypto_nonce(), header, payload)?;

    // remove the key tag from the payload
    let payload_len = payload.len() - key.tag_len();
    let payload = &mut payload[0..payload_len];

    Ok((header, payload))
}
