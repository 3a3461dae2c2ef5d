// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    crypto::{packet_protection, secret::Secret, CipherSuite, EncryptedPayload, ProtectedPayload},
    packet::number::{PacketNumberSpace, TruncatedPacketNumber},
};
use aes::{
    cipher::{BlockEncrypt, KeyInit},
    Aes128,
};
use quill_codec::{DecoderBuffer, DecoderError};
use zeroize::Zeroize;

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.1
//# The output of this algorithm is a 5-byte mask that is applied to the
//# protected header fields using exclusive OR.

pub const HEADER_PROTECTION_MASK_LEN: usize = 5;
pub type HeaderProtectionMask = [u8; HEADER_PROTECTION_MASK_LEN];

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.2
//# An endpoint MUST discard packets that are not long enough to contain
//# a complete sample.

pub const SAMPLE_LEN: usize = 16;

/// A header protection key for one direction of one encryption level
pub enum HeaderKey {
    Aes128(Aes128),
}

impl core::fmt::Debug for HeaderKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("HeaderKey(..)")
    }
}

impl HeaderKey {
    /// Derives the header protection key from a traffic secret
    pub fn from_secret(secret: &Secret, suite: CipherSuite) -> Self {
        match suite {
            CipherSuite::TlsAes128GcmSha256 => {
                let mut hp = [0u8; 16];
                secret.expand_label_into(&packet_protection::QUIC_HP_LABEL, &[], &mut hp);
                let cipher = Aes128::new_from_slice(&hp).expect("key length matches suite");
                hp.zeroize();
                Self::Aes128(cipher)
            }
        }
    }

    #[inline]
    pub const fn sample_len(&self) -> usize {
        match self {
            Self::Aes128(_) => SAMPLE_LEN,
        }
    }

    //= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.3
    //# AES-based header protection samples 16 bytes from the packet
    //# ciphertext.  This value is used as the input to AES-ECB.
    //#
    //# mask = AES-ECB(hp_key, sample)
    #[inline]
    pub fn mask(&self, ciphertext_sample: &[u8]) -> HeaderProtectionMask {
        match self {
            Self::Aes128(cipher) => {
                let mut block = [0u8; 16];
                block.copy_from_slice(&ciphertext_sample[..SAMPLE_LEN]);
                cipher.encrypt_block((&mut block).into());

                let mut mask = [0; HEADER_PROTECTION_MASK_LEN];
                mask.copy_from_slice(&block[..HEADER_PROTECTION_MASK_LEN]);
                mask
            }
        }
    }
}

//= https://www.rfc-editor.org/rfc/rfc9001#section-5.4.1
//# mask = header_protection(hp_key, sample)
//#
//# pn_length = (packet[0] & 0x03) + 1
//# if (packet[0] & 0x80) == 0x80:
//#    # Long header: 4 bits masked
//#    packet[0] ^= mask[0] & 0x0f
//# else:
//#    # Short header: 5 bits masked
//#    packet[0] ^= mask[0] & 0x1f
//#
//# # pn_offset is the start of the Packet Number field.
//# packet[pn_offset:pn_offset+pn_length] ^= mask[1:1+pn_length]

const LONG_HEADER_TAG: u8 = 0x80;
pub(crate) const LONG_HEADER_MASK: u8 = 0x0f;
pub(crate) const SHORT_HEADER_MASK: u8 = 0x1f;

#[inline(always)]
fn mask_from_packet_tag(tag: u8) -> u8 {
    if tag & LONG_HEADER_TAG == LONG_HEADER_TAG {
        LONG_HEADER_MASK
    } else {
        SHORT_HEADER_MASK
    }
}

#[inline(always)]
fn xor_mask(payload: &mut [u8], mask: &HeaderProtectionMask) {
    for (payload_byte, mask_byte) in payload.iter_mut().zip(&mask[1..]) {
        *payload_byte ^= mask_byte;
    }
}

#[inline]
pub(crate) fn apply_header_protection<'a>(
    mask: HeaderProtectionMask,
    payload: EncryptedPayload<'a>,
) -> ProtectedPayload<'a> {
    let header_len = payload.header_len;
    let packet_number_len = payload.packet_number_len;
    let payload = payload.buffer.into_less_safe_slice();

    payload[0] ^= mask[0] & mask_from_packet_tag(payload[0]);

    let header_with_pn_len = packet_number_len.bytesize() + header_len;
    let packet_number_bytes = &mut payload[header_len..header_with_pn_len];
    xor_mask(packet_number_bytes, &mask);

    ProtectedPayload::new(header_len, payload)
}

#[inline]
pub(crate) fn remove_header_protection<'a>(
    space: PacketNumberSpace,
    mask: HeaderProtectionMask,
    payload: ProtectedPayload<'a>,
) -> Result<(TruncatedPacketNumber, EncryptedPayload<'a>), DecoderError> {
    let header_len = payload.header_len;
    let payload = payload.buffer.into_less_safe_slice();

    payload[0] ^= mask[0] & mask_from_packet_tag(payload[0]);
    let packet_number_len = space.new_packet_number_len(payload[0]);

    let header_with_pn_len = packet_number_len.bytesize() + header_len;
    let packet_number = {
        let packet_number_bytes = payload
            .get_mut(header_len..header_with_pn_len)
            .ok_or(DecoderError::UnexpectedEof(header_with_pn_len))?;
        xor_mask(packet_number_bytes, &mask);

        let (packet_number, _) = packet_number_len
            .decode_truncated_packet_number(DecoderBuffer::new(packet_number_bytes))?;
        packet_number
    };

    Ok((
        packet_number,
        EncryptedPayload::new(header_len, packet_number_len, payload),
    ))
}
