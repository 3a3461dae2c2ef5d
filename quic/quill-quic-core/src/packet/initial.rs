// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    connection,
    crypto::{
        self, packet_protection, EncryptedPayload, HeaderKey, PacketKey, ProtectedPayload, TAG_LEN,
    },
    packet::{
        long::{PacketType, Version, FIXED_BIT, LONG_HEADER_FORM},
        number::{PacketNumber, PacketNumberSpace, TruncatedPacketNumber},
    },
    varint::VarInt,
};
use quill_codec::{DecoderBufferMut, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.2
//# Initial Packet {
//#   Header Form (1) = 1,
//#   Fixed Bit (1) = 1,
//#   Long Packet Type (2) = 0,
//#   Reserved Bits (2),
//#   Packet Number Length (2),
//#   Version (32),
//#   Destination Connection ID Length (8),
//#   Destination Connection ID (0..160),
//#   Source Connection ID Length (8),
//#   Source Connection ID (0..160),
//#   Token Length (i),
//#   Token (..),
//#   Length (i),
//#   Packet Number (8..32),
//#   Packet Payload (8..),
//# }

#[derive(Debug)]
pub struct Initial<PacketNumber, Payload> {
    pub version: Version,
    pub destination_connection_id: connection::Id,
    pub source_connection_id: connection::Id,
    pub packet_number: PacketNumber,
    pub payload: Payload,
}

pub type ProtectedInitial<'a> = Initial<(), ProtectedPayload<'a>>;
pub type EncryptedInitial<'a> = Initial<PacketNumber, EncryptedPayload<'a>>;
pub type CleartextInitial<'a> = Initial<PacketNumber, DecoderBufferMut<'a>>;

impl<'a> ProtectedInitial<'a> {
    /// Removes header protection, revealing the packet number
    #[inline]
    pub fn unprotect(
        self,
        header_key: &HeaderKey,
        largest_acknowledged: PacketNumber,
    ) -> Result<EncryptedInitial<'a>, packet_protection::Error> {
        let Initial {
            version,
            destination_connection_id,
            source_connection_id,
            payload,
            ..
        } = self;

        let (truncated_packet_number, payload) =
            crypto::unprotect(header_key, PacketNumberSpace::Initial, payload)?;

        let packet_number = truncated_packet_number.expand(largest_acknowledged);

        Ok(Initial {
            version,
            destination_connection_id,
            source_connection_id,
            packet_number,
            payload,
        })
    }
}

impl<'a> EncryptedInitial<'a> {
    /// Decrypts the payload, yielding the contained frames
    #[inline]
    pub fn decrypt(self, key: &PacketKey) -> Result<CleartextInitial<'a>, packet_protection::Error> {
        let Initial {
            version,
            destination_connection_id,
            source_connection_id,
            packet_number,
            payload,
        } = self;

        let (_header, payload) = crypto::decrypt(key, packet_number, payload)?;

        Ok(Initial {
            version,
            destination_connection_id,
            source_connection_id,
            packet_number,
            payload: DecoderBufferMut::new(payload),
        })
    }
}

/// Encodes an Initial packet header through the packet number field.
///
/// The Length field is computed from `payload_len` (the frame bytes that
/// follow the packet number, excluding the AEAD tag) and encoded in its
/// canonical form, so the packet number and payload always sit flush after
/// it.
#[derive(Debug)]
pub struct Header<'a> {
    pub version: Version,
    pub destination_connection_id: &'a [u8],
    pub source_connection_id: &'a [u8],
    pub token: &'a [u8],
    pub packet_number: TruncatedPacketNumber,
    pub payload_len: usize,
}

impl Header<'_> {
    #[inline]
    fn protected_payload_len(&self) -> VarInt {
        let len = self.packet_number.bytesize() + self.payload_len + TAG_LEN;
        VarInt::try_from(len).expect("packet payloads are always shorter than a datagram")
    }
}

impl EncoderValue for Header<'_> {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        let mut tag: u8 = LONG_HEADER_FORM | FIXED_BIT | PacketType::Initial.into_bits();
        tag |= self.packet_number.len().into_packet_tag_mask();
        encoder.encode(&tag);

        encoder.encode(&self.version);
        encoder.encode_with_len_prefix::<u8, _>(&self.destination_connection_id);
        encoder.encode_with_len_prefix::<u8, _>(&self.source_connection_id);
        encoder.encode_with_len_prefix::<VarInt, _>(&self.token);
        encoder.encode(&self.protected_payload_len());
        encoder.encode(&self.packet_number);
    }
}
