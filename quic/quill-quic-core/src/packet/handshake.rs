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

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.4
//# Handshake Packet {
//#   Header Form (1) = 1,
//#   Fixed Bit (1) = 1,
//#   Long Packet Type (2) = 2,
//#   Reserved Bits (2),
//#   Packet Number Length (2),
//#   Version (32),
//#   Destination Connection ID Length (8),
//#   Destination Connection ID (0..160),
//#   Source Connection ID Length (8),
//#   Source Connection ID (0..160),
//#   Length (i),
//#   Packet Number (8..32),
//#   Packet Payload (8..),
//# }

#[derive(Debug)]
pub struct Handshake<PacketNumber, Payload> {
    pub version: Version,
    pub destination_connection_id: connection::Id,
    pub source_connection_id: connection::Id,
    pub packet_number: PacketNumber,
    pub payload: Payload,
}

pub type ProtectedHandshake<'a> = Handshake<(), ProtectedPayload<'a>>;
pub type EncryptedHandshake<'a> = Handshake<PacketNumber, EncryptedPayload<'a>>;
pub type CleartextHandshake<'a> = Handshake<PacketNumber, DecoderBufferMut<'a>>;

impl<'a> ProtectedHandshake<'a> {
    /// Removes header protection, revealing the packet number
    #[inline]
    pub fn unprotect(
        self,
        header_key: &HeaderKey,
        largest_acknowledged: PacketNumber,
    ) -> Result<EncryptedHandshake<'a>, packet_protection::Error> {
        let Handshake {
            version,
            destination_connection_id,
            source_connection_id,
            payload,
            ..
        } = self;

        let (truncated_packet_number, payload) =
            crypto::unprotect(header_key, PacketNumberSpace::Handshake, payload)?;

        let packet_number = truncated_packet_number.expand(largest_acknowledged);

        Ok(Handshake {
            version,
            destination_connection_id,
            source_connection_id,
            packet_number,
            payload,
        })
    }
}

impl<'a> EncryptedHandshake<'a> {
    /// Decrypts the payload, yielding the contained frames
    #[inline]
    pub fn decrypt(
        self,
        key: &PacketKey,
    ) -> Result<CleartextHandshake<'a>, packet_protection::Error> {
        let Handshake {
            version,
            destination_connection_id,
            source_connection_id,
            packet_number,
            payload,
        } = self;

        let (_header, payload) = crypto::decrypt(key, packet_number, payload)?;

        Ok(Handshake {
            version,
            destination_connection_id,
            source_connection_id,
            packet_number,
            payload: DecoderBufferMut::new(payload),
        })
    }
}

/// Encodes a Handshake packet header through the packet number field
#[derive(Debug)]
pub struct Header<'a> {
    pub version: Version,
    pub destination_connection_id: &'a [u8],
    pub source_connection_id: &'a [u8],
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
        let mut tag: u8 = LONG_HEADER_FORM | FIXED_BIT | PacketType::Handshake.into_bits();
        tag |= self.packet_number.len().into_packet_tag_mask();
        encoder.encode(&tag);

        encoder.encode(&self.version);
        encoder.encode_with_len_prefix::<u8, _>(&self.destination_connection_id);
        encoder.encode_with_len_prefix::<u8, _>(&self.source_connection_id);
        encoder.encode(&self.protected_payload_len());
        encoder.encode(&self.packet_number);
    }
}
