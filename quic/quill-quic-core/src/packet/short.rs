// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    connection,
    crypto::{self, packet_protection, EncryptedPayload, HeaderKey, PacketKey, ProtectedPayload},
    packet::{
        long::FIXED_BIT,
        number::{PacketNumber, PacketNumberSpace, TruncatedPacketNumber},
    },
};
use quill_codec::{DecoderBufferMut, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-17.3.1
//# 1-RTT Packet {
//#   Header Form (1) = 0,
//#   Fixed Bit (1) = 1,
//#   Spin Bit (1),
//#   Reserved Bits (2),
//#   Key Phase (1),
//#   Packet Number Length (2),
//#   Destination Connection ID (0..160),
//#   Packet Number (8..32),
//#   Packet Payload (8..),
//# }

#[derive(Debug)]
pub struct Short<PacketNumber, Payload> {
    pub destination_connection_id: connection::Id,
    pub packet_number: PacketNumber,
    pub payload: Payload,
}

pub type ProtectedShort<'a> = Short<(), ProtectedPayload<'a>>;
pub type EncryptedShort<'a> = Short<PacketNumber, EncryptedPayload<'a>>;
pub type CleartextShort<'a> = Short<PacketNumber, DecoderBufferMut<'a>>;

impl<'a> ProtectedShort<'a> {
    /// Removes header protection, revealing the packet number
    #[inline]
    pub fn unprotect(
        self,
        header_key: &HeaderKey,
        largest_acknowledged: PacketNumber,
    ) -> Result<EncryptedShort<'a>, packet_protection::Error> {
        let Short {
            destination_connection_id,
            payload,
            ..
        } = self;

        let (truncated_packet_number, payload) =
            crypto::unprotect(header_key, PacketNumberSpace::ApplicationData, payload)?;

        let packet_number = truncated_packet_number.expand(largest_acknowledged);

        Ok(Short {
            destination_connection_id,
            packet_number,
            payload,
        })
    }
}

impl<'a> EncryptedShort<'a> {
    /// Decrypts the payload, yielding the contained frames
    #[inline]
    pub fn decrypt(self, key: &PacketKey) -> Result<CleartextShort<'a>, packet_protection::Error> {
        let Short {
            destination_connection_id,
            packet_number,
            payload,
        } = self;

        let (_header, payload) = crypto::decrypt(key, packet_number, payload)?;

        Ok(Short {
            destination_connection_id,
            packet_number,
            payload: DecoderBufferMut::new(payload),
        })
    }
}

/// Encodes a 1-RTT packet header through the packet number field.
///
/// The spin bit is not set and the key phase is always zero (this stack
/// performs no key updates).
#[derive(Debug)]
pub struct Header<'a> {
    pub destination_connection_id: &'a [u8],
    pub packet_number: TruncatedPacketNumber,
}

impl EncoderValue for Header<'_> {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        let mut tag: u8 = FIXED_BIT;
        tag |= self.packet_number.len().into_packet_tag_mask();
        encoder.encode(&tag);

        encoder.write_slice(self.destination_connection_id);
        encoder.encode(&self.packet_number);
    }
}
