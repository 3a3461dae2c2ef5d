// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Unauthenticated packet header parsing
//!
//! Nothing parsed here has been authenticated. The decoded connection IDs
//! route a packet to a connection; everything else is untrusted until the
//! AEAD opens the payload.

pub mod handshake;
pub mod initial;
pub mod long;
pub mod number;
pub mod short;

pub use handshake::{CleartextHandshake, EncryptedHandshake, ProtectedHandshake};
pub use initial::{CleartextInitial, EncryptedInitial, ProtectedInitial};
pub use short::{CleartextShort, EncryptedShort, ProtectedShort};

use crate::{
    connection,
    crypto::ProtectedPayload,
    packet::long::{PacketType, Version, FIXED_BIT, LONG_HEADER_FORM, VERSION_1},
    varint::VarInt,
};
use quill_codec::{DecoderBufferMut, DecoderError};

pub type Tag = u8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The header could not be parsed below the AEAD; the datagram is
    /// silently dropped
    InvalidHeader(&'static str),
    /// A long header carried a version this stack does not speak; reported
    /// separately so a caller may choose to answer with Version Negotiation
    UnsupportedVersion(Version),
    /// A recognized packet type outside this stack's scope (Version
    /// Negotiation, Retry, 0-RTT)
    UnsupportedPacket(&'static str),
}

impl From<DecoderError> for Error {
    fn from(error: DecoderError) -> Self {
        Self::InvalidHeader(error.into())
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::InvalidHeader(reason) => write!(f, "invalid header: {reason}"),
            Self::UnsupportedVersion(version) => write!(f, "unsupported version: {version:#x}"),
            Self::UnsupportedPacket(name) => write!(f, "unsupported packet: {name}"),
        }
    }
}

/// One header-protected packet taken from the front of a datagram
#[derive(Debug)]
pub enum ProtectedPacket<'a> {
    Initial(ProtectedInitial<'a>),
    Handshake(ProtectedHandshake<'a>),
    Short(ProtectedShort<'a>),
}

impl<'a> ProtectedPacket<'a> {
    /// Decodes a single packet, returning the rest of the datagram.
    ///
    /// Coalesced datagrams are consumed by calling this in a loop until the
    /// remaining buffer is empty. Short-header packets always extend to the
    /// end of the datagram, so `destination_connection_id_len` (the length
    /// of connection IDs issued by this endpoint) is needed to find their
    /// payload.
    pub fn decode(
        buffer: DecoderBufferMut<'a>,
        destination_connection_id_len: usize,
    ) -> Result<(Self, DecoderBufferMut<'a>), Error> {
        let tag = buffer.peek_byte(0)?;

        //= https://www.rfc-editor.org/rfc/rfc9000#section-17.2
        //# Fixed Bit:  The next bit (0x40) of byte 0 is set to 1, unless the
        //#    packet is a Version Negotiation packet.  Packets containing a
        //#    zero value for this bit are not valid packets in this version and
        //#    MUST be discarded.
        if tag & FIXED_BIT == 0 {
            return Err(Error::InvalidHeader("fixed bit is zero"));
        }

        if tag & LONG_HEADER_FORM != 0 {
            Self::decode_long(buffer)
        } else {
            Self::decode_short(buffer, destination_connection_id_len)
        }
    }

    fn decode_long(buffer: DecoderBufferMut<'a>) -> Result<(Self, DecoderBufferMut<'a>), Error> {
        // parse with an immutable view first to find the packet boundary
        let (tag, version, destination_connection_id, source_connection_id, header_len, payload_len) = {
            let peek = buffer.peek();
            let (tag, peek) = peek.decode::<u8>()?;
            let (version, peek) = peek.decode::<Version>()?;

            if version == 0 {
                return Err(Error::UnsupportedPacket("version negotiation"));
            }

            if version != VERSION_1 {
                return Err(Error::UnsupportedVersion(version));
            }

            let (destination_connection_id, peek) = long::decode_connection_id(peek)?;
            let (source_connection_id, peek) = long::decode_connection_id(peek)?;

            let peek = match PacketType::from_tag(tag) {
                PacketType::Initial => {
                    //= https://www.rfc-editor.org/rfc/rfc9000#section-17.2.2
                    //# Token Length:  A variable-length integer specifying the
                    //#    length of the Token field, in bytes.
                    // Retry is out of scope, so the token content is skipped
                    peek.skip_with_len_prefix::<VarInt>()?
                }
                PacketType::Handshake => peek,
                PacketType::ZeroRtt => return Err(Error::UnsupportedPacket("0-rtt")),
                PacketType::Retry => return Err(Error::UnsupportedPacket("retry")),
            };

            let (payload_len, peek) = peek.decode::<VarInt>()?;
            let payload_len: usize = payload_len
                .try_into()
                .map_err(|_| Error::InvalidHeader("payload length overflow"))?;

            let header_len = buffer.len() - peek.len();

            (
                tag,
                version,
                destination_connection_id,
                source_connection_id,
                header_len,
                payload_len,
            )
        };

        let total_len = header_len
            .checked_add(payload_len)
            .ok_or(Error::InvalidHeader("payload length overflow"))?;
        buffer.ensure_len(total_len)?;

        let (packet, remaining) = buffer.decode_slice(total_len)?;
        let payload = ProtectedPayload::new(header_len, packet.into_less_safe_slice());

        let packet = match PacketType::from_tag(tag) {
            PacketType::Initial => Self::Initial(initial::Initial {
                version,
                destination_connection_id,
                source_connection_id,
                packet_number: (),
                payload,
            }),
            PacketType::Handshake => Self::Handshake(handshake::Handshake {
                version,
                destination_connection_id,
                source_connection_id,
                packet_number: (),
                payload,
            }),
            _ => unreachable!("unsupported types returned above"),
        };

        Ok((packet, remaining))
    }

    fn decode_short(
        buffer: DecoderBufferMut<'a>,
        destination_connection_id_len: usize,
    ) -> Result<(Self, DecoderBufferMut<'a>), Error> {
        let destination_connection_id = {
            let peek = buffer.peek();
            let peek = peek.skip(1)?;
            let (dcid, _) = peek.decode_slice(destination_connection_id_len)?;
            connection::Id::try_from_bytes(dcid.into_less_safe_slice())
                .ok_or(Error::InvalidHeader("connection id exceeds max length"))?
        };

        // a short header packet extends to the end of the UDP datagram
        let header_len = 1 + destination_connection_id_len;
        let total_len = buffer.len();
        let (packet, remaining) = buffer.decode_slice(total_len)?;

        let packet = Self::Short(short::Short {
            destination_connection_id,
            packet_number: (),
            payload: ProtectedPayload::new(header_len, packet.into_less_safe_slice()),
        });

        Ok((packet, remaining))
    }

    /// The DCID this packet routes on
    pub fn destination_connection_id(&self) -> &connection::Id {
        match self {
            Self::Initial(packet) => &packet.destination_connection_id,
            Self::Handshake(packet) => &packet.destination_connection_id,
            Self::Short(packet) => &packet.destination_connection_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn decode(bytes: &mut [u8]) -> Result<(usize, usize), Error> {
        let buffer = DecoderBufferMut::new(bytes);
        let (packet, remaining) = ProtectedPacket::decode(buffer, 8)?;
        let consumed = match &packet {
            ProtectedPacket::Initial(packet) => packet.payload.len(),
            ProtectedPacket::Handshake(packet) => packet.payload.len(),
            ProtectedPacket::Short(packet) => packet.payload.len(),
        };
        Ok((consumed, remaining.len()))
    }

    #[test]
    fn example_client_initial_test() {
        let mut packet =
            crate::crypto::tests::EXAMPLE_CLIENT_INITIAL_PROTECTED_PACKET.to_vec();
        let buffer = DecoderBufferMut::new(&mut packet);
        let (decoded, remaining) = ProtectedPacket::decode(buffer, 8).unwrap();
        assert!(remaining.is_empty());

        match decoded {
            ProtectedPacket::Initial(initial) => {
                assert_eq!(
                    initial.destination_connection_id.as_bytes(),
                    hex!("8394c8f03e515708")
                );
                assert!(initial.source_connection_id.is_empty());
                // header_len (18) + length field (1182)
                assert_eq!(initial.payload.len(), 1200);
            }
            other => panic!("expected an initial packet, got {other:?}"),
        }
    }

    #[test]
    fn fixed_bit_test() {
        let mut packet = [0x80u8, 0, 0, 0, 1, 0, 0, 1, 2];
        assert_eq!(
            decode(&mut packet),
            Err(Error::InvalidHeader("fixed bit is zero"))
        );
    }

    #[test]
    fn unsupported_version_test() {
        // a long header with version 0xff00001d (draft-29)
        let mut packet = hex!("c0ff00001d00000102").to_vec();
        assert_eq!(
            decode(&mut packet),
            Err(Error::UnsupportedVersion(0xff00_001d))
        );
    }

    #[test]
    fn version_negotiation_test() {
        let mut packet = hex!("c00000000000000102").to_vec();
        assert_eq!(
            decode(&mut packet),
            Err(Error::UnsupportedPacket("version negotiation"))
        );
    }

    #[test]
    fn truncated_packet_test() {
        // a valid initial header claiming more payload than the datagram has
        let mut packet = hex!("c3000000010101010044ff").to_vec();
        assert!(matches!(
            decode(&mut packet),
            Err(Error::InvalidHeader(_))
        ));
    }

    #[test]
    fn oversized_connection_id_test() {
        let mut packet = hex!("c30000000115").to_vec();
        packet.extend_from_slice(&[0u8; 21]);
        packet.extend_from_slice(&hex!("00 00 01 00"));
        assert!(matches!(decode(&mut packet), Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn coalesced_decode_test() {
        // two copies of the example packet back to back
        let example = crate::crypto::tests::EXAMPLE_CLIENT_INITIAL_PROTECTED_PACKET;
        let mut datagram = example.to_vec();
        datagram.extend_from_slice(&example);

        let buffer = DecoderBufferMut::new(&mut datagram);
        let (first, remaining) = ProtectedPacket::decode(buffer, 8).unwrap();
        assert!(matches!(first, ProtectedPacket::Initial(_)));
        assert_eq!(remaining.len(), example.len());

        let (second, remaining) = ProtectedPacket::decode(remaining, 8).unwrap();
        assert!(matches!(second, ProtectedPacket::Initial(_)));
        assert!(remaining.is_empty());
    }
}
