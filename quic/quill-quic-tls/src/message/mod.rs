// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! TLS 1.3 handshake message framing
//!
//! Every message starts with a one-byte type and a 24-bit length. QUIC
//! carries these directly in CRYPTO streams; there is no record layer.

pub mod certificate;
pub mod client_hello;
pub mod encrypted_extensions;
pub mod finished;
pub mod server_hello;

pub use certificate::{Certificate, CertificateVerify};
pub use client_hello::ClientHello;
pub use encrypted_extensions::EncryptedExtensions;
pub use finished::Finished;
pub use server_hello::ServerHello;

use crate::error::Error;
use core::convert::TryFrom;
use quill_codec::{decoder_value, Encoder, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc8446#section-4
//# enum {
//#     client_hello(1),
//#     server_hello(2),
//#     new_session_ticket(4),
//#     end_of_early_data(5),
//#     encrypted_extensions(8),
//#     certificate(11),
//#     certificate_request(13),
//#     certificate_verify(15),
//#     finished(20),
//#     key_update(24),
//#     message_hash(254),
//#     (255)
//# } HandshakeType;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeType {
    ClientHello,
    ServerHello,
    NewSessionTicket,
    EndOfEarlyData,
    EncryptedExtensions,
    Certificate,
    CertificateRequest,
    CertificateVerify,
    Finished,
    KeyUpdate,
}

impl HandshakeType {
    #[inline]
    pub const fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            1 => Self::ClientHello,
            2 => Self::ServerHello,
            4 => Self::NewSessionTicket,
            5 => Self::EndOfEarlyData,
            8 => Self::EncryptedExtensions,
            11 => Self::Certificate,
            13 => Self::CertificateRequest,
            15 => Self::CertificateVerify,
            20 => Self::Finished,
            24 => Self::KeyUpdate,
            _ => return None,
        })
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::ClientHello => 1,
            Self::ServerHello => 2,
            Self::NewSessionTicket => 4,
            Self::EndOfEarlyData => 5,
            Self::EncryptedExtensions => 8,
            Self::Certificate => 11,
            Self::CertificateRequest => 13,
            Self::CertificateVerify => 15,
            Self::Finished => 20,
            Self::KeyUpdate => 24,
        }
    }
}

/// A 24-bit length prefix
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct U24(pub u32);

impl TryFrom<usize> for U24 {
    type Error = Error;

    #[inline]
    fn try_from(value: usize) -> Result<Self, Self::Error> {
        if value > 0x00ff_ffff {
            return Err(Error::decode_error("length exceeds 24 bits"));
        }
        Ok(Self(value as u32))
    }
}

impl EncoderValue for U24 {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        let bytes = self.0.to_be_bytes();
        encoder.write_slice(&bytes[1..]);
    }

    #[inline]
    fn encoding_size(&self) -> usize {
        3
    }

    #[inline]
    fn encoding_size_for_encoder<E: Encoder>(&self, _encoder: &E) -> usize {
        3
    }
}

decoder_value!(
    impl<'a> U24 {
        fn decode(buffer: Buffer) -> Result<Self> {
            let (bytes, buffer) = buffer.decode_slice(3)?;
            let bytes = bytes.as_less_safe_slice();
            let value = (bytes[0] as u32) << 16 | (bytes[1] as u32) << 8 | bytes[2] as u32;
            Ok((U24(value), buffer))
        }
    }
);

impl TryFrom<U24> for usize {
    type Error = core::convert::Infallible;

    #[inline]
    fn try_from(value: U24) -> Result<Self, Self::Error> {
        Ok(value.0 as usize)
    }
}

/// The type and length prefix of a handshake message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandshakeHeader {
    pub message_type: u8,
    pub length: u32,
}

impl HandshakeHeader {
    pub const LEN: usize = 4;

    #[inline]
    pub fn handshake_type(self) -> Option<HandshakeType> {
        HandshakeType::from_u8(self.message_type)
    }
}

decoder_value!(
    impl<'a> HandshakeHeader {
        fn decode(buffer: Buffer) -> Result<Self> {
            let (message_type, buffer) = buffer.decode::<u8>()?;
            let (length, buffer) = buffer.decode::<U24>()?;
            Ok((
                HandshakeHeader {
                    message_type,
                    length: length.0,
                },
                buffer,
            ))
        }
    }
);

/// Encodes `body` as a handshake message of the given type
pub(crate) fn encode_message<E: Encoder, Body: EncoderValue>(
    encoder: &mut E,
    message_type: HandshakeType,
    body: &Body,
) {
    encoder.encode(&message_type.as_u8());
    encoder.encode_with_len_prefix::<U24, _>(body);
}
