// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

//! The QUIC frame codec
//!
//! Decrypted packet payloads are a concatenation of type-prefixed frames.
//! Parsing is streaming: [`Frame::decode`] takes one frame off the front of
//! the payload and returns the rest.

pub mod ack;
pub mod connection_close;
pub mod crypto;
pub mod handshake_done;
pub mod padding;
pub mod ping;
pub mod reset_stream;
pub mod stream;

pub use ack::{Ack, AckBuilder, EcnCounts};
pub use connection_close::ConnectionClose;
pub use crypto::{Crypto, CryptoRef};
pub use handshake_done::HandshakeDone;
pub use padding::Padding;
pub use ping::Ping;
pub use reset_stream::ResetStream;
pub use stream::{Stream, StreamRef};

use crate::{transport, varint::VarInt};
use quill_codec::{DecoderBuffer, Encoder, EncoderValue};

pub(crate) type Tag = u8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    Padding(Padding),
    Ping(Ping),
    Ack(Ack<'a>),
    ResetStream(ResetStream),
    Crypto(CryptoRef<'a>),
    Stream(StreamRef<'a>),
    ConnectionClose(ConnectionClose<'a>),
    HandshakeDone(HandshakeDone),
}

impl<'a> Frame<'a> {
    /// Decodes one frame from the front of a cleartext payload
    ///
    /// Unknown frame types close the connection with `PROTOCOL_VIOLATION`;
    /// a malformed known frame closes it with `FRAME_ENCODING_ERROR`.
    pub fn decode(buffer: DecoderBuffer<'a>) -> Result<(Self, DecoderBuffer<'a>), transport::Error> {
        let tag = buffer.peek_byte(0)?;
        let body = buffer.skip(1)?;

        let (frame, remaining) = match tag {
            padding::TAG => {
                let (frame, remaining) = body.decode_parameterized(tag)?;
                (Self::Padding(frame), remaining)
            }
            ping::TAG => {
                let (frame, remaining) = body.decode_parameterized(tag)?;
                (Self::Ping(frame), remaining)
            }
            ack::TAG | ack::TAG_ECN => {
                let (frame, remaining) = body.decode_parameterized(tag)?;
                (Self::Ack(frame), remaining)
            }
            reset_stream::TAG => {
                let (frame, remaining) = body.decode_parameterized(tag)?;
                (Self::ResetStream(frame), remaining)
            }
            crypto::TAG => {
                let (frame, remaining) = body.decode_parameterized(tag)?;
                (Self::Crypto(frame), remaining)
            }
            stream::TAG..=0x0f => {
                let (frame, remaining) = body.decode_parameterized(tag)?;
                (Self::Stream(frame), remaining)
            }
            connection_close::QUIC_ERROR_TAG | connection_close::APPLICATION_ERROR_TAG => {
                let (frame, remaining) = body.decode_parameterized(tag)?;
                (Self::ConnectionClose(frame), remaining)
            }
            handshake_done::TAG => {
                let (frame, remaining) = body.decode_parameterized(tag)?;
                (Self::HandshakeDone(frame), remaining)
            }
            //= https://www.rfc-editor.org/rfc/rfc9000#section-12.4
            //# An endpoint MUST treat the receipt of a frame of unknown type
            //# as a connection error of type FRAME_ENCODING_ERROR.
            // this stack negotiates no extension frames, so anything it does
            // not implement is a protocol violation
            _ => {
                return Err(transport::Error::PROTOCOL_VIOLATION
                    .with_reason("unknown frame type")
                    .with_frame_type(VarInt::from_u8(tag)))
            }
        };

        Ok((frame, remaining))
    }

    pub fn tag(&self) -> Tag {
        match self {
            Self::Padding(frame) => frame.tag(),
            Self::Ping(frame) => frame.tag(),
            Self::Ack(frame) => frame.tag(),
            Self::ResetStream(frame) => frame.tag(),
            Self::Crypto(frame) => frame.tag(),
            Self::Stream(frame) => frame.tag(),
            Self::ConnectionClose(frame) => frame.tag(),
            Self::HandshakeDone(frame) => frame.tag(),
        }
    }

    /// True if receiving this frame obligates the receiver to send an ACK
    ///
    /// ACK, PADDING and CONNECTION_CLOSE are the non-eliciting frames
    /// (RFC 9000 §13.2.1).
    #[inline]
    pub fn is_ack_eliciting(&self) -> bool {
        !matches!(
            self,
            Self::Padding(_) | Self::Ack(_) | Self::ConnectionClose(_)
        )
    }
}

impl EncoderValue for Frame<'_> {
    #[inline]
    fn encode<E: Encoder>(&self, encoder: &mut E) {
        match self {
            Self::Padding(frame) => encoder.encode(frame),
            Self::Ping(frame) => encoder.encode(frame),
            Self::Ack(frame) => encoder.encode(frame),
            Self::ResetStream(frame) => encoder.encode(frame),
            Self::Crypto(frame) => encoder.encode(frame),
            Self::Stream(frame) => encoder.encode(frame),
            Self::ConnectionClose(frame) => encoder.encode(frame),
            Self::HandshakeDone(frame) => encoder.encode(frame),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(payload: &[u8]) -> Result<Vec<Frame<'_>>, transport::Error> {
        let mut frames = vec![];
        let mut buffer = DecoderBuffer::new(payload);
        while !buffer.is_empty() {
            let (frame, remaining) = Frame::decode(buffer)?;
            frames.push(frame);
            buffer = remaining;
        }
        Ok(frames)
    }

    #[test]
    fn padding_run_test() {
        let frames = decode_all(&[0, 0, 0, 0, 1]).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Frame::Padding(Padding { length: 4 }));
        assert_eq!(frames[1], Frame::Ping(Ping));
    }

    #[test]
    fn unknown_frame_test() {
        // MAX_DATA is not implemented by this stack
        let error = decode_all(&[0x10, 0x44, 0x00]).unwrap_err();
        assert_eq!(error.code, transport::Error::PROTOCOL_VIOLATION.code);
        assert_eq!(error.frame_type, Some(VarInt::from_u8(0x10)));
    }

    #[test]
    fn truncated_frame_test() {
        // CRYPTO frame with a length that exceeds the payload
        let error = decode_all(&[0x06, 0x00, 0x0f, 0xaa]).unwrap_err();
        assert_eq!(error.code, transport::Error::FRAME_ENCODING_ERROR.code);
    }

    #[test]
    fn ack_eliciting_test() {
        assert!(!Frame::Padding(Padding { length: 1 }).is_ack_eliciting());
        assert!(Frame::Ping(Ping).is_ack_eliciting());
        assert!(Frame::Crypto(Crypto {
            offset: VarInt::ZERO,
            data: &[][..],
        })
        .is_ack_eliciting());
        assert!(Frame::HandshakeDone(HandshakeDone).is_ack_eliciting());
    }
}
