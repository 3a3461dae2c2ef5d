// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::fmt;

//= https://www.rfc-editor.org/rfc/rfc8446#section-6
//# enum { ... } AlertDescription;

/// TLS alert descriptions used by the server handshake
pub mod alert {
    pub const UNEXPECTED_MESSAGE: u8 = 10;
    pub const HANDSHAKE_FAILURE: u8 = 40;
    pub const ILLEGAL_PARAMETER: u8 = 47;
    pub const DECODE_ERROR: u8 = 50;
    pub const DECRYPT_ERROR: u8 = 51;
    pub const PROTOCOL_VERSION: u8 = 70;
    pub const INTERNAL_ERROR: u8 = 80;
    pub const MISSING_EXTENSION: u8 = 109;
}

/// A fatal handshake failure carrying the TLS alert to surface to the peer
///
/// QUIC carries no alert records; the transport maps the alert into a
/// CONNECTION_CLOSE with error code `0x0100 + alert` (RFC 9001 §4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Error {
    pub alert: u8,
    pub reason: &'static str,
}

impl Error {
    pub const fn new(alert: u8, reason: &'static str) -> Self {
        Self { alert, reason }
    }

    pub const fn unexpected_message(reason: &'static str) -> Self {
        Self::new(alert::UNEXPECTED_MESSAGE, reason)
    }

    pub const fn handshake_failure(reason: &'static str) -> Self {
        Self::new(alert::HANDSHAKE_FAILURE, reason)
    }

    pub const fn illegal_parameter(reason: &'static str) -> Self {
        Self::new(alert::ILLEGAL_PARAMETER, reason)
    }

    pub const fn decode_error(reason: &'static str) -> Self {
        Self::new(alert::DECODE_ERROR, reason)
    }

    pub const fn decrypt_error(reason: &'static str) -> Self {
        Self::new(alert::DECRYPT_ERROR, reason)
    }

    pub const fn protocol_version(reason: &'static str) -> Self {
        Self::new(alert::PROTOCOL_VERSION, reason)
    }

    pub const fn missing_extension(reason: &'static str) -> Self {
        Self::new(alert::MISSING_EXTENSION, reason)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tls alert {}: {}", self.alert, self.reason)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<quill_codec::DecoderError> for Error {
    fn from(error: quill_codec::DecoderError) -> Self {
        Self::new(alert::DECODE_ERROR, error.into())
    }
}

impl From<Error> for quill_quic_core::transport::Error {
    fn from(error: Error) -> Self {
        quill_quic_core::transport::Error::crypto_error(error.alert).with_reason(error.reason)
    }
}
