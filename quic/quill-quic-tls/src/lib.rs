// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The server side of the TLS 1.3 handshake, carried in QUIC CRYPTO frames
//!
//! There is no TLS record layer: the transport feeds reassembled CRYPTO
//! stream bytes into a [`session::Session`] and receives handshake bytes,
//! key material and events back through the [`context::Context`] trait.

pub mod context;
pub mod error;
pub mod extension;
pub mod key_schedule;
pub mod message;
pub mod provider;
pub mod session;
pub mod transcript;

pub use context::Context;
pub use error::Error;
pub use provider::{Provider, SignatureScheme};
pub use session::Session;
