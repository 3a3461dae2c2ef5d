// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use quill_quic_core::{crypto::Keys, transport};

/// The packet protection keys for one encryption level, both directions
#[derive(Debug)]
pub struct LevelKeys {
    /// Opens packets protected by the client
    pub opener: Keys,
    /// Seals packets the server sends
    pub sealer: Keys,
}

/// The transport-side callbacks a [`crate::Session`] drives while it makes
/// progress
///
/// The connection implements this; the handshake owns no packet or timer
/// state of its own.
pub trait Context {
    /// The client's raw `quic_transport_parameters` value
    fn on_client_params(&mut self, params: &[u8]) -> Result<(), transport::Error>;

    /// Handshake-level keys are ready; installed before the ServerHello's
    /// flight leaves the Initial level
    fn on_handshake_keys(&mut self, keys: LevelKeys) -> Result<(), transport::Error>;

    /// 1-RTT keys are ready; installed once the server Finished is queued
    fn on_one_rtt_keys(&mut self, keys: LevelKeys) -> Result<(), transport::Error>;

    //= https://www.rfc-editor.org/rfc/rfc9001#section-4.1.2
    //# the handshake is
    //# considered confirmed at the server when the handshake completes
    fn on_handshake_complete(&mut self) -> Result<(), transport::Error>;

    /// Queues handshake bytes to be sent in Initial-level CRYPTO frames
    fn send_initial(&mut self, transmission: &[u8]);

    /// Queues handshake bytes to be sent in Handshake-level CRYPTO frames
    fn send_handshake(&mut self, transmission: &[u8]);
}
