// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-packet-number-space state: send numbering, receive tracking, keys,
//! and the level's CRYPTO stream

pub mod crypto_stream;
pub mod received;

pub use crypto_stream::CryptoStream;
pub use received::Received;

use quill_quic_core::{
    packet::number::{PacketNumber, PacketNumberSpace, TruncatedPacketNumber},
    time::Timestamp,
    varint::VarInt,
};
use quill_quic_tls::context::LevelKeys;

/// Everything a connection tracks for one packet number space
#[derive(Debug)]
pub struct PacketSpace {
    space: PacketNumberSpace,

    /// The next packet number to send; strictly monotonic
    next_packet_number: u64,

    /// The largest packet number the peer has acknowledged, used to size
    /// outgoing packet number encodings
    largest_acknowledged: Option<u64>,

    /// Packet numbers received from the peer
    pub received: Received,

    /// When the largest ack-eliciting packet arrived; surfaced to the
    /// external timer for delayed-ACK decisions
    pub largest_received_time: Option<Timestamp>,

    /// An ACK should be sent at the next opportunity
    pub ack_pending: bool,

    /// The CRYPTO stream carried at this level
    pub crypto: CryptoStream,

    /// Packet protection keys, present once the level is installed.
    /// Initial keys are installed at connection creation and discarded when
    /// the handshake level takes over.
    pub keys: Option<LevelKeys>,
}

impl PacketSpace {
    pub fn new(space: PacketNumberSpace) -> Self {
        Self {
            space,
            next_packet_number: 0,
            largest_acknowledged: None,
            received: Received::default(),
            largest_received_time: None,
            ack_pending: false,
            crypto: CryptoStream::default(),
            keys: None,
        }
    }

    #[inline]
    pub fn space(&self) -> PacketNumberSpace {
        self.space
    }

    /// Allocates the next packet number to send
    ///
    /// Numbers are never reused within a space; running out of them is a
    /// connection-fatal internal error handled by the caller.
    pub fn allocate_packet_number(&mut self) -> Option<(PacketNumber, TruncatedPacketNumber)> {
        let value = VarInt::new(self.next_packet_number).ok()?;
        let packet_number = self.space.new_packet_number(value);

        let base = self
            .space
            .new_packet_number(VarInt::new(self.largest_acknowledged.unwrap_or(0)).ok()?);
        let truncated = packet_number.truncate(base)?;

        self.next_packet_number += 1;
        Some((packet_number, truncated))
    }

    /// The packet number the RFC 9000 decoding algorithm expands against
    #[inline]
    pub fn expansion_base(&self) -> PacketNumber {
        let largest = self.received.largest().unwrap_or(0);
        self.space
            .new_packet_number(VarInt::new(largest).unwrap_or(VarInt::ZERO))
    }

    /// Records a successfully decrypted packet
    pub fn on_packet_received(&mut self, packet_number: u64, ack_eliciting: bool, now: Timestamp) {
        let newly_inserted = self.received.insert(packet_number);
        debug_assert!(newly_inserted, "duplicates are dropped before decrypt");

        if ack_eliciting {
            self.ack_pending = true;
            if Some(packet_number) == self.received.largest() {
                self.largest_received_time = Some(now);
            }
        }
    }

    /// True if `packet_number` has not been allocated for sending yet
    #[inline]
    pub fn is_unsent(&self, packet_number: u64) -> bool {
        packet_number >= self.next_packet_number
    }

    /// Processes the peer's acknowledgment of `largest`
    pub fn on_largest_acknowledged(&mut self, largest: u64) {
        debug_assert!(!self.is_unsent(largest));

        if self.largest_acknowledged.map_or(true, |current| current < largest) {
            self.largest_acknowledged = Some(largest);
        }
    }

    /// True if this space has ack-eliciting data waiting to be sent
    #[inline]
    pub fn has_ack_eliciting_data(&self) -> bool {
        self.crypto.has_pending()
    }

    /// True if this space wants a transmission at the next opportunity
    #[inline]
    pub fn is_transmission_pending(&self) -> bool {
        self.keys.is_some() && (self.ack_pending || self.has_ack_eliciting_data())
    }

    /// Drops the keys and any pending transmission state.
    ///
    /// Used when the Initial space retires after handshake keys are in use
    /// (RFC 9001 §4.9.1).
    pub fn discard_keys(&mut self) {
        self.keys = None;
        self.ack_pending = false;
    }
}
