// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Telemetry hooks
//!
//! The endpoint takes no process-wide globals; callers pass a `Subscriber`
//! in. Every method defaults to a no-op, so uninteresting events cost
//! nothing.

use quill_quic_core::{packet::number::PacketNumberSpace, transport};

/// The reason an incoming datagram or packet was discarded without further
/// processing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The header could not be parsed
    MalformedHeader,
    /// A long header carried an unsupported version
    UnsupportedVersion,
    /// A recognized but out-of-scope packet type (Retry, 0-RTT, Version
    /// Negotiation)
    UnsupportedPacket,
    /// No connection matches the destination connection ID
    UnknownConnection,
    /// Keys for the packet's encryption level are not installed (or already
    /// discarded)
    KeysUnavailable,
    /// The packet number was already received
    DuplicatePacket,
    /// The AEAD rejected the packet
    AeadFailure,
}

/// Clients implement `Subscriber` to consume endpoint telemetry.
///
/// Since the default implementation is a noop, the rust compiler is able to
/// optimize away any code for events the subscriber does not consume.
pub trait Subscriber {
    fn on_packet_received(&mut self, space: PacketNumberSpace, len: usize) {
        let _ = space;
        let _ = len;
    }

    fn on_packet_sent(&mut self, space: PacketNumberSpace, len: usize) {
        let _ = space;
        let _ = len;
    }

    fn on_packet_dropped(&mut self, reason: DropReason) {
        let _ = reason;
    }

    fn on_connection_created(&mut self) {}

    fn on_connection_closed(&mut self, error: &transport::Error) {
        let _ = error;
    }

    fn on_handshake_complete(&mut self) {}
}

/// The always-silent subscriber
impl Subscriber for () {}

impl<A, B> Subscriber for (A, B)
where
    A: Subscriber,
    B: Subscriber,
{
    fn on_packet_received(&mut self, space: PacketNumberSpace, len: usize) {
        self.0.on_packet_received(space, len);
        self.1.on_packet_received(space, len);
    }

    fn on_packet_sent(&mut self, space: PacketNumberSpace, len: usize) {
        self.0.on_packet_sent(space, len);
        self.1.on_packet_sent(space, len);
    }

    fn on_packet_dropped(&mut self, reason: DropReason) {
        self.0.on_packet_dropped(reason);
        self.1.on_packet_dropped(reason);
    }

    fn on_connection_created(&mut self) {
        self.0.on_connection_created();
        self.1.on_connection_created();
    }

    fn on_connection_closed(&mut self, error: &transport::Error) {
        self.0.on_connection_closed(error);
        self.1.on_connection_closed(error);
    }

    fn on_handshake_complete(&mut self) {
        self.0.on_handshake_complete();
        self.1.on_handshake_complete();
    }
}

/// A subscriber that counts everything it sees
#[derive(Clone, Copy, Debug, Default)]
pub struct Counters {
    pub packets_received: u64,
    pub packets_sent: u64,
    pub packets_dropped: u64,
    pub aead_failures: u64,
    pub connections_created: u64,
    pub connections_closed: u64,
    pub handshakes_completed: u64,
}

impl Subscriber for Counters {
    fn on_packet_received(&mut self, _space: PacketNumberSpace, _len: usize) {
        self.packets_received += 1;
    }

    fn on_packet_sent(&mut self, _space: PacketNumberSpace, _len: usize) {
        self.packets_sent += 1;
    }

    fn on_packet_dropped(&mut self, reason: DropReason) {
        self.packets_dropped += 1;
        if matches!(reason, DropReason::AeadFailure) {
            self.aead_failures += 1;
        }
    }

    fn on_connection_created(&mut self) {
        self.connections_created += 1;
    }

    fn on_connection_closed(&mut self, _error: &transport::Error) {
        self.connections_closed += 1;
    }

    fn on_handshake_complete(&mut self) {
        self.handshakes_completed += 1;
    }
}
