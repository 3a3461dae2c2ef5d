// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The datagram-level entry point: routes packets to connections by DCID
//! and creates server connections for new client Initials
//!
//! Nothing here is authenticated; a spoofed Initial creates a connection
//! whose AEAD will refuse every subsequent packet unless the sender really
//! chose that DCID.

use crate::{
    connection::{Connection, State},
    event::{DropReason, Subscriber},
};
use bytes::Bytes;
use hashbrown::HashMap;
use quill_quic_core::{
    connection::{id, Id},
    packet::{self, ProtectedPacket},
    random,
    time::Timestamp,
    transport,
    varint::VarInt,
};
use quill_quic_tls::Provider;
use quill_codec::DecoderBufferMut;
use std::net::SocketAddr;

/// The length of connection IDs this endpoint issues
const LOCAL_ID_LEN: usize = 8;

/// An opaque reference to a connection owned by the endpoint
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle(pub(crate) usize);

/// One UDP datagram to hand to the I/O layer
#[derive(Debug)]
pub struct Transmission {
    pub peer_address: SocketAddr,
    pub payload: Vec<u8>,
}

/// Application-facing events produced while processing input
#[derive(Debug)]
pub enum Event {
    /// The client's raw transport parameter blob, surfaced once the
    /// ClientHello is processed
    TransportParameters {
        connection: Handle,
        parameters: Vec<u8>,
    },
    /// The TLS handshake finished; 1-RTT data flows from here on
    HandshakeComplete { connection: Handle },
    /// Stream data arrived; ordering within the stream is the upper
    /// layer's concern
    StreamData {
        connection: Handle,
        stream_id: VarInt,
        offset: VarInt,
        data: Bytes,
        fin: bool,
    },
    /// The peer abruptly terminated the sending part of a stream
    StreamReset {
        connection: Handle,
        stream_id: VarInt,
        error_code: VarInt,
    },
    /// The connection finished, either by error, by local close, or by the
    /// peer's CONNECTION_CLOSE
    ConnectionClosed {
        connection: Handle,
        error: transport::Error,
    },
}

/// Datagrams to send plus events to surface, produced by every endpoint
/// entry point
#[derive(Debug, Default)]
pub struct Output {
    pub transmissions: Vec<Transmission>,
    pub events: Vec<Event>,
}

/// The per-connection signals the external loss/ACK scheduler reads; the
/// core itself never arms a timer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimerState {
    /// Unsent or retransmittable ack-eliciting data exists
    pub has_ack_eliciting_data: bool,
    /// When the newest ack-eliciting packet arrived
    pub latest_ack_eliciting_time: Option<Timestamp>,
    /// An acknowledgment should be flushed now
    pub ack_pending: bool,
}

pub struct Endpoint<P, R, S>
where
    P: Provider,
    R: random::Generator,
    S: Subscriber,
{
    provider: P,
    random: R,
    subscriber: S,
    connections: Vec<Option<Connection>>,
    /// The only cross-connection structure: DCID -> connection slot
    routes: HashMap<Id, usize>,
}

impl<P, R, S> Endpoint<P, R, S>
where
    P: Provider,
    R: random::Generator,
    S: Subscriber,
{
    pub fn new(provider: P, random: R, subscriber: S) -> Self {
        Self {
            provider,
            random,
            subscriber,
            connections: Vec::new(),
            routes: HashMap::new(),
        }
    }

    /// Read access to the telemetry subscriber
    pub fn subscriber(&self) -> &S {
        &self.subscriber
    }

    /// The lifecycle state of a connection, if it still exists
    pub fn connection_state(&self, handle: Handle) -> Option<State> {
        self.connections
            .get(handle.0)
            .and_then(|slot| slot.as_ref())
            .map(|connection| connection.state())
    }

    /// The signals the external timer drives `tick`/`retransmit` from
    pub fn timer_state(&self, handle: Handle) -> Option<TimerState> {
        self.connections
            .get(handle.0)
            .and_then(|slot| slot.as_ref())
            .map(|connection| TimerState {
                has_ack_eliciting_data: connection.has_ack_eliciting_data(),
                latest_ack_eliciting_time: connection.latest_ack_eliciting_time(),
                ack_pending: connection.ack_pending(),
            })
    }

    /// Ingests one UDP datagram
    ///
    /// Coalesced packets are routed individually: each carries its own DCID.
    pub fn recv(&mut self, peer_address: SocketAddr, datagram: &mut [u8], now: Timestamp) -> Output {
        let mut output = Output::default();
        let mut touched = Vec::new();

        let mut buffer = DecoderBufferMut::new(datagram);
        while !buffer.is_empty() {
            let (packet, remaining) = match ProtectedPacket::decode(buffer, LOCAL_ID_LEN) {
                Ok(decoded) => decoded,
                Err(error) => {
                    self.subscriber.on_packet_dropped(match error {
                        packet::Error::UnsupportedVersion(_) => DropReason::UnsupportedVersion,
                        packet::Error::UnsupportedPacket(_) => DropReason::UnsupportedPacket,
                        packet::Error::InvalidHeader(_) => DropReason::MalformedHeader,
                    });
                    // the rest of the datagram cannot be delimited
                    break;
                }
            };
            buffer = remaining;

            let destination = *packet.destination_connection_id();

            let index = match self.routes.get(&destination) {
                Some(index) => *index,
                None => {
                    //= https://www.rfc-editor.org/rfc/rfc9000#section-7.2
                    //# When an Initial packet is sent by a client that has not
                    //# previously received an Initial or Retry packet from the
                    //# server, the client populates the Destination Connection
                    //# ID field with an unpredictable value.  This Destination
                    //# Connection ID MUST be at least 8 bytes in length.
                    if !matches!(packet, ProtectedPacket::Initial(_))
                        || destination.len() < id::MIN_INITIAL_DESTINATION_LEN
                    {
                        self.subscriber.on_packet_dropped(DropReason::UnknownConnection);
                        continue;
                    }

                    self.create_connection(peer_address, destination)
                }
            };

            let Some(connection) = self.connections[index].as_mut() else {
                self.subscriber.on_packet_dropped(DropReason::UnknownConnection);
                continue;
            };

            // the path is pinned for the lifetime of the connection
            if connection.peer_address() != peer_address {
                self.subscriber.on_packet_dropped(DropReason::UnknownConnection);
                continue;
            }

            if let Err(error) = connection.on_packet(
                Handle(index),
                now,
                packet,
                &self.provider,
                &mut self.subscriber,
                &mut output.events,
            ) {
                connection.close(
                    Handle(index),
                    error,
                    false,
                    &[],
                    &mut self.subscriber,
                    &mut output.events,
                );
            }

            if !touched.contains(&index) {
                touched.push(index);
            }
        }

        for index in touched {
            if let Some(connection) = self.connections[index].as_mut() {
                connection.flush(now, &mut self.subscriber, &mut output.transmissions);
            }
        }

        output
    }

    /// Drives ACK generation and pending retransmissions; called by the
    /// external timer
    pub fn tick(&mut self, now: Timestamp) -> Output {
        let mut output = Output::default();

        for slot in self.connections.iter_mut() {
            if let Some(connection) = slot.as_mut() {
                connection.flush(now, &mut self.subscriber, &mut output.transmissions);
            }
        }

        output
    }

    /// Initiates an application-level close
    pub fn close(
        &mut self,
        handle: Handle,
        error_code: VarInt,
        reason: &[u8],
        now: Timestamp,
    ) -> Output {
        let mut output = Output::default();

        if let Some(connection) = self.connections.get_mut(handle.0).and_then(|slot| slot.as_mut()) {
            connection.close(
                handle,
                transport::Error::new(error_code),
                true,
                reason,
                &mut self.subscriber,
                &mut output.events,
            );
            connection.flush(now, &mut self.subscriber, &mut output.transmissions);
        }

        output
    }

    /// Queues stream data and flushes the resulting packets
    pub fn send_stream(
        &mut self,
        handle: Handle,
        stream_id: VarInt,
        data: Bytes,
        fin: bool,
        now: Timestamp,
    ) -> Output {
        let mut output = Output::default();

        if let Some(connection) = self.connections.get_mut(handle.0).and_then(|slot| slot.as_mut()) {
            connection.send_stream(stream_id, data, fin);
            connection.flush(now, &mut self.subscriber, &mut output.transmissions);
        }

        output
    }

    /// Abruptly terminates the sending side of a stream
    pub fn reset_stream(
        &mut self,
        handle: Handle,
        stream_id: VarInt,
        error_code: VarInt,
        now: Timestamp,
    ) -> Output {
        let mut output = Output::default();

        if let Some(connection) = self.connections.get_mut(handle.0).and_then(|slot| slot.as_mut()) {
            connection.reset_stream(stream_id, error_code);
            connection.flush(now, &mut self.subscriber, &mut output.transmissions);
        }

        output
    }

    /// Requeues a connection's in-flight handshake data and flushes it
    ///
    /// Called by the external loss timer when it decides the first flight
    /// was lost; the core itself keeps no timers.
    pub fn retransmit(&mut self, handle: Handle, now: Timestamp) -> Output {
        let mut output = Output::default();

        if let Some(connection) = self.connections.get_mut(handle.0).and_then(|slot| slot.as_mut()) {
            connection.mark_handshake_data_lost();
            connection.flush(now, &mut self.subscriber, &mut output.transmissions);
        }

        output
    }

    /// Destroys a connection, zeroizing its keying material
    ///
    /// Called by the external layer after a close drains or an idle timeout
    /// fires.
    pub fn destroy(&mut self, handle: Handle) {
        if let Some(slot) = self.connections.get_mut(handle.0) {
            if slot.take().is_some() {
                self.routes.retain(|_, index| *index != handle.0);
            }
        }
    }

    fn connection_mut(&mut self, handle: Handle) -> Option<&mut Connection> {
        self.connections.get_mut(handle.0).and_then(|slot| slot.as_mut())
    }

    fn create_connection(&mut self, peer_address: SocketAddr, odcid: Id) -> usize {
        let mut scid = [0u8; LOCAL_ID_LEN];
        self.random.public_random_fill(&mut scid);
        let local_id = Id::try_from_bytes(&scid).expect("generated ids are in range");

        let connection = Connection::new(peer_address, odcid, local_id, &mut self.random);

        let index = self
            .connections
            .iter()
            .position(|slot| slot.is_none())
            .unwrap_or_else(|| {
                self.connections.push(None);
                self.connections.len() - 1
            });
        self.connections[index] = Some(connection);

        // the client addresses us by the ODCID until it learns our SCID,
        // then by the SCID; route both to the same connection
        self.routes.insert(odcid, index);
        self.routes.insert(local_id, index);

        self.subscriber.on_connection_created();
        index
    }
}
