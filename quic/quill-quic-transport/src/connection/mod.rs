// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A single server connection: three packet number spaces, the embedded
//! TLS session, and the packet pipeline between them

pub(crate) mod packet_builder;

use crate::{
    endpoint::{Event, Handle, Transmission},
    event::{DropReason, Subscriber},
    space::PacketSpace,
};
use bytes::Bytes;
use hashbrown::HashMap;
use quill_quic_core::{
    connection::Id,
    crypto::{CipherSuite, EncryptionLevel, InitialSecrets, Keys},
    frame::Frame,
    packet::{
        number::{PacketNumber, PacketNumberSpace},
        ProtectedHandshake, ProtectedInitial, ProtectedPacket, ProtectedShort,
    },
    random,
    time::Timestamp,
    transport,
    varint::VarInt,
};
use quill_quic_tls::{
    context::{Context as TlsContext, LevelKeys},
    Provider, Session,
};
use std::net::SocketAddr;

/// The connection-level lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Created, no packet processed yet
    Idle,
    /// Processing the handshake
    Handshaking,
    /// Handshake confirmed; application data flows
    Established,
    /// A CONNECTION_CLOSE was (or is about to be) sent
    Closing,
    /// The peer closed; nothing further is sent
    Drained,
    /// Terminal
    Closed,
}

struct CloseState {
    error: transport::Error,
    is_application: bool,
    reason: Vec<u8>,
    frame_sent: bool,
}

struct PendingStream {
    stream_id: VarInt,
    offset: VarInt,
    data: Bytes,
    fin: bool,
}

pub(crate) struct Spaces {
    pub initial: PacketSpace,
    pub handshake: PacketSpace,
    pub application: PacketSpace,
}

impl Spaces {
    fn new() -> Self {
        Self {
            initial: PacketSpace::new(PacketNumberSpace::Initial),
            handshake: PacketSpace::new(PacketNumberSpace::Handshake),
            application: PacketSpace::new(PacketNumberSpace::ApplicationData),
        }
    }

    pub(crate) fn by_level_mut(&mut self, level: EncryptionLevel) -> &mut PacketSpace {
        match level {
            EncryptionLevel::Initial => &mut self.initial,
            EncryptionLevel::Handshake => &mut self.handshake,
            EncryptionLevel::ZeroRtt | EncryptionLevel::OneRtt => &mut self.application,
        }
    }
}

pub struct Connection {
    state: State,
    local_id: Id,
    peer_id: Id,
    /// The client's first DCID; all Initial secrets derive from it and it
    /// never changes
    original_destination_id: Id,
    peer_address: SocketAddr,
    spaces: Spaces,
    session: Session,
    /// A HANDSHAKE_DONE frame is owed to the client
    handshake_done_pending: bool,
    pending_streams: Vec<PendingStream>,
    /// Queued RESET_STREAM frames as `(stream_id, error_code, final_size)`
    pending_resets: Vec<(VarInt, VarInt, VarInt)>,
    /// Bytes queued so far per outgoing stream, for offsets and final sizes
    stream_offsets: HashMap<u64, u64>,
    close: Option<CloseState>,
}

impl Connection {
    /// Creates a server connection for a client's first Initial packet
    pub(crate) fn new(
        peer_address: SocketAddr,
        original_destination_id: Id,
        local_id: Id,
        random: &mut dyn random::Generator,
    ) -> Self {
        let mut spaces = Spaces::new();

        //= https://www.rfc-editor.org/rfc/rfc9001#section-5.2
        //# Initial packets apply the packet protection process, but use a
        //# secret derived from the Destination Connection ID field from the
        //# client's first Initial packet.
        let secrets = InitialSecrets::new(original_destination_id.as_bytes());
        spaces.initial.keys = Some(LevelKeys {
            opener: Keys::from_secret(&secrets.client, CipherSuite::TlsAes128GcmSha256),
            sealer: Keys::from_secret(&secrets.server, CipherSuite::TlsAes128GcmSha256),
        });

        Self {
            state: State::Idle,
            local_id,
            peer_id: Id::EMPTY,
            original_destination_id,
            peer_address,
            spaces,
            session: Session::new(random),
            handshake_done_pending: false,
            pending_streams: Vec::new(),
            pending_resets: Vec::new(),
            stream_offsets: HashMap::new(),
            close: None,
        }
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    #[inline]
    pub fn peer_address(&self) -> SocketAddr {
        self.peer_address
    }

    #[inline]
    pub fn local_id(&self) -> &Id {
        &self.local_id
    }

    #[inline]
    pub fn original_destination_id(&self) -> &Id {
        &self.original_destination_id
    }

    /// True if an external timer should eventually call [`Self::flush`]
    #[inline]
    pub fn has_ack_eliciting_data(&self) -> bool {
        self.spaces.initial.has_ack_eliciting_data()
            || self.spaces.handshake.has_ack_eliciting_data()
            || self.spaces.application.has_ack_eliciting_data()
    }

    /// True if any space owes the peer an acknowledgment
    #[inline]
    pub fn ack_pending(&self) -> bool {
        self.spaces.initial.ack_pending
            || self.spaces.handshake.ack_pending
            || self.spaces.application.ack_pending
    }

    /// The receipt time of the newest ack-eliciting packet, for the external
    /// delayed-ACK timer
    #[inline]
    pub fn latest_ack_eliciting_time(&self) -> Option<Timestamp> {
        [
            self.spaces.initial.largest_received_time,
            self.spaces.handshake.largest_received_time,
            self.spaces.application.largest_received_time,
        ]
        .into_iter()
        .flatten()
        .max()
    }

    /// Processes one packet taken from a datagram addressed to this
    /// connection.
    ///
    /// A returned error means the connection must close with that code;
    /// per-packet failures below the AEAD are silent drops.
    pub(crate) fn on_packet<P: Provider, S: Subscriber>(
        &mut self,
        handle: Handle,
        now: Timestamp,
        packet: ProtectedPacket,
        provider: &P,
        subscriber: &mut S,
        events: &mut Vec<Event>,
    ) -> Result<(), transport::Error> {
        if matches!(self.state, State::Closing | State::Drained | State::Closed) {
            return Ok(());
        }

        match packet {
            ProtectedPacket::Initial(packet) => {
                self.on_initial(handle, now, packet, provider, subscriber, events)
            }
            ProtectedPacket::Handshake(packet) => {
                self.on_handshake(handle, now, packet, provider, subscriber, events)
            }
            ProtectedPacket::Short(packet) => {
                self.on_short(handle, now, packet, provider, subscriber, events)
            }
        }
    }

    fn on_initial<P: Provider, S: Subscriber>(
        &mut self,
        handle: Handle,
        now: Timestamp,
        packet: ProtectedInitial,
        provider: &P,
        subscriber: &mut S,
        events: &mut Vec<Event>,
    ) -> Result<(), transport::Error> {
        let level = EncryptionLevel::Initial;
        let base = self.spaces.initial.expansion_base();

        let cleartext = {
            let Some(keys) = self.spaces.initial.keys.as_ref() else {
                subscriber.on_packet_dropped(DropReason::KeysUnavailable);
                return Ok(());
            };

            let Ok(packet) = packet.unprotect(&keys.opener.header, base) else {
                subscriber.on_packet_dropped(DropReason::AeadFailure);
                return Ok(());
            };

            if self
                .spaces
                .initial
                .received
                .contains(packet.packet_number.as_u64())
            {
                subscriber.on_packet_dropped(DropReason::DuplicatePacket);
                return Ok(());
            }

            match packet.decrypt(&keys.opener.packet) {
                Ok(cleartext) => cleartext,
                Err(_) => {
                    subscriber.on_packet_dropped(DropReason::AeadFailure);
                    return Ok(());
                }
            }
        };

        // the client's chosen source ID becomes the DCID of everything the
        // server sends
        self.peer_id = cleartext.source_connection_id;

        subscriber.on_packet_received(PacketNumberSpace::Initial, cleartext.payload.len());
        self.process_payload(
            handle,
            now,
            level,
            cleartext.packet_number,
            cleartext.payload.freeze().into_less_safe_slice(),
            provider,
            subscriber,
            events,
        )
    }

    fn on_handshake<P: Provider, S: Subscriber>(
        &mut self,
        handle: Handle,
        now: Timestamp,
        packet: ProtectedHandshake,
        provider: &P,
        subscriber: &mut S,
        events: &mut Vec<Event>,
    ) -> Result<(), transport::Error> {
        let level = EncryptionLevel::Handshake;
        let base = self.spaces.handshake.expansion_base();

        let cleartext = {
            let Some(keys) = self.spaces.handshake.keys.as_ref() else {
                subscriber.on_packet_dropped(DropReason::KeysUnavailable);
                return Ok(());
            };

            let Ok(packet) = packet.unprotect(&keys.opener.header, base) else {
                subscriber.on_packet_dropped(DropReason::AeadFailure);
                return Ok(());
            };

            if self
                .spaces
                .handshake
                .received
                .contains(packet.packet_number.as_u64())
            {
                subscriber.on_packet_dropped(DropReason::DuplicatePacket);
                return Ok(());
            }

            match packet.decrypt(&keys.opener.packet) {
                Ok(cleartext) => cleartext,
                Err(_) => {
                    subscriber.on_packet_dropped(DropReason::AeadFailure);
                    return Ok(());
                }
            }
        };

        //= https://www.rfc-editor.org/rfc/rfc9001#section-4.9.1
        //# a server MUST discard Initial keys when it first successfully
        //# processes a Handshake packet.
        self.spaces.initial.discard_keys();

        subscriber.on_packet_received(PacketNumberSpace::Handshake, cleartext.payload.len());
        self.process_payload(
            handle,
            now,
            level,
            cleartext.packet_number,
            cleartext.payload.freeze().into_less_safe_slice(),
            provider,
            subscriber,
            events,
        )
    }

    fn on_short<P: Provider, S: Subscriber>(
        &mut self,
        handle: Handle,
        now: Timestamp,
        packet: ProtectedShort,
        provider: &P,
        subscriber: &mut S,
        events: &mut Vec<Event>,
    ) -> Result<(), transport::Error> {
        let level = EncryptionLevel::OneRtt;
        let base = self.spaces.application.expansion_base();

        let cleartext = {
            let Some(keys) = self.spaces.application.keys.as_ref() else {
                subscriber.on_packet_dropped(DropReason::KeysUnavailable);
                return Ok(());
            };

            let Ok(packet) = packet.unprotect(&keys.opener.header, base) else {
                subscriber.on_packet_dropped(DropReason::AeadFailure);
                return Ok(());
            };

            if self
                .spaces
                .application
                .received
                .contains(packet.packet_number.as_u64())
            {
                subscriber.on_packet_dropped(DropReason::DuplicatePacket);
                return Ok(());
            }

            match packet.decrypt(&keys.opener.packet) {
                Ok(cleartext) => cleartext,
                Err(_) => {
                    subscriber.on_packet_dropped(DropReason::AeadFailure);
                    return Ok(());
                }
            }
        };

        subscriber.on_packet_received(PacketNumberSpace::ApplicationData, cleartext.payload.len());
        self.process_payload(
            handle,
            now,
            level,
            cleartext.packet_number,
            cleartext.payload.freeze().into_less_safe_slice(),
            provider,
            subscriber,
            events,
        )
    }

    /// Walks the frames of a decrypted packet
    #[allow(clippy::too_many_arguments)]
    fn process_payload<P: Provider, S: Subscriber>(
        &mut self,
        handle: Handle,
        now: Timestamp,
        level: EncryptionLevel,
        packet_number: PacketNumber,
        payload: &[u8],
        provider: &P,
        subscriber: &mut S,
        events: &mut Vec<Event>,
    ) -> Result<(), transport::Error> {
        if self.state == State::Idle {
            self.state = State::Handshaking;
        }

        let mut buffer = quill_codec::DecoderBuffer::new(payload);
        let mut ack_eliciting = false;

        while !buffer.is_empty() {
            let (frame, remaining) = Frame::decode(buffer)?;
            ack_eliciting |= frame.is_ack_eliciting();

            match frame {
                Frame::Padding(_) | Frame::Ping(_) => {}

                Frame::Ack(ack) => {
                    let space = self.spaces.by_level_mut(level);
                    let largest = ack.largest_acknowledged.as_u64();

                    //= https://www.rfc-editor.org/rfc/rfc9000#section-13.1
                    //# An endpoint SHOULD treat receipt of an acknowledgment
                    //# for a packet it did not send as a connection error of
                    //# type PROTOCOL_VIOLATION
                    if space.is_unsent(largest) {
                        return Err(transport::Error::PROTOCOL_VIOLATION
                            .with_reason("acknowledgment for an unsent packet"));
                    }

                    space.on_largest_acknowledged(largest);
                }

                Frame::Crypto(frame) => {
                    let delivered = self
                        .spaces
                        .by_level_mut(level)
                        .crypto
                        .recv(frame.offset.as_u64(), frame.data)?;

                    if let Some(bytes) = delivered {
                        let Self {
                            session, spaces, ..
                        } = self;

                        let mut context = SessionContext {
                            spaces,
                            events,
                            handle,
                        };
                        session.on_crypto_data(level, &bytes, provider, &mut context)?;
                    }
                }

                Frame::Stream(frame) => {
                    if level != EncryptionLevel::OneRtt {
                        return Err(transport::Error::PROTOCOL_VIOLATION
                            .with_reason("stream frame outside application space"));
                    }

                    events.push(Event::StreamData {
                        connection: handle,
                        stream_id: frame.stream_id,
                        offset: frame.offset,
                        data: Bytes::copy_from_slice(frame.data),
                        fin: frame.is_fin,
                    });
                }

                Frame::ResetStream(frame) => {
                    if level != EncryptionLevel::OneRtt {
                        return Err(transport::Error::PROTOCOL_VIOLATION
                            .with_reason("reset_stream frame outside application space"));
                    }

                    events.push(Event::StreamReset {
                        connection: handle,
                        stream_id: frame.stream_id,
                        error_code: frame.application_error_code,
                    });
                }

                Frame::ConnectionClose(frame) => {
                    let error = transport::Error::new(frame.error_code);
                    self.state = State::Drained;
                    subscriber.on_connection_closed(&error);
                    events.push(Event::ConnectionClosed {
                        connection: handle,
                        error,
                    });
                }

                //= https://www.rfc-editor.org/rfc/rfc9000#section-19.20
                //# A server MUST
                //# treat receipt of a HANDSHAKE_DONE frame as a connection error
                //# of type PROTOCOL_VIOLATION.
                Frame::HandshakeDone(_) => {
                    return Err(transport::Error::PROTOCOL_VIOLATION
                        .with_reason("client sent handshake_done"));
                }
            }

            buffer = remaining;

            if self.state == State::Drained {
                return Ok(());
            }
        }

        self.spaces
            .by_level_mut(level)
            .on_packet_received(packet_number.as_u64(), ack_eliciting, now);

        if self.session.is_complete() && self.state == State::Handshaking {
            self.state = State::Established;
            self.handshake_done_pending = true;
            subscriber.on_handshake_complete();
        }

        Ok(())
    }

    /// Queues application data for transmission on `stream_id`
    pub(crate) fn send_stream(&mut self, stream_id: VarInt, data: Bytes, fin: bool) {
        let offset = self
            .stream_offsets
            .entry(stream_id.as_u64())
            .or_insert(0);
        let start = *offset;
        *offset += data.len() as u64;

        self.pending_streams.push(PendingStream {
            stream_id,
            offset: VarInt::new(start).unwrap_or(VarInt::MAX),
            data,
            fin,
        });
    }

    /// Queues a RESET_STREAM for `stream_id`
    pub(crate) fn reset_stream(&mut self, stream_id: VarInt, error_code: VarInt) {
        let final_size = self
            .stream_offsets
            .get(&stream_id.as_u64())
            .copied()
            .unwrap_or(0);

        // drop not-yet-sent data for the stream
        self.pending_streams
            .retain(|pending| pending.stream_id != stream_id);

        self.pending_resets.push((
            stream_id,
            error_code,
            VarInt::new(final_size).unwrap_or(VarInt::MAX),
        ));
    }

    /// Starts closing with `error`, emitting the CONNECTION_CLOSE on the
    /// next flush
    pub(crate) fn close(
        &mut self,
        handle: Handle,
        error: transport::Error,
        is_application: bool,
        reason: &[u8],
        subscriber: &mut impl Subscriber,
        events: &mut Vec<Event>,
    ) {
        if matches!(self.state, State::Closing | State::Drained | State::Closed) {
            return;
        }

        self.state = State::Closing;
        subscriber.on_connection_closed(&error);
        events.push(Event::ConnectionClosed {
            connection: handle,
            error,
        });
        self.close = Some(CloseState {
            error,
            is_application,
            reason: reason.to_vec(),
            frame_sent: false,
        });
    }

    /// Requeues all unacknowledged handshake data for retransmission.
    ///
    /// The loss-detection policy lives outside the core; this is the lever
    /// it pulls when its timer fires.
    pub(crate) fn mark_handshake_data_lost(&mut self) {
        self.spaces.initial.crypto.mark_lost();
        self.spaces.handshake.crypto.mark_lost();
    }

    /// Builds every datagram this connection currently wants to send
    pub(crate) fn flush<S: Subscriber>(
        &mut self,
        now: Timestamp,
        subscriber: &mut S,
        transmissions: &mut Vec<Transmission>,
    ) {
        if matches!(self.state, State::Drained | State::Closed) {
            return;
        }

        if self.close.is_some() {
            let (error, is_application, reason, frame_sent) = {
                let close = self.close.as_ref().expect("checked above");
                (
                    close.error,
                    close.is_application,
                    close.reason.clone(),
                    close.frame_sent,
                )
            };

            if !frame_sent {
                if let Some(payload) =
                    packet_builder::build_close_datagram(self, error, is_application, &reason)
                {
                    transmissions.push(Transmission {
                        peer_address: self.peer_address,
                        payload,
                    });
                }
                if let Some(close) = self.close.as_mut() {
                    close.frame_sent = true;
                }
            }
            return;
        }

        while let Some(datagram) = packet_builder::build_datagram(self, now, subscriber) {
            transmissions.push(Transmission {
                peer_address: self.peer_address,
                payload: datagram,
            });
        }
    }
}

/// The borrow-splitting adapter the TLS session drives
struct SessionContext<'a> {
    spaces: &'a mut Spaces,
    events: &'a mut Vec<Event>,
    handle: Handle,
}

impl TlsContext for SessionContext<'_> {
    fn on_client_params(&mut self, params: &[u8]) -> Result<(), transport::Error> {
        self.events.push(Event::TransportParameters {
            connection: self.handle,
            parameters: params.to_vec(),
        });
        Ok(())
    }

    fn on_handshake_keys(&mut self, keys: LevelKeys) -> Result<(), transport::Error> {
        if self.spaces.handshake.keys.is_some() {
            return Err(transport::Error::INTERNAL_ERROR
                .with_reason("handshake keys installed twice"));
        }
        self.spaces.handshake.keys = Some(keys);
        Ok(())
    }

    fn on_one_rtt_keys(&mut self, keys: LevelKeys) -> Result<(), transport::Error> {
        if self.spaces.application.keys.is_some() {
            return Err(transport::Error::INTERNAL_ERROR
                .with_reason("application keys installed twice"));
        }
        self.spaces.application.keys = Some(keys);
        Ok(())
    }

    fn on_handshake_complete(&mut self) -> Result<(), transport::Error> {
        self.events.push(Event::HandshakeComplete {
            connection: self.handle,
        });
        Ok(())
    }

    fn send_initial(&mut self, transmission: &[u8]) {
        self.spaces.initial.crypto.push(transmission);
    }

    fn send_handshake(&mut self, transmission: &[u8]) {
        self.spaces.handshake.crypto.push(transmission);
    }
}
