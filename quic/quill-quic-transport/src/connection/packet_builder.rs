// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Egress packet and datagram assembly
//!
//! Payloads are assembled before headers are written, so every Length field
//! is encoded canonically in one pass and the packet number and payload
//! always sit flush behind it. The AEAD runs over the finished plaintext,
//! then header protection masks the first byte and packet number, sampling
//! the ciphertext at `pn_start + 4`.

use crate::{
    connection::{Connection, PendingStream, Spaces},
    event::Subscriber,
    space::PacketSpace,
};
use quill_quic_core::{
    connection::Id,
    crypto::{self, EncryptionLevel, TAG_LEN},
    frame::{self, AckBuilder, ConnectionClose, CryptoRef, HandshakeDone, ResetStream, StreamRef},
    packet::{
        handshake, initial,
        long::VERSION_1,
        number::{PacketNumber, TruncatedPacketNumber},
        short,
    },
    time::Timestamp,
    transport,
    varint::VarInt,
};
use quill_codec::{Encoder, EncoderBuffer, EncoderValue};

//= https://www.rfc-editor.org/rfc/rfc9000#section-14.1
//# A server MUST expand the payload of all UDP datagrams carrying ack-
//# eliciting Initial packets to at least the smallest allowed maximum
//# datagram size of 1200 bytes.
pub(crate) const MAX_DATAGRAM_SIZE: usize = 1200;

/// Keeps the ciphertext long enough for a full header protection sample
/// regardless of the packet number length
const MIN_PACKET_PAYLOAD: usize = 4;

/// The most ACK ranges encoded into one frame
const MAX_ACK_RANGES: usize = 8;

struct Plan {
    level: EncryptionLevel,
    packet_number: PacketNumber,
    truncated: TruncatedPacketNumber,
    payload: Vec<u8>,
}

impl Plan {
    fn size(&self, destination: &Id, source: &Id) -> usize {
        packet_size(
            self.level,
            destination,
            source,
            self.truncated,
            self.payload.len(),
        )
    }
}

/// Exact on-the-wire size of a packet with the given payload length
fn packet_size(
    level: EncryptionLevel,
    destination: &Id,
    source: &Id,
    truncated: TruncatedPacketNumber,
    payload_len: usize,
) -> usize {
    let header_len = match level {
        EncryptionLevel::Initial => initial::Header {
            version: VERSION_1,
            destination_connection_id: destination.as_bytes(),
            source_connection_id: source.as_bytes(),
            token: &[],
            packet_number: truncated,
            payload_len,
        }
        .encoding_size(),
        EncryptionLevel::Handshake => handshake::Header {
            version: VERSION_1,
            destination_connection_id: destination.as_bytes(),
            source_connection_id: source.as_bytes(),
            packet_number: truncated,
            payload_len,
        }
        .encoding_size(),
        EncryptionLevel::ZeroRtt | EncryptionLevel::OneRtt => short::Header {
            destination_connection_id: destination.as_bytes(),
            packet_number: truncated,
        }
        .encoding_size(),
    };

    header_len + payload_len + TAG_LEN
}

/// The worst-case overhead (header with a 4-byte packet number plus tag)
/// used when budgeting payloads
fn overhead_estimate(level: EncryptionLevel, destination: &Id, source: &Id) -> usize {
    let header = match level {
        // tag + version + dcid len + dcid + scid len + scid + token len +
        // 2-byte length
        EncryptionLevel::Initial => 10 + destination.len() + source.len(),
        EncryptionLevel::Handshake => 9 + destination.len() + source.len(),
        EncryptionLevel::ZeroRtt | EncryptionLevel::OneRtt => 1 + destination.len(),
    };

    header + 4 + TAG_LEN
}

/// Builds one coalesced datagram, or `None` when nothing is pending
pub(crate) fn build_datagram<S: Subscriber>(
    connection: &mut Connection,
    now: Timestamp,
    subscriber: &mut S,
) -> Option<Vec<u8>> {
    let destination = connection.peer_id;
    let source = connection.local_id;

    let Connection {
        spaces,
        handshake_done_pending,
        pending_streams,
        pending_resets,
        ..
    } = connection;

    let mut plans: Vec<Plan> = Vec::new();
    let mut used = 0;

    //= https://www.rfc-editor.org/rfc/rfc9000#section-12.2
    //# Senders MUST NOT coalesce QUIC packets
    //# with different connection IDs into a single UDP datagram.
    // one packet per level, in Initial -> Handshake -> 1-RTT order
    for level in [EncryptionLevel::Initial, EncryptionLevel::Handshake] {
        let space = spaces.by_level_mut(level);
        if !space.is_transmission_pending() {
            continue;
        }

        let budget = MAX_DATAGRAM_SIZE
            .saturating_sub(used)
            .saturating_sub(overhead_estimate(level, &destination, &source));
        if budget < MIN_PACKET_PAYLOAD {
            continue;
        }

        if let Some(plan) = plan_crypto_level(space, level, budget, now) {
            used += plan.size(&destination, &source);
            plans.push(plan);
        }
    }

    if spaces.application.keys.is_some() {
        let budget = MAX_DATAGRAM_SIZE
            .saturating_sub(used)
            .saturating_sub(overhead_estimate(EncryptionLevel::OneRtt, &destination, &source));
        if budget >= MIN_PACKET_PAYLOAD {
            if let Some(plan) = plan_application(
                &mut spaces.application,
                handshake_done_pending,
                pending_streams,
                pending_resets,
                budget,
                now,
            ) {
                used += plan.size(&destination, &source);
                plans.push(plan);
            }
        }
    }

    if plans.is_empty() {
        return None;
    }

    // padding travels inside the final packet's plaintext, so it is added
    // pre-AEAD and authenticated like any other frame
    let has_initial = plans
        .iter()
        .any(|plan| plan.level == EncryptionLevel::Initial);
    if has_initial && used < MAX_DATAGRAM_SIZE {
        pad_last_plan(&mut plans, used, &destination, &source);
    }

    Some(assemble(spaces, plans, &destination, &source, subscriber))
}

/// Builds a datagram carrying only a CONNECTION_CLOSE at the highest
/// installed level
pub(crate) fn build_close_datagram(
    connection: &mut Connection,
    error: transport::Error,
    is_application: bool,
    reason: &[u8],
) -> Option<Vec<u8>> {
    let destination = connection.peer_id;
    let source = connection.local_id;
    let spaces = &mut connection.spaces;

    let level = [
        EncryptionLevel::OneRtt,
        EncryptionLevel::Handshake,
        EncryptionLevel::Initial,
    ]
    .into_iter()
    .find(|level| spaces.by_level_mut(*level).keys.is_some())?;

    let reason = if reason.is_empty() {
        None
    } else {
        Some(reason)
    };

    //= https://www.rfc-editor.org/rfc/rfc9000#section-10.2.3
    //# A CONNECTION_CLOSE of type 0x1d MUST be replaced by a CONNECTION_CLOSE
    //# of type 0x1c when sending the frame in Initial or Handshake packets.
    let frame = if is_application && level == EncryptionLevel::OneRtt {
        ConnectionClose {
            error_code: error.code,
            frame_type: None,
            reason,
        }
    } else {
        ConnectionClose {
            error_code: error.code,
            frame_type: Some(error.frame_type.unwrap_or(VarInt::ZERO)),
            reason,
        }
    };

    let mut payload = frame.encode_to_vec();
    while payload.len() < MIN_PACKET_PAYLOAD {
        payload.push(0);
    }

    let space = spaces.by_level_mut(level);
    let (packet_number, truncated) = space.allocate_packet_number()?;

    let plans = vec![Plan {
        level,
        packet_number,
        truncated,
        payload,
    }];

    Some(assemble(spaces, plans, &destination, &source, &mut ()))
}

/// Plans an Initial or Handshake packet: pending ACK plus CRYPTO data
fn plan_crypto_level(
    space: &mut PacketSpace,
    level: EncryptionLevel,
    budget: usize,
    now: Timestamp,
) -> Option<Plan> {
    let mut payload = Vec::new();

    append_ack(space, &mut payload, budget, now);
    append_crypto(space, &mut payload, budget);

    finish_plan(space, level, payload)
}

/// Plans a 1-RTT packet: ACK, HANDSHAKE_DONE, RESET_STREAM and STREAM
/// frames
fn plan_application(
    space: &mut PacketSpace,
    handshake_done_pending: &mut bool,
    pending_streams: &mut Vec<PendingStream>,
    pending_resets: &mut Vec<(VarInt, VarInt, VarInt)>,
    budget: usize,
    now: Timestamp,
) -> Option<Plan> {
    let mut payload = Vec::new();

    append_ack(space, &mut payload, budget, now);
    append_crypto(space, &mut payload, budget);

    if *handshake_done_pending && payload.len() < budget {
        payload.extend_from_slice(&HandshakeDone.encode_to_vec());
        *handshake_done_pending = false;
    }

    while let Some((stream_id, error_code, final_size)) = pending_resets.first().copied() {
        let frame = ResetStream {
            stream_id,
            application_error_code: error_code,
            final_size,
        };
        let encoded = frame.encode_to_vec();
        if payload.len() + encoded.len() > budget {
            break;
        }
        payload.extend_from_slice(&encoded);
        pending_resets.remove(0);
    }

    while let Some(pending) = pending_streams.first_mut() {
        // type + stream id + offset + 4-byte length prefix upper bound
        let frame_overhead =
            1 + pending.stream_id.encoding_size() + pending.offset.encoding_size() + 4;
        let remaining = budget.saturating_sub(payload.len());
        let Some(data_budget) = remaining.checked_sub(frame_overhead) else {
            break;
        };
        if data_budget == 0 {
            break;
        }

        let take = pending.data.len().min(data_budget);
        let frame = StreamRef {
            stream_id: pending.stream_id,
            offset: pending.offset,
            data: &pending.data[..take],
            is_fin: pending.fin && take == pending.data.len(),
        };
        payload.extend_from_slice(&frame.encode_to_vec());

        if take == pending.data.len() {
            pending_streams.remove(0);
        } else {
            // leave the remainder queued at the advanced offset
            pending.offset = pending
                .offset
                .checked_add_usize(take)
                .unwrap_or(VarInt::MAX);
            pending.data = pending.data.slice(take..);
            break;
        }
    }

    finish_plan(space, EncryptionLevel::OneRtt, payload)
}

fn append_ack(space: &mut PacketSpace, payload: &mut Vec<u8>, budget: usize, now: Timestamp) {
    if !space.ack_pending || space.received.is_empty() {
        return;
    }

    let mut ranges = space.received.ack_ranges();
    ranges.truncate(MAX_ACK_RANGES);

    // the delay is scaled down by the default ack_delay_exponent of 3
    // (RFC 9000 §13.2.5, §18.2)
    let ack_delay = space
        .largest_received_time
        .map(|received| now.saturating_duration_since(received).as_micros() as u64 >> 3)
        .unwrap_or(0);

    let ack = AckBuilder {
        ack_delay: VarInt::new(ack_delay).unwrap_or(VarInt::ZERO),
        ranges: &ranges,
    };

    let encoded = ack.encode_to_vec();
    if payload.len() + encoded.len() <= budget {
        payload.extend_from_slice(&encoded);
        space.ack_pending = false;
    }
}

fn append_crypto(space: &mut PacketSpace, payload: &mut Vec<u8>, budget: usize) {
    let remaining = budget.saturating_sub(payload.len());

    let encoded = {
        let Some((offset, data)) = space.crypto.pending() else {
            return;
        };
        let offset = VarInt::new(offset).unwrap_or(VarInt::MAX);

        let Some(len) = CryptoRef::max_data_len(offset, data.len(), remaining) else {
            return;
        };

        let frame = CryptoRef {
            offset,
            data: &data[..len],
        };
        (len, frame.encode_to_vec())
    };

    let (len, bytes) = encoded;
    space.crypto.advance(len);
    payload.extend_from_slice(&bytes);
}

fn finish_plan(space: &mut PacketSpace, level: EncryptionLevel, mut payload: Vec<u8>) -> Option<Plan> {
    if payload.is_empty() {
        return None;
    }

    while payload.len() < MIN_PACKET_PAYLOAD {
        // a run of PADDING frames
        payload.push(frame::Padding { length: 1 }.tag());
    }

    let (packet_number, truncated) = space.allocate_packet_number()?;

    Some(Plan {
        level,
        packet_number,
        truncated,
        payload,
    })
}

/// Grows the last plan's payload with PADDING frames until the datagram
/// reaches `MAX_DATAGRAM_SIZE`, accounting for Length fields that grow with
/// the payload
fn pad_last_plan(plans: &mut [Plan], used: usize, destination: &Id, source: &Id) {
    let Some(last) = plans.last_mut() else {
        return;
    };

    let others = used - last.size(destination, source);
    let mut pad = MAX_DATAGRAM_SIZE - used;

    for _ in 0..4 {
        let candidate = packet_size(
            last.level,
            destination,
            source,
            last.truncated,
            last.payload.len() + pad,
        );
        let total = others + candidate;

        match total.cmp(&MAX_DATAGRAM_SIZE) {
            core::cmp::Ordering::Equal => break,
            core::cmp::Ordering::Less => pad += MAX_DATAGRAM_SIZE - total,
            core::cmp::Ordering::Greater => {
                let excess = total - MAX_DATAGRAM_SIZE;
                if excess >= pad {
                    pad = 0;
                    break;
                }
                pad -= excess;
            }
        }
    }

    last.payload.resize(last.payload.len() + pad, 0);
}

/// Seals and protects every planned packet into one datagram
fn assemble<S: Subscriber>(
    spaces: &mut Spaces,
    plans: Vec<Plan>,
    destination: &Id,
    source: &Id,
    subscriber: &mut S,
) -> Vec<u8> {
    let mut datagram = vec![0u8; MAX_DATAGRAM_SIZE + 64];
    let mut position = 0;

    for plan in plans {
        let packet_start = position;

        // header through the packet number
        let header_total = {
            let mut encoder = EncoderBuffer::new(&mut datagram[packet_start..]);
            match plan.level {
                EncryptionLevel::Initial => encoder.encode(&initial::Header {
                    version: VERSION_1,
                    destination_connection_id: destination.as_bytes(),
                    source_connection_id: source.as_bytes(),
                    token: &[],
                    packet_number: plan.truncated,
                    payload_len: plan.payload.len(),
                }),
                EncryptionLevel::Handshake => encoder.encode(&handshake::Header {
                    version: VERSION_1,
                    destination_connection_id: destination.as_bytes(),
                    source_connection_id: source.as_bytes(),
                    packet_number: plan.truncated,
                    payload_len: plan.payload.len(),
                }),
                EncryptionLevel::ZeroRtt | EncryptionLevel::OneRtt => {
                    encoder.encode(&short::Header {
                        destination_connection_id: destination.as_bytes(),
                        packet_number: plan.truncated,
                    })
                }
            }
            encoder.len()
        };

        let packet_number_len = plan.truncated.len();
        let header_len = header_total - packet_number_len.bytesize();

        let payload_start = packet_start + header_total;
        let packet_end = payload_start + plan.payload.len() + TAG_LEN;
        datagram[payload_start..payload_start + plan.payload.len()]
            .copy_from_slice(&plan.payload);

        let space = spaces.by_level_mut(plan.level);
        let keys = space
            .keys
            .as_ref()
            .expect("planned levels always have keys");

        // encrypt, then protect; the order is load-bearing because the
        // header protection mask is sampled from the ciphertext
        let encrypted = crypto::encrypt(
            &keys.sealer.packet,
            plan.packet_number,
            packet_number_len,
            header_len,
            &mut datagram[packet_start..packet_end],
        )
        .expect("sealing in-memory packets is infallible");

        crypto::protect(&keys.sealer.header, encrypted)
            .expect("planned packets always include a full sample");

        subscriber.on_packet_sent(space.space(), packet_end - packet_start);
        position = packet_end;
    }

    datagram.truncate(position);
    datagram
}
