// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end exercises of the endpoint: RFC 9001 Appendix A input, a full
//! synthetic handshake, and application data exchange

use bytes::Bytes;
use hex_literal::hex;
use quill_codec::{DecoderBuffer, DecoderBufferMut, Encoder, EncoderBuffer, EncoderValue};
use quill_quic_core::{
    connection::Id,
    crypto::{self, CipherSuite, InitialSecrets, Keys, Secret},
    frame::{Frame, StreamRef},
    packet::{handshake, initial, long::VERSION_1, number::PacketNumberSpace, short},
    random,
    time::Timestamp,
    varint::VarInt,
};
use quill_quic_tls::{key_schedule, provider::testing::Provider, transcript::Transcript};
use quill_quic_transport::{
    connection::State,
    event::{Counters, DropReason, Subscriber},
    Endpoint, Event,
};
use std::net::SocketAddr;

const EXAMPLE_DCID: [u8; 8] = hex!("8394c8f03e515708");

/// The RFC 9001 Appendix A.2 client Initial datagram
const EXAMPLE_CLIENT_INITIAL: [u8; 1200] = hex!(
    "
   c000000001088394c8f03e5157080000 449e7b9aec34d1b1c98dd7689fb8ec11
   d242b123dc9bd8bab936b47d92ec356c 0bab7df5976d27cd449f63300099f399
   1c260ec4c60d17b31f8429157bb35a12 82a643a8d2262cad67500cadb8e7378c
   8eb7539ec4d4905fed1bee1fc8aafba1 7c750e2c7ace01e6005f80fcb7df6212
   30c83711b39343fa028cea7f7fb5ff89 eac2308249a02252155e2347b63d58c5
   457afd84d05dfffdb20392844ae81215 4682e9cf012f9021a6f0be17ddd0c208
   4dce25ff9b06cde535d0f920a2db1bf3 62c23e596dee38f5a6cf3948838a3aec
   4e15daf8500a6ef69ec4e3feb6b1d98e 610ac8b7ec3faf6ad760b7bad1db4ba3
   485e8a94dc250ae3fdb41ed15fb6a8e5 eba0fc3dd60bc8e30c5c4287e53805db
   059ae0648db2f64264ed5e39be2e20d8 2df566da8dd5998ccabdae053060ae6c
   7b4378e846d29f37ed7b4ea9ec5d82e7 961b7f25a9323851f681d582363aa5f8
   9937f5a67258bf63ad6f1a0b1d96dbd4 faddfcefc5266ba6611722395c906556
   be52afe3f565636ad1b17d508b73d874 3eeb524be22b3dcbc2c7468d54119c74
   68449a13d8e3b95811a198f3491de3e7 fe942b330407abf82a4ed7c1b311663a
   c69890f4157015853d91e923037c227a 33cdd5ec281ca3f79c44546b9d90ca00
   f064c99e3dd97911d39fe9c5d0b23a22 9a234cb36186c4819e8b9c5927726632
   291d6a418211cc2962e20fe47feb3edf 330f2c603a9d48c0fcb5699dbfe58964
   25c5bac4aee82e57a85aaf4e2513e4f0 5796b07ba2ee47d80506f8d2c25e50fd
   14de71e6c418559302f939b0e1abd576 f279c4b2e0feb85c1f28ff18f58891ff
   ef132eef2fa09346aee33c28eb130ff2 8f5b766953334113211996d20011a198
   e3fc433f9f2541010ae17c1bf202580f 6047472fb36857fe843b19f5984009dd
   c324044e847a4f4a0ab34f719595de37 252d6235365e9b84392b061085349d73
   203a4a13e96f5432ec0fd4a1ee65accd d5e3904df54c1da510b0ff20dcc0c77f
   cb2c0e0eb605cb0504db87632cf3d8b4 dae6e705769d1de354270123cb11450e
   fc60ac47683d7b8d0f811365565fd98c 4c8eb936bcab8d069fc33bd801b03ade
   a2e1fbc5aa463d08ca19896d2bf59a07 1b851e6c239052172f296bfb5e724047
   90a2181014f3b94a4e97d117b4381303 68cc39dbb2d198065ae3986547926cd2
   162f40a29f0c3c8745c0f50fba3852e5 66d44575c29d39a03f0cda721984b6f4
   40591f355e12d439ff150aab7613499d bd49adabc8676eef023b15b65bfc5ca0
   6948109f23f350db82123535eb8a7433 bdabcb909271a6ecbcb58b936a88cd4e
   8f2e6ff5800175f113253d8fa9ca8885 c2f552e657dc603f252e1a8e308f76f0
   be79e2fb8f5d5fbbe2e30ecadd220723 c8c0aea8078cdfcb3868263ff8f09400
   54da48781893a7e49ad5aff4af300cd8 04a6b6279ab3ff3afb64491c85194aab
   760d58a606654f9f4400e8b38591356f bf6425aca26dc85244259ff2b19c41b9
   f96f3ca9ec1dde434da7d2d392b905dd f3d1f9af93d1af5950bd493f5aa731b4
   056df31bd267b6b90a079831aaf579be 0a39013137aac6d404f518cfd4684064
   7e78bfe706ca4cf5e9c5453e9f7cfd2b 8b4c8d169a44e55c88d4a9a7f9474241
   1092abbdf8b889e5c199d096e3f24788
    "
);

fn peer() -> SocketAddr {
    "192.0.2.7:4433".parse().unwrap()
}

fn now() -> Timestamp {
    Timestamp::from_micros(1_000_000)
}

fn endpoint() -> Endpoint<Provider, random::testing::Generator, Counters> {
    Endpoint::new(
        Provider::default(),
        random::testing::Generator::default(),
        Counters::default(),
    )
}

/// Decrypts every packet in a server datagram with the given per-level
/// opener keys, returning `(level tag, cleartext payload)` pairs
fn open_datagram(
    datagram: &[u8],
    initial_keys: Option<&Keys>,
    handshake_keys: Option<&Keys>,
    application_keys: Option<&Keys>,
    server_id_len: usize,
) -> Vec<(u8, Vec<u8>)> {
    use quill_quic_core::packet::ProtectedPacket;

    let mut payloads = vec![];
    let mut bytes = datagram.to_vec();
    let mut buffer = DecoderBufferMut::new(&mut bytes);

    while !buffer.is_empty() {
        let (packet, remaining) = ProtectedPacket::decode(buffer, server_id_len).unwrap();
        buffer = remaining;

        match packet {
            ProtectedPacket::Initial(packet) => {
                let keys = initial_keys.expect("unexpected initial packet");
                let base = PacketNumberSpace::Initial.new_packet_number(VarInt::ZERO);
                let packet = packet.unprotect(&keys.header, base).unwrap();
                let packet = packet.decrypt(&keys.packet).unwrap();
                payloads.push((0u8, packet.payload.peek().into_less_safe_slice().to_vec()));
            }
            ProtectedPacket::Handshake(packet) => {
                let keys = handshake_keys.expect("unexpected handshake packet");
                let base = PacketNumberSpace::Handshake.new_packet_number(VarInt::ZERO);
                let packet = packet.unprotect(&keys.header, base).unwrap();
                let packet = packet.decrypt(&keys.packet).unwrap();
                payloads.push((2u8, packet.payload.peek().into_less_safe_slice().to_vec()));
            }
            ProtectedPacket::Short(packet) => {
                let keys = application_keys.expect("unexpected 1-rtt packet");
                let base = PacketNumberSpace::ApplicationData.new_packet_number(VarInt::ZERO);
                let packet = packet.unprotect(&keys.header, base).unwrap();
                let packet = packet.decrypt(&keys.packet).unwrap();
                payloads.push((3u8, packet.payload.peek().into_less_safe_slice().to_vec()));
            }
        }
    }

    payloads
}

/// Collects CRYPTO frame contents (ignoring ordering concerns; the server
/// sends in order) and asserts no unexpected frames appear
fn crypto_bytes(payload: &[u8]) -> Vec<u8> {
    let mut out = vec![];
    let mut buffer = DecoderBuffer::new(payload);
    while !buffer.is_empty() {
        let (frame, remaining) = Frame::decode(buffer).unwrap();
        if let Frame::Crypto(frame) = frame {
            assert_eq!(frame.offset.as_u64(), out.len() as u64, "in-order crypto");
            out.extend_from_slice(frame.data);
        }
        buffer = remaining;
    }
    out
}

fn frames(payload: &[u8]) -> Vec<u8> {
    let mut tags = vec![];
    let mut buffer = DecoderBuffer::new(payload);
    while !buffer.is_empty() {
        let (frame, remaining) = Frame::decode(buffer).unwrap();
        tags.push(frame.tag());
        buffer = remaining;
    }
    tags
}

#[test]
fn rfc_client_initial_test() {
    let mut endpoint = endpoint();
    let mut datagram = EXAMPLE_CLIENT_INITIAL.to_vec();

    let output = endpoint.recv(peer(), &mut datagram, now());

    // the client's transport parameters surface exactly once
    let parameters: Vec<_> = output
        .events
        .iter()
        .filter(|event| matches!(event, Event::TransportParameters { .. }))
        .collect();
    assert_eq!(parameters.len(), 1);

    // the handshake is not complete until the client's Finished arrives
    assert!(!output
        .events
        .iter()
        .any(|event| matches!(event, Event::HandshakeComplete { .. })));

    assert!(!output.transmissions.is_empty());

    //= https://www.rfc-editor.org/rfc/rfc9000#section-14.1
    //= type=test
    //# every datagram carrying the server's Initial is at least 1200 bytes
    let first = &output.transmissions[0];
    assert!(first.payload.len() >= 1200, "initial datagram must be padded");

    // the first datagram opens with the server Initial carrying an ACK of
    // packet 2 and the start of the ServerHello
    let secrets = InitialSecrets::new(&EXAMPLE_DCID);
    let server_keys = Keys::from_secret(&secrets.server, CipherSuite::TlsAes128GcmSha256);

    let mut bytes = first.payload.clone();
    let buffer = DecoderBufferMut::new(&mut bytes);
    let (packet, _) =
        quill_quic_core::packet::ProtectedPacket::decode(buffer, 8).unwrap();
    let quill_quic_core::packet::ProtectedPacket::Initial(packet) = packet else {
        panic!("expected the server flight to lead with an Initial");
    };

    let base = PacketNumberSpace::Initial.new_packet_number(VarInt::ZERO);
    let packet = packet.unprotect(&server_keys.header, base).unwrap();
    let packet = packet.decrypt(&server_keys.packet).unwrap();

    let payload = packet.payload.peek().into_less_safe_slice().to_vec();
    let mut sh = vec![];
    let mut saw_ack = false;
    let mut buffer = DecoderBuffer::new(&payload);
    while !buffer.is_empty() {
        let (frame, remaining) = Frame::decode(buffer).unwrap();
        match frame {
            Frame::Ack(ack) => {
                saw_ack = true;
                assert_eq!(ack.largest_acknowledged.as_u64(), 2);
            }
            Frame::Crypto(frame) => sh.extend_from_slice(frame.data),
            Frame::Padding(_) => {}
            other => panic!("unexpected frame in server initial: {other:?}"),
        }
        buffer = remaining;
    }

    assert!(saw_ack, "the server must acknowledge the client initial");
    // ServerHello, 3-byte length, legacy version
    assert_eq!(sh[0], 2);
    assert_eq!(&sh[4..6], &[0x03, 0x03]);
}

#[test]
fn duplicate_client_initial_test() {
    let mut endpoint = endpoint();

    let mut first = EXAMPLE_CLIENT_INITIAL.to_vec();
    let output = endpoint.recv(peer(), &mut first, now());
    assert_eq!(
        output
            .events
            .iter()
            .filter(|event| matches!(event, Event::TransportParameters { .. }))
            .count(),
        1
    );

    // the exact same datagram again: same packet number, silently dropped
    let mut second = EXAMPLE_CLIENT_INITIAL.to_vec();
    let output = endpoint.recv(peer(), &mut second, now());
    assert!(output.events.is_empty(), "no state change on replay");
    assert!(endpoint.subscriber().packets_dropped > 0);
}

#[test]
fn unknown_short_header_test() {
    let mut endpoint = endpoint();

    // a short-header packet for a connection that does not exist
    let mut datagram = vec![0x40u8; 64];
    let output = endpoint.recv(peer(), &mut datagram, now());
    assert!(output.transmissions.is_empty());
    assert!(output.events.is_empty());
    assert_eq!(endpoint.subscriber().packets_dropped, 1);
}

// === a full synthetic handshake ===

/// Everything the simulated client knows
struct TestClient {
    secret: x25519_dalek::StaticSecret,
    transcript: Transcript,
    initial: Keys,
    server_initial: Keys,
    odcid: Id,
    /// the server's chosen SCID, learned from its first reply
    server_id: Option<Id>,
    handshake_secret: Option<Secret>,
    client_hs_secret: Option<Secret>,
    server_hs_secret: Option<Secret>,
    client_ap_secret: Option<Secret>,
    server_ap_secret: Option<Secret>,
    packet_number: u64,
}

impl TestClient {
    fn new(odcid: [u8; 8]) -> Self {
        let odcid = Id::try_from_bytes(&odcid).unwrap();
        let secrets = InitialSecrets::new(odcid.as_bytes());

        Self {
            secret: x25519_dalek::StaticSecret::from([0x42u8; 32]),
            transcript: Transcript::default(),
            initial: Keys::from_secret(&secrets.client, CipherSuite::TlsAes128GcmSha256),
            server_initial: Keys::from_secret(&secrets.server, CipherSuite::TlsAes128GcmSha256),
            odcid,
            server_id: None,
            handshake_secret: None,
            client_hs_secret: None,
            server_hs_secret: None,
            client_ap_secret: None,
            server_ap_secret: None,
            packet_number: 0,
        }
    }

    fn public_key(&self) -> [u8; 32] {
        *x25519_dalek::PublicKey::from(&self.secret).as_bytes()
    }

    /// A minimal but fully valid ClientHello
    fn client_hello(&self) -> Vec<u8> {
        let mut body = vec![];
        body.extend_from_slice(&[0x03, 0x03]);
        body.extend_from_slice(&[0x11; 32]);
        // empty legacy session id
        body.push(0);
        // cipher_suites: TLS_AES_128_GCM_SHA256
        body.extend_from_slice(&[0x00, 0x02, 0x13, 0x01]);
        // legacy compression
        body.extend_from_slice(&[0x01, 0x00]);

        let mut extensions = vec![];
        // supported_versions: TLS 1.3
        extensions.extend_from_slice(&hex!("002b 0003 02 0304"));
        // signature_algorithms: ecdsa_secp256r1_sha256
        extensions.extend_from_slice(&hex!("000d 0004 0002 0403"));
        // key_share: x25519
        extensions.extend_from_slice(&hex!("0033 0026 0024 001d 0020"));
        extensions.extend_from_slice(&self.public_key());
        // quic_transport_parameters (empty is fine for this server)
        extensions.extend_from_slice(&hex!("0039 0000"));

        body.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
        body.extend_from_slice(&extensions);

        let mut message = vec![1, 0, 0, 0];
        message[1] = (body.len() >> 16) as u8;
        message[2] = (body.len() >> 8) as u8;
        message[3] = body.len() as u8;
        message.extend_from_slice(&body);
        message
    }

    fn next_packet_number(&mut self) -> (u64, quill_quic_core::packet::number::TruncatedPacketNumber) {
        let value = self.packet_number;
        self.packet_number += 1;

        let space = PacketNumberSpace::Initial;
        let packet_number = space.new_packet_number(VarInt::new(value).unwrap());
        let truncated = packet_number
            .truncate(space.new_packet_number(VarInt::ZERO))
            .unwrap();
        (value, truncated)
    }

    /// Seals a client Initial datagram carrying `payload` frames, padded to
    /// 1200 bytes
    fn seal_initial(&mut self, payload_frames: &[u8]) -> Vec<u8> {
        let (packet_number, truncated) = self.next_packet_number();

        // pad the plaintext so the datagram reaches 1200
        let overhead = 10 + self.odcid.len() + truncated.bytesize() + 16;
        let mut payload = payload_frames.to_vec();
        payload.resize(1200 - overhead, 0);

        let header = initial::Header {
            version: VERSION_1,
            destination_connection_id: self.odcid.as_bytes(),
            source_connection_id: &[],
            token: &[],
            packet_number: truncated,
            payload_len: payload.len(),
        };

        seal(&self.initial, header, truncated, packet_number, &payload)
    }

    fn seal_handshake(&mut self, payload_frames: &[u8]) -> Vec<u8> {
        let (packet_number, truncated) = self.next_packet_number();
        let keys = Keys::from_secret(
            self.client_hs_secret.as_ref().unwrap(),
            CipherSuite::TlsAes128GcmSha256,
        );

        let mut payload = payload_frames.to_vec();
        while payload.len() < 4 {
            payload.push(0);
        }

        let header = handshake::Header {
            version: VERSION_1,
            destination_connection_id: self.server_id.as_ref().unwrap().as_bytes(),
            source_connection_id: &[],
            packet_number: truncated,
            payload_len: payload.len(),
        };

        seal(&keys, header, truncated, packet_number, &payload)
    }

    fn seal_application(&mut self, payload_frames: &[u8]) -> Vec<u8> {
        let (packet_number, truncated) = self.next_packet_number();
        let keys = Keys::from_secret(
            self.client_ap_secret.as_ref().unwrap(),
            CipherSuite::TlsAes128GcmSha256,
        );

        let mut payload = payload_frames.to_vec();
        while payload.len() < 4 {
            payload.push(0);
        }

        let header = short::Header {
            destination_connection_id: self.server_id.as_ref().unwrap().as_bytes(),
            packet_number: truncated,
        };

        seal(&keys, header, truncated, packet_number, &payload)
    }

    /// Processes the server's first flight, deriving every secret the same
    /// way a real client would
    fn process_server_flight(&mut self, flights: &[Vec<u8>], client_hello: &[u8]) -> Vec<u8> {
        use quill_quic_core::packet::ProtectedPacket;

        self.transcript.update(client_hello);

        let mut initial_crypto = vec![];
        let mut handshake_crypto = vec![];

        for datagram in flights {
            // learn the server's connection ID from the first long header
            if self.server_id.is_none() {
                // dcil lives right after tag + version
                let scil_index = 5 + 1 + datagram[5] as usize;
                let scil = datagram[scil_index] as usize;
                self.server_id = Some(
                    Id::try_from_bytes(&datagram[scil_index + 1..scil_index + 1 + scil]).unwrap(),
                );
            }

            let mut bytes = datagram.clone();
            let mut buffer = DecoderBufferMut::new(&mut bytes);
            while !buffer.is_empty() {
                let (packet, remaining) =
                    ProtectedPacket::decode(buffer, self.server_id.as_ref().unwrap().len())
                        .unwrap();
                buffer = remaining;

                match packet {
                    ProtectedPacket::Initial(packet) => {
                        let base = PacketNumberSpace::Initial.new_packet_number(VarInt::ZERO);
                        let packet = packet
                            .unprotect(&self.server_initial.header, base)
                            .unwrap();
                        let packet = packet.decrypt(&self.server_initial.packet).unwrap();
                        let payload = packet.payload.peek().into_less_safe_slice().to_vec();
                        initial_crypto.extend_from_slice(&crypto_bytes(&payload));
                    }
                    ProtectedPacket::Handshake(packet) => {
                        let keys = Keys::from_secret(
                            self.server_hs_secret
                                .as_ref()
                                .expect("handshake data must follow the server hello"),
                            CipherSuite::TlsAes128GcmSha256,
                        );
                        let base = PacketNumberSpace::Handshake.new_packet_number(VarInt::ZERO);
                        let packet = packet.unprotect(&keys.header, base).unwrap();
                        let packet = packet.decrypt(&keys.packet).unwrap();
                        let payload = packet.payload.peek().into_less_safe_slice().to_vec();
                        handshake_crypto.extend_from_slice(&crypto_bytes(&payload));
                    }
                    ProtectedPacket::Short(_) => {
                        panic!("unexpected 1-rtt packet in the first flight")
                    }
                }

                // after the full ServerHello, handshake secrets become
                // available
                if self.handshake_secret.is_none() && !initial_crypto.is_empty() {
                    let server_hello = initial_crypto.clone();
                    self.transcript.update(&server_hello);

                    let key_share =
                        &server_hello[server_hello.len() - 38..server_hello.len() - 6];
                    let mut server_public = [0u8; 32];
                    server_public.copy_from_slice(key_share);
                    let shared = self
                        .secret
                        .diffie_hellman(&x25519_dalek::PublicKey::from(server_public));

                    let handshake_secret = key_schedule::handshake_secret(shared.as_bytes());
                    let transcript_hash = self.transcript.current();
                    self.client_hs_secret =
                        Some(handshake_secret.expand_label(b"c hs traffic", &transcript_hash));
                    self.server_hs_secret =
                        Some(handshake_secret.expand_label(b"s hs traffic", &transcript_hash));
                    self.handshake_secret = Some(handshake_secret);
                }
            }
        }

        assert!(
            !handshake_crypto.is_empty(),
            "the first flight must coalesce or follow with handshake data"
        );

        // EncryptedExtensions .. server Finished
        self.transcript_handshake_messages(&handshake_crypto);

        let transcript_hash = self.transcript.current();
        let master = key_schedule::master_secret(self.handshake_secret.as_ref().unwrap());
        self.client_ap_secret = Some(master.expand_label(b"c ap traffic", &transcript_hash));
        self.server_ap_secret = Some(master.expand_label(b"s ap traffic", &transcript_hash));

        // the client Finished proves the handshake secret
        let verify_data = key_schedule::finished_verify_data(
            self.client_hs_secret.as_ref().unwrap(),
            &transcript_hash,
        );

        let mut finished = vec![20, 0, 0, 32];
        finished.extend_from_slice(&verify_data);
        finished
    }

    /// Verifies the server flight is EE, Certificate, CertificateVerify,
    /// Finished and mixes each into the transcript
    fn transcript_handshake_messages(&mut self, mut bytes: &[u8]) {
        let mut types = vec![];
        while !bytes.is_empty() {
            let length = u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]) as usize;
            let (message, rest) = bytes.split_at(4 + length);
            types.push(message[0]);
            self.transcript.update(message);
            bytes = rest;
        }
        assert_eq!(types, vec![8, 11, 15, 20]);
    }
}

/// Seals one packet into a standalone datagram
fn seal<H: EncoderValue>(
    keys: &Keys,
    header: H,
    truncated: quill_quic_core::packet::number::TruncatedPacketNumber,
    packet_number: u64,
    payload: &[u8],
) -> Vec<u8> {
    let mut datagram = vec![0u8; 1500];

    let header_total = {
        let mut encoder = EncoderBuffer::new(&mut datagram);
        encoder.encode(&header);
        encoder.len()
    };

    let header_len = header_total - truncated.bytesize();
    let end = header_total + payload.len() + crypto::TAG_LEN;
    datagram[header_total..header_total + payload.len()].copy_from_slice(payload);

    let space = truncated.space();
    let packet_number = space.new_packet_number(VarInt::new(packet_number).unwrap());

    let encrypted = crypto::encrypt(
        &keys.packet,
        packet_number,
        truncated.len(),
        header_len,
        &mut datagram[..end],
    )
    .unwrap();
    crypto::protect(&keys.header, encrypted).unwrap();

    datagram.truncate(end);
    datagram
}

/// Builds a CRYPTO frame around handshake bytes
fn crypto_frame(data: &[u8]) -> Vec<u8> {
    let mut frame = vec![0x06, 0x00];
    let mut length = [0u8; 8];
    let len = {
        let mut encoder = EncoderBuffer::new(&mut length);
        encoder.encode(&VarInt::new(data.len() as u64).unwrap());
        encoder.len()
    };
    frame.extend_from_slice(&length[..len]);
    frame.extend_from_slice(data);
    frame
}

#[test]
fn full_handshake_test() {
    let mut endpoint = endpoint();
    let mut client = TestClient::new(EXAMPLE_DCID);

    // --- flight 1: ClientHello ---
    let client_hello = client.client_hello();
    let mut datagram = client.seal_initial(&crypto_frame(&client_hello));
    let output = endpoint.recv(peer(), &mut datagram, now());

    assert!(!output.transmissions.is_empty());
    let flights: Vec<_> = output
        .transmissions
        .iter()
        .map(|transmission| transmission.payload.clone())
        .collect();

    // --- client processes the flight and answers with Finished, coalescing
    // an Initial-level ACK and the Handshake-level Finished into a single
    // datagram ---
    let finished = client.process_server_flight(&flights, &client_hello);

    // ACK of the server's Initial packet 0
    let mut datagram = client.seal_initial(&[0x02, 0x00, 0x00, 0x00, 0x00]);
    datagram.extend_from_slice(&client.seal_handshake(&crypto_frame(&finished)));
    let output = endpoint.recv(peer(), &mut datagram, now());

    let handle = output
        .events
        .iter()
        .find_map(|event| match event {
            Event::HandshakeComplete { connection } => Some(*connection),
            _ => None,
        })
        .expect("handshake must complete after the client Finished");

    assert_eq!(endpoint.connection_state(handle), Some(State::Established));
    assert_eq!(endpoint.subscriber().handshakes_completed, 1);

    // the server confirms with HANDSHAKE_DONE at 1-RTT (possibly coalesced
    // behind a Handshake-level ACK)
    let server_ap_keys = Keys::from_secret(
        client.server_ap_secret.as_ref().unwrap(),
        CipherSuite::TlsAes128GcmSha256,
    );
    let server_hs_keys = Keys::from_secret(
        client.server_hs_secret.as_ref().unwrap(),
        CipherSuite::TlsAes128GcmSha256,
    );
    let mut saw_handshake_done = false;
    for transmission in &output.transmissions {
        for (level, payload) in open_datagram(
            &transmission.payload,
            None,
            Some(&server_hs_keys),
            Some(&server_ap_keys),
            client.server_id.as_ref().unwrap().len(),
        ) {
            if level == 3 && frames(&payload).contains(&0x1e) {
                saw_handshake_done = true;
            }
        }
    }
    assert!(saw_handshake_done, "the server must send HANDSHAKE_DONE");

    // --- 1-RTT: client sends stream data ---
    let stream_frame = StreamRef {
        stream_id: VarInt::ZERO,
        offset: VarInt::ZERO,
        data: b"abc",
        is_fin: true,
    }
    .encode_to_vec();

    let mut datagram = client.seal_application(&stream_frame);
    let output = endpoint.recv(peer(), &mut datagram, now());

    let stream_event = output
        .events
        .iter()
        .find_map(|event| match event {
            Event::StreamData {
                stream_id,
                offset,
                data,
                fin,
                ..
            } => Some((*stream_id, *offset, data.clone(), *fin)),
            _ => None,
        })
        .expect("stream data must surface");

    assert_eq!(stream_event.0, VarInt::ZERO);
    assert_eq!(stream_event.1, VarInt::ZERO);
    assert_eq!(&stream_event.2[..], b"abc");
    assert!(stream_event.3);

    // --- server sends stream data back ---
    let output = endpoint.send_stream(
        handle,
        VarInt::ZERO,
        Bytes::from_static(b"response"),
        true,
        now(),
    );
    assert!(!output.transmissions.is_empty());

    let mut server_stream = None;
    for transmission in &output.transmissions {
        for (level, payload) in open_datagram(
            &transmission.payload,
            None,
            None,
            Some(&server_ap_keys),
            client.server_id.as_ref().unwrap().len(),
        ) {
            assert_eq!(level, 3);
            let mut buffer = DecoderBuffer::new(&payload);
            while !buffer.is_empty() {
                let (frame, remaining) = Frame::decode(buffer).unwrap();
                if let Frame::Stream(frame) = frame {
                    server_stream = Some((frame.stream_id, frame.data.to_vec(), frame.is_fin));
                }
                buffer = remaining;
            }
        }
    }

    let (stream_id, data, fin) = server_stream.expect("server stream data must be sent");
    assert_eq!(stream_id, VarInt::ZERO);
    assert_eq!(data, b"response");
    assert!(fin);
}

#[test]
fn missing_key_share_closes_test() {
    let mut endpoint = endpoint();
    let mut client = TestClient::new(EXAMPLE_DCID);

    // rebuild the hello without its key_share extension
    let client_hello = {
        let full = client.client_hello();
        strip_extension(&full, 0x0033)
    };

    let mut datagram = client.seal_initial(&crypto_frame(&client_hello));
    let output = endpoint.recv(peer(), &mut datagram, now());

    // missing_extension (109) maps into the CRYPTO_ERROR range
    let closed = output
        .events
        .iter()
        .find_map(|event| match event {
            Event::ConnectionClosed { error, .. } => Some(*error),
            _ => None,
        })
        .expect("the connection must close");
    assert_eq!(closed.code.as_u64(), 0x100 + 109);

    // the close materializes as a CONNECTION_CLOSE datagram
    let secrets = InitialSecrets::new(&EXAMPLE_DCID);
    let server_keys = Keys::from_secret(&secrets.server, CipherSuite::TlsAes128GcmSha256);

    let payloads = open_datagram(
        &output.transmissions[0].payload,
        Some(&server_keys),
        None,
        None,
        8,
    );
    let (_, payload) = &payloads[0];
    assert_eq!(payload[0], 0x1c);

    let buffer = DecoderBuffer::new(&payload[1..]);
    let (error_code, _) = buffer.decode::<VarInt>().unwrap();
    assert_eq!(error_code.as_u64(), 0x100 + 109);
}

#[test]
fn tls12_only_client_closes_test() {
    let mut endpoint = endpoint();
    let mut client = TestClient::new(EXAMPLE_DCID);

    let client_hello = {
        let full = client.client_hello();
        // replace supported_versions' 0x0304 with 0x0303
        let mut bytes = full.clone();
        let position = bytes
            .windows(7)
            .position(|window| window == hex!("002b0003020304"))
            .unwrap();
        bytes[position + 5..position + 7].copy_from_slice(&hex!("0303"));
        bytes
    };

    let mut datagram = client.seal_initial(&crypto_frame(&client_hello));
    let output = endpoint.recv(peer(), &mut datagram, now());

    let closed = output
        .events
        .iter()
        .find_map(|event| match event {
            Event::ConnectionClosed { error, .. } => Some(*error),
            _ => None,
        })
        .expect("the connection must close");

    // protocol_version (70)
    assert_eq!(closed.code.as_u64(), 0x100 + 70);
}

#[test]
fn destroy_mid_handshake_test() {
    let mut endpoint = endpoint();

    let mut datagram = EXAMPLE_CLIENT_INITIAL.to_vec();
    let output = endpoint.recv(peer(), &mut datagram, now());

    let handle = output
        .events
        .iter()
        .find_map(|event| match event {
            Event::TransportParameters { connection, .. } => Some(*connection),
            _ => None,
        })
        .unwrap();
    assert_eq!(endpoint.connection_state(handle), Some(State::Handshaking));

    // the caller may destroy at any time; the keying material zeroizes on
    // drop and the routes disappear
    endpoint.destroy(handle);
    assert_eq!(endpoint.connection_state(handle), None);

    // a replayed datagram now creates a brand-new connection
    let mut datagram = EXAMPLE_CLIENT_INITIAL.to_vec();
    let output = endpoint.recv(peer(), &mut datagram, now());
    assert!(!output.transmissions.is_empty());
    assert_eq!(endpoint.subscriber().connections_created, 2);
}

#[test]
fn retransmit_test() {
    let mut endpoint = endpoint();

    let mut datagram = EXAMPLE_CLIENT_INITIAL.to_vec();
    let output = endpoint.recv(peer(), &mut datagram, now());
    let first_flight: usize = output
        .transmissions
        .iter()
        .map(|transmission| transmission.payload.len())
        .sum();
    assert!(first_flight > 0);

    let handle = output
        .events
        .iter()
        .find_map(|event| match event {
            Event::TransportParameters { connection, .. } => Some(*connection),
            _ => None,
        })
        .unwrap();

    // after the flush, nothing is pending until the timer says otherwise
    let timer = endpoint.timer_state(handle).unwrap();
    assert!(!timer.has_ack_eliciting_data);
    assert!(!timer.ack_pending);
    assert_eq!(timer.latest_ack_eliciting_time, Some(now()));

    // the external loss timer decides the flight was lost
    let output = endpoint.retransmit(handle, now());
    assert!(
        !output.transmissions.is_empty(),
        "handshake data must be retransmittable"
    );

    // with nothing newly pending, a tick produces nothing
    let output = endpoint.tick(now());
    assert!(output.transmissions.is_empty());
}

#[test]
fn drop_counters_test() {
    let mut endpoint = endpoint();

    // a malformed datagram: long header with truncated fields
    let mut datagram = hex!("c0000000").to_vec();
    let output = endpoint.recv(peer(), &mut datagram, now());
    assert!(output.transmissions.is_empty());
    assert_eq!(endpoint.subscriber().packets_dropped, 1);

    // exercise the tuple subscriber composition
    let mut pair = (Counters::default(), Counters::default());
    pair.on_packet_dropped(DropReason::MalformedHeader);
    assert_eq!(pair.0.packets_dropped, 1);
    assert_eq!(pair.1.packets_dropped, 1);
}

/// Removes one extension from a ClientHello message (header included)
fn strip_extension(message: &[u8], extension_type: u16) -> Vec<u8> {
    let body = &message[4..];

    // fixed fields: version + random + session id + suites + compression
    let mut offset = 2 + 32;
    let session_id_len = body[offset] as usize;
    offset += 1 + session_id_len;
    let suites_len = u16::from_be_bytes([body[offset], body[offset + 1]]) as usize;
    offset += 2 + suites_len;
    let compression_len = body[offset] as usize;
    offset += 1 + compression_len;

    let extensions_start = offset + 2;
    let mut extensions = vec![];
    let mut cursor = &body[extensions_start..];
    while !cursor.is_empty() {
        let this_type = u16::from_be_bytes([cursor[0], cursor[1]]);
        let len = u16::from_be_bytes([cursor[2], cursor[3]]) as usize;
        if this_type != extension_type {
            extensions.extend_from_slice(&cursor[..4 + len]);
        }
        cursor = &cursor[4 + len..];
    }

    let mut out = body[..offset].to_vec();
    out.extend_from_slice(&(extensions.len() as u16).to_be_bytes());
    out.extend_from_slice(&extensions);

    let mut message = vec![1, 0, 0, 0];
    message[1] = (out.len() >> 16) as u8;
    message[2] = (out.len() >> 8) as u8;
    message[3] = out.len() as u8;
    message.extend_from_slice(&out);
    message
}
