// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The server handshake state machine, driven by reassembled CRYPTO bytes

use crate::{
    context::{Context, LevelKeys},
    error::Error,
    key_schedule,
    message::{
        certificate, Certificate, CertificateVerify, ClientHello, EncryptedExtensions, Finished,
        HandshakeHeader, HandshakeType, ServerHello,
    },
    provider::Provider,
    transcript::Transcript,
};
use quill_codec::{DecoderBuffer, EncoderValue};
use quill_quic_core::{
    crypto::{CipherSuite, EncryptionLevel, Keys, Secret},
    random, transport,
};
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

/// Handshake messages never legitimately grow past this in QUIC; a peer
/// that tries is buffering-attacking us
const MAX_MESSAGE_LEN: usize = 0x1_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Idle,
    ClientHelloReceived,
    ServerHelloSent,
    HandshakeKeysInstalled,
    FinishedSent,
    Complete,
}

/// A single connection's server-side TLS 1.3 handshake
pub struct Session {
    state: State,
    transcript: Transcript,
    /// Present until the ClientHello's key share is processed
    secret_key: Option<StaticSecret>,
    server_random: [u8; 32],
    recv_initial: Vec<u8>,
    recv_handshake: Vec<u8>,
    /// The verify data the client's Finished must carry
    client_finished_verify: Option<Zeroizing<[u8; 32]>>,
}

impl core::fmt::Debug for Session {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Session").field("state", &self.state).finish()
    }
}

impl Session {
    /// Creates a session with a fresh X25519 key pair and server random
    pub fn new(random: &mut dyn random::Generator) -> Self {
        let mut scalar = [0u8; 32];
        random.private_random_fill(&mut scalar);
        let secret_key = StaticSecret::from(scalar);
        scalar.zeroize();

        let mut server_random = [0u8; 32];
        random.public_random_fill(&mut server_random);

        Self {
            state: State::Idle,
            transcript: Transcript::default(),
            secret_key: Some(secret_key),
            server_random,
            recv_initial: Vec::new(),
            recv_handshake: Vec::new(),
            client_finished_verify: None,
        }
    }

    #[inline]
    pub fn state(&self) -> State {
        self.state
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// Feeds contiguous CRYPTO stream bytes received at `level`
    ///
    /// Progress is reported through `context`; a returned error must close
    /// the connection with the contained code.
    pub fn on_crypto_data<C: Context, P: Provider>(
        &mut self,
        level: EncryptionLevel,
        data: &[u8],
        provider: &P,
        context: &mut C,
    ) -> Result<(), transport::Error> {
        match level {
            EncryptionLevel::Initial => {
                self.recv_initial.extend_from_slice(data);
                while let Some(message) = take_message(&mut self.recv_initial)? {
                    self.on_initial_message(&message, provider, context)?;
                }
            }
            EncryptionLevel::Handshake => {
                self.recv_handshake.extend_from_slice(data);
                while let Some(message) = take_message(&mut self.recv_handshake)? {
                    self.on_handshake_message(&message, context)?;
                }
            }
            EncryptionLevel::ZeroRtt | EncryptionLevel::OneRtt => {
                if !data.is_empty() {
                    return Err(Error::unexpected_message(
                        "unexpected crypto data at application level",
                    )
                    .into());
                }
            }
        }

        Ok(())
    }

    fn on_initial_message<C: Context, P: Provider>(
        &mut self,
        message: &[u8],
        provider: &P,
        context: &mut C,
    ) -> Result<(), transport::Error> {
        let (header, _) = DecoderBuffer::new(message)
            .decode::<HandshakeHeader>()
            .map_err(Error::from)?;

        if !matches!((self.state, header.handshake_type()), (State::Idle, Some(HandshakeType::ClientHello))) {
            return Err(Error::unexpected_message("unexpected initial-level message").into());
        }

        self.on_client_hello(message, provider, context)
    }

    fn on_client_hello<C: Context, P: Provider>(
        &mut self,
        message: &[u8],
        provider: &P,
        context: &mut C,
    ) -> Result<(), transport::Error> {
        let body = DecoderBuffer::new(&message[HandshakeHeader::LEN..]);
        let client_hello = ClientHello::decode(body).map_err(transport::Error::from)?;
        let suite = client_hello.cipher_suite;

        self.transcript.update(message);
        self.state = State::ClientHelloReceived;

        context.on_client_params(client_hello.transport_parameters)?;

        //= https://www.rfc-editor.org/rfc/rfc7748#section-6.1
        //# Both MAY check, without leaking extra information about the value of
        //# K, whether K is the all-zero value and abort if so
        let secret_key = self
            .secret_key
            .take()
            .ok_or_else(|| transport::Error::INTERNAL_ERROR.with_reason("key share consumed"))?;
        let public_key = PublicKey::from(&secret_key);
        let shared_secret = secret_key.diffie_hellman(&PublicKey::from(client_hello.key_share));
        if shared_secret.as_bytes().iter().all(|byte| *byte == 0) {
            return Err(Error::illegal_parameter("low order x25519 key share").into());
        }

        // ServerHello goes out at the Initial level
        let server_hello = ServerHello {
            random: &self.server_random,
            session_id_echo: client_hello.session_id,
            cipher_suite: suite,
            key_share: public_key.as_bytes(),
        }
        .encode_to_vec();
        self.transcript.update(&server_hello);
        context.send_initial(&server_hello);
        self.state = State::ServerHelloSent;

        // handshake keys install the moment the ServerHello is queued; the
        // rest of the flight already travels at the Handshake level
        let handshake_secret = key_schedule::handshake_secret(shared_secret.as_bytes());
        let transcript_hash = self.transcript.current();
        let client_secret = handshake_secret.expand_label(b"c hs traffic", &transcript_hash);
        let server_secret = handshake_secret.expand_label(b"s hs traffic", &transcript_hash);

        context.on_handshake_keys(level_keys(&client_secret, &server_secret, suite))?;
        self.state = State::HandshakeKeysInstalled;

        // the remainder of the server flight goes out at the Handshake level
        let mut flight = Vec::new();

        append(&mut flight, &mut self.transcript, &EncryptedExtensions {
            transport_parameters: provider.transport_parameters(),
        });

        append(&mut flight, &mut self.transcript, &Certificate {
            chain: provider.certificate_chain(),
        });

        let signature = provider.sign(&certificate::signature_content(&self.transcript.current()));
        append(&mut flight, &mut self.transcript, &CertificateVerify {
            algorithm: provider.signature_scheme(),
            signature: &signature,
        });

        let verify_data =
            key_schedule::finished_verify_data(&server_secret, &self.transcript.current());
        append(&mut flight, &mut self.transcript, &Finished {
            verify_data: &verify_data,
        });

        context.send_handshake(&flight);

        // the application traffic secrets use the transcript through the
        // server Finished (RFC 8446 §7.1)
        let master_secret = key_schedule::master_secret(&handshake_secret);
        let transcript_hash = self.transcript.current();
        let client_application = master_secret.expand_label(b"c ap traffic", &transcript_hash);
        let server_application = master_secret.expand_label(b"s ap traffic", &transcript_hash);

        context.on_one_rtt_keys(level_keys(&client_application, &server_application, suite))?;

        // the client proves possession of the handshake secret, so its
        // Finished is computed over the same transcript point
        self.client_finished_verify = Some(Zeroizing::new(key_schedule::finished_verify_data(
            &client_secret,
            &transcript_hash,
        )));

        self.state = State::FinishedSent;
        Ok(())
    }

    fn on_handshake_message<C: Context>(
        &mut self,
        message: &[u8],
        context: &mut C,
    ) -> Result<(), transport::Error> {
        let (header, _) = DecoderBuffer::new(message)
            .decode::<HandshakeHeader>()
            .map_err(Error::from)?;

        if !matches!(
            (self.state, header.handshake_type()),
            (State::FinishedSent, Some(HandshakeType::Finished))
        ) {
            return Err(Error::unexpected_message("unexpected handshake-level message").into());
        }

        let verify_data = &message[HandshakeHeader::LEN..];
        let expected = self
            .client_finished_verify
            .take()
            .ok_or_else(|| transport::Error::INTERNAL_ERROR.with_reason("finished consumed"))?;

        //= https://www.rfc-editor.org/rfc/rfc8446#section-4.4.4
        //# Recipients of Finished messages MUST verify that the contents are
        //# correct and if incorrect MUST terminate the connection with a
        //# "decrypt_error" alert.
        if verify_data.ct_eq(&expected[..]).unwrap_u8() == 0 {
            return Err(Error::decrypt_error("client finished does not verify").into());
        }

        self.transcript.update(message);
        self.state = State::Complete;
        context.on_handshake_complete()?;

        Ok(())
    }
}

fn level_keys(client_secret: &Secret, server_secret: &Secret, suite: CipherSuite) -> LevelKeys {
    LevelKeys {
        opener: Keys::from_secret(client_secret, suite),
        sealer: Keys::from_secret(server_secret, suite),
    }
}

/// Encodes a message into the flight and mixes it into the transcript
fn append<Message: EncoderValue>(
    flight: &mut Vec<u8>,
    transcript: &mut Transcript,
    message: &Message,
) {
    let start = flight.len();
    flight.extend_from_slice(&message.encode_to_vec());
    transcript.update(&flight[start..]);
}

/// Takes one complete handshake message off the front of `buffer`
fn take_message(buffer: &mut Vec<u8>) -> Result<Option<Vec<u8>>, Error> {
    if buffer.len() < HandshakeHeader::LEN {
        return Ok(None);
    }

    let (header, _) = DecoderBuffer::new(buffer).decode::<HandshakeHeader>()?;
    let total = HandshakeHeader::LEN + header.length as usize;

    if total > MAX_MESSAGE_LEN {
        return Err(Error::decode_error("handshake message too long"));
    }

    if buffer.len() < total {
        return Ok(None);
    }

    let message = buffer[..total].to_vec();
    buffer.drain(..total);
    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testing::Provider as TestProvider;
    use hex_literal::hex;
    use quill_quic_core::random::testing::Generator;

    #[derive(Default)]
    struct TestContext {
        client_params: Option<Vec<u8>>,
        handshake_keys: Option<LevelKeys>,
        one_rtt_keys: Option<LevelKeys>,
        complete: bool,
        initial_out: Vec<u8>,
        handshake_out: Vec<u8>,
    }

    impl Context for TestContext {
        fn on_client_params(&mut self, params: &[u8]) -> Result<(), transport::Error> {
            self.client_params = Some(params.to_vec());
            Ok(())
        }

        fn on_handshake_keys(&mut self, keys: LevelKeys) -> Result<(), transport::Error> {
            assert!(self.handshake_keys.is_none(), "keys must install only once");
            self.handshake_keys = Some(keys);
            Ok(())
        }

        fn on_one_rtt_keys(&mut self, keys: LevelKeys) -> Result<(), transport::Error> {
            assert!(self.one_rtt_keys.is_none(), "keys must install only once");
            self.one_rtt_keys = Some(keys);
            Ok(())
        }

        fn on_handshake_complete(&mut self) -> Result<(), transport::Error> {
            self.complete = true;
            Ok(())
        }

        fn send_initial(&mut self, transmission: &[u8]) {
            self.initial_out.extend_from_slice(transmission);
        }

        fn send_handshake(&mut self, transmission: &[u8]) {
            self.handshake_out.extend_from_slice(transmission);
        }
    }

    fn example_client_hello() -> Vec<u8> {
        // the ClientHello carried in the RFC 9001 A.2 Initial packet
        let mut message = hex!("010000ed").to_vec();
        message.extend_from_slice(&crate::message::client_hello::tests::EXAMPLE_CLIENT_HELLO_BODY);
        message
    }

    #[test]
    fn full_flight_test() {
        let mut session = Session::new(&mut Generator::default());
        let provider = TestProvider::default();
        let mut context = TestContext::default();

        assert_eq!(session.state(), State::Idle);

        session
            .on_crypto_data(
                EncryptionLevel::Initial,
                &example_client_hello(),
                &provider,
                &mut context,
            )
            .unwrap();

        assert_eq!(session.state(), State::FinishedSent);
        assert_eq!(
            context.client_params.as_deref(),
            Some(&hex!("0408ffffffffffffffff05048000ffff07048000ffff0801100104800075300901100f088394c8f03e51570806048000ffff")[..])
        );
        assert!(context.handshake_keys.is_some());
        assert!(context.one_rtt_keys.is_some());
        assert!(!context.complete);

        // the ServerHello leads the initial transmission
        assert_eq!(context.initial_out[0], 2);
        // EncryptedExtensions leads the handshake transmission, which ends
        // with the server Finished
        assert_eq!(context.handshake_out[0], 8);
        let finished_offset = context.handshake_out.len() - 36;
        assert_eq!(context.handshake_out[finished_offset], 20);
    }

    #[test]
    fn fragmented_client_hello_test() {
        let mut session = Session::new(&mut Generator::default());
        let provider = TestProvider::default();
        let mut context = TestContext::default();

        let message = example_client_hello();
        let (first, second) = message.split_at(100);

        session
            .on_crypto_data(EncryptionLevel::Initial, first, &provider, &mut context)
            .unwrap();
        assert_eq!(session.state(), State::Idle);

        session
            .on_crypto_data(EncryptionLevel::Initial, second, &provider, &mut context)
            .unwrap();
        assert_eq!(session.state(), State::FinishedSent);
    }

    #[test]
    fn client_finished_test() {
        let mut session = Session::new(&mut Generator::default());
        let provider = TestProvider::default();
        let mut context = TestContext::default();

        session
            .on_crypto_data(
                EncryptionLevel::Initial,
                &example_client_hello(),
                &provider,
                &mut context,
            )
            .unwrap();

        // compute the verify data the same way the client would
        let expected = session.client_finished_verify.as_ref().unwrap();
        let mut finished = vec![20, 0, 0, 32];
        finished.extend_from_slice(&expected[..]);

        session
            .on_crypto_data(EncryptionLevel::Handshake, &finished, &provider, &mut context)
            .unwrap();

        assert!(session.is_complete());
        assert!(context.complete);
    }

    #[test]
    fn bad_client_finished_test() {
        let mut session = Session::new(&mut Generator::default());
        let provider = TestProvider::default();
        let mut context = TestContext::default();

        session
            .on_crypto_data(
                EncryptionLevel::Initial,
                &example_client_hello(),
                &provider,
                &mut context,
            )
            .unwrap();

        let finished = [&[20u8, 0, 0, 32][..], &[0xaa; 32][..]].concat();
        let error = session
            .on_crypto_data(EncryptionLevel::Handshake, &finished, &provider, &mut context)
            .unwrap_err();

        // decrypt_error
        assert_eq!(error.code.as_u64(), 0x100 + 51);
    }

    #[test]
    fn duplicate_client_hello_test() {
        let mut session = Session::new(&mut Generator::default());
        let provider = TestProvider::default();
        let mut context = TestContext::default();

        let mut doubled = example_client_hello();
        doubled.extend_from_slice(&example_client_hello());

        let error = session
            .on_crypto_data(EncryptionLevel::Initial, &doubled, &provider, &mut context)
            .unwrap_err();

        // unexpected_message
        assert_eq!(error.code.as_u64(), 0x100 + 10);
    }

    #[test]
    fn missing_key_share_closes_test() {
        let mut session = Session::new(&mut Generator::default());
        let provider = TestProvider::default();
        let mut context = TestContext::default();

        // a ClientHello with every extension but key_share
        let body = crate::message::client_hello::tests::strip_extension(
            crate::extension::id::KEY_SHARE,
        );
        let mut message = vec![1, 0, 0, body.len() as u8];
        message[2] = (body.len() >> 8) as u8;
        message.extend_from_slice(&body);

        let error = session
            .on_crypto_data(EncryptionLevel::Initial, &message, &provider, &mut context)
            .unwrap_err();

        // missing_extension
        assert_eq!(error.code.as_u64(), 0x100 + 109);
    }
}
