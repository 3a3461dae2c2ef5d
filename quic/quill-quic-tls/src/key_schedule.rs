// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use hmac::{Hmac, Mac};
use quill_quic_core::crypto::Secret;
use sha2::{Digest, Sha256};

//= https://www.rfc-editor.org/rfc/rfc8446#section-7.1
//#              0
//#              |
//#              v
//#    PSK ->  HKDF-Extract = Early Secret
//#              |
//#              +-----> Derive-Secret(., "ext binder" | "res binder", "")
//#              ...
//#              v
//#        Derive-Secret(., "derived", "")
//#              |
//#              v
//#    (EC)DHE -> HKDF-Extract = Handshake Secret
//#              |
//#              +-----> Derive-Secret(., "c hs traffic",
//#              |                     ClientHello...ServerHello)
//#              +-----> Derive-Secret(., "s hs traffic",
//#              |                     ClientHello...ServerHello)
//#              v
//#        Derive-Secret(., "derived", "")
//#              |
//#              v
//#    0 -> HKDF-Extract = Master Secret
//#              |
//#              +-----> Derive-Secret(., "c ap traffic",
//#              |                     ClientHello...server Finished)
//#              +-----> Derive-Secret(., "s ap traffic",
//#                                    ClientHello...server Finished)

const ZEROS: [u8; 32] = [0; 32];

#[inline]
fn empty_hash() -> [u8; 32] {
    Sha256::digest([]).into()
}

/// `Handshake Secret` from the ECDHE shared secret (no PSK in this stack)
#[inline]
pub fn handshake_secret(shared_secret: &[u8]) -> Secret {
    let early_secret = Secret::extract(&[], &ZEROS);
    let derived = early_secret.expand_label(b"derived", &empty_hash());
    Secret::extract(derived.as_bytes(), shared_secret)
}

/// `Master Secret` from the handshake secret
#[inline]
pub fn master_secret(handshake_secret: &Secret) -> Secret {
    let derived = handshake_secret.expand_label(b"derived", &empty_hash());
    Secret::extract(derived.as_bytes(), &ZEROS)
}

//= https://www.rfc-editor.org/rfc/rfc8446#section-4.4.4
//# The key used to compute the Finished message is computed from the
//# Base Key defined in Section 4.4 using HKDF (see Section 7.1).
//# Specifically:
//#
//# finished_key =
//#     HKDF-Expand-Label(BaseKey, "finished", "", Hash.length)
//#
//# verify_data =
//#     HMAC(finished_key, Transcript-Hash(Handshake Context,
//#                                        Certificate*, CertificateVerify*))

#[inline]
pub fn finished_verify_data(traffic_secret: &Secret, transcript_hash: &[u8; 32]) -> [u8; 32] {
    let finished_key = traffic_secret.expand_label(b"finished", &[]);

    let mut mac = Hmac::<Sha256>::new_from_slice(finished_key.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(transcript_hash);
    mac.finalize().into_bytes().into()
}
