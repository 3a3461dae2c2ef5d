// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! HKDF plumbing shared by the initial key derivation and the TLS key
//! schedule.
//!
//! Every secret travels inside [`Secret`], which zeroizes its bytes when
//! dropped.

use crate::crypto::label;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// The output length of the negotiated hash function (SHA-256)
pub const LEN: usize = 32;

/// A 32-byte secret derived by the key schedule
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret([u8; LEN]);

impl core::fmt::Debug for Secret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // never log secret material
        f.write_str("Secret(..)")
    }
}

impl Secret {
    /// `HKDF-Extract(salt, ikm)`
    #[inline]
    pub fn extract(salt: &[u8], ikm: &[u8]) -> Self {
        let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), ikm);
        Self(prk.into())
    }

    /// `HKDF-Expand-Label(secret, label, context, len)` with `len` fixed to
    /// the hash output length
    #[inline]
    pub fn expand_label(&self, label_name: &[u8], context: &[u8]) -> Self {
        let mut out = [0; LEN];
        self.expand_label_into(label_name, context, &mut out);
        Self(out)
    }

    /// `HKDF-Expand-Label(secret, label, context, out.len())`
    #[inline]
    pub fn expand_label_into(&self, label_name: &[u8], context: &[u8], out: &mut [u8]) {
        let mut info = InfoBuffer::default();
        label::compute_label(out.len(), label_name, &mut info);
        // splice the context into the trailing zero-length context slot
        info.set_context(context);

        let hkdf = Hkdf::<Sha256>::from_prk(&self.0).expect("secret length is a valid prk");
        hkdf.expand(info.as_slice(), out)
            .expect("label output length is within hkdf bounds");
    }

    /// `HKDF-Expand(secret, info, out.len())` with a precomputed info block
    #[inline]
    pub fn expand_raw_into(&self, info: &[u8], out: &mut [u8]) {
        let hkdf = Hkdf::<Sha256>::from_prk(&self.0).expect("secret length is a valid prk");
        hkdf.expand(info, out)
            .expect("output length is within hkdf bounds");
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; LEN] {
        &self.0
    }
}

impl From<[u8; LEN]> for Secret {
    #[inline]
    fn from(bytes: [u8; LEN]) -> Self {
        Self(bytes)
    }
}

/// Stack buffer holding an `HkdfLabel` structure
///
/// The layout is `len(2) || label(1 + n) || context(1 + m)`; labels are at
/// most 255 bytes and the context is a hash output, so 512 covers every use.
struct InfoBuffer {
    bytes: [u8; 512],
    len: usize,
}

impl Default for InfoBuffer {
    fn default() -> Self {
        Self {
            bytes: [0; 512],
            len: 0,
        }
    }
}

impl InfoBuffer {
    #[inline]
    fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Replaces the empty context written by `compute_label` with `context`
    #[inline]
    fn set_context(&mut self, context: &[u8]) {
        if context.is_empty() {
            return;
        }

        debug_assert!(context.len() <= u8::MAX as usize);
        // compute_label wrote a zero context length as the final byte
        self.bytes[self.len - 1] = context.len() as u8;
        self.bytes[self.len..self.len + context.len()].copy_from_slice(context);
        self.len += context.len();
    }
}

impl Extend<u8> for InfoBuffer {
    #[inline]
    fn extend<T: IntoIterator<Item = u8>>(&mut self, iter: T) {
        for byte in iter {
            self.bytes[self.len] = byte;
            self.len += 1;
        }
    }
}
