// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use sha2::{Digest, Sha256};

//= https://www.rfc-editor.org/rfc/rfc8446#section-4.4.1
//# Transcript-Hash(M1, M2, ... Mn) = Hash(M1 || M2 || ... || Mn)

/// The running hash over every handshake message, in wire order, including
/// the 4-byte message headers
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    hash: Sha256,
}

impl Transcript {
    /// Mixes one complete handshake message into the transcript
    #[inline]
    pub fn update(&mut self, message: &[u8]) {
        self.hash.update(message);
    }

    /// Returns the transcript hash at the current point of the handshake
    #[inline]
    pub fn current(&self) -> [u8; 32] {
        self.hash.clone().finalize().into()
    }
}
