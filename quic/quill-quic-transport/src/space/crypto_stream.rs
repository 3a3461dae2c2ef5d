// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Reassembly of one encryption level's CRYPTO stream, plus the outbound
//! CRYPTO byte queue for the same level

use quill_quic_core::transport;
use std::collections::BTreeMap;

//= https://www.rfc-editor.org/rfc/rfc9000#section-7.5
//# Implementations MUST support buffering at least 4096 bytes of data
//# received in out-of-order CRYPTO frames.
const MAX_BUFFERED: usize = 65536;

/// An offset-addressed sparse buffer that releases bytes to the TLS engine
/// once they become contiguous
#[derive(Debug, Default)]
pub struct CryptoStream {
    /// Bytes already handed to the TLS engine
    delivered: u64,
    /// Pending out-of-order chunks, keyed by start offset; disjoint and
    /// non-adjacent after normalization
    chunks: BTreeMap<u64, Vec<u8>>,
    buffered: usize,

    /// Outbound handshake bytes for this level
    tx_data: Vec<u8>,
    /// How much of `tx_data` has been packetized
    tx_sent: usize,
}

impl CryptoStream {
    /// Ingests one CRYPTO frame, returning any newly contiguous bytes
    ///
    /// Data below the delivery point is discarded as retransmission.
    /// Overlaps with still-buffered data must match byte-for-byte
    /// (RFC 9000 §2.2); contradictions close the connection.
    pub fn recv(
        &mut self,
        offset: u64,
        data: &[u8],
    ) -> Result<Option<Vec<u8>>, transport::Error> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(transport::Error::FRAME_ENCODING_ERROR.with_reason("crypto offset overflow"))?;

        // drop the already-delivered prefix
        let (offset, data) = if offset < self.delivered {
            if end <= self.delivered {
                return Ok(None);
            }
            let skip = (self.delivered - offset) as usize;
            (self.delivered, &data[skip..])
        } else {
            (offset, data)
        };

        if data.is_empty() {
            return Ok(None);
        }

        // absorb overlaps with buffered chunks, verifying consistency
        let mut merged_offset = offset;
        let mut merged = data.to_vec();

        // a predecessor chunk may cover or abut the new data
        let predecessor = self
            .chunks
            .range(..=offset)
            .next_back()
            .map(|(start, chunk)| (*start, chunk.len()));
        if let Some((start, len)) = predecessor {
            let chunk_end = start + len as u64;
            if chunk_end >= offset {
                let chunk = self.chunks.remove(&start).expect("chunk exists");
                self.buffered -= chunk.len();

                // verify the overlapping region matches
                let overlap = ((chunk_end - offset) as usize).min(merged.len());
                if chunk[(offset - start) as usize..][..overlap] != merged[..overlap] {
                    return Err(stream_corruption());
                }

                if chunk_end >= offset + merged.len() as u64 {
                    // the predecessor covers the new data entirely
                    merged = chunk;
                } else {
                    let tail_start = (chunk_end - offset) as usize;
                    let mut combined = chunk;
                    combined.extend_from_slice(&merged[tail_start..]);
                    merged = combined;
                }
                merged_offset = start;
            }
        }

        // successors that start inside (or abut) the merged region
        loop {
            let merged_end = merged_offset + merged.len() as u64;
            let successor = self
                .chunks
                .range(merged_offset..=merged_end)
                .next()
                .map(|(start, _)| *start);
            let Some(start) = successor else { break };

            let chunk = self.chunks.remove(&start).expect("chunk exists");
            self.buffered -= chunk.len();

            // verify the overlapping region matches
            let overlap = ((merged_end - start) as usize).min(chunk.len());
            if merged[(start - merged_offset) as usize..][..overlap] != chunk[..overlap] {
                return Err(stream_corruption());
            }

            if chunk.len() > overlap {
                merged.extend_from_slice(&chunk[overlap..]);
            }
        }

        // past the cap, the connection closes with CRYPTO_BUFFER_EXCEEDED
        // rather than buffering without bound (RFC 9000 §7.5)
        if self.buffered + merged.len() > MAX_BUFFERED {
            return Err(transport::Error::CRYPTO_BUFFER_EXCEEDED
                .with_reason("crypto reassembly buffer exceeded"));
        }

        if merged_offset == self.delivered {
            self.delivered += merged.len() as u64;
            return Ok(Some(merged));
        }

        self.buffered += merged.len();
        self.chunks.insert(merged_offset, merged);
        Ok(None)
    }

    /// Total bytes handed to the TLS engine so far
    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Queues outbound handshake bytes
    #[inline]
    pub fn push(&mut self, data: &[u8]) {
        self.tx_data.extend_from_slice(data);
    }

    /// The not-yet-packetized outbound bytes and their stream offset
    #[inline]
    pub fn pending(&self) -> Option<(u64, &[u8])> {
        if self.tx_sent < self.tx_data.len() {
            Some((self.tx_sent as u64, &self.tx_data[self.tx_sent..]))
        } else {
            None
        }
    }

    #[inline]
    pub fn has_pending(&self) -> bool {
        self.tx_sent < self.tx_data.len()
    }

    /// Marks `len` pending bytes as packetized
    #[inline]
    pub fn advance(&mut self, len: usize) {
        debug_assert!(self.tx_sent + len <= self.tx_data.len());
        self.tx_sent += len;
    }

    /// Requeues everything for retransmission; driven by the external loss
    /// timer through `Endpoint::tick`
    #[inline]
    pub fn mark_lost(&mut self) {
        self.tx_sent = 0;
    }
}

fn stream_corruption() -> transport::Error {
    //= https://www.rfc-editor.org/rfc/rfc9000#section-2.2
    //# An endpoint could receive data for a stream at the same offset
    //# multiple times.  Data that has already been received can be
    //# discarded.  The data at a given offset MUST NOT change if it is sent
    //# multiple times; an endpoint MAY treat receipt of different data at
    //# the same offset as a connection error of type PROTOCOL_VIOLATION.
    transport::Error::PROTOCOL_VIOLATION.with_reason("crypto stream data changed between deliveries")
}
