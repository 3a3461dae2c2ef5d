// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Wire formats and packet protection primitives for the quill QUIC server
//! transport.
//!
//! This crate contains everything below the connection state machine: the
//! variable-length integer codec, long/short packet headers, packet number
//! encoding, the QUIC frame codec, the key schedule, AEAD packet protection
//! and header protection.

#![cfg_attr(all(not(test), not(feature = "std")), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod connection;
pub mod crypto;
pub mod frame;
pub mod packet;
pub mod random;
pub mod time;
pub mod transport;
pub mod varint;
