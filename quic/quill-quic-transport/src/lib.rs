// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The quill QUIC server transport: connection state machines behind a
//! datagram-in, datagram-out endpoint
//!
//! The [`endpoint::Endpoint`] is the only entry point. The embedding I/O
//! layer feeds it received UDP datagrams and a timestamp; it returns
//! datagrams to send plus application-facing events. The core performs no
//! I/O and reads no clocks of its own.

pub mod connection;
pub mod endpoint;
pub mod event;
pub mod space;

pub use endpoint::{Endpoint, Event, Output, TimerState, Transmission};
