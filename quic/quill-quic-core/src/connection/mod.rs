// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Connection-level identifiers

pub mod id;

pub use id::Id;
