// Copyright The Quill Project Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Monotonic time values supplied by the embedding I/O layer.
//!
//! The core performs no clock reads of its own; every entry point that needs
//! a notion of "now" takes a `Timestamp` from the caller.

use core::{ops::Add, time::Duration};

/// A point in time, measured in microseconds from an epoch chosen by the
/// embedding layer. Only differences between timestamps are meaningful.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    #[inline]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    #[inline]
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Returns the duration elapsed since `earlier`, or zero if `earlier`
    /// is in the future.
    #[inline]
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    #[inline]
    fn add(self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_micros() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_since_test() {
        let a = Timestamp::from_micros(100);
        let b = Timestamp::from_micros(350);
        assert_eq!(b.saturating_duration_since(a), Duration::from_micros(250));
        assert_eq!(a.saturating_duration_since(b), Duration::ZERO);
        assert_eq!(a + Duration::from_micros(250), b);
    }
}
