// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mirror entries and the observations that produce them.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::DecodedValue;
use crate::erd::Erd;
use crate::types::ApplianceId;

/// Position of an observation in the mirror's total order.
///
/// Sequences are assigned when a value is observed: when a poll request is
/// issued, when a push event is received, or when an optimistic write is
/// recorded. A higher sequence always reflects a later observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence(u64);

impl Sequence {
    /// Returns the raw counter value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Shared monotonic source of [`Sequence`] numbers.
///
/// Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct SequenceClock(Arc<AtomicU64>);

impl SequenceClock {
    /// Creates a clock starting at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next sequence. The first call returns `#1`.
    #[must_use]
    pub fn next(&self) -> Sequence {
        Sequence(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Where an observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    /// A scheduled or explicit REST read.
    Poll,
    /// A websocket push event.
    Push,
    /// A locally issued write, not yet confirmed by the service.
    OptimisticWrite,
}

impl UpdateSource {
    /// Returns `true` for observations reported by the service.
    #[must_use]
    pub const fn is_authoritative(self) -> bool {
        matches!(self, Self::Poll | Self::Push)
    }
}

/// The mirrored state of one ERD on one appliance.
///
/// `raw` and `value` are always replaced together, so the decoded value
/// reflects the raw payload stored next to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorEntry {
    /// Raw hex payload.
    pub raw: String,
    /// Decoded value of `raw`.
    pub value: DecodedValue,
    /// When the entry was last replaced.
    pub last_updated: DateTime<Utc>,
    /// Origin of the current value.
    pub source: UpdateSource,
    /// Sequence of the observation that produced the current value.
    pub sequence: Sequence,
    /// Highest authoritative sequence applied to this pair.
    ///
    /// Equal to `sequence` for poll and push entries. Optimistic writes carry
    /// the previous mark forward, so an older authoritative observation stays
    /// discarded after a write replaces a newer one.
    pub authoritative_sequence: Option<Sequence>,
}

impl MirrorEntry {
    /// Returns `true` if an authoritative observation at `sequence` is older
    /// than one already applied.
    #[must_use]
    pub fn supersedes(&self, sequence: Sequence) -> bool {
        self.authoritative_sequence
            .is_some_and(|applied| applied > sequence)
    }
}

/// An observed raw ERD value on its way into the mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErdUpdate {
    /// The appliance the value belongs to.
    pub appliance_id: ApplianceId,
    /// The ERD.
    pub erd: Erd,
    /// Raw hex payload.
    pub raw: String,
    /// Where the value came from.
    pub source: UpdateSource,
    /// When the value was observed.
    pub sequence: Sequence,
}

/// Result of offering an update to the mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The update replaced (or created) the entry.
    Applied,
    /// A newer authoritative observation was already stored.
    Superseded {
        /// Sequence of the value that was kept.
        current: Sequence,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic_and_shared() {
        let clock = SequenceClock::new();
        let other = clock.clone();

        let a = clock.next();
        let b = other.next();
        let c = clock.next();

        assert_eq!(a.value(), 1);
        assert!(a < b && b < c);
    }

    #[test]
    fn authoritative_sources() {
        assert!(UpdateSource::Poll.is_authoritative());
        assert!(UpdateSource::Push.is_authoritative());
        assert!(!UpdateSource::OptimisticWrite.is_authoritative());
    }

    #[test]
    fn sequence_display() {
        assert_eq!(SequenceClock::new().next().to_string(), "#1");
    }
}
