// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mirrored appliance state.
//!
//! The [`DeviceMirror`] holds the latest known value of every observed
//! `(appliance, ERD)` pair. Values reach it from three sources (scheduled
//! polls, push events, and optimistic writes) and are ordered by the
//! [`Sequence`] taken from a shared [`SequenceClock`] when the value was
//! observed.

mod entry;
mod mirror;

pub use entry::{ErdUpdate, MirrorEntry, Sequence, SequenceClock, UpdateOutcome, UpdateSource};
pub use mirror::DeviceMirror;
