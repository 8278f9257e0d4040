// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory mirror of appliance ERD values.

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{ErdUpdate, MirrorEntry, Sequence, SequenceClock, UpdateOutcome, UpdateSource};
use crate::codec::{self, DecodedValue};
use crate::erd::Erd;
use crate::error::{DecodeError, EncodeError};
use crate::event::{ApplianceEvent, EventBus};
use crate::types::ApplianceId;

/// Latest known value of every observed `(appliance, ERD)` pair.
///
/// Poll results, push events, and optimistic writes all land here. Updates
/// are applied per key under the map's shard lock, so concurrent writers on
/// different keys never block each other, and writers on the same key are
/// serialized.
///
/// Ordering rule: an authoritative update is discarded when a higher
/// authoritative [`Sequence`] has already been applied to the pair, even if
/// an optimistic write has replaced that value since. Optimistic entries
/// never block an authoritative update that is at least as new.
///
/// # Examples
///
/// ```
/// use smarthq_lib::erd::Erd;
/// use smarthq_lib::event::EventBus;
/// use smarthq_lib::state::{DeviceMirror, ErdUpdate, UpdateSource};
/// use smarthq_lib::types::ApplianceId;
///
/// let mirror = DeviceMirror::new(EventBus::new());
/// let id = ApplianceId::from("D828C9D1");
///
/// mirror.update(ErdUpdate {
///     appliance_id: id.clone(),
///     erd: Erd::DoorStatus,
///     raw: "01".to_string(),
///     source: UpdateSource::Push,
///     sequence: mirror.next_sequence(),
/// }).unwrap();
///
/// let entry = mirror.get(&id, Erd::DoorStatus).unwrap();
/// assert_eq!(entry.value.as_flag(), Some(true));
/// ```
#[derive(Debug)]
pub struct DeviceMirror {
    entries: DashMap<(ApplianceId, Erd), MirrorEntry>,
    clock: SequenceClock,
    events: EventBus,
}

impl DeviceMirror {
    /// Creates an empty mirror that announces changes on `events`.
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self {
            entries: DashMap::new(),
            clock: SequenceClock::new(),
            events,
        }
    }

    /// Returns the shared sequence clock.
    #[must_use]
    pub fn clock(&self) -> &SequenceClock {
        &self.clock
    }

    /// Takes the next sequence number from the mirror's clock.
    #[must_use]
    pub fn next_sequence(&self) -> Sequence {
        self.clock.next()
    }

    /// Returns the current entry, if the pair has been observed.
    #[must_use]
    pub fn get(&self, appliance_id: &ApplianceId, erd: Erd) -> Option<MirrorEntry> {
        self.entries
            .get(&(appliance_id.clone(), erd))
            .map(|entry| entry.value().clone())
    }

    /// Returns every entry of one appliance, ordered by ERD.
    #[must_use]
    pub fn snapshot(&self, appliance_id: &ApplianceId) -> Vec<(Erd, MirrorEntry)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .filter(|item| &item.key().0 == appliance_id)
            .map(|item| (item.key().1, item.value().clone()))
            .collect();
        entries.sort_by_key(|(erd, _)| *erd);
        entries
    }

    /// Returns the number of mirrored pairs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing has been observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry of an appliance. Returns how many were removed.
    pub fn remove_appliance(&self, appliance_id: &ApplianceId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(id, _), _| id != appliance_id);
        before.saturating_sub(self.entries.len())
    }

    /// Offers an observed raw value to the mirror.
    ///
    /// The payload is decoded first; on failure the stored entry is left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the payload cannot be decoded.
    pub fn update(&self, update: ErdUpdate) -> Result<UpdateOutcome, DecodeError> {
        self.apply(update).map(|(outcome, _)| outcome)
    }

    /// Records a locally issued write before the service confirms it.
    ///
    /// The value is encoded against the current raw payload, so composite
    /// ERDs keep their untouched bytes. The next authoritative observation
    /// for the pair replaces the optimistic entry, unless it is older than
    /// one already applied.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError`] if the value cannot be encoded.
    pub fn optimistic_set(
        &self,
        appliance_id: &ApplianceId,
        erd: Erd,
        value: &DecodedValue,
    ) -> Result<MirrorEntry, EncodeError> {
        let current = self.get(appliance_id, erd).map(|entry| entry.raw);
        let raw = codec::encode(erd, value, current.as_deref())?;
        Ok(self.optimistic_set_raw(appliance_id, erd, raw)?)
    }

    /// Records an already encoded write.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the payload cannot be decoded.
    pub fn optimistic_set_raw(
        &self,
        appliance_id: &ApplianceId,
        erd: Erd,
        raw: String,
    ) -> Result<MirrorEntry, DecodeError> {
        let sequence = self.next_sequence();
        // Optimistic writes are never superseded.
        let (_, entry) = self.apply(ErdUpdate {
            appliance_id: appliance_id.clone(),
            erd,
            raw,
            source: UpdateSource::OptimisticWrite,
            sequence,
        })?;
        Ok(entry)
    }

    /// Returns the outcome together with the entry built from `update`.
    fn apply(&self, update: ErdUpdate) -> Result<(UpdateOutcome, MirrorEntry), DecodeError> {
        let ErdUpdate {
            appliance_id,
            erd,
            raw,
            source,
            sequence,
        } = update;

        let value = codec::decode(erd, &raw).inspect_err(|e| {
            tracing::warn!(
                appliance_id = %appliance_id,
                erd = %erd,
                source = ?source,
                error = %e,
                "Discarding undecodable ERD value"
            );
        })?;

        let mut entry = MirrorEntry {
            raw,
            value,
            last_updated: Utc::now(),
            source,
            sequence,
            authoritative_sequence: source.is_authoritative().then_some(sequence),
        };

        match self.entries.entry((appliance_id.clone(), erd)) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if source.is_authoritative() && current.supersedes(sequence) {
                    let current = current.authoritative_sequence.unwrap_or(current.sequence);
                    tracing::debug!(
                        appliance_id = %appliance_id,
                        erd = %erd,
                        sequence = %sequence,
                        current = %current,
                        "Discarding superseded ERD value"
                    );
                    return Ok((UpdateOutcome::Superseded { current }, entry));
                }
                if !source.is_authoritative() {
                    entry.authoritative_sequence = current.authoritative_sequence;
                }
                occupied.insert(entry.clone());
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry.clone());
            }
        }

        tracing::trace!(
            appliance_id = %appliance_id,
            erd = %erd,
            raw = %entry.raw,
            source = ?source,
            sequence = %sequence,
            "ERD value applied"
        );
        self.events.publish(ApplianceEvent::ErdChanged {
            appliance_id,
            erd,
            entry: entry.clone(),
        });

        Ok((UpdateOutcome::Applied, entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Temperature;

    fn mirror() -> DeviceMirror {
        DeviceMirror::new(EventBus::new())
    }

    fn update(
        mirror: &DeviceMirror,
        erd: Erd,
        raw: &str,
        source: UpdateSource,
        sequence: Sequence,
    ) -> Result<UpdateOutcome, DecodeError> {
        mirror.update(ErdUpdate {
            appliance_id: ApplianceId::from("A1"),
            erd,
            raw: raw.to_string(),
            source,
            sequence,
        })
    }

    #[test]
    fn first_observation_creates_entry() {
        let m = mirror();
        let id = ApplianceId::from("A1");
        assert!(m.get(&id, Erd::DoorStatus).is_none());

        let seq = m.next_sequence();
        assert_eq!(
            update(&m, Erd::DoorStatus, "01", UpdateSource::Poll, seq),
            Ok(UpdateOutcome::Applied)
        );

        let entry = m.get(&id, Erd::DoorStatus).unwrap();
        assert_eq!(entry.raw, "01");
        assert_eq!(entry.value, DecodedValue::Flag(true));
        assert_eq!(entry.source, UpdateSource::Poll);
        assert_eq!(entry.sequence, seq);
    }

    #[test]
    fn older_observation_does_not_clobber_newer() {
        let m = mirror();
        let s1 = m.next_sequence();
        let s2 = m.next_sequence();
        let s3 = m.next_sequence();

        update(&m, Erd::SoundLevel, "01", UpdateSource::Poll, s1).unwrap();
        update(&m, Erd::SoundLevel, "03", UpdateSource::Push, s3).unwrap();
        let outcome = update(&m, Erd::SoundLevel, "02", UpdateSource::Poll, s2).unwrap();

        assert_eq!(outcome, UpdateOutcome::Superseded { current: s3 });
        let entry = m.get(&ApplianceId::from("A1"), Erd::SoundLevel).unwrap();
        assert_eq!(entry.raw, "03");
        assert_eq!(entry.source, UpdateSource::Push);
    }

    #[test]
    fn decode_failure_keeps_previous_value() {
        let m = mirror();
        update(&m, Erd::DoorStatus, "00", UpdateSource::Poll, m.next_sequence()).unwrap();

        let err = update(&m, Erd::DoorStatus, "zz", UpdateSource::Push, m.next_sequence());
        assert!(matches!(err, Err(DecodeError::InvalidHex { .. })));

        let entry = m.get(&ApplianceId::from("A1"), Erd::DoorStatus).unwrap();
        assert_eq!(entry.raw, "00");
    }

    #[test]
    fn optimistic_value_is_visible_then_replaced() {
        let m = mirror();
        let id = ApplianceId::from("A1");
        let poll_seq = m.next_sequence();

        let entry = m
            .optimistic_set(&id, Erd::UpperOvenLight, &DecodedValue::Flag(true))
            .unwrap();
        assert_eq!(entry.raw, "01");
        assert_eq!(entry.source, UpdateSource::OptimisticWrite);

        // A poll issued before the write still replaces the optimistic value.
        let outcome = update(&m, Erd::UpperOvenLight, "00", UpdateSource::Poll, poll_seq).unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied);
        let entry = m.get(&id, Erd::UpperOvenLight).unwrap();
        assert_eq!(entry.value, DecodedValue::Flag(false));
        assert_eq!(entry.source, UpdateSource::Poll);
    }

    #[test]
    fn slow_poll_stays_discarded_after_optimistic_write() {
        let m = mirror();
        let id = ApplianceId::from("A1");
        let poll_seq = m.next_sequence();
        let push_seq = m.next_sequence();

        update(&m, Erd::SoundLevel, "03", UpdateSource::Push, push_seq).unwrap();
        let written = m
            .optimistic_set(&id, Erd::SoundLevel, &DecodedValue::Integer(4))
            .unwrap();
        assert_eq!(written.authoritative_sequence, Some(push_seq));

        let outcome = update(&m, Erd::SoundLevel, "01", UpdateSource::Poll, poll_seq).unwrap();
        assert_eq!(outcome, UpdateOutcome::Superseded { current: push_seq });
        let entry = m.get(&id, Erd::SoundLevel).unwrap();
        assert_eq!(entry.raw, "04");
        assert_eq!(entry.source, UpdateSource::OptimisticWrite);

        // A newer push still replaces the optimistic value.
        let next = m.next_sequence();
        update(&m, Erd::SoundLevel, "02", UpdateSource::Push, next).unwrap();
        let entry = m.get(&id, Erd::SoundLevel).unwrap();
        assert_eq!(entry.raw, "02");
        assert_eq!(entry.authoritative_sequence, Some(next));
    }

    #[test]
    fn optimistic_cook_mode_preserves_record() {
        let m = mirror();
        let id = ApplianceId::from("A1");
        update(&m, Erd::UpperOvenCookMode, "aa0096ff", UpdateSource::Poll, m.next_sequence())
            .unwrap();

        let entry = m
            .optimistic_set(
                &id,
                Erd::UpperOvenCookMode,
                &DecodedValue::Temperature(Temperature::from_celsius(200.0)),
            )
            .unwrap();
        assert_eq!(entry.raw, "aa0188ff");
    }

    #[test]
    fn optimistic_cook_mode_without_payload_fails() {
        let m = mirror();
        let err = m
            .optimistic_set(
                &ApplianceId::from("A1"),
                Erd::UpperOvenCookMode,
                &DecodedValue::Temperature(Temperature::from_celsius(200.0)),
            )
            .unwrap_err();
        assert!(matches!(err, EncodeError::MissingPayload { .. }));
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn applied_updates_are_published() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let m = DeviceMirror::new(bus);

        let s1 = m.next_sequence();
        let s2 = m.next_sequence();
        update(&m, Erd::DoorStatus, "01", UpdateSource::Push, s2).unwrap();
        update(&m, Erd::DoorStatus, "00", UpdateSource::Poll, s1).unwrap();

        let event = rx.recv().await.unwrap();
        let ApplianceEvent::ErdChanged { erd, entry, .. } = event else {
            panic!("unexpected event {event:?}");
        };
        assert_eq!(erd, Erd::DoorStatus);
        assert_eq!(entry.raw, "01");
        // The superseded poll produced no event.
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn snapshot_and_removal() {
        let m = mirror();
        update(&m, Erd::UpperOvenLight, "01", UpdateSource::Poll, m.next_sequence()).unwrap();
        update(&m, Erd::DoorStatus, "00", UpdateSource::Poll, m.next_sequence()).unwrap();
        m.update(ErdUpdate {
            appliance_id: ApplianceId::from("B2"),
            erd: Erd::DoorStatus,
            raw: "01".to_string(),
            source: UpdateSource::Push,
            sequence: m.next_sequence(),
        })
        .unwrap();

        let snapshot = m.snapshot(&ApplianceId::from("A1"));
        let erds: Vec<_> = snapshot.iter().map(|(erd, _)| *erd).collect();
        assert_eq!(erds.len(), 2);
        assert!(erds.contains(&Erd::DoorStatus));

        assert_eq!(m.remove_appliance(&ApplianceId::from("A1")), 2);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn concurrent_updates_keep_highest_sequence() {
        use std::sync::Arc;

        let m = Arc::new(mirror());
        let sequences: Vec<_> = (0..64).map(|_| m.next_sequence()).collect();
        let highest = *sequences.last().unwrap();

        std::thread::scope(|scope| {
            for chunk in sequences.chunks(8) {
                let m = Arc::clone(&m);
                scope.spawn(move || {
                    for seq in chunk.iter().rev() {
                        let raw = format!("{:02x}", seq.value());
                        let _ = update(&m, Erd::SoundLevel, &raw, UpdateSource::Push, *seq);
                    }
                });
            }
        });

        let entry = m.get(&ApplianceId::from("A1"), Erd::SoundLevel).unwrap();
        assert_eq!(entry.sequence, highest);
    }
}
