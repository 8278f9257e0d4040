// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broadcast bus for appliance events.

use tokio::sync::broadcast;

use super::ApplianceEvent;

/// Default channel capacity for the event bus.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Fan-out of [`ApplianceEvent`]s to any number of subscribers.
///
/// Each subscriber gets its own copy of every event published after it
/// subscribed. A subscriber that falls more than the capacity behind
/// receives `RecvError::Lagged` and skips the oldest events; the mirror
/// itself is unaffected.
///
/// # Examples
///
/// ```
/// use smarthq_lib::event::{ApplianceEvent, EventBus};
/// use smarthq_lib::types::ApplianceId;
///
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
///
/// bus.publish(ApplianceEvent::ApplianceRemoved {
///     appliance_id: ApplianceId::from("D828C9D1"),
/// });
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ApplianceEvent>,
}

impl EventBus {
    /// Creates a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a bus that buffers up to `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribes to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ApplianceEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes an event and returns how many subscribers received it.
    pub fn publish(&self, event: ApplianceEvent) -> usize {
        // No subscribers is not an error
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
