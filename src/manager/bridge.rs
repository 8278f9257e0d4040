// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge facade tying discovery, mirror, push channel and scheduler together.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::capabilities::{binding_for, profile_for};
use crate::codec::{self, DecodedValue};
use crate::discovery::{self, DiscoveryDiff};
use crate::erd::{Erd, ErdKind};
use crate::error::{EncodeError, Error, Result};
use crate::event::{ApplianceEvent, EventBus};
use crate::protocol::{HttpConfig, ResourceClient};
use crate::push::{ChannelState, PushChannel, PushSettings};
use crate::scheduler::{CycleReport, PollSettings, ReconciliationScheduler};
use crate::state::{DeviceMirror, ErdUpdate, MirrorEntry, UpdateSource};
use crate::types::{Appliance, ApplianceId};

use super::BridgeConfig;

/// Capacity of the push-to-mirror queue.
const PUSH_QUEUE_CAPACITY: usize = 256;

/// Synchronizes the appliances of one `SmartHQ` account.
///
/// The bridge owns the REST client, the [`DeviceMirror`], the push channel
/// and the reconciliation scheduler. Accessory code reads from the mirror
/// through [`get`](Self::get) and writes through [`set`](Self::set).
///
/// # Examples
///
/// ```no_run
/// use smarthq_lib::SmartHqBridge;
/// use smarthq_lib::codec::DecodedValue;
/// use smarthq_lib::erd::Erd;
/// use smarthq_lib::manager::BridgeConfig;
///
/// #[tokio::main]
/// async fn main() -> smarthq_lib::Result<()> {
///     let bridge = SmartHqBridge::new(BridgeConfig::default(), "access-token")?;
///     bridge.start().await?;
///
///     let mut events = bridge.subscribe();
///     tokio::spawn(async move {
///         while let Ok(event) = events.recv().await {
///             println!("Event: {event:?}");
///         }
///     });
///
///     for appliance in bridge.appliances() {
///         if let Some(entry) = bridge.get(&appliance.id, Erd::UpperOvenLight) {
///             println!("{}: light {:?}", appliance.nickname, entry.value);
///         }
///     }
///
///     bridge.set(&"D828C9D1".into(), Erd::UpperOvenLight, DecodedValue::Flag(true)).await?;
///     bridge.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct SmartHqBridge {
    config: BridgeConfig,
    client: Arc<ResourceClient>,
    events: EventBus,
    mirror: Arc<DeviceMirror>,
    scheduler: ReconciliationScheduler<ResourceClient>,
    /// Discovered appliances, keyed by ID.
    appliances: Arc<RwLock<HashMap<ApplianceId, Appliance>>>,
    /// Account ID; `None` until discovery succeeded.
    user_id: RwLock<Option<String>>,
    push: Mutex<Option<PushChannel>>,
    applier: Mutex<Option<JoinHandle<()>>>,
}

impl SmartHqBridge {
    /// Creates a bridge. Nothing is contacted until [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: BridgeConfig, token: impl Into<String>) -> Result<Self> {
        config.validate()?;

        let client = HttpConfig::new(config.api_url.clone())
            .with_token(token)
            .with_timeout(config.request_timeout)
            .into_client()?;

        Ok(Self::with_client(config, client))
    }

    /// Creates a bridge around an existing client.
    #[must_use]
    pub fn with_client(config: BridgeConfig, client: ResourceClient) -> Self {
        let client = Arc::new(client);
        let events = EventBus::new();
        let mirror = Arc::new(DeviceMirror::new(events.clone()));
        let scheduler = ReconciliationScheduler::new(
            Arc::clone(&client),
            Arc::clone(&mirror),
            PollSettings::from_config(&config),
        );

        Self {
            config,
            client,
            events,
            mirror,
            scheduler,
            appliances: Arc::new(RwLock::new(HashMap::new())),
            user_id: RwLock::new(None),
            push: Mutex::new(None),
            applier: Mutex::new(None),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Discovers the appliances, opens the push channel, starts the
    /// reconciliation timers, and runs one refresh cycle per appliance.
    ///
    /// Calling `start` on a running bridge does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if the appliance listing fails. The
    /// bridge stays unstarted and `start` may be retried.
    pub async fn start(&self) -> Result<()> {
        if self.push.lock().is_some() {
            tracing::debug!("Bridge already started");
            return Ok(());
        }

        let discovery = discovery::discover(&self.client, &self.config).await?;
        *self.user_id.write() = Some(discovery.user_id.clone());

        let ids: Vec<ApplianceId> = discovery
            .appliances
            .into_iter()
            .map(|appliance| self.track(appliance))
            .collect();

        let (sink, queue) = mpsc::channel(PUSH_QUEUE_CAPACITY);
        let applier = tokio::spawn(apply_push_updates(
            queue,
            Arc::clone(&self.mirror),
            Arc::clone(&self.appliances),
        ));
        *self.applier.lock() = Some(applier);

        let channel = PushChannel::open(
            Arc::clone(&self.client),
            PushSettings::from_config(&self.config),
            sink,
            self.mirror.clock().clone(),
            self.events.clone(),
        );
        *self.push.lock() = Some(channel);

        let reports = join_all(ids.iter().map(|id| self.scheduler.run_cycle(id))).await;
        tracing::info!(
            appliances = ids.len(),
            refreshed = reports.iter().flatten().count(),
            "Bridge started"
        );
        Ok(())
    }

    /// Stops the push channel and every reconciliation timer.
    ///
    /// A later [`start`](Self::start) rediscovers and resumes polling.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown();

        let channel = self.push.lock().take();
        if let Some(channel) = channel {
            channel.close().await;
        }

        // The queue closes with the channel, which ends the applier
        let applier = self.applier.lock().take();
        if let Some(applier) = applier {
            if let Err(e) = applier.await {
                tracing::warn!(error = %e, "Push applier ended abnormally");
            }
        }

        tracing::info!("Bridge shut down");
    }

    /// Lists the account again and reconciles the known appliance set.
    ///
    /// New appliances are registered and refreshed once. Appliances no
    /// longer reported are dropped from the mirror and announced with
    /// [`ApplianceEvent::ApplianceRemoved`]. Known appliances get their
    /// metadata refreshed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Discovery`] if the listing fails; nothing changes
    /// in that case.
    pub async fn rediscover(&self) -> Result<DiscoveryDiff> {
        let discovery = discovery::discover(&self.client, &self.config).await?;
        let known: Vec<ApplianceId> = self.appliances.read().keys().cloned().collect();
        let diff = discovery.diff(&known);

        for id in &diff.removed {
            self.untrack(id);
        }

        for appliance in discovery.appliances {
            if diff.added.contains(&appliance.id) {
                self.track(appliance);
            } else {
                self.appliances.write().insert(appliance.id.clone(), appliance);
            }
        }

        for id in &diff.added {
            self.scheduler.tick(id);
        }

        tracing::info!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            "Rediscovery complete"
        );
        Ok(diff)
    }

    // =========================================================================
    // State access
    // =========================================================================

    /// Returns the mirrored entry for one ERD of an appliance.
    #[must_use]
    pub fn get(&self, appliance_id: &ApplianceId, erd: Erd) -> Option<MirrorEntry> {
        self.mirror.get(appliance_id, erd)
    }

    /// Writes a value and records it optimistically in the mirror.
    ///
    /// Composite ERDs are encoded against their current payload; for cook
    /// modes that payload is read from the service first so that fields
    /// changed on the appliance itself are preserved.
    ///
    /// # Errors
    ///
    /// - [`Error::NotStarted`] before discovery succeeded
    /// - [`Error::UnknownAppliance`] for an appliance discovery did not report
    /// - [`Error::Encode`] if the value does not fit the ERD or the ERD is read-only
    /// - [`Error::Communication`] if the read or the write fails
    pub async fn set(
        &self,
        appliance_id: &ApplianceId,
        erd: Erd,
        value: DecodedValue,
    ) -> Result<MirrorEntry> {
        if self.user_id.read().is_none() {
            return Err(Error::NotStarted);
        }
        let appliance = self
            .appliance(appliance_id)
            .ok_or_else(|| Error::UnknownAppliance(appliance_id.clone()))?;

        if let Some(binding) = binding_for(&appliance.appliance_type, &appliance.features, erd) {
            if !binding.writable {
                return Err(EncodeError::ReadOnly { erd }.into());
            }
        }

        let current = if erd.kind() == ErdKind::CookMode {
            Some(self.read_through(appliance_id, erd).await?)
        } else {
            self.mirror.get(appliance_id, erd).map(|entry| entry.raw)
        };

        let raw = codec::encode(erd, &value, current.as_deref())?;
        self.client
            .write_erd(&appliance.user_id, appliance_id, erd, &raw)
            .await?;

        let entry = self.mirror.optimistic_set_raw(appliance_id, erd, raw)?;
        tracing::debug!(
            appliance_id = %appliance_id,
            erd = %erd,
            raw = %entry.raw,
            seq = %entry.sequence,
            "ERD written"
        );
        Ok(entry)
    }

    /// Runs a refresh cycle for one appliance now.
    ///
    /// Returns `None` if the appliance is unknown or a cycle is already in
    /// flight.
    pub async fn refresh(&self, appliance_id: &ApplianceId) -> Option<CycleReport> {
        self.scheduler.run_cycle(appliance_id).await
    }

    /// Returns the discovered appliances.
    #[must_use]
    pub fn appliances(&self) -> Vec<Appliance> {
        self.appliances.read().values().cloned().collect()
    }

    /// Returns one discovered appliance.
    #[must_use]
    pub fn appliance(&self, appliance_id: &ApplianceId) -> Option<Appliance> {
        self.appliances.read().get(appliance_id).cloned()
    }

    /// Returns the account ID, once discovery succeeded.
    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.user_id.read().clone()
    }

    /// Returns the shared mirror.
    #[must_use]
    pub fn mirror(&self) -> &Arc<DeviceMirror> {
        &self.mirror
    }

    /// Returns the push channel state.
    #[must_use]
    pub fn channel_state(&self) -> ChannelState {
        self.push
            .lock()
            .as_ref()
            .map_or(ChannelState::Disconnected, PushChannel::state)
    }

    // =========================================================================
    // Collaborators
    // =========================================================================

    /// Replaces the bearer token used for every later request.
    pub fn set_token(&self, token: impl Into<String>) {
        self.client.set_token(token);
    }

    /// Subscribes to appliance events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ApplianceEvent> {
        self.events.subscribe()
    }

    /// Returns the event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Adds an appliance and registers its polled ERDs.
    fn track(&self, appliance: Appliance) -> ApplianceId {
        let id = appliance.id.clone();
        let settings = self.config.resolve(&id);

        match profile_for(&appliance.appliance_type) {
            Some(profile) => {
                let erds = profile.polled_erds(&appliance.features);
                if erds.is_empty() {
                    tracing::info!(
                        appliance_id = %id,
                        appliance_type = %appliance.appliance_type,
                        "No supported features on appliance"
                    );
                }
                self.scheduler.register(id.clone(), erds, settings.refresh_rate);
            }
            None => {
                tracing::warn!(
                    appliance_id = %id,
                    appliance_type = %appliance.appliance_type,
                    "Unsupported appliance type"
                );
            }
        }

        tracing::info!(appliance_id = %id, nickname = %appliance.nickname, "Adding appliance");
        self.appliances.write().insert(id.clone(), appliance.clone());
        self.events.publish(ApplianceEvent::ApplianceAdded {
            appliance: Box::new(appliance),
        });
        id
    }

    fn untrack(&self, appliance_id: &ApplianceId) {
        self.appliances.write().remove(appliance_id);
        self.scheduler.unregister(appliance_id);
        let dropped = self.mirror.remove_appliance(appliance_id);

        tracing::info!(appliance_id = %appliance_id, entries = dropped, "Removing appliance");
        self.events.publish(ApplianceEvent::ApplianceRemoved {
            appliance_id: appliance_id.clone(),
        });
    }

    /// Reads one ERD from the service and offers it to the mirror.
    async fn read_through(&self, appliance_id: &ApplianceId, erd: Erd) -> Result<String> {
        let sequence = self.mirror.next_sequence();
        let raw = self.client.read_erd(appliance_id, erd).await?;

        // A decode failure is logged by the mirror; encoding reports it again
        let _ = self.mirror.update(ErdUpdate {
            appliance_id: appliance_id.clone(),
            erd,
            raw: raw.clone(),
            source: UpdateSource::Poll,
            sequence,
        });
        Ok(raw)
    }
}

impl Drop for SmartHqBridge {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

/// Feeds push updates into the mirror until the push channel closes.
async fn apply_push_updates(
    mut queue: mpsc::Receiver<ErdUpdate>,
    mirror: Arc<DeviceMirror>,
    appliances: Arc<RwLock<HashMap<ApplianceId, Appliance>>>,
) {
    while let Some(update) = queue.recv().await {
        if !appliances.read().contains_key(&update.appliance_id) {
            tracing::debug!(
                appliance_id = %update.appliance_id,
                erd = %update.erd,
                "Dropping push update for undiscovered appliance"
            );
            continue;
        }
        // Decode failures are logged by the mirror and keep the old value
        let _ = mirror.update(update);
    }
    tracing::debug!("Push applier stopped");
}
