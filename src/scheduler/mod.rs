// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic reconciliation of the mirror against the remote API.
//!
//! Each registered appliance gets a timer that triggers a refresh cycle:
//! one read per relevant ERD, all fed into the [`DeviceMirror`] as poll
//! observations. At most one cycle runs per appliance. A tick that fires
//! while the previous cycle is still in flight is skipped, not queued.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::future::join_all;
use parking_lot::{Mutex, RwLock};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::erd::Erd;
use crate::error::{CommunicationError, RequestContext};
use crate::manager::BridgeConfig;
use crate::protocol::ErdTransport;
use crate::state::{DeviceMirror, ErdUpdate, UpdateOutcome, UpdateSource};
use crate::types::ApplianceId;

/// Request settings of a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Upper bound for a single ERD read.
    pub request_timeout: Duration,
    /// Extra attempts for a failed read.
    pub erd_retries: u32,
}

impl PollSettings {
    /// Extracts the poll settings from a bridge configuration.
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            erd_retries: config.erd_retries,
        }
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

/// What a call to [`ReconciliationScheduler::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new cycle was spawned.
    Started,
    /// A cycle was already in flight; nothing was started.
    SkippedBusy,
    /// The appliance is not registered.
    UnknownAppliance,
}

/// Summary of one refresh cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// The refreshed appliance.
    pub appliance_id: ApplianceId,
    /// Reads that updated the mirror.
    pub applied: usize,
    /// Reads that lost to a newer observation.
    pub stale: usize,
    /// Reads that failed or returned an undecodable payload.
    pub failed: usize,
}

impl CycleReport {
    /// Returns `true` if no read failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} applied, {} stale, {} failed",
            self.appliance_id, self.applied, self.stale, self.failed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadOutcome {
    Applied,
    Stale,
    Failed,
}

#[derive(Debug)]
struct Registration {
    erds: Vec<Erd>,
    period: Duration,
    busy: AtomicBool,
    cancel: CancellationToken,
}

/// Clears the busy flag when a cycle ends, however it ends.
struct BusyGuard(Arc<Registration>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::Release);
    }
}

struct Inner<T> {
    transport: Arc<T>,
    mirror: Arc<DeviceMirror>,
    settings: PollSettings,
    appliances: RwLock<HashMap<ApplianceId, Arc<Registration>>>,
    /// Parent of every registration token. Replaced on shutdown.
    cancel: Mutex<CancellationToken>,
}

/// Drives refresh cycles for every registered appliance.
///
/// Cloning is cheap; clones share the same registrations.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use smarthq_lib::erd::Erd;
/// use smarthq_lib::event::EventBus;
/// use smarthq_lib::protocol::HttpConfig;
/// use smarthq_lib::scheduler::{PollSettings, ReconciliationScheduler};
/// use smarthq_lib::state::DeviceMirror;
///
/// # async fn example() -> smarthq_lib::Result<()> {
/// let client = Arc::new(HttpConfig::default().with_token("secret").into_client()?);
/// let mirror = Arc::new(DeviceMirror::new(EventBus::new()));
/// let scheduler = ReconciliationScheduler::new(client, mirror, PollSettings::default());
///
/// scheduler.register("D828C9D1".into(), vec![Erd::DoorStatus], Duration::from_secs(300));
/// let report = scheduler.run_cycle(&"D828C9D1".into()).await;
/// println!("{report:?}");
/// # Ok(())
/// # }
/// ```
pub struct ReconciliationScheduler<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ReconciliationScheduler<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for ReconciliationScheduler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconciliationScheduler")
            .field("appliances", &self.inner.appliances.read().len())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl<T: ErdTransport> ReconciliationScheduler<T> {
    /// Creates a scheduler with no registered appliances.
    #[must_use]
    pub fn new(transport: Arc<T>, mirror: Arc<DeviceMirror>, settings: PollSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                mirror,
                settings,
                appliances: RwLock::new(HashMap::new()),
                cancel: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Registers an appliance and starts its timer. The first tick fires
    /// one `period` from now.
    ///
    /// Registering an appliance again replaces its ERD list and period.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register(&self, appliance_id: ApplianceId, erds: Vec<Erd>, period: Duration) {
        let registration = Arc::new(Registration {
            erds,
            period,
            busy: AtomicBool::new(false),
            cancel: self.inner.cancel.lock().child_token(),
        });

        tracing::debug!(
            appliance_id = %appliance_id,
            erds = registration.erds.len(),
            period_secs = period.as_secs(),
            "Registering appliance for reconciliation"
        );

        let previous = self
            .inner
            .appliances
            .write()
            .insert(appliance_id.clone(), Arc::clone(&registration));
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        self.spawn_ticker(appliance_id, &registration);
    }

    /// Stops the timer of an appliance. Returns `false` if it was not
    /// registered.
    pub fn unregister(&self, appliance_id: &ApplianceId) -> bool {
        match self.inner.appliances.write().remove(appliance_id) {
            Some(registration) => {
                registration.cancel.cancel();
                tracing::debug!(appliance_id = %appliance_id, "Unregistered appliance");
                true
            }
            None => false,
        }
    }

    /// Returns the registered appliances.
    #[must_use]
    pub fn registered(&self) -> Vec<ApplianceId> {
        self.inner.appliances.read().keys().cloned().collect()
    }

    /// Returns `true` while a cycle for the appliance is in flight.
    #[must_use]
    pub fn is_busy(&self, appliance_id: &ApplianceId) -> bool {
        self.registration(appliance_id)
            .is_some_and(|registration| registration.busy.load(Ordering::Acquire))
    }

    /// Starts a cycle in the background unless one is already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn tick(&self, appliance_id: &ApplianceId) -> TickOutcome {
        let Some(registration) = self.registration(appliance_id) else {
            return TickOutcome::UnknownAppliance;
        };
        let Some(guard) = Self::try_acquire(&registration) else {
            tracing::debug!(appliance_id = %appliance_id, "Refresh still in flight, skipping tick");
            return TickOutcome::SkippedBusy;
        };

        let scheduler = self.clone();
        let appliance_id = appliance_id.clone();
        tokio::spawn(async move {
            let cancel = guard.0.cancel.clone();
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(appliance_id = %appliance_id, "Refresh cancelled");
                }
                report = scheduler.cycle(&appliance_id, &guard.0) => {
                    Self::log_report(&report);
                }
            }
            drop(guard);
        });

        TickOutcome::Started
    }

    /// Runs a cycle and waits for it.
    ///
    /// Returns `None` if the appliance is not registered or a cycle is
    /// already in flight.
    pub async fn run_cycle(&self, appliance_id: &ApplianceId) -> Option<CycleReport> {
        let registration = self.registration(appliance_id)?;
        let Some(guard) = Self::try_acquire(&registration) else {
            tracing::debug!(appliance_id = %appliance_id, "Refresh already in flight");
            return None;
        };

        let report = self.cycle(appliance_id, &guard.0).await;
        Self::log_report(&report);
        Some(report)
    }

    /// Stops every timer and cancels in-flight cycles.
    ///
    /// The scheduler stays usable: appliances registered afterwards get
    /// running timers again.
    pub fn shutdown(&self) {
        let previous =
            std::mem::replace(&mut *self.inner.cancel.lock(), CancellationToken::new());
        previous.cancel();
        self.inner.appliances.write().clear();
    }

    fn registration(&self, appliance_id: &ApplianceId) -> Option<Arc<Registration>> {
        self.inner.appliances.read().get(appliance_id).cloned()
    }

    fn try_acquire(registration: &Arc<Registration>) -> Option<BusyGuard> {
        registration
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(Arc::clone(registration)))
    }

    fn spawn_ticker(&self, appliance_id: ApplianceId, registration: &Arc<Registration>) {
        let scheduler = self.clone();
        let cancel = registration.cancel.clone();
        let period = registration.period;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        scheduler.tick(&appliance_id);
                    }
                }
            }
            tracing::trace!(appliance_id = %appliance_id, "Reconciliation timer stopped");
        });
    }

    async fn cycle(&self, appliance_id: &ApplianceId, registration: &Registration) -> CycleReport {
        let reads = registration
            .erds
            .iter()
            .map(|&erd| self.poll_erd(appliance_id, erd));
        let outcomes = join_all(reads).await;

        let mut report = CycleReport {
            appliance_id: appliance_id.clone(),
            applied: 0,
            stale: 0,
            failed: 0,
        };
        for outcome in outcomes {
            match outcome {
                ReadOutcome::Applied => report.applied += 1,
                ReadOutcome::Stale => report.stale += 1,
                ReadOutcome::Failed => report.failed += 1,
            }
        }
        report
    }

    /// Reads one ERD, retrying failed requests, and offers the result to
    /// the mirror.
    async fn poll_erd(&self, appliance_id: &ApplianceId, erd: Erd) -> ReadOutcome {
        let settings = self.inner.settings;
        let mut attempt: u32 = 0;

        loop {
            // Taken before the request so a push received meanwhile wins.
            let sequence = self.inner.mirror.next_sequence();

            let result = tokio::time::timeout(
                settings.request_timeout,
                self.inner.transport.read_erd(appliance_id, erd),
            )
            .await
            .unwrap_or_else(|_| {
                Err(CommunicationError::Timeout {
                    context: RequestContext::erd(appliance_id, erd),
                    timeout_ms: u64::try_from(settings.request_timeout.as_millis())
                        .unwrap_or(u64::MAX),
                })
            });

            match result {
                Ok(raw) => {
                    let update = ErdUpdate {
                        appliance_id: appliance_id.clone(),
                        erd,
                        raw,
                        source: UpdateSource::Poll,
                        sequence,
                    };
                    return match self.inner.mirror.update(update) {
                        Ok(UpdateOutcome::Applied) => ReadOutcome::Applied,
                        Ok(UpdateOutcome::Superseded { current }) => {
                            tracing::debug!(
                                appliance_id = %appliance_id,
                                erd = %erd,
                                seq = %sequence,
                                current = %current,
                                "Poll result superseded by newer observation"
                            );
                            ReadOutcome::Stale
                        }
                        Err(_) => ReadOutcome::Failed,
                    };
                }
                Err(e) if attempt < settings.erd_retries => {
                    attempt += 1;
                    tracing::debug!(error = %e, attempt, "Retrying ERD read");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "ERD read failed");
                    return ReadOutcome::Failed;
                }
            }
        }
    }

    fn log_report(report: &CycleReport) {
        if report.is_complete() {
            tracing::debug!(
                appliance_id = %report.appliance_id,
                applied = report.applied,
                stale = report.stale,
                "Refresh cycle complete"
            );
        } else {
            tracing::warn!(
                appliance_id = %report.appliance_id,
                applied = report.applied,
                stale = report.stale,
                failed = report.failed,
                "Refresh cycle finished with failures"
            );
        }
    }
}
