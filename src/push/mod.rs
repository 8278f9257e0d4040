// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Push event channel.
//!
//! A long-lived websocket that subscribes to every ERD change of the
//! account and forwards each notification as an [`ErdUpdate`] over an
//! `mpsc` channel. The channel reconnects with exponential backoff after
//! a failure, sends keepalive pings, and treats a silent connection as
//! dead after the inactivity timeout. A rejected token closes the channel.
//!
//! ```text
//! Disconnected -> Connecting -> Subscribed -> Receiving
//!                     ^                           |
//!                     +---- Reconnecting <--------+
//! any state --(close)--> Closed
//! ```

mod message;

pub use message::{ALL_ERDS, IncomingMessage, OutgoingMessage};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::error::ChannelError;
use crate::event::{ApplianceEvent, EventBus};
use crate::manager::{BridgeConfig, ReconnectionPolicy};
use crate::protocol::EndpointSource;
use crate::state::{ErdUpdate, SequenceClock, UpdateSource};

const NORMAL_CLOSURE: u16 = 1000;

/// Connection state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Not started.
    Disconnected,
    /// Looking up the endpoint and performing the handshake.
    Connecting,
    /// Connected and subscribed; nothing received yet.
    Subscribed,
    /// At least one notification received on this connection.
    Receiving,
    /// Waiting before reconnect attempt `attempt` (one-based).
    Reconnecting {
        /// Upcoming attempt number.
        attempt: u32,
    },
    /// Shut down. Terminal.
    Closed,
}

impl ChannelState {
    /// Returns `true` while a websocket connection is established.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Subscribed | Self::Receiving)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Subscribed => write!(f, "subscribed"),
            Self::Receiving => write!(f, "receiving"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Timing settings of the push channel.
#[derive(Debug, Clone)]
pub struct PushSettings {
    /// Interval between keepalive pings.
    pub keepalive_interval: Duration,
    /// Reconnect when nothing is received for this long.
    pub keepalive_timeout: Duration,
    /// Backoff between reconnects.
    pub reconnection: ReconnectionPolicy,
}

impl PushSettings {
    /// Extracts the push settings from a bridge configuration.
    #[must_use]
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            keepalive_interval: config.keepalive_interval,
            keepalive_timeout: config.keepalive_timeout,
            reconnection: config.reconnection.clone(),
        }
    }
}

impl Default for PushSettings {
    fn default() -> Self {
        Self::from_config(&BridgeConfig::default())
    }
}

/// Handle to a running push channel.
///
/// Dropping the handle stops the background task.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use smarthq_lib::event::EventBus;
/// use smarthq_lib::protocol::HttpConfig;
/// use smarthq_lib::push::{PushChannel, PushSettings};
/// use smarthq_lib::state::SequenceClock;
///
/// # async fn example() -> smarthq_lib::Result<()> {
/// let client = Arc::new(HttpConfig::default().with_token("secret").into_client()?);
/// let (tx, mut rx) = tokio::sync::mpsc::channel(256);
/// let channel = PushChannel::open(client, PushSettings::default(), tx, SequenceClock::new(), EventBus::new());
///
/// while let Some(update) = rx.recv().await {
///     println!("{} {} = {}", update.appliance_id, update.erd, update.raw);
/// }
/// channel.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct PushChannel {
    state: watch::Receiver<ChannelState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PushChannel {
    /// Spawns the channel task. Returns immediately; the first connection
    /// attempt happens in the background.
    pub fn open<E: EndpointSource>(
        endpoint: Arc<E>,
        settings: PushSettings,
        sink: mpsc::Sender<ErdUpdate>,
        clock: SequenceClock,
        events: EventBus,
    ) -> Self {
        let (state_tx, state) = watch::channel(ChannelState::Disconnected);
        let cancel = CancellationToken::new();

        let task = ChannelTask {
            endpoint,
            settings,
            sink,
            clock,
            events,
            state_tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run());

        Self {
            state,
            cancel,
            task: Some(handle),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Returns a receiver that observes every state transition.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Stops the channel and waits for the task to finish.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Push channel task ended abnormally");
            }
        }
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// How a single connection ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// The server closed the connection or the stream ended.
    ServerClosed,
    /// The channel was closed locally.
    Cancelled,
    /// Nobody consumes updates any more.
    SinkClosed,
}

struct ChannelTask<E> {
    endpoint: Arc<E>,
    settings: PushSettings,
    sink: mpsc::Sender<ErdUpdate>,
    clock: SequenceClock,
    events: EventBus,
    state_tx: watch::Sender<ChannelState>,
    cancel: CancellationToken,
}

impl<E: EndpointSource> ChannelTask<E> {
    async fn run(self) {
        let mut attempt: u32 = 0;

        loop {
            self.set_state(ChannelState::Connecting);

            let mut received = false;
            match self.session(&mut received).await {
                Ok(SessionEnd::Cancelled | SessionEnd::SinkClosed) => break,
                Ok(SessionEnd::ServerClosed) => {
                    tracing::info!("Push channel closed by server, reconnecting");
                }
                Err(e) if e.is_auth_failure() => {
                    tracing::error!(error = %e, "Push channel rejected by service, not retrying");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "Push channel failed");
                }
            }

            if received {
                attempt = 0;
            }

            if !self.settings.reconnection.should_retry(attempt) {
                tracing::error!(attempt, "Push channel reconnection limit reached, giving up");
                break;
            }

            let delay = self.settings.reconnection.delay_for_attempt(attempt);
            attempt = attempt.saturating_add(1);
            self.set_state(ChannelState::Reconnecting { attempt });
            tracing::info!(
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                attempt,
                "Waiting before reconnect"
            );

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ChannelState::Closed);
        tracing::debug!("Push channel task exiting");
    }

    /// Runs one connection until it ends.
    async fn session(&self, received: &mut bool) -> Result<SessionEnd, ChannelError> {
        let url = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            url = self.endpoint.websocket_endpoint() => url?,
        };

        tracing::info!(url = %url, "Connecting push channel");

        let connect = tokio::time::timeout(
            self.settings.keepalive_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        );
        let (stream, _response) = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(SessionEnd::Cancelled),
            result = connect => result
                .map_err(|_| ChannelError::Connect("handshake timed out".to_string()))?
                .map_err(|e| ChannelError::Connect(e.to_string()))?,
        };

        let (mut write, mut read) = stream.split();

        let subscribe = OutgoingMessage::subscribe_all()
            .to_json()
            .map_err(|e| ChannelError::Send(e.to_string()))?;
        write
            .send(Message::text(subscribe))
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))?;
        self.set_state(ChannelState::Subscribed);
        tracing::info!(resources = ALL_ERDS, "Push channel subscribed");

        let ping = OutgoingMessage::ping()
            .to_json()
            .map_err(|e| ChannelError::Send(e.to_string()))?;

        let interval = self.settings.keepalive_interval;
        let mut keepalive = tokio::time::interval_at(Instant::now() + interval, interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let timeout = self.settings.keepalive_timeout;
        let idle = tokio::time::sleep(timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Cancelled);
                }
                () = &mut idle => {
                    return Err(ChannelError::KeepaliveTimeout {
                        timeout_secs: timeout.as_secs(),
                    });
                }
                _ = keepalive.tick() => {
                    tracing::trace!("Sending keepalive ping");
                    write
                        .send(Message::text(ping.clone()))
                        .await
                        .map_err(|e| ChannelError::Send(e.to_string()))?;
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            idle.as_mut().reset(Instant::now() + timeout);
                            if !*received {
                                *received = true;
                                self.set_state(ChannelState::Receiving);
                            }
                            if !self.dispatch(text.as_str()).await {
                                return Ok(SessionEnd::SinkClosed);
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.as_ref().map_or(NORMAL_CLOSURE, |cf| u16::from(cf.code));
                            if code != NORMAL_CLOSURE {
                                return Err(ChannelError::Closed {
                                    code,
                                    reason: frame.map(|cf| cf.reason.as_str().to_string()).unwrap_or_default(),
                                });
                            }
                            return Ok(SessionEnd::ServerClosed);
                        }
                        Some(Ok(_)) => {
                            // Ping, pong, and binary frames only prove liveness
                            idle.as_mut().reset(Instant::now() + timeout);
                        }
                        Some(Err(e)) => return Err(ChannelError::Protocol(e.to_string())),
                        None => return Ok(SessionEnd::ServerClosed),
                    }
                }
            }
        }
    }

    /// Forwards one text frame. Returns `false` once the sink is closed.
    async fn dispatch(&self, text: &str) -> bool {
        match IncomingMessage::parse(text) {
            Ok(IncomingMessage::ErdChanged {
                appliance_id,
                erd,
                value,
            }) => {
                let sequence = self.clock.next();
                tracing::debug!(
                    appliance_id = %appliance_id,
                    erd = %erd,
                    value = %value,
                    sequence = %sequence,
                    "Push notification"
                );
                let update = ErdUpdate {
                    appliance_id,
                    erd,
                    raw: value,
                    source: UpdateSource::Push,
                    sequence,
                };
                if self.sink.send(update).await.is_err() {
                    tracing::debug!("Push update sink closed");
                    return false;
                }
            }
            Ok(IncomingMessage::UnknownErd { appliance_id, code }) => {
                tracing::warn!(appliance_id = %appliance_id, code, "Dropping unknown ERD code");
            }
            Ok(IncomingMessage::Other { kind }) => {
                tracing::trace!(kind, "Ignoring push frame");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring malformed push frame");
            }
        }
        true
    }

    fn set_state(&self, state: ChannelState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "Push channel state changed");
            self.events
                .publish(ApplianceEvent::ChannelStateChanged { state });
        }
    }
}
