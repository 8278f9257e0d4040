// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge configuration.
//!
//! The configuration document is JSON with camelCase keys. Every field is
//! optional; missing fields take the defaults listed on [`BridgeConfig`].
//!
//! ```json
//! {
//!   "options": { "refreshRate": 300, "allowInvalidCharacters": false },
//!   "devices": [
//!     { "applianceId": "D828C9D1", "refreshRate": 60, "firmware": "V1.2-beta" },
//!     { "applianceId": "F00DCAFE", "hide_device": true }
//!   ],
//!   "requestTimeout": 15,
//!   "erdRetries": 1
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::protocol::HttpConfig;
use crate::types::ApplianceId;

/// Refresh period used when neither the device nor the platform sets one.
pub const DEFAULT_REFRESH_RATE: Duration = Duration::from_secs(3600);

/// Top-level configuration of a [`SmartHqBridge`](super::SmartHqBridge).
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use smarthq_lib::manager::BridgeConfig;
///
/// let config = BridgeConfig::from_json(r#"{
///     "options": { "refreshRate": 120 },
///     "devices": [{ "applianceId": "A1", "refreshRate": 30 }]
/// }"#).unwrap();
///
/// assert_eq!(config.resolve(&"A1".into()).refresh_rate, Duration::from_secs(30));
/// assert_eq!(config.resolve(&"B2".into()).refresh_rate, Duration::from_secs(120));
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeConfig {
    /// REST API root. Default: the production `SmartHQ` API.
    pub api_url: String,
    /// Platform-wide options.
    pub options: PlatformOptions,
    /// Per-appliance overrides.
    pub devices: Vec<DeviceOverride>,
    /// Timeout of a single REST request. Default: 15 s.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    /// Interval between websocket keepalive pings. Default: 30 s.
    #[serde(with = "duration_secs")]
    pub keepalive_interval: Duration,
    /// Reconnect when the websocket is silent this long. Default: 90 s.
    #[serde(with = "duration_secs")]
    pub keepalive_timeout: Duration,
    /// Extra attempts for a failed ERD read within one cycle. Default: 1.
    pub erd_retries: u32,
    /// Backoff for push channel reconnects. Not read from JSON.
    #[serde(skip)]
    pub reconnection: ReconnectionPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_url: HttpConfig::DEFAULT_BASE_URL.to_string(),
            options: PlatformOptions::default(),
            devices: Vec::new(),
            request_timeout: HttpConfig::DEFAULT_TIMEOUT,
            keepalive_interval: Duration::from_secs(30),
            keepalive_timeout: Duration::from_secs(90),
            erd_retries: 1,
            reconnection: ReconnectionPolicy::default(),
        }
    }
}

impl BridgeConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document is malformed or a setting is
    /// out of range.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the API root.
    #[must_use]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Sets the platform refresh rate.
    #[must_use]
    pub fn with_refresh_rate(mut self, rate: Duration) -> Self {
        self.options.refresh_rate = Some(rate);
        self
    }

    /// Adds a per-appliance override.
    #[must_use]
    pub fn with_device(mut self, device: DeviceOverride) -> Self {
        self.devices.push(device);
        self
    }

    /// Sets the REST request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the keepalive ping interval and inactivity timeout.
    #[must_use]
    pub fn with_keepalive(mut self, interval: Duration, timeout: Duration) -> Self {
        self.keepalive_interval = interval;
        self.keepalive_timeout = timeout;
        self
    }

    /// Sets the number of extra ERD read attempts per cycle.
    #[must_use]
    pub fn with_erd_retries(mut self, retries: u32) -> Self {
        self.erd_retries = retries;
        self
    }

    /// Sets the push channel reconnection policy.
    #[must_use]
    pub fn with_reconnection(mut self, policy: ReconnectionPolicy) -> Self {
        self.reconnection = policy;
        self
    }

    /// Checks every setting for range errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for zero refresh rates or zero timings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.options.refresh_rate.is_some_and(|rate| rate.is_zero()) {
            return Err(ConfigError::InvalidRefreshRate {
                scope: "options".to_string(),
            });
        }
        if let Some(device) = self
            .devices
            .iter()
            .find(|device| device.refresh_rate.is_some_and(|rate| rate.is_zero()))
        {
            return Err(ConfigError::InvalidRefreshRate {
                scope: format!("device {}", device.appliance_id),
            });
        }
        for (field, value) in [
            ("requestTimeout", self.request_timeout),
            ("keepaliveInterval", self.keepalive_interval),
            ("keepaliveTimeout", self.keepalive_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::InvalidDuration { field });
            }
        }
        Ok(())
    }

    /// Returns the override for an appliance, if configured.
    #[must_use]
    pub fn device(&self, appliance_id: &ApplianceId) -> Option<&DeviceOverride> {
        self.devices
            .iter()
            .find(|device| &device.appliance_id == appliance_id)
    }

    /// Resolves the effective settings of an appliance.
    ///
    /// Refresh rate precedence: device override, then platform option, then
    /// [`DEFAULT_REFRESH_RATE`].
    #[must_use]
    pub fn resolve(&self, appliance_id: &ApplianceId) -> DeviceSettings {
        let device = self.device(appliance_id);

        let (refresh_rate, refresh_source) =
            match (device.and_then(|d| d.refresh_rate), self.options.refresh_rate) {
                (Some(rate), _) => (rate, SettingSource::Device),
                (None, Some(rate)) => (rate, SettingSource::Platform),
                (None, None) => (DEFAULT_REFRESH_RATE, SettingSource::Default),
            };

        tracing::debug!(
            appliance_id = %appliance_id,
            refresh_rate_secs = refresh_rate.as_secs(),
            source = ?refresh_source,
            "Resolved refresh rate"
        );

        DeviceSettings {
            refresh_rate,
            refresh_source,
            hidden: device.is_some_and(|d| d.hide_device),
            firmware: device.and_then(|d| d.firmware.clone()),
        }
    }
}

/// Platform-wide options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformOptions {
    /// Refresh period for every appliance without its own, in seconds.
    #[serde(with = "duration_secs::option")]
    pub refresh_rate: Option<Duration>,
    /// Keep display names verbatim instead of cleaning them.
    pub allow_invalid_characters: bool,
}

/// Settings for one appliance.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOverride {
    /// The appliance these settings apply to.
    pub appliance_id: ApplianceId,
    /// Refresh period in seconds.
    #[serde(default, with = "duration_secs::option")]
    pub refresh_rate: Option<Duration>,
    /// Firmware version to report instead of the discovered one.
    #[serde(default)]
    pub firmware: Option<String>,
    /// Exclude the appliance from discovery.
    #[serde(default, rename = "hide_device", alias = "hideDevice")]
    pub hide_device: bool,
}

impl DeviceOverride {
    /// Creates an empty override for an appliance.
    #[must_use]
    pub fn new(appliance_id: impl Into<ApplianceId>) -> Self {
        Self {
            appliance_id: appliance_id.into(),
            refresh_rate: None,
            firmware: None,
            hide_device: false,
        }
    }

    /// Sets the refresh rate.
    #[must_use]
    pub fn with_refresh_rate(mut self, rate: Duration) -> Self {
        self.refresh_rate = Some(rate);
        self
    }

    /// Sets the reported firmware version.
    #[must_use]
    pub fn with_firmware(mut self, firmware: impl Into<String>) -> Self {
        self.firmware = Some(firmware.into());
        self
    }

    /// Hides the appliance.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hide_device = true;
        self
    }
}

/// Where a resolved setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingSource {
    /// The appliance's own override.
    Device,
    /// The platform options.
    Platform,
    /// The built-in default.
    Default,
}

/// Effective settings of one appliance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSettings {
    /// Reconciliation period.
    pub refresh_rate: Duration,
    /// Where the period came from.
    pub refresh_source: SettingSource,
    /// Whether the appliance is excluded.
    pub hidden: bool,
    /// Firmware override.
    pub firmware: Option<String>,
}

/// Exponential backoff for push channel reconnects.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use smarthq_lib::manager::ReconnectionPolicy;
///
/// let policy = ReconnectionPolicy::default();
/// assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(8));
/// assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(60));
/// assert!(policy.should_retry(1_000));
///
/// let bounded = ReconnectionPolicy::new().with_max_retries(3);
/// assert!(!bounded.should_retry(3));
/// ```
#[derive(Debug, Clone)]
pub struct ReconnectionPolicy {
    /// Whether reconnection is enabled.
    pub enabled: bool,
    /// Maximum number of retries before giving up (None = infinite).
    pub max_retries: Option<u32>,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound of the delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub backoff_multiplier: f64,
}

impl ReconnectionPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy that never reconnects.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Limits the number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the delay before the first retry.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the upper bound of the delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Returns the delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let seconds = self.initial_delay.as_secs_f64() * factor;
        if !seconds.is_finite() || seconds >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(seconds)
    }

    /// Returns `true` if retry number `attempt` (zero-based) may proceed.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> bool {
        self.enabled && self.max_retries.is_none_or(|max| attempt < max)
    }
}

impl Default for ReconnectionPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: None,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

/// Serde helpers for durations written as whole seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer};

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<u64>::deserialize(deserializer).map(|secs| secs.map(Duration::from_secs))
        }
    }
}
