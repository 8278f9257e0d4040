// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Firmware version normalization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A dotted firmware version string suitable for accessory metadata.
///
/// Vendor strings come in shapes such as `V1.2.3-beta` or `123`. They are
/// normalized by dropping a leading `V` and any `-suffix`; a remainder
/// without dots has every character joined with `.`.
///
/// # Examples
///
/// ```
/// use smarthq_lib::types::FirmwareVersion;
///
/// assert_eq!(FirmwareVersion::normalize(Some("V1.2.3-beta")).as_str(), "1.2.3");
/// assert_eq!(FirmwareVersion::normalize(Some("123")).as_str(), "1.2.3");
/// assert_eq!(FirmwareVersion::normalize(None).as_str(), "0.0.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FirmwareVersion(String);

impl FirmwareVersion {
    /// Version reported when nothing usable is available.
    pub const DEFAULT: &'static str = "0.0.0";

    /// Normalizes a raw vendor version string.
    #[must_use]
    pub fn normalize(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::default();
        };

        let trimmed = raw.trim();
        let without_prefix = trimmed.strip_prefix('V').unwrap_or(trimmed);
        let core = without_prefix
            .split_once('-')
            .map_or(without_prefix, |(head, _)| head);

        if core.is_empty() {
            return Self::default();
        }

        if core.contains('.') {
            return Self(core.to_string());
        }

        let dotted = core
            .chars()
            .map(String::from)
            .collect::<Vec<_>>()
            .join(".");
        Self(dotted)
    }

    /// Returns the normalized version.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FirmwareVersion {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
