// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Temperature values.
//!
//! Appliances report and accept temperatures in whole degrees Fahrenheit.
//! Accessory hosts work in Celsius, so [`Temperature`] stores Celsius and
//! converts at the wire boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A temperature, stored in degrees Celsius.
///
/// # Examples
///
/// ```
/// use smarthq_lib::types::Temperature;
///
/// let t = Temperature::from_fahrenheit(350);
/// assert!((t.celsius() - 176.666).abs() < 0.01);
///
/// let t = Temperature::from_celsius(200.0);
/// assert_eq!(t.to_fahrenheit(), Some(392));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temperature(f64);

impl Temperature {
    /// Creates a temperature from degrees Celsius.
    #[must_use]
    pub const fn from_celsius(celsius: f64) -> Self {
        Self(celsius)
    }

    /// Creates a temperature from the wire value in degrees Fahrenheit.
    #[must_use]
    pub fn from_fahrenheit(fahrenheit: u16) -> Self {
        Self((f64::from(fahrenheit) - 32.0) * 5.0 / 9.0)
    }

    /// Returns the value in degrees Celsius.
    #[must_use]
    pub const fn celsius(self) -> f64 {
        self.0
    }

    /// Converts to whole degrees Fahrenheit for the wire.
    ///
    /// Returns `None` when the rounded value does not fit in an unsigned
    /// 16-bit field.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn to_fahrenheit(self) -> Option<u16> {
        let fahrenheit = (self.0 * 9.0 / 5.0 + 32.0).round();
        if fahrenheit.is_finite() && (0.0..=f64::from(u16::MAX)).contains(&fahrenheit) {
            Some(fahrenheit as u16)
        } else {
            None
        }
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°C", self.0)
    }
}
