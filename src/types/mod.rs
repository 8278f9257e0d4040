// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types shared across the library.
//!
//! # Types
//!
//! - [`ApplianceId`] - Opaque appliance identifier
//! - [`ApplianceType`] - Appliance category (dishwasher, oven, refrigerator)
//! - [`FeatureSet`] - Feature identifiers reported for an appliance
//! - [`Appliance`] - Discovered appliance metadata
//! - [`Temperature`] - Celsius temperature with Fahrenheit wire conversion
//! - [`FirmwareVersion`] - Normalized dotted firmware version

mod appliance;
mod firmware;
mod temperature;

pub use appliance::{Appliance, ApplianceId, ApplianceType, FeatureSet, clean_display_name};
pub use firmware::FirmwareVersion;
pub use temperature::Temperature;
