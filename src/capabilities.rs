// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Capability profiles.
//!
//! A profile maps the feature identifiers an appliance reports to the ERDs
//! an accessory host binds to characteristics. The set of bound ERDs is also
//! what the reconciliation scheduler polls.
//!
//! # Examples
//!
//! ```
//! use smarthq_lib::capabilities::{BindingKind, profile_for};
//! use smarthq_lib::erd::Erd;
//! use smarthq_lib::types::{ApplianceType, FeatureSet};
//!
//! let features: FeatureSet = ["COOKING_V1_UPPER_OVEN_FOUNDATION"].into_iter().collect();
//! let profile = profile_for(&ApplianceType::Oven).unwrap();
//! let bindings = profile.bindings(&features);
//!
//! assert_eq!(bindings.len(), 1);
//! assert_eq!(bindings[0].erd, Erd::UpperOvenLight);
//! assert_eq!(bindings[0].kind, BindingKind::OnOff);
//! assert!(bindings[0].writable);
//! ```

use crate::erd::Erd;
use crate::types::{ApplianceType, FeatureSet};

/// The kind of accessory characteristic an ERD backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    /// A boolean on/off switch or light.
    OnOff,
    /// A target temperature in Celsius.
    TargetTemperature,
    /// A contact sensor: open or closed.
    ContactSensor,
}

/// One ERD an appliance exposes to accessory hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErdBinding {
    /// Feature identifier that enables this binding.
    pub feature: &'static str,
    /// The bound ERD.
    pub erd: Erd,
    /// The characteristic kind.
    pub kind: BindingKind,
    /// Whether hosts may write the ERD.
    pub writable: bool,
}

/// Maps reported features to ERD bindings for one appliance category.
pub trait CapabilityProfile: Send + Sync {
    /// The category this profile applies to.
    fn appliance_type(&self) -> ApplianceType;

    /// Every binding the profile knows, regardless of features.
    fn known_bindings(&self) -> &'static [ErdBinding];

    /// Returns the bindings enabled by the given features, in profile order.
    fn bindings(&self, features: &FeatureSet) -> Vec<ErdBinding> {
        self.known_bindings()
            .iter()
            .filter(|binding| features.contains(binding.feature))
            .copied()
            .collect()
    }

    /// Returns the ERDs the scheduler should poll for these features.
    fn polled_erds(&self, features: &FeatureSet) -> Vec<Erd> {
        self.bindings(features)
            .into_iter()
            .map(|binding| binding.erd)
            .collect()
    }
}

/// Oven profile: the upper oven light and the upper oven target temperature.
#[derive(Debug, Clone, Copy, Default)]
pub struct OvenProfile;

impl CapabilityProfile for OvenProfile {
    fn appliance_type(&self) -> ApplianceType {
        ApplianceType::Oven
    }

    fn known_bindings(&self) -> &'static [ErdBinding] {
        &[
            ErdBinding {
                feature: "COOKING_V1_UPPER_OVEN_FOUNDATION",
                erd: Erd::UpperOvenLight,
                kind: BindingKind::OnOff,
                writable: true,
            },
            ErdBinding {
                feature: "COOKING_V1_EXTENDED_COOKTOP_FOUNDATION",
                erd: Erd::UpperOvenCookMode,
                kind: BindingKind::TargetTemperature,
                writable: true,
            },
        ]
    }
}

/// Refrigerator profile: the door as a contact sensor.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefrigeratorProfile;

impl CapabilityProfile for RefrigeratorProfile {
    fn appliance_type(&self) -> ApplianceType {
        ApplianceType::Refrigerator
    }

    fn known_bindings(&self) -> &'static [ErdBinding] {
        &[ErdBinding {
            feature: "DOOR_STATUS",
            erd: Erd::DoorStatus,
            kind: BindingKind::ContactSensor,
            writable: false,
        }]
    }
}

/// Returns the profile for an appliance category, if one exists.
#[must_use]
pub fn profile_for(appliance_type: &ApplianceType) -> Option<&'static dyn CapabilityProfile> {
    match appliance_type {
        ApplianceType::Oven => Some(&OvenProfile),
        ApplianceType::Refrigerator => Some(&RefrigeratorProfile),
        // No dishwasher ERD is catalogued yet.
        ApplianceType::Dishwasher | ApplianceType::Other(_) => None,
    }
}

/// Looks up the binding for one ERD of an appliance.
#[must_use]
pub fn binding_for(
    appliance_type: &ApplianceType,
    features: &FeatureSet,
    erd: Erd,
) -> Option<ErdBinding> {
    profile_for(appliance_type)?
        .bindings(features)
        .into_iter()
        .find(|binding| binding.erd == erd)
}
