// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Appliance identity and metadata.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::FirmwareVersion;

/// Opaque identifier of an appliance, as assigned by the cloud service.
///
/// Identifiers are compared verbatim; the service treats them as
/// case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplianceId(String);

impl ApplianceId {
    /// Creates an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplianceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ApplianceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ApplianceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Appliance category as reported by the appliance listing.
///
/// # Examples
///
/// ```
/// use smarthq_lib::types::ApplianceType;
///
/// let t: ApplianceType = "Oven".parse().unwrap();
/// assert_eq!(t, ApplianceType::Oven);
///
/// let t: ApplianceType = "Microwave".parse().unwrap();
/// assert_eq!(t, ApplianceType::Other("Microwave".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ApplianceType {
    /// A dishwasher.
    Dishwasher,
    /// A wall oven or range.
    Oven,
    /// A refrigerator.
    Refrigerator,
    /// Any category without a capability profile.
    Other(String),
}

impl ApplianceType {
    /// Returns the category name used by the service.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Dishwasher => "Dishwasher",
            Self::Oven => "Oven",
            Self::Refrigerator => "Refrigerator",
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for ApplianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplianceType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "dishwasher" => Self::Dishwasher,
            "oven" => Self::Oven,
            "refrigerator" => Self::Refrigerator,
            _ => Self::Other(s.to_string()),
        })
    }
}

impl From<String> for ApplianceType {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl From<ApplianceType> for String {
    fn from(kind: ApplianceType) -> Self {
        kind.as_str().to_string()
    }
}

/// Feature identifiers reported for an appliance, e.g.
/// `COOKING_V1_UPPER_OVEN_FOUNDATION`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet(BTreeSet<String>);

impl FeatureSet {
    /// Returns `true` if the feature is present.
    #[must_use]
    pub fn contains(&self, feature: &str) -> bool {
        self.0.contains(feature)
    }

    /// Iterates over the features in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Returns the number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no feature is reported.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A discovered appliance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appliance {
    /// Identifier assigned by the service.
    pub id: ApplianceId,
    /// Appliance category.
    pub appliance_type: ApplianceType,
    /// Display name, already cleaned for accessory hosts.
    pub nickname: String,
    /// Brand, when reported.
    pub brand: Option<String>,
    /// Model number, when reported.
    pub model: Option<String>,
    /// Serial number, when reported.
    pub serial: Option<String>,
    /// Reported feature identifiers.
    pub features: FeatureSet,
    /// Normalized firmware version.
    pub firmware: FirmwareVersion,
    /// Account the appliance belongs to; required for writes.
    pub user_id: String,
}

/// Cleans a display name for accessory hosts.
///
/// Valid names start and end with a letter or digit and otherwise contain
/// only letters, digits, spaces, and apostrophes. Invalid characters are
/// removed first, then any leading or trailing non-alphanumeric characters.
/// Every modification is logged at warn level.
///
/// # Examples
///
/// ```
/// use smarthq_lib::types::clean_display_name;
///
/// assert_eq!(clean_display_name("Kitchen Oven", "Name"), "Kitchen Oven");
/// assert_eq!(clean_display_name("  Mom's Fridge! ", "Name"), "Mom's Fridge");
/// assert_eq!(clean_display_name("Oven (Upper)", "Name"), "Oven Upper");
/// ```
#[must_use]
pub fn clean_display_name(value: &str, field: &str) -> String {
    if is_valid_display_name(value) {
        return value.to_string();
    }

    tracing::warn!(
        field,
        value,
        "Invalid characteristic value; use only letters, digits, spaces, and apostrophes, starting and ending with a letter or digit"
    );

    let mut cleaned: String = value
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '\'')
        .collect();
    if cleaned != value {
        tracing::warn!(field, before = value, after = %cleaned, "Removed invalid characters");
    }

    let trimmed = cleaned.trim_matches(|c: char| !c.is_alphanumeric());
    if trimmed.len() != cleaned.len() {
        tracing::warn!(field, before = %cleaned, after = trimmed, "Removed invalid leading or trailing characters");
        cleaned = trimmed.to_string();
    }

    cleaned
}

fn is_valid_display_name(value: &str) -> bool {
    let (Some(first), Some(last)) = (value.chars().next(), value.chars().next_back()) else {
        return false;
    };
    first.is_alphanumeric()
        && last.is_alphanumeric()
        && value
            .chars()
            .all(|c| c.is_alphanumeric() || c == ' ' || c == '\'')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appliance_type_parsing_is_case_insensitive() {
        assert_eq!("dishwasher".parse(), Ok(ApplianceType::Dishwasher));
        assert_eq!("REFRIGERATOR".parse(), Ok(ApplianceType::Refrigerator));
    }

    #[test]
    fn appliance_type_serde() {
        let kind: ApplianceType = serde_json::from_str("\"Oven\"").unwrap();
        assert_eq!(kind, ApplianceType::Oven);
        assert_eq!(
            serde_json::to_string(&ApplianceType::Other("Dryer".into())).unwrap(),
            "\"Dryer\""
        );
    }

    #[test]
    fn feature_set_lookup() {
        let features: FeatureSet = ["COOKING_V1_UPPER_OVEN_FOUNDATION", "DOOR_STATUS"]
            .into_iter()
            .collect();
        assert!(features.contains("DOOR_STATUS"));
        assert!(!features.contains("DISHWASHER_V1_FOUNDATION"));
        assert_eq!(features.len(), 2);
    }

    #[test]
    fn valid_names_are_untouched() {
        assert_eq!(clean_display_name("Fridge 2", "Name"), "Fridge 2");
        assert_eq!(clean_display_name("Café", "Name"), "Café");
        assert_eq!(clean_display_name("A", "Name"), "A");
    }

    #[test]
    fn invalid_characters_are_removed() {
        assert_eq!(clean_display_name("Oven #1", "Name"), "Oven 1");
        assert_eq!(clean_display_name("Dish-washer", "Name"), "Dishwasher");
    }

    #[test]
    fn leading_and_trailing_characters_are_trimmed() {
        assert_eq!(clean_display_name("'Garage' ", "Name"), "Garage");
        assert_eq!(clean_display_name("  ", "Name"), "");
    }

    #[test]
    fn single_char_name_validity() {
        assert!(is_valid_display_name("7"));
        assert!(!is_valid_display_name("'"));
        assert!(!is_valid_display_name(""));
    }
}
