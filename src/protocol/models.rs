// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire representations of the REST resources.

use serde::{Deserialize, Serialize};

use crate::erd::Erd;
use crate::types::ApplianceId;

/// Response of `GET /appliance`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplianceList {
    /// Account the appliances belong to.
    pub user_id: String,
    /// Listed appliances.
    #[serde(default)]
    pub items: Vec<ApplianceSummary>,
}

/// One entry of the appliance listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplianceSummary {
    /// Appliance identifier.
    pub appliance_id: ApplianceId,
    /// Appliance category, e.g. `Oven`.
    #[serde(rename = "type")]
    pub appliance_type: String,
    /// User-assigned name.
    #[serde(default)]
    pub nickname: Option<String>,
}

/// Response of `GET /appliance/{id}`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplianceDetails {
    /// Brand name.
    #[serde(default)]
    pub brand: Option<String>,
    /// Model number.
    #[serde(default)]
    pub model: Option<String>,
    /// Serial number.
    #[serde(default)]
    pub serial: Option<String>,
    /// User-assigned name.
    #[serde(default)]
    pub nickname: Option<String>,
    /// Firmware version string, when the service reports one.
    #[serde(default)]
    pub firmware: Option<String>,
}

/// Response of `GET /appliance/{id}/feature`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureListing {
    /// Feature identifiers.
    #[serde(default)]
    pub features: Vec<String>,
}

/// Response of `GET /appliance/{id}/erd/{code}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErdValue {
    /// The hex payload. Some gateways send non-string JSON here.
    pub value: serde_json::Value,
}

impl ErdValue {
    /// Returns the payload as a string.
    #[must_use]
    pub fn into_raw(self) -> String {
        match self.value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        }
    }
}

/// Body of `POST /appliance/{id}/erd/{code}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErdWrite<'a> {
    /// Always `appliance#erdListEntry`.
    pub kind: &'static str,
    /// Account that owns the appliance.
    pub user_id: &'a str,
    /// Target appliance.
    pub appliance_id: &'a ApplianceId,
    /// Target ERD.
    pub erd: Erd,
    /// Hex payload.
    pub value: &'a str,
}

impl<'a> ErdWrite<'a> {
    /// Resource kind of an ERD write.
    pub const KIND: &'static str = "appliance#erdListEntry";

    /// Creates a write body.
    #[must_use]
    pub fn new(user_id: &'a str, appliance_id: &'a ApplianceId, erd: Erd, value: &'a str) -> Self {
        Self {
            kind: Self::KIND,
            user_id,
            appliance_id,
            erd,
            value,
        }
    }
}

/// Response of `GET /websocket`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebsocketEndpoint {
    /// The `wss://` URL to connect to.
    pub endpoint: String,
}
