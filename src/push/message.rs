// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Websocket message shapes.

use serde::{Deserialize, Serialize};

use crate::erd::Erd;
use crate::types::ApplianceId;

/// Resource pattern covering every ERD of every appliance.
pub const ALL_ERDS: &str = "/appliance/*/erd/*";

/// Kind of an ERD change notification.
const PUBLISH_ERD: &str = "publish#erd";

/// Frames sent to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum OutgoingMessage {
    /// Subscribes to resource patterns.
    #[serde(rename = "websocket#subscribe")]
    Subscribe {
        /// Always `subscribe`.
        action: &'static str,
        /// Resource patterns.
        resources: Vec<String>,
    },
    /// Keepalive ping.
    #[serde(rename = "websocket#ping")]
    Ping {
        /// Correlation identifier.
        id: &'static str,
        /// Always `ping`.
        action: &'static str,
    },
}

impl OutgoingMessage {
    /// Subscription to every ERD change.
    #[must_use]
    pub fn subscribe_all() -> Self {
        Self::Subscribe {
            action: "subscribe",
            resources: vec![ALL_ERDS.to_string()],
        }
    }

    /// Keepalive ping.
    #[must_use]
    pub fn ping() -> Self {
        Self::Ping {
            id: "keepalive-ping",
            action: "ping",
        }
    }

    /// Serializes the frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ErdPublish {
    item: ErdItem,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErdItem {
    appliance_id: ApplianceId,
    erd: String,
    value: serde_json::Value,
}

/// A classified incoming frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingMessage {
    /// An ERD changed on an appliance.
    ErdChanged {
        /// The appliance.
        appliance_id: ApplianceId,
        /// The ERD.
        erd: Erd,
        /// Raw hex payload.
        value: String,
    },
    /// An ERD change for a code outside the catalog.
    UnknownErd {
        /// The appliance.
        appliance_id: ApplianceId,
        /// The code as received.
        code: String,
    },
    /// Any other kind (pong, subscription acknowledgements, ...).
    Other {
        /// The frame kind.
        kind: String,
    },
}

impl IncomingMessage {
    /// Classifies a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not JSON or an ERD notification is
    /// missing fields.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_str(text)?;
        if envelope.kind != PUBLISH_ERD {
            return Ok(Self::Other {
                kind: envelope.kind,
            });
        }

        let ErdPublish { item } = serde_json::from_str(text)?;
        let value = match item.value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };

        Ok(match Erd::from_code(&item.erd) {
            Ok(erd) => Self::ErdChanged {
                appliance_id: item.appliance_id,
                erd,
                value,
            },
            Err(_) => Self::UnknownErd {
                appliance_id: item.appliance_id,
                code: item.erd,
            },
        })
    }
}
