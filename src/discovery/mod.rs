// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Appliance discovery.
//!
//! Discovery lists the appliances of the account, then fetches the details
//! and the feature list of each appliance in parallel and merges them into
//! an [`Appliance`]. Only a failed listing fails discovery as a whole; an
//! appliance whose detail or feature call fails is logged and left out.
//!
//! # Examples
//!
//! ```no_run
//! use smarthq_lib::discovery::discover;
//! use smarthq_lib::manager::BridgeConfig;
//! use smarthq_lib::protocol::HttpConfig;
//!
//! # async fn example() -> smarthq_lib::Result<()> {
//! let client = HttpConfig::default().with_token("secret").into_client()?;
//! let discovery = discover(&client, &BridgeConfig::default()).await?;
//!
//! for appliance in &discovery.appliances {
//!     println!("{} ({}): {}", appliance.nickname, appliance.appliance_type, appliance.id);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;

use futures_util::future::join_all;

use crate::error::{CommunicationError, DiscoveryError};
use crate::manager::BridgeConfig;
use crate::protocol::ResourceClient;
use crate::protocol::models::ApplianceSummary;
use crate::types::{Appliance, ApplianceId, FirmwareVersion, clean_display_name};

/// Result of a discovery run.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    /// Account the appliances belong to.
    pub user_id: String,
    /// Visible appliances, in listing order.
    pub appliances: Vec<Appliance>,
}

impl Discovery {
    /// Returns the identifiers of the discovered appliances.
    #[must_use]
    pub fn ids(&self) -> HashSet<ApplianceId> {
        self.appliances.iter().map(|a| a.id.clone()).collect()
    }

    /// Compares this run against the appliances known before it.
    #[must_use]
    pub fn diff<'a>(&self, known: impl IntoIterator<Item = &'a ApplianceId>) -> DiscoveryDiff {
        let known: HashSet<&ApplianceId> = known.into_iter().collect();
        let current = self.ids();

        let added = self
            .appliances
            .iter()
            .filter(|a| !known.contains(&a.id))
            .map(|a| a.id.clone())
            .collect();
        let removed = known
            .into_iter()
            .filter(|id| !current.contains(*id))
            .cloned()
            .collect();

        DiscoveryDiff { added, removed }
    }
}

/// Appliances that appeared or disappeared between two discovery runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryDiff {
    /// Newly reported appliances.
    pub added: Vec<ApplianceId>,
    /// Appliances no longer reported.
    pub removed: Vec<ApplianceId>,
}

impl DiscoveryDiff {
    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Discovers the appliances of the account.
///
/// Appliances marked hidden in `config` are skipped. Nicknames are cleaned
/// unless `allowInvalidCharacters` is set.
///
/// # Errors
///
/// Returns [`DiscoveryError`] if the appliance listing cannot be fetched.
pub async fn discover(
    client: &ResourceClient,
    config: &BridgeConfig,
) -> Result<Discovery, DiscoveryError> {
    let listing = client.list_appliances().await.inspect_err(|e| {
        tracing::error!(error = %e, "Failed to discover appliances");
    })?;

    tracing::info!(
        count = listing.items.len(),
        "Discovered appliances"
    );

    let visible = listing.items.into_iter().filter(|summary| {
        let hidden = config.resolve(&summary.appliance_id).hidden;
        if hidden {
            tracing::info!(appliance_id = %summary.appliance_id, "Hiding appliance");
        }
        !hidden
    });

    let user_id = listing.user_id;
    let fetches = visible.map(|summary| describe(client, config, &user_id, summary));

    let appliances = join_all(fetches)
        .await
        .into_iter()
        .filter_map(|result| {
            result
                .inspect_err(|e| {
                    tracing::warn!(error = %e, "Skipping appliance that could not be described");
                })
                .ok()
        })
        .collect();

    Ok(Discovery {
        user_id,
        appliances,
    })
}

/// Fetches details and features of one appliance and merges them.
async fn describe(
    client: &ResourceClient,
    config: &BridgeConfig,
    user_id: &str,
    summary: ApplianceSummary,
) -> Result<Appliance, CommunicationError> {
    let id = summary.appliance_id;
    let (details, features) = tokio::try_join!(
        client.appliance_details(&id),
        client.appliance_features(&id)
    )?;

    let raw_name = summary
        .nickname
        .or(details.nickname)
        .unwrap_or_else(|| id.to_string());
    let nickname = if config.options.allow_invalid_characters {
        raw_name
    } else {
        clean_display_name(&raw_name, "nickname")
    };

    let settings = config.resolve(&id);
    let firmware =
        FirmwareVersion::normalize(settings.firmware.as_deref().or(details.firmware.as_deref()));

    let appliance = Appliance {
        appliance_type: summary.appliance_type.into(),
        nickname,
        brand: details.brand,
        model: details.model,
        serial: details.serial,
        features: features.features.into_iter().collect(),
        firmware,
        user_id: user_id.to_string(),
        id,
    };

    tracing::debug!(
        appliance_id = %appliance.id,
        appliance_type = %appliance.appliance_type,
        nickname = %appliance.nickname,
        firmware = %appliance.firmware,
        features = appliance.features.len(),
        "Described appliance"
    );

    Ok(appliance)
}
