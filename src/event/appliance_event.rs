// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Appliance event types.

use crate::erd::Erd;
use crate::push::ChannelState;
use crate::state::MirrorEntry;
use crate::types::{Appliance, ApplianceId};

/// Events emitted by the bridge.
///
/// Accessory hosts subscribe to these to refresh characteristics without
/// polling the mirror.
///
/// # Examples
///
/// ```
/// use smarthq_lib::event::ApplianceEvent;
/// use smarthq_lib::push::ChannelState;
/// use smarthq_lib::types::ApplianceId;
///
/// let removed = ApplianceEvent::ApplianceRemoved {
///     appliance_id: ApplianceId::from("D828C9D1"),
/// };
/// assert!(removed.is_lifecycle());
///
/// let state = ApplianceEvent::ChannelStateChanged {
///     state: ChannelState::Receiving,
/// };
/// assert!(state.appliance_id().is_none());
/// ```
#[derive(Debug, Clone)]
pub enum ApplianceEvent {
    /// Discovery found a new appliance.
    ApplianceAdded {
        /// The discovered appliance.
        appliance: Box<Appliance>,
    },

    /// An appliance disappeared from the listing.
    ApplianceRemoved {
        /// The removed appliance.
        appliance_id: ApplianceId,
    },

    /// A mirror entry was replaced.
    ErdChanged {
        /// The appliance the ERD belongs to.
        appliance_id: ApplianceId,
        /// The ERD.
        erd: Erd,
        /// The new entry.
        entry: MirrorEntry,
    },

    /// The push channel changed state.
    ChannelStateChanged {
        /// The new state.
        state: ChannelState,
    },
}

impl ApplianceEvent {
    /// Returns the appliance this event is about, if any.
    #[must_use]
    pub fn appliance_id(&self) -> Option<&ApplianceId> {
        match self {
            Self::ApplianceAdded { appliance } => Some(&appliance.id),
            Self::ApplianceRemoved { appliance_id } | Self::ErdChanged { appliance_id, .. } => {
                Some(appliance_id)
            }
            Self::ChannelStateChanged { .. } => None,
        }
    }

    /// Returns `true` for appliance added/removed events.
    #[must_use]
    pub fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::ApplianceAdded { .. } | Self::ApplianceRemoved { .. }
        )
    }

    /// Returns `true` for ERD changes.
    #[must_use]
    pub fn is_erd_change(&self) -> bool {
        matches!(self, Self::ErdChanged { .. })
    }
}
