// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event system for appliance changes.
//!
//! The [`EventBus`] broadcasts [`ApplianceEvent`]s: appliances appearing or
//! disappearing, mirror entries being replaced, and push channel state
//! transitions.

mod appliance_event;
mod event_bus;

pub use appliance_event::ApplianceEvent;
pub use event_bus::EventBus;
