// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `SmartHQ` Lib - appliance state synchronization for GE `SmartHQ`.
//!
//! This library keeps an in-memory mirror of appliance ERDs (Entity
//! Reference Designators) in sync with the `SmartHQ` cloud, combining
//! periodic polling with a push websocket.
//!
//! # Components
//!
//! - **ERD codec** ([`erd`], [`codec`]): the ERD catalog and the hex payload
//!   decode and encode rules
//! - **Resource client** ([`protocol`]): authenticated REST access
//! - **Push channel** ([`push`]): websocket subscription with keepalive and
//!   reconnection
//! - **Device mirror** ([`state`]): latest value per `(appliance, ERD)`,
//!   ordered by observation sequence
//! - **Reconciliation scheduler** ([`scheduler`]): per-appliance refresh
//!   cycles with a skip-while-busy guard
//!
//! # Quick Start
//!
//! ```no_run
//! use smarthq_lib::SmartHqBridge;
//! use smarthq_lib::codec::DecodedValue;
//! use smarthq_lib::erd::Erd;
//! use smarthq_lib::manager::BridgeConfig;
//! use smarthq_lib::types::Temperature;
//!
//! #[tokio::main]
//! async fn main() -> smarthq_lib::Result<()> {
//!     let bridge = SmartHqBridge::new(BridgeConfig::default(), "access-token")?;
//!     bridge.start().await?;
//!
//!     let oven = "D828C9D1".into();
//!     bridge.set(&oven, Erd::UpperOvenLight, DecodedValue::Flag(true)).await?;
//!     bridge
//!         .set(
//!             &oven,
//!             Erd::UpperOvenCookMode,
//!             DecodedValue::Temperature(Temperature::from_celsius(180.0)),
//!         )
//!         .await?;
//!
//!     if let Some(entry) = bridge.get(&oven, Erd::UpperOvenLight) {
//!         println!("light: {:?} ({:?})", entry.value, entry.source);
//!     }
//!
//!     bridge.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod capabilities;
pub mod codec;
pub mod discovery;
pub mod erd;
pub mod error;
pub mod event;
pub mod manager;
pub mod protocol;
pub mod push;
pub mod scheduler;
pub mod state;
pub mod types;

pub use error::{Error, Result};
pub use manager::SmartHqBridge;
