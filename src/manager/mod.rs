// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level bridge for one `SmartHQ` account.
//!
//! The [`SmartHqBridge`] is the entry point for accessory hosts. It provides:
//!
//! - **Discovery**: lists the account's appliances and their features
//! - **Mirroring**: keeps the latest value of every relevant ERD in memory
//! - **Push updates**: applies websocket notifications as they arrive
//! - **Reconciliation**: polls each appliance on its refresh period
//! - **Writes**: encodes values, writes them, and records them optimistically
//!
//! # Examples
//!
//! ```no_run
//! use smarthq_lib::manager::{BridgeConfig, SmartHqBridge};
//!
//! #[tokio::main]
//! async fn main() -> smarthq_lib::Result<()> {
//!     let config = BridgeConfig::from_json(r#"{ "options": { "refreshRate": 300 } }"#)?;
//!     let bridge = SmartHqBridge::new(config, "access-token")?;
//!     bridge.start().await?;
//!
//!     for appliance in bridge.appliances() {
//!         println!("{} ({})", appliance.nickname, appliance.appliance_type);
//!     }
//!
//!     bridge.shutdown().await;
//!     Ok(())
//! }
//! ```

mod bridge;
mod config;

pub use bridge::SmartHqBridge;
pub use config::{
    BridgeConfig, DEFAULT_REFRESH_RATE, DeviceOverride, DeviceSettings, PlatformOptions,
    ReconnectionPolicy, SettingSource,
};
