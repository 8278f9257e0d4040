// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Remote access to the `SmartHQ` cloud.
//!
//! [`ResourceClient`] is the authenticated REST client. The two traits in
//! this module are the seams the rest of the library depends on:
//!
//! - [`ErdTransport`]: reading and writing single ERDs, used by the
//!   reconciliation scheduler
//! - [`EndpointSource`]: looking up the push websocket URL, used by the
//!   push channel on every (re)connect

mod http;
pub mod models;

pub use http::{HttpConfig, ResourceClient};

use std::future::Future;

use url::Url;

use crate::erd::Erd;
use crate::error::CommunicationError;
use crate::types::ApplianceId;

/// Reads and writes single ERDs.
pub trait ErdTransport: Send + Sync + 'static {
    /// Reads the raw hex payload of one ERD.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError`] on transport failure or a non-success
    /// response.
    fn read_erd(
        &self,
        appliance_id: &ApplianceId,
        erd: Erd,
    ) -> impl Future<Output = Result<String, CommunicationError>> + Send;

    /// Writes the raw hex payload of one ERD.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError`] on transport failure or a non-success
    /// response.
    fn write_erd(
        &self,
        user_id: &str,
        appliance_id: &ApplianceId,
        erd: Erd,
        value: &str,
    ) -> impl Future<Output = Result<(), CommunicationError>> + Send;
}

/// Provides the push websocket URL.
pub trait EndpointSource: Send + Sync + 'static {
    /// Returns the URL to connect to.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError`] if the lookup fails.
    fn websocket_endpoint(&self)
    -> impl Future<Output = Result<Url, CommunicationError>> + Send;
}

/// A fixed endpoint, for deployments that already know the URL.
impl EndpointSource for Url {
    async fn websocket_endpoint(&self) -> Result<Url, CommunicationError> {
        Ok(self.clone())
    }
}
