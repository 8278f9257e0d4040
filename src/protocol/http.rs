// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! REST client for the `SmartHQ` appliance API.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::erd::Erd;
use crate::error::{CommunicationError, ConfigError, RequestContext};
use crate::protocol::models::{
    ApplianceDetails, ApplianceList, ErdValue, ErdWrite, FeatureListing, WebsocketEndpoint,
};
use crate::protocol::{EndpointSource, ErdTransport};
use crate::types::ApplianceId;

// ============================================================================
// HttpConfig - Connection settings for the REST API
// ============================================================================

/// Configuration for the REST client.
///
/// # Examples
///
/// ```
/// use smarthq_lib::protocol::HttpConfig;
/// use std::time::Duration;
///
/// let config = HttpConfig::new("https://api.brillion.geappliances.com/v1/")
///     .with_token("secret")
///     .with_timeout(Duration::from_secs(5));
/// assert_eq!(config.timeout(), Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct HttpConfig {
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpConfig {
    /// Production API root.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.brillion.geappliances.com/v1/";
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

    /// Creates a configuration for the given API root.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the API root.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Creates a [`ResourceClient`] from this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the URL is invalid or the HTTP client
    /// cannot be created.
    pub fn into_client(self) -> Result<ResourceClient, ConfigError> {
        let mut raw = self.base_url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base_url = Url::parse(&raw).map_err(|source| ConfigError::InvalidUrl {
            url: self.base_url.clone(),
            source,
        })?;

        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(ResourceClient {
            base_url,
            client,
            token: Arc::new(RwLock::new(self.token)),
            timeout: self.timeout,
        })
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_URL)
    }
}

// ============================================================================
// ResourceClient - Authenticated access to appliances and ERDs
// ============================================================================

/// Authenticated client for appliance listing, metadata, and ERD access.
///
/// The token is shared between clones; [`set_token`](Self::set_token) takes
/// effect for every subsequent request.
///
/// # Examples
///
/// ```no_run
/// use smarthq_lib::erd::Erd;
/// use smarthq_lib::protocol::HttpConfig;
/// use smarthq_lib::types::ApplianceId;
///
/// # async fn example() -> smarthq_lib::Result<()> {
/// let client = HttpConfig::default().with_token("secret").into_client()?;
/// let raw = client.read_erd(&ApplianceId::from("D828C9D1"), Erd::DoorStatus).await?;
/// println!("door: {raw}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ResourceClient {
    base_url: Url,
    client: Client,
    token: Arc<RwLock<Option<String>>>,
    timeout: Duration,
}

impl ResourceClient {
    /// Returns the API root.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Replaces the bearer token used for subsequent requests.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
        tracing::debug!("Bearer token replaced");
    }

    /// Lists the appliances of the account.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError`] if the request fails.
    pub async fn list_appliances(&self) -> Result<ApplianceList, CommunicationError> {
        let context = RequestContext::Path("appliance".to_string());
        let url = self.url("appliance", &context)?;
        self.get_json(url, context).await
    }

    /// Fetches metadata for one appliance.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError`] if the request fails.
    pub async fn appliance_details(
        &self,
        appliance_id: &ApplianceId,
    ) -> Result<ApplianceDetails, CommunicationError> {
        let context = RequestContext::appliance(appliance_id);
        let path = format!("appliance/{}", urlencoding::encode(appliance_id.as_str()));
        let url = self.url(&path, &context)?;
        self.get_json(url, context).await
    }

    /// Fetches the feature identifiers of one appliance.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError`] if the request fails.
    pub async fn appliance_features(
        &self,
        appliance_id: &ApplianceId,
    ) -> Result<FeatureListing, CommunicationError> {
        let context = RequestContext::appliance(appliance_id);
        let path = format!(
            "appliance/{}/feature",
            urlencoding::encode(appliance_id.as_str())
        );
        let url = self.url(&path, &context)?;
        self.get_json(url, context).await
    }

    /// Reads the raw payload of one ERD.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError`] if the request fails.
    pub async fn read_erd(
        &self,
        appliance_id: &ApplianceId,
        erd: Erd,
    ) -> Result<String, CommunicationError> {
        let context = RequestContext::erd(appliance_id, erd);
        let url = self.url(&Self::erd_path(appliance_id, erd), &context)?;
        let value: ErdValue = self.get_json(url, context).await?;
        let raw = value.into_raw();
        tracing::debug!(appliance_id = %appliance_id, erd = %erd, raw = %raw, "Read ERD");
        Ok(raw)
    }

    /// Writes the raw payload of one ERD.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError`] if the request fails.
    pub async fn write_erd(
        &self,
        user_id: &str,
        appliance_id: &ApplianceId,
        erd: Erd,
        value: &str,
    ) -> Result<(), CommunicationError> {
        let context = RequestContext::erd(appliance_id, erd);
        let url = self.url(&Self::erd_path(appliance_id, erd), &context)?;
        let body = ErdWrite::new(user_id, appliance_id, erd, value);

        tracing::debug!(appliance_id = %appliance_id, erd = %erd, value, "Writing ERD");

        let request = self.authorize(self.client.post(url).json(&body));
        self.execute(request, &context).await?;
        Ok(())
    }

    /// Looks up the push websocket endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError`] if the request fails or the endpoint
    /// is not a valid URL.
    pub async fn websocket_endpoint(&self) -> Result<Url, CommunicationError> {
        let context = RequestContext::Path("websocket".to_string());
        let url = self.url("websocket", &context)?;
        let endpoint: WebsocketEndpoint = self.get_json(url, context.clone()).await?;
        Url::parse(&endpoint.endpoint).map_err(|e| CommunicationError::InvalidResponse {
            context,
            message: format!("invalid websocket endpoint {:?}: {e}", endpoint.endpoint),
        })
    }

    fn erd_path(appliance_id: &ApplianceId, erd: Erd) -> String {
        format!(
            "appliance/{}/erd/{}",
            urlencoding::encode(appliance_id.as_str()),
            erd.code()
        )
    }

    fn url(&self, path: &str, context: &RequestContext) -> Result<Url, CommunicationError> {
        self.base_url
            .join(path)
            .map_err(|e| CommunicationError::InvalidResponse {
                context: context.clone(),
                message: format!("cannot build request URL for {path:?}: {e}"),
            })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.token.read().as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        context: RequestContext,
    ) -> Result<T, CommunicationError> {
        tracing::debug!(url = %url, "Sending HTTP request");

        let request = self.authorize(self.client.get(url));
        let body = self.execute(request, &context).await?;

        serde_json::from_str(&body).map_err(|e| CommunicationError::InvalidResponse {
            context,
            message: e.to_string(),
        })
    }

    async fn execute(
        &self,
        request: RequestBuilder,
        context: &RequestContext,
    ) -> Result<String, CommunicationError> {
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(e, context))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(CommunicationError::Unauthorized {
                context: context.clone(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e, context))?;

        if !status.is_success() {
            return Err(CommunicationError::Status {
                context: context.clone(),
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(status = status.as_u16(), body = %body, "Received HTTP response");

        Ok(body)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn transport_error(&self, source: reqwest::Error, context: &RequestContext) -> CommunicationError {
        if source.is_timeout() {
            CommunicationError::Timeout {
                context: context.clone(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            CommunicationError::Transport {
                context: context.clone(),
                source,
            }
        }
    }
}

impl ErdTransport for ResourceClient {
    async fn read_erd(
        &self,
        appliance_id: &ApplianceId,
        erd: Erd,
    ) -> Result<String, CommunicationError> {
        ResourceClient::read_erd(self, appliance_id, erd).await
    }

    async fn write_erd(
        &self,
        user_id: &str,
        appliance_id: &ApplianceId,
        erd: Erd,
        value: &str,
    ) -> Result<(), CommunicationError> {
        ResourceClient::write_erd(self, user_id, appliance_id, erd, value).await
    }
}

impl EndpointSource for ResourceClient {
    async fn websocket_endpoint(&self) -> Result<Url, CommunicationError> {
        ResourceClient::websocket_endpoint(self).await
    }
}
