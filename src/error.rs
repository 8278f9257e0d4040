// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `SmartHQ` library.
//!
//! Every component reports its own error enum; all of them convert into the
//! top-level [`Error`]. Apart from a failed appliance discovery, each of these
//! is recovered at the component boundary: the push channel reconnects, the
//! scheduler logs and moves on, and the mirror keeps its last known value.

use std::fmt;

use thiserror::Error;

use crate::erd::Erd;
use crate::types::ApplianceId;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// The remote API could not be reached or rejected a request.
    #[error("remote communication error: {0}")]
    Communication(#[from] CommunicationError),

    /// A raw ERD payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A value could not be encoded for the wire.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// An ERD code is not part of the catalog.
    #[error(transparent)]
    UnknownErd(#[from] UnknownErdError),

    /// The push channel failed.
    #[error("push channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Appliance discovery failed.
    #[error("discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// The appliance was not reported by discovery.
    #[error("unknown appliance: {0}")]
    UnknownAppliance(ApplianceId),

    /// The bridge has not completed discovery yet.
    #[error("bridge is not started")]
    NotStarted,
}

/// Identifies the resource a remote call was about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestContext {
    /// A call that is not scoped to one appliance (listing, websocket lookup).
    Path(String),
    /// A call scoped to one appliance, optionally to one ERD.
    Appliance {
        /// The appliance the call targets.
        appliance_id: ApplianceId,
        /// The ERD the call targets, if any.
        erd: Option<Erd>,
    },
}

impl RequestContext {
    /// Creates a context for an appliance-level call.
    #[must_use]
    pub fn appliance(appliance_id: &ApplianceId) -> Self {
        Self::Appliance {
            appliance_id: appliance_id.clone(),
            erd: None,
        }
    }

    /// Creates a context for a single ERD of an appliance.
    #[must_use]
    pub fn erd(appliance_id: &ApplianceId, erd: Erd) -> Self {
        Self::Appliance {
            appliance_id: appliance_id.clone(),
            erd: Some(erd),
        }
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{path}"),
            Self::Appliance {
                appliance_id,
                erd: None,
            } => write!(f, "appliance {appliance_id}"),
            Self::Appliance {
                appliance_id,
                erd: Some(erd),
            } => write!(f, "appliance {appliance_id} erd {erd}"),
        }
    }
}

/// Transport failures and non-success responses from the remote API.
///
/// Accessory hosts should surface every variant as "service unavailable"
/// rather than falling back to a stale value; see
/// [`is_service_unavailable`](Self::is_service_unavailable).
#[derive(Debug, Error)]
pub enum CommunicationError {
    /// The HTTP request could not be sent or its body could not be read.
    #[error("{context}: transport failure: {source}")]
    Transport {
        /// What the request was about.
        context: RequestContext,
        /// The underlying HTTP error.
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success status code.
    #[error("{context}: HTTP {status}: {body}")]
    Status {
        /// What the request was about.
        context: RequestContext,
        /// The HTTP status code.
        status: u16,
        /// The response body, for diagnostics.
        body: String,
    },

    /// The bearer token was rejected.
    #[error("{context}: unauthorized")]
    Unauthorized {
        /// What the request was about.
        context: RequestContext,
    },

    /// The request did not complete in time.
    #[error("{context}: timed out after {timeout_ms} ms")]
    Timeout {
        /// What the request was about.
        context: RequestContext,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The response could not be interpreted.
    #[error("{context}: invalid response: {message}")]
    InvalidResponse {
        /// What the request was about.
        context: RequestContext,
        /// Description of the problem.
        message: String,
    },
}

impl CommunicationError {
    /// Returns the context of the failed request.
    #[must_use]
    pub fn context(&self) -> &RequestContext {
        match self {
            Self::Transport { context, .. }
            | Self::Status { context, .. }
            | Self::Unauthorized { context }
            | Self::Timeout { context, .. }
            | Self::InvalidResponse { context, .. } => context,
        }
    }

    /// Returns `true` when a consumer should report the resource as
    /// unavailable. Every remote failure qualifies.
    #[must_use]
    pub fn is_service_unavailable(&self) -> bool {
        true
    }

    /// Returns `true` if the failure was a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if the bearer token was rejected.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Errors raised while decoding a raw ERD payload.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload is empty.
    #[error("{erd}: empty payload")]
    Empty {
        /// The ERD being decoded.
        erd: Erd,
    },

    /// The payload is not valid hexadecimal.
    #[error("{erd}: invalid hex payload {raw:?}")]
    InvalidHex {
        /// The ERD being decoded.
        erd: Erd,
        /// The offending payload.
        raw: String,
    },

    /// The payload is shorter than the structure requires.
    #[error("{erd}: payload too short, expected at least {expected} bytes, got {actual}")]
    PayloadTooShort {
        /// The ERD being decoded.
        erd: Erd,
        /// Minimum number of bytes.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// The payload is longer than the value type can hold.
    #[error("{erd}: payload too long, expected at most {max} bytes, got {actual}")]
    PayloadTooLong {
        /// The ERD being decoded.
        erd: Erd,
        /// Maximum number of bytes.
        max: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// The payload should contain text but is not valid UTF-8.
    #[error("{erd}: payload is not valid text")]
    InvalidText {
        /// The ERD being decoded.
        erd: Erd,
    },
}

/// Errors raised while encoding a value for the wire.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The value type does not match the ERD's decode rule.
    #[error("{erd}: expected a {expected} value")]
    TypeMismatch {
        /// The ERD being encoded.
        erd: Erd,
        /// The value kind the ERD accepts.
        expected: &'static str,
    },

    /// A composite ERD needs its current payload to be known.
    #[error("{erd}: current payload is unknown")]
    MissingPayload {
        /// The ERD being encoded.
        erd: Erd,
    },

    /// The value does not fit in the wire field.
    #[error("{erd}: value {value} does not fit in the wire field")]
    OutOfRange {
        /// The ERD being encoded.
        erd: Erd,
        /// The rejected value, rendered for diagnostics.
        value: String,
    },

    /// The ERD is bound read-only for this appliance.
    #[error("{erd}: read-only for this appliance")]
    ReadOnly {
        /// The ERD being encoded.
        erd: Erd,
    },

    /// The existing composite payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// An ERD code that is not part of the catalog.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown ERD code {code:?}")]
pub struct UnknownErdError {
    /// The code as received.
    pub code: String,
}

/// Push channel failures. All of them lead to a reconnect with backoff.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The websocket endpoint could not be obtained.
    #[error("websocket endpoint lookup failed: {0}")]
    Endpoint(#[from] CommunicationError),

    /// The websocket handshake failed.
    #[error("websocket connection failed: {0}")]
    Connect(String),

    /// A frame could not be sent.
    #[error("websocket send failed: {0}")]
    Send(String),

    /// The connection broke while reading.
    #[error("websocket protocol error: {0}")]
    Protocol(String),

    /// The server closed the connection.
    #[error("websocket closed by server (code {code}): {reason}")]
    Closed {
        /// Close code sent by the server.
        code: u16,
        /// Close reason sent by the server.
        reason: String,
    },

    /// No traffic was received within the inactivity timeout.
    #[error("no traffic for {timeout_secs}s")]
    KeepaliveTimeout {
        /// The inactivity timeout that elapsed.
        timeout_secs: u64,
    },
}

impl ChannelError {
    /// Returns `true` if the service rejected the credentials.
    ///
    /// Retrying cannot succeed until the token is replaced.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Endpoint(e) if e.is_unauthorized())
    }
}

/// Configuration problems detected while resolving settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document is not valid JSON for this schema.
    #[error("invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),

    /// A refresh rate of zero seconds was configured.
    #[error("refresh rate must be at least one second ({scope})")]
    InvalidRefreshRate {
        /// Where the rate was configured.
        scope: String,
    },

    /// A timing setting of zero was configured.
    #[error("{field} must be greater than zero")]
    InvalidDuration {
        /// The offending setting.
        field: &'static str,
    },

    /// The API URL could not be parsed.
    #[error("invalid API URL {url:?}: {source}")]
    InvalidUrl {
        /// The configured URL.
        url: String,
        /// The parse failure.
        #[source]
        source: url::ParseError,
    },

    /// The HTTP client could not be built.
    #[error("HTTP client could not be created: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Appliance discovery failed as a whole.
#[derive(Debug, Error)]
#[error("appliance listing failed: {source}")]
pub struct DiscoveryError {
    /// The failed listing call.
    #[from]
    pub source: CommunicationError,
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn communication_error_carries_context() {
        let err = CommunicationError::Status {
            context: RequestContext::erd(&ApplianceId::from("D828C9D1"), Erd::DoorStatus),
            status: 503,
            body: "busy".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "appliance D828C9D1 erd 0x1016: HTTP 503: busy"
        );
        assert!(err.is_service_unavailable());
        assert!(!err.is_timeout());
    }

    #[test]
    fn rejected_token_is_an_auth_failure() {
        let err = ChannelError::Endpoint(CommunicationError::Unauthorized {
            context: RequestContext::Path("websocket".to_string()),
        });
        assert!(err.is_auth_failure());
        assert!(!ChannelError::Connect("refused".to_string()).is_auth_failure());
    }

    #[test]
    fn decode_error_display() {
        let err = DecodeError::PayloadTooShort {
            erd: Erd::UpperOvenCookMode,
            expected: 3,
            actual: 1,
        };
        assert_eq!(
            err.to_string(),
            "0x5100: payload too short, expected at least 3 bytes, got 1"
        );
    }

    #[test]
    fn unknown_erd_display() {
        let err = UnknownErdError {
            code: "0x9999".to_string(),
        };
        assert_eq!(err.to_string(), "unknown ERD code \"0x9999\"");
    }

    #[test]
    fn error_from_decode_error() {
        let err: Error = DecodeError::Empty {
            erd: Erd::DoorStatus,
        }
        .into();
        assert!(matches!(err, Error::Decode(DecodeError::Empty { .. })));
    }

    #[test]
    fn path_context_display() {
        let ctx = RequestContext::Path("appliance".to_string());
        assert_eq!(ctx.to_string(), "appliance");
    }
}
