//! Session configuration.
//!
//! Pure data. Bridge callers hand over a camelCase JSON map; Rust callers
//! build [`SessionConfig`] directly. Every field is optional in JSON.

use crate::base::neterror::NetError;
use crate::http::headers::HeaderSet;
use crate::http::retry::RetryPolicy;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_RESOURCE_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);
pub const DEFAULT_MAX_CONNECTIONS_PER_HOST: usize = 6;

/// Everything a session applies to its requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub headers: HeaderSet,
    #[serde(rename = "sessionConfiguration")]
    pub tuning: TransportTuning,
    #[serde(rename = "retryPolicyConfiguration")]
    pub retry_policy: RetryPolicy,
    #[serde(rename = "requestAdapterConfiguration")]
    pub auth_adapter: AuthAdapterConfig,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the bridge JSON option map.
    pub fn from_json(value: serde_json::Value) -> Result<Self, NetError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).map_err(|e| NetError::InvalidOptions(e.to_string()))
    }

    pub fn headers(mut self, headers: HeaderSet) -> Self {
        self.headers = headers;
        self
    }

    pub fn tuning(mut self, tuning: TransportTuning) -> Self {
        self.tuning = tuning;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Capture refreshed bearer tokens from this response header.
    pub fn token_header(mut self, name: impl Into<String>) -> Self {
        self.auth_adapter.bearer_auth_token_response_header = Some(name.into());
        self
    }

    pub fn cancel_on_unauthorized(mut self, enabled: bool) -> Self {
        self.tuning.cancel_on_unauthorized = enabled;
        self
    }
}

/// Knobs forwarded to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportTuning {
    pub follow_redirects: bool,
    /// Carried for transports that distinguish metered links.
    pub allows_cellular_access: bool,
    /// Wait for the network to come up instead of failing the connect.
    pub waits_for_connectivity: bool,
    /// Bound on a single attempt.
    #[serde(
        rename = "timeoutIntervalForRequest",
        deserialize_with = "de_seconds",
        serialize_with = "ser_seconds"
    )]
    pub request_timeout: Duration,
    /// Bound on the whole call, retries included.
    #[serde(
        rename = "timeoutIntervalForResource",
        deserialize_with = "de_seconds",
        serialize_with = "ser_seconds"
    )]
    pub resource_timeout: Duration,
    #[serde(rename = "httpMaximumConnectionsPerHost")]
    pub max_connections_per_host: usize,
    /// A 401 cancels every other in-flight operation on the session.
    #[serde(rename = "cancelRequestsOnUnauthorized")]
    pub cancel_on_unauthorized: bool,
}

impl Default for TransportTuning {
    fn default() -> Self {
        Self {
            follow_redirects: true,
            allows_cellular_access: true,
            waits_for_connectivity: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            resource_timeout: DEFAULT_RESOURCE_TIMEOUT,
            max_connections_per_host: DEFAULT_MAX_CONNECTIONS_PER_HOST,
            cancel_on_unauthorized: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthAdapterConfig {
    /// Response header carrying a refreshed bearer token.
    pub bearer_auth_token_response_header: Option<String>,
}

/// Seconds as a JSON number, fractional allowed.
pub(crate) fn de_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

pub(crate) fn de_opt_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Duration>, D::Error> {
    match Option::<f64>::deserialize(deserializer)? {
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

pub(crate) fn ser_seconds<S: Serializer>(
    value: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}
