//! Bearer token injection and capture.
//!
//! Outgoing: every attempt reads the host's credential and sets
//! `Authorization: Bearer <token>` unless the caller supplied Authorization
//! on that request. Incoming: a configured response header rotates the stored
//! token, and a 401 may cancel the session's other in-flight operations.

use super::store::{Credential, CredentialStore};
use crate::config::SessionConfig;
use crate::session::Session;
use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::sync::Arc;

pub struct AuthInterceptor {
    host: String,
    store: Arc<dyn CredentialStore>,
    token_header: Option<HeaderName>,
    cancel_on_unauthorized: bool,
}

impl AuthInterceptor {
    pub fn new(
        host: impl Into<String>,
        store: Arc<dyn CredentialStore>,
        config: &SessionConfig,
    ) -> Self {
        let token_header = config
            .auth_adapter
            .bearer_auth_token_response_header
            .as_deref()
            .and_then(|name| match HeaderName::from_bytes(name.as_bytes()) {
                Ok(header) => Some(header),
                Err(_) => {
                    tracing::warn!(header = %name, "ignoring invalid token header name");
                    None
                }
            });
        Self {
            host: host.into(),
            store,
            token_header,
            cancel_on_unauthorized: config.tuning.cancel_on_unauthorized,
        }
    }

    pub fn token_header(&self) -> Option<&HeaderName> {
        self.token_header.as_ref()
    }

    /// Outgoing hook. `caller_authorization` is true when the per-request
    /// headers set Authorization themselves.
    pub fn apply(&self, headers: &mut HeaderMap, caller_authorization: bool) {
        if caller_authorization {
            return;
        }
        let Some(credential) = self.store.get(&self.host) else {
            return;
        };
        match HeaderValue::from_str(&format!("Bearer {}", credential.expose())) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => {
                tracing::warn!(host = %self.host, "stored credential is not a valid header value");
            }
        }
    }

    /// Incoming hook, run on the terminal response of an operation.
    pub fn on_response(
        &self,
        session: &Session,
        task_id: &str,
        status: StatusCode,
        headers: &HeaderMap,
    ) {
        if let Some(name) = &self.token_header {
            if let Some(token) = headers.get(name).and_then(|v| v.to_str().ok()) {
                let token = token.trim();
                let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
                if !token.is_empty() {
                    self.store.set(&self.host, Credential::new(token));
                    tracing::debug!(host = %self.host, "bearer token rotated");
                }
            }
        }

        if status == StatusCode::UNAUTHORIZED && self.cancel_on_unauthorized {
            let cancelled = session.cancel_all_except(task_id);
            if cancelled > 0 {
                tracing::warn!(
                    host = %self.host,
                    task_id = %task_id,
                    cancelled,
                    "unauthorized response cancelled in-flight requests"
                );
            }
        }
    }
}

impl std::fmt::Debug for AuthInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthInterceptor")
            .field("host", &self.host)
            .field("token_header", &self.token_header)
            .field("cancel_on_unauthorized", &self.cancel_on_unauthorized)
            .finish()
    }
}
