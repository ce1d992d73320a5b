//! Client facade with builder pattern.
//!
//! The call surface bridge callers see: session lifecycle, header overlay,
//! the five request methods, uploads and cancellation, all addressed by base
//! URL and task id.
//!
//! # Example
//!
//! ```rust,ignore
//! use sessionnet::{Client, RequestOptions, SessionConfig};
//!
//! let client = Client::new();
//! client.create_session("https://chat.example.com", SessionConfig::default())?;
//!
//! let resp = client
//!     .get("https://chat.example.com", "/api/v4/users/me", RequestOptions::new())
//!     .await?;
//! ```

use crate::auth::{CredentialStore, MemoryCredentialStore};
use crate::base::neterror::NetError;
use crate::config::SessionConfig;
use crate::http::headers::HeaderSet;
use crate::http::response::ClientResponse;
use crate::http::transaction::{self, RequestOptions};
use crate::registry::SessionRegistry;
use crate::session::Session;
use crate::transport::{HyperTransportFactory, TransportFactory};
use crate::upload::{UploadManager, UploadOptions};
use http::Method;
use std::path::Path;
use std::sync::Arc;

/// Per-origin session manager.
///
/// Use [`Client::builder()`] to plug in a credential store or transport.
#[derive(Clone, Debug)]
pub struct Client {
    registry: Arc<SessionRegistry>,
    uploads: UploadManager,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Create a client with an in-memory credential store and the hyper
    /// transport.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn create_session(&self, base_url: &str, config: SessionConfig) -> Result<(), NetError> {
        self.registry.create_session(base_url, config).map(|_| ())
    }

    /// Create a session from the bridge JSON configuration map.
    pub fn create_session_from_json(
        &self,
        base_url: &str,
        config: serde_json::Value,
    ) -> Result<(), NetError> {
        self.create_session(base_url, SessionConfig::from_json(config)?)
    }

    pub fn get_session(&self, base_url: &str) -> Option<Arc<Session>> {
        self.registry.get_session(base_url)
    }

    pub fn invalidate_session(&self, base_url: &str) -> Result<(), NetError> {
        self.registry.invalidate_session(base_url)
    }

    pub fn get_headers(&self, base_url: &str) -> Result<HeaderSet, NetError> {
        self.registry.get_headers(base_url)
    }

    pub fn add_headers(&self, base_url: &str, headers: &HeaderSet) -> Result<(), NetError> {
        self.registry.add_headers(base_url, headers)
    }

    pub async fn get(
        &self,
        base_url: &str,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ClientResponse, NetError> {
        self.request(Method::GET, base_url, endpoint, options).await
    }

    pub async fn put(
        &self,
        base_url: &str,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ClientResponse, NetError> {
        self.request(Method::PUT, base_url, endpoint, options).await
    }

    pub async fn post(
        &self,
        base_url: &str,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ClientResponse, NetError> {
        self.request(Method::POST, base_url, endpoint, options).await
    }

    pub async fn patch(
        &self,
        base_url: &str,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ClientResponse, NetError> {
        self.request(Method::PATCH, base_url, endpoint, options).await
    }

    pub async fn delete(
        &self,
        base_url: &str,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ClientResponse, NetError> {
        self.request(Method::DELETE, base_url, endpoint, options).await
    }

    /// Dispatch a request with any method on the session for `base_url`.
    pub async fn request(
        &self,
        method: Method,
        base_url: &str,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<ClientResponse, NetError> {
        let session = self.registry.require_session(base_url)?;
        transaction::execute(&session, method, endpoint, options).await
    }

    pub async fn upload(
        &self,
        base_url: &str,
        endpoint: &str,
        path: impl AsRef<Path>,
        task_id: &str,
        options: UploadOptions,
    ) -> Result<ClientResponse, NetError> {
        self.uploads.upload(base_url, endpoint, path, task_id, options).await
    }

    /// Cancel an in-flight request or upload by task id.
    pub fn cancel_request(&self, task_id: &str) -> Result<(), NetError> {
        self.registry.cancel_request(task_id)
    }
}

/// Builder for creating a [`Client`].
#[derive(Default)]
pub struct ClientBuilder {
    credentials: Option<Arc<dyn CredentialStore>>,
    transports: Option<Arc<dyn TransportFactory>>,
    cancel_replaced_sessions: Option<bool>,
}

impl ClientBuilder {
    /// Set the credential store. Defaults to [`MemoryCredentialStore`].
    pub fn credential_store<S: CredentialStore + 'static>(mut self, store: S) -> Self {
        self.credentials = Some(Arc::new(store));
        self
    }

    /// Set the transport factory. Defaults to [`HyperTransportFactory`].
    pub fn transport_factory<F: TransportFactory + 'static>(mut self, factory: F) -> Self {
        self.transports = Some(Arc::new(factory));
        self
    }

    /// Whether replacing a session cancels its in-flight operations
    /// (default: true).
    pub fn cancel_replaced_sessions(mut self, enabled: bool) -> Self {
        self.cancel_replaced_sessions = Some(enabled);
        self
    }

    pub fn build(self) -> Client {
        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new()));
        let transports = self
            .transports
            .unwrap_or_else(|| Arc::new(HyperTransportFactory));
        let registry = Arc::new(
            SessionRegistry::new(credentials, transports)
                .cancel_replaced(self.cancel_replaced_sessions.unwrap_or(true)),
        );
        Client {
            uploads: UploadManager::new(registry.clone()),
            registry,
        }
    }
}
