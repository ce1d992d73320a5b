//! Transport abstraction.
//!
//! A session talks to the network through a [`Transport`], built once per
//! session by a [`TransportFactory`] from the session's tuning knobs. The
//! default implementation is [`HyperTransport`]; tests plug in their own.
//!
//! A transport executes one attempt: connect, send, follow redirects if the
//! tuning asks for it, and collect the body. Retries, timeouts per attempt
//! and authentication live above it in the dispatcher.

pub mod body;
pub mod h1;
pub mod socket;

pub use self::body::{FileBody, PreparedBody};
pub use self::h1::HyperTransport;

use crate::base::neterror::NetError;
use crate::config::TransportTuning;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::{fmt, future::Future, pin::Pin, sync::Arc};
use url::Url;

/// A fully prepared request. Cloned for every attempt.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: PreparedBody,
}

impl PreparedRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: PreparedBody::Empty,
        }
    }
}

/// Response of the final hop with its body collected.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// URL that produced this response.
    pub url: Url,
}

/// Alias for the `Future` returned by a transport.
pub type Executing = Pin<Box<dyn Future<Output = Result<TransportResponse, NetError>> + Send>>;

/// Executes prepared requests. Implementations must be safe to share
/// between concurrent requests.
pub trait Transport: Send + Sync {
    fn execute(&self, request: PreparedRequest) -> Executing;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn execute(&self, request: PreparedRequest) -> Executing {
        (**self).execute(request)
    }
}

/// Builds the transport a new session will use.
pub trait TransportFactory: Send + Sync {
    fn create(&self, tuning: &TransportTuning) -> Result<Arc<dyn Transport>, NetError>;
}

impl<F> TransportFactory for F
where
    F: Fn(&TransportTuning) -> Result<Arc<dyn Transport>, NetError> + Send + Sync,
{
    fn create(&self, tuning: &TransportTuning) -> Result<Arc<dyn Transport>, NetError> {
        self(tuning)
    }
}

/// Factory for [`HyperTransport`].
#[derive(Clone, Copy, Debug, Default)]
pub struct HyperTransportFactory;

impl TransportFactory for HyperTransportFactory {
    fn create(&self, tuning: &TransportTuning) -> Result<Arc<dyn Transport>, NetError> {
        Ok(Arc::new(HyperTransport::new(tuning.clone())?))
    }
}

impl fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transport")
    }
}
