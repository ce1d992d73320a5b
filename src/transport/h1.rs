//! Default transport: tokio TCP, BoringSSL, hyper HTTP/1.1.
//!
//! One connection per attempt, capped per host by a semaphore sized from
//! `httpMaximumConnectionsPerHost`. Redirects are followed here so the
//! dispatcher only ever sees the final hop.

use super::socket::ConnectJob;
use super::{Executing, PreparedBody, PreparedRequest, Transport, TransportResponse};
use crate::base::neterror::{NetError, TransportErrorKind};
use crate::config::TransportTuning;
use bytes::Bytes;
use dashmap::DashMap;
use futures::TryStreamExt;
use http::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, LOCATION};
use http::{HeaderMap, HeaderValue, Method, Request, StatusCode};
use http_body::Frame;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use std::io;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// Maximum redirects followed for one attempt.
pub const MAX_REDIRECTS: usize = 20;

type OutgoingBody = UnsyncBoxBody<Bytes, io::Error>;

#[derive(Clone)]
pub struct HyperTransport {
    inner: Arc<Inner>,
}

struct Inner {
    tuning: TransportTuning,
    connector: ConnectJob,
    host_limits: DashMap<String, Arc<Semaphore>>,
}

impl HyperTransport {
    pub fn new(tuning: TransportTuning) -> Result<Self, NetError> {
        let connector = ConnectJob::new(tuning.waits_for_connectivity)?;
        Ok(Self {
            inner: Arc::new(Inner {
                tuning,
                connector,
                host_limits: DashMap::new(),
            }),
        })
    }

    pub fn tuning(&self) -> &TransportTuning {
        &self.inner.tuning
    }
}

impl Transport for HyperTransport {
    fn execute(&self, request: PreparedRequest) -> Executing {
        let inner = self.inner.clone();
        Box::pin(async move { inner.execute(request).await })
    }
}

impl Inner {
    async fn execute(&self, mut request: PreparedRequest) -> Result<TransportResponse, NetError> {
        let mut redirects = 0usize;
        loop {
            let (status, headers, body) = self.send_once(&request).await?;
            tracing::debug!(
                method = %request.method,
                url = %request.url,
                status = status.as_u16(),
                "response received"
            );

            let location = if self.tuning.follow_redirects && is_redirect(status) {
                headers.get(LOCATION).cloned()
            } else {
                None
            };
            let Some(location) = location else {
                return Ok(TransportResponse {
                    status,
                    headers,
                    body,
                    url: request.url,
                });
            };

            if redirects >= MAX_REDIRECTS {
                return Err(NetError::transport(
                    TransportErrorKind::TooManyRedirects,
                    format!("stopped after {MAX_REDIRECTS} redirects at {}", request.url),
                ));
            }
            redirects += 1;

            let next = location
                .to_str()
                .ok()
                .and_then(|loc| request.url.join(loc).ok())
                .ok_or_else(|| {
                    NetError::transport(
                        TransportErrorKind::Protocol,
                        format!("invalid Location header from {}", request.url),
                    )
                })?;
            tracing::debug!(
                from = %request.url,
                to = %next,
                status = status.as_u16(),
                "following redirect"
            );
            request = redirect_request(request, status, next);
        }
    }

    async fn send_once(
        &self,
        request: &PreparedRequest,
    ) -> Result<(StatusCode, HeaderMap, Bytes), NetError> {
        // Held until the body is fully read.
        let _permit = self.acquire(&request.url).await?;

        let socket = self.connector.connect(&request.url).await?;
        let (mut sender, conn) = http1::handshake::<_, OutgoingBody>(TokioIo::new(socket))
            .await
            .map_err(classify_hyper)?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "connection closed with error");
            }
        });

        let response = sender
            .send_request(build_request(request)?)
            .await
            .map_err(classify_hyper)?;
        let (parts, body) = response.into_parts();
        let body = body.collect().await.map_err(classify_hyper)?.to_bytes();

        Ok((parts.status, parts.headers, body))
    }

    async fn acquire(&self, url: &Url) -> Result<OwnedSemaphorePermit, NetError> {
        let key = format!(
            "{}:{}",
            url.host_str().unwrap_or_default(),
            url.port_or_known_default().unwrap_or_default()
        );
        let limit = self.tuning.max_connections_per_host.max(1);
        let semaphore = self
            .host_limits
            .entry(key)
            .or_insert_with(|| Arc::new(Semaphore::new(limit)))
            .clone();
        semaphore
            .acquire_owned()
            .await
            .map_err(|e| NetError::transport(TransportErrorKind::Io, e.to_string()))
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

/// Rewrite a request for the next redirect hop.
///
/// 303 always becomes GET, as do 301/302 answers to POST. Credentials do not
/// cross origins.
fn redirect_request(
    mut request: PreparedRequest,
    status: StatusCode,
    next: Url,
) -> PreparedRequest {
    let to_get = match status.as_u16() {
        303 => request.method != Method::HEAD,
        301 | 302 => request.method == Method::POST,
        _ => false,
    };
    if to_get {
        request.method = Method::GET;
        request.body = PreparedBody::Empty;
        request.headers.remove(CONTENT_TYPE);
        request.headers.remove(CONTENT_LENGTH);
    }
    if request.url.origin() != next.origin() {
        request.headers.remove(AUTHORIZATION);
        request.headers.remove(COOKIE);
    }
    request.url = next;
    request
}

fn build_request(request: &PreparedRequest) -> Result<Request<OutgoingBody>, NetError> {
    let url = &request.url;
    let path = &url[url::Position::BeforePath..url::Position::AfterQuery];
    let length = request.body.content_length();

    let mut req = Request::builder()
        .method(request.method.clone())
        .uri(path)
        .body(outgoing_body(&request.body))
        .map_err(|e| NetError::MalformedUrl(format!("{url}: {e}")))?;

    let headers = req.headers_mut();
    *headers = request.headers.clone();
    headers.insert(HOST, host_header(url)?);
    let sends_body = length > 0
        || matches!(request.method, Method::POST | Method::PUT | Method::PATCH);
    if sends_body {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    }
    Ok(req)
}

/// In-memory bodies report an exact size to hyper. Files stream under the
/// Content-Length set in `build_request`.
fn outgoing_body(body: &PreparedBody) -> OutgoingBody {
    match body {
        PreparedBody::Empty => Empty::new().map_err(|never| match never {}).boxed_unsync(),
        PreparedBody::Bytes(bytes) => Full::new(bytes.clone())
            .map_err(|never| match never {})
            .boxed_unsync(),
        PreparedBody::File(_) => {
            StreamBody::new(body.clone().into_stream().map_ok(Frame::data)).boxed_unsync()
        }
    }
}

fn host_header(url: &Url) -> Result<HeaderValue, NetError> {
    let host = url
        .host_str()
        .ok_or_else(|| NetError::MalformedUrl(url.to_string()))?;
    let value = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    HeaderValue::from_str(&value).map_err(|_| NetError::MalformedUrl(url.to_string()))
}

fn classify_hyper(e: hyper::Error) -> NetError {
    let kind = if e.is_timeout() {
        TransportErrorKind::Timeout
    } else if e.is_parse() || e.is_parse_status() {
        TransportErrorKind::Protocol
    } else {
        TransportErrorKind::Io
    };
    NetError::transport(kind, e.to_string())
}
