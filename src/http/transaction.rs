//! Request dispatch.
//!
//! `execute` snapshots the session headers, registers a cancellable handle
//! and drives an [`HttpTransaction`] state machine: send an attempt, ask the
//! retry policy, back off, repeat. The auth interceptor runs before every
//! attempt and after the terminal response.

use crate::base::neterror::{NetError, TransportErrorKind};
use crate::config::de_opt_seconds;
use crate::http::headers::HeaderSet;
use crate::http::requestbody::RequestBody;
use crate::http::response::ClientResponse;
use crate::http::retry::{AttemptOutcome, RetryDecision, RetryPolicy, RetryReason};
use crate::session::Session;
use crate::transport::{PreparedBody, PreparedRequest, TransportResponse};
use futures::future::{Abortable, Aborted};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::Method;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Join an endpoint to a base URL with exactly one slash between them.
pub fn join_endpoint(base: &Url, endpoint: &str) -> Result<Url, NetError> {
    if endpoint.is_empty() {
        return Ok(base.clone());
    }
    let base_str = base.as_str().trim_end_matches('/');
    let endpoint = endpoint.trim_start_matches('/');
    let joined = format!("{base_str}/{endpoint}");
    Url::parse(&joined).map_err(|e| NetError::MalformedUrl(format!("{joined}: {e}")))
}

/// Per-request options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestOptions {
    /// Merged over the session headers; wins on conflicts.
    pub headers: HeaderSet,
    pub body: RequestBody,
    /// Overrides the session's per-attempt timeout.
    #[serde(rename = "timeoutInterval", deserialize_with = "de_opt_seconds")]
    pub timeout: Option<Duration>,
    /// Overrides the session's retry policy.
    #[serde(rename = "retryPolicyConfiguration")]
    pub retry_policy: Option<RetryPolicy>,
    /// Caller-chosen id for `cancel_request`. Generated when absent.
    pub task_id: Option<String>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, NetError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).map_err(|e| NetError::InvalidOptions(e.to_string()))
    }

    pub fn header(mut self, name: &str, value: &str) -> Result<Self, NetError> {
        self.headers.insert(name, value)?;
        Ok(self)
    }

    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = body.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn task_id(mut self, id: impl Into<String>) -> Self {
        self.task_id = Some(id.into());
        self
    }
}

/// Everything an attempt loop needs, fixed at dispatch.
pub(crate) struct Dispatch {
    pub request: PreparedRequest,
    /// Per-request headers set Authorization.
    pub caller_authorization: bool,
    pub retry_policy: RetryPolicy,
    pub timeout: Duration,
}

impl Dispatch {
    /// Snapshot session headers, then merge the per-request ones over them.
    pub fn prepare(
        session: &Session,
        method: Method,
        url: Url,
        request_headers: &HeaderSet,
        retry_policy: Option<RetryPolicy>,
        timeout: Option<Duration>,
    ) -> Self {
        let headers = session.headers().merged(request_headers);
        let mut request = PreparedRequest::new(method, url);
        request.headers = headers.to_header_map();
        Self {
            request,
            caller_authorization: request_headers.contains("authorization"),
            retry_policy: retry_policy.unwrap_or_else(|| session.config().retry_policy.clone()),
            timeout: timeout.unwrap_or(session.config().tuning.request_timeout),
        }
    }

    fn set_default_content_type(&mut self, content_type: &'static str) {
        if !self.request.headers.contains_key(CONTENT_TYPE) {
            self.request
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }
}

/// Dispatch `method` against `endpoint` on `session`.
pub async fn execute(
    session: &Arc<Session>,
    method: Method,
    endpoint: &str,
    options: RequestOptions,
) -> Result<ClientResponse, NetError> {
    let url = join_endpoint(session.base_url(), endpoint)?;
    let mut dispatch = Dispatch::prepare(
        session,
        method,
        url,
        &options.headers,
        options.retry_policy,
        options.timeout,
    );
    if let Some(content_type) = options.body.content_type() {
        dispatch.set_default_content_type(content_type);
    }
    dispatch.request.body = match options.body.to_bytes()? {
        bytes if bytes.is_empty() => PreparedBody::Empty,
        bytes => PreparedBody::Bytes(bytes),
    };

    let session_ref = session.clone();
    run_operation(session, options.task_id, move |task_id| {
        HttpTransaction::new(session_ref, task_id, dispatch).run()
    })
    .await
}

/// Run `work` as a registered, cancellable operation bounded by the
/// session's resource timeout. The handle is gone once this returns.
pub(crate) async fn run_operation<F, Fut>(
    session: &Arc<Session>,
    task_id: Option<String>,
    work: F,
) -> Result<ClientResponse, NetError>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<ClientResponse, NetError>>,
{
    let (guard, registration) = session.register_task(task_id)?;
    let id = guard.id().to_string();
    let resource_timeout = session.config().tuning.resource_timeout;

    let operation = Abortable::new(work(id.clone()), registration);
    let result = match tokio::time::timeout(resource_timeout, operation).await {
        Ok(Ok(result)) => result,
        Ok(Err(Aborted)) => {
            tracing::warn!(session = %session.key(), task_id = %id, "operation cancelled");
            Err(NetError::Cancelled)
        }
        Err(_) => Err(NetError::transport(
            TransportErrorKind::Timeout,
            format!("resource timeout of {resource_timeout:?} exceeded"),
        )),
    };
    drop(guard);
    result
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum State {
    SendRequest,
    BackOff(Duration),
}

/// Attempt loop for one operation.
pub(crate) struct HttpTransaction {
    session: Arc<Session>,
    task_id: String,
    dispatch: Dispatch,
    state: State,
    attempt: u32,
}

impl HttpTransaction {
    pub fn new(session: Arc<Session>, task_id: String, dispatch: Dispatch) -> Self {
        Self {
            session,
            task_id,
            dispatch,
            state: State::SendRequest,
            attempt: 0,
        }
    }

    pub async fn run(mut self) -> Result<ClientResponse, NetError> {
        loop {
            match self.state {
                State::SendRequest => {
                    let outcome = self.send_attempt().await;
                    let decision = match &outcome {
                        Ok(response) => {
                            self.decide(AttemptOutcome::Status(response.status.as_u16()))
                        }
                        Err(e) => self.decide(AttemptOutcome::Failed(e)),
                    };
                    match decision {
                        RetryDecision::Retry(delay) => self.state = State::BackOff(delay),
                        RetryDecision::Terminal => return self.finish(outcome),
                    }
                }
                State::BackOff(delay) => {
                    tokio::time::sleep(delay).await;
                    self.attempt += 1;
                    self.state = State::SendRequest;
                }
            }
        }
    }

    fn decide(&self, outcome: AttemptOutcome<'_>) -> RetryDecision {
        let retry = self.attempt + 1;
        let decision = self.dispatch.retry_policy.decide(retry, outcome);
        if let RetryDecision::Retry(delay) = decision {
            let reason = RetryReason::from_outcome(outcome)
                .map(|r| r.to_string())
                .unwrap_or_default();
            tracing::warn!(
                url = %self.dispatch.request.url,
                task_id = %self.task_id,
                retry,
                delay_ms = delay.as_millis() as u64,
                reason = %reason,
                "retrying request"
            );
        }
        decision
    }

    async fn send_attempt(&self) -> Result<TransportResponse, NetError> {
        let mut request = self.dispatch.request.clone();
        self.session
            .interceptor()
            .apply(&mut request.headers, self.dispatch.caller_authorization);

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            attempt = self.attempt + 1,
            "sending request"
        );
        let timeout = self.dispatch.timeout;
        match tokio::time::timeout(timeout, self.session.transport().execute(request)).await {
            Ok(result) => result,
            Err(_) => Err(NetError::transport(
                TransportErrorKind::Timeout,
                format!("request timed out after {timeout:?}"),
            )),
        }
    }

    fn finish(
        &self,
        outcome: Result<TransportResponse, NetError>,
    ) -> Result<ClientResponse, NetError> {
        let response = outcome?;
        self.session.interceptor().on_response(
            &self.session,
            &self.task_id,
            response.status,
            &response.headers,
        );
        Ok(ClientResponse::from_transport(response))
    }
}
