//! Scripted transport shared by the integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use futures::TryStreamExt;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use sessionnet::transport::{
    Executing, PreparedRequest, Transport, TransportFactory, TransportResponse,
};
use sessionnet::{NetError, TransportErrorKind, TransportTuning};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

#[derive(Clone, Debug)]
pub enum Reply {
    Respond {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: Bytes,
    },
    Fail(NetError),
    /// Never answers.
    Hang,
}

impl Reply {
    pub fn status(status: u16) -> Self {
        Reply::Respond {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn json(status: u16, body: &'static str) -> Self {
        Reply::Respond {
            status,
            headers: vec![("content-type", "application/json".to_string())],
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    pub fn with_header(self, name: &'static str, value: &str) -> Self {
        match self {
            Reply::Respond {
                status,
                mut headers,
                body,
            } => {
                headers.push((name, value.to_string()));
                Reply::Respond {
                    status,
                    headers,
                    body,
                }
            }
            other => other,
        }
    }

    pub fn connect_error() -> Self {
        Reply::Fail(NetError::transport(TransportErrorKind::Connect, "connection refused"))
    }
}

#[derive(Clone, Debug)]
pub struct Recorded {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    pub at: Instant,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

#[derive(Default)]
struct MockState {
    replies: HashMap<String, VecDeque<Reply>>,
    requests: Vec<Recorded>,
}

/// Replies are scripted per path. The last reply for a path repeats.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, path: &str, reply: Reply) -> &Self {
        self.state
            .lock()
            .unwrap()
            .replies
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.path() == path)
            .collect()
    }

    /// Wait until at least `n` requests have been recorded.
    pub async fn wait_for_requests(&self, n: usize) {
        for _ in 0..1000 {
            if self.state.lock().unwrap().requests.len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {n} requests");
    }

    pub fn factory(&self) -> impl TransportFactory + 'static {
        let mock = self.clone();
        move |_: &TransportTuning| -> Result<Arc<dyn Transport>, NetError> {
            Ok(Arc::new(mock.clone()))
        }
    }

    fn next_reply(&self, path: &str) -> Reply {
        let mut state = self.state.lock().unwrap();
        match state.replies.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Reply::status(404),
        }
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: PreparedRequest) -> Executing {
        let mock = self.clone();
        Box::pin(async move {
            let at = Instant::now();
            let chunks: Vec<Bytes> = request
                .body
                .clone()
                .into_stream()
                .try_collect()
                .await
                .map_err(|e| NetError::transport(TransportErrorKind::Io, e.to_string()))?;

            mock.state.lock().unwrap().requests.push(Recorded {
                method: request.method.clone(),
                url: request.url.clone(),
                headers: request.headers.clone(),
                body: chunks.concat(),
                at,
            });

            match mock.next_reply(request.url.path()) {
                Reply::Respond {
                    status,
                    headers,
                    body,
                } => {
                    let mut map = HeaderMap::new();
                    for (name, value) in headers {
                        map.append(
                            HeaderName::from_static(name),
                            HeaderValue::from_str(&value).unwrap(),
                        );
                    }
                    Ok(TransportResponse {
                        status: StatusCode::from_u16(status).unwrap(),
                        headers: map,
                        body,
                        url: request.url,
                    })
                }
                Reply::Fail(err) => Err(err),
                Reply::Hang => futures::future::pending().await,
            }
        })
    }
}
