//! File uploads with resume offset, progress and cancellation.
//!
//! The operation handle is registered before the file is touched, so a
//! `cancel` issued right after `upload` is called always lands. The file is
//! streamed from `skip_bytes` to its end, either raw or wrapped in a
//! multipart form. Progress counts the skipped prefix as already sent.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::http::multipart::Form;
use crate::http::response::ClientResponse;
use crate::http::transaction::{
    join_endpoint, run_operation, Dispatch, HttpTransaction, RequestOptions,
};
use crate::registry::SessionRegistry;
use crate::transport::{FileBody, PreparedBody};
use http::header::{HeaderValue, CONTENT_TYPE};
use http::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI16, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Capacity of a progress channel. Events beyond it are dropped.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 32;

/// A progress event for one upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub task_id: String,
    /// `floor(100 * sent / total)`, skipped bytes included.
    pub percent: u8,
}

/// Bounded channel for progress events. The receiver sees the channel close
/// when the upload finishes.
pub fn progress_channel() -> (mpsc::Sender<UploadProgress>, mpsc::Receiver<UploadProgress>) {
    mpsc::channel(PROGRESS_CHANNEL_CAPACITY)
}

/// Emits a progress event only when the percentage increases. Sending never
/// blocks the upload; a full or closed channel drops the event.
#[derive(Debug)]
pub struct ProgressReporter {
    task_id: String,
    last: AtomicI16,
    sender: mpsc::Sender<UploadProgress>,
}

impl ProgressReporter {
    pub fn new(task_id: impl Into<String>, sender: mpsc::Sender<UploadProgress>) -> Self {
        Self {
            task_id: task_id.into(),
            last: AtomicI16::new(-1),
            sender,
        }
    }

    pub fn report(&self, sent: u64, total: u64) {
        let percent = if total == 0 {
            100
        } else {
            ((u128::from(sent.min(total)) * 100) / u128::from(total)) as i16
        };
        let previous = self.last.fetch_max(percent, Ordering::AcqRel);
        if percent > previous {
            let _ = self.sender.try_send(UploadProgress {
                task_id: self.task_id.clone(),
                percent: percent as u8,
            });
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MultipartOptions {
    /// Form field holding the file.
    pub field_name: String,
    /// Defaults to the file's name on disk.
    pub file_name: Option<String>,
    pub content_type: String,
    /// Extra text fields sent before the file.
    pub fields: BTreeMap<String, String>,
}

impl Default for MultipartOptions {
    fn default() -> Self {
        Self {
            field_name: "files".to_string(),
            file_name: None,
            content_type: "application/octet-stream".to_string(),
            fields: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadOptions {
    #[serde(flatten)]
    pub request: RequestOptions,
    /// Resume offset into the file.
    pub skip_bytes: u64,
    /// Wrap the file in a multipart form instead of sending it raw.
    pub multipart: Option<MultipartOptions>,
    #[serde(skip)]
    pub progress: Option<mpsc::Sender<UploadProgress>>,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(value: serde_json::Value) -> Result<Self, NetError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value).map_err(|e| NetError::InvalidOptions(e.to_string()))
    }

    pub fn skip_bytes(mut self, skip: u64) -> Self {
        self.skip_bytes = skip;
        self
    }

    pub fn multipart(mut self, multipart: MultipartOptions) -> Self {
        self.multipart = Some(multipart);
        self
    }

    pub fn progress(mut self, sender: mpsc::Sender<UploadProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn request(mut self, request: RequestOptions) -> Self {
        self.request = request;
        self
    }
}

/// Runs uploads against the sessions of a registry.
#[derive(Debug, Clone)]
pub struct UploadManager {
    registry: Arc<SessionRegistry>,
}

impl UploadManager {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// POST the file at `path` to `endpoint` on the session for `base_url`.
    pub async fn upload(
        &self,
        base_url: &str,
        endpoint: &str,
        path: impl AsRef<Path>,
        task_id: &str,
        options: UploadOptions,
    ) -> Result<ClientResponse, NetError> {
        let session = self.registry.require_session(base_url)?;
        let url = join_endpoint(session.base_url(), endpoint)?;
        let path = path.as_ref().to_path_buf();
        let session_ref = session.clone();

        run_operation(&session, Some(task_id.to_string()), move |task_id| async move {
            let metadata = tokio::fs::metadata(&path).await.file_context(&path)?;
            if !metadata.is_file() {
                return Err(NetError::FileUnreadable {
                    path: path.display().to_string(),
                    message: "not a regular file".to_string(),
                });
            }
            let file_len = metadata.len();
            let skip = options.skip_bytes;
            if skip > file_len {
                return Err(NetError::InvalidUploadOffset { skip, len: file_len });
            }

            let mut dispatch = Dispatch::prepare(
                &session_ref,
                Method::POST,
                url,
                &options.request.headers,
                options.request.retry_policy,
                options.request.timeout,
            );

            let mut body = FileBody::new(path.clone(), skip, file_len);
            body.progress = options
                .progress
                .map(|sender| Arc::new(ProgressReporter::new(task_id.clone(), sender)));

            let content_type = match options.multipart {
                Some(multipart) => {
                    let envelope = multipart_form(&path, multipart).into_envelope()?;
                    body.prefix = envelope.prefix;
                    body.suffix = envelope.suffix;
                    Some(envelope.content_type)
                }
                None if dispatch.request.headers.contains_key(CONTENT_TYPE) => None,
                None => Some("application/octet-stream".to_string()),
            };
            if let Some(content_type) = content_type {
                let value = HeaderValue::from_str(&content_type)
                    .map_err(|_| NetError::InvalidHeader(content_type.clone()))?;
                dispatch.request.headers.insert(CONTENT_TYPE, value);
            }

            tracing::debug!(
                task_id = %task_id,
                path = %path.display(),
                skip,
                file_len,
                "starting upload"
            );
            dispatch.request.body = PreparedBody::File(body);
            HttpTransaction::new(session_ref, task_id, dispatch).run().await
        })
        .await
    }

    /// Cancel an in-flight upload. The upload resolves `Cancelled`.
    pub fn cancel(&self, task_id: &str) -> Result<(), NetError> {
        self.registry.cancel_request(task_id)
    }
}

fn multipart_form(path: &Path, options: MultipartOptions) -> Form {
    let file_name = options.file_name.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string())
    });
    let form = options
        .fields
        .into_iter()
        .fold(Form::new(), |form, (name, value)| form.text(name, value));
    form.file(options.field_name, file_name, options.content_type)
}

/// Absolute or relative path from a bridge-style `file://` URL or plain path.
pub fn path_from_file_url(file: &str) -> PathBuf {
    match url::Url::parse(file) {
        Ok(url) if url.scheme() == "file" => {
            url.to_file_path().unwrap_or_else(|_| PathBuf::from(file))
        }
        _ => PathBuf::from(file),
    }
}
