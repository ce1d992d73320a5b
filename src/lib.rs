//! # sessionnet
//!
//! A per-origin HTTP client session manager for Rust.
//!
//! `sessionnet` keeps one long-lived session per base URL and applies the
//! same headers, retry policy, redirect policy and bearer-token handling to
//! every request issued against that origin. File uploads can resume from an
//! offset, report progress and be cancelled by task id.
//!
//! ## Features
//!
//! - **Sessions**: keyed by origin, replaced on re-create, invalidated with
//!   their credential
//! - **Headers**: case-insensitive, last write wins, snapshotted at dispatch
//! - **Retry**: exponential backoff on transport failures and 5xx statuses
//! - **Auth**: bearer injection, token rotation from a response header,
//!   401-triggered cancellation of sibling requests
//! - **Uploads**: raw or multipart, resume offset, bounded progress channel
//! - **Transport**: tokio + BoringSSL + hyper HTTP/1.1 by default, pluggable
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sessionnet::{Client, RequestOptions, RetryPolicy, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sessionnet::NetError> {
//!     let client = Client::new();
//!     let config = SessionConfig::default()
//!         .retry_policy(RetryPolicy::exponential(3, 1.0, 2.0))
//!         .token_header("Token");
//!     client.create_session("https://chat.example.com", config)?;
//!
//!     let response = client
//!         .get("https://chat.example.com", "/api/v4/system/ping", RequestOptions::new())
//!         .await?;
//!     println!("Status: {}", response.code);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`base`] - Error taxonomy and IO context helpers
//! - [`config`] - Session configuration and its JSON shape
//! - [`http`] - Headers, retry policy, dispatch and response normalization
//! - [`auth`] - Credential stores and the bearer-token interceptor
//! - [`session`] / [`registry`] - Session lifecycle and in-flight operations
//! - [`upload`] - Resumable, cancellable file uploads
//! - [`transport`] - Transport trait and the default hyper implementation

pub mod auth;
pub mod base;
pub mod client;
pub mod config;
pub mod http;
pub mod registry;
pub mod session;
pub mod transport;
pub mod upload;

pub use auth::{Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use base::neterror::{NetError, TransportErrorKind};
pub use client::{Client, ClientBuilder};
pub use config::{SessionConfig, TransportTuning};
pub use crate::http::headers::HeaderSet;
pub use crate::http::response::{ClientResponse, ResponseData};
pub use crate::http::retry::{RetryKind, RetryPolicy};
pub use crate::http::transaction::RequestOptions;
pub use crate::http::RequestBody;
pub use upload::{progress_channel, MultipartOptions, UploadOptions, UploadProgress};
