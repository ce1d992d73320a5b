//! Retry policy with exponential backoff.
//!
//! The policy is a pure function of the attempt number and the outcome of
//! that attempt. The dispatcher owns the loop and the sleeping; this module
//! only answers "retry after D" or "stop".

use crate::base::neterror::{NetError, TransportErrorKind};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Upper bound for a single backoff sleep.
pub const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

const DEFAULT_RETRY_LIMIT: u32 = 2;
const DEFAULT_BACKOFF_BASE: f64 = 1.0;
const DEFAULT_BACKOFF_SCALE: f64 = 2.0;

fn default_retry_statuses() -> BTreeSet<u16> {
    [500, 502, 503, 504].into_iter().collect()
}

/// Which retry strategy a session applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryKind {
    /// Never retry.
    #[default]
    None,
    /// `base * scale^(attempt-1)` seconds between attempts.
    Exponential,
}

impl<'de> Deserialize<'de> for RetryKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        match raw.to_ascii_lowercase().as_str() {
            "none" | "" => Ok(RetryKind::None),
            "exponential" | "exponential_retry" => Ok(RetryKind::Exponential),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["none", "exponential"],
            )),
        }
    }
}

/// Retry configuration attached to a session or overridden per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    #[serde(rename = "type")]
    pub kind: RetryKind,
    /// Maximum number of retries after the first attempt.
    pub retry_limit: u32,
    /// Seconds to wait before the first retry.
    #[serde(rename = "exponentialBackoffBase")]
    pub backoff_base: f64,
    #[serde(rename = "exponentialBackoffScale")]
    pub backoff_scale: f64,
    /// HTTP statuses that count as retryable. Only 5xx entries are honored.
    #[serde(rename = "statusCodes")]
    pub retry_statuses: BTreeSet<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Result of a single attempt as seen by the policy.
#[derive(Debug, Clone, Copy)]
pub enum AttemptOutcome<'a> {
    /// A response arrived with this status.
    Status(u16),
    /// No response; the attempt failed with this error.
    Failed(&'a NetError),
}

/// What the dispatcher should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    Terminal,
}

/// Why an attempt is being retried. Used for log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    Transport(TransportErrorKind),
    Status(u16),
}

impl RetryReason {
    pub fn from_outcome(outcome: AttemptOutcome<'_>) -> Option<Self> {
        match outcome {
            AttemptOutcome::Status(code) => Some(RetryReason::Status(code)),
            AttemptOutcome::Failed(err) => err.transport_kind().map(RetryReason::Transport),
        }
    }
}

impl std::fmt::Display for RetryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryReason::Transport(kind) => write!(f, "transport:{kind}"),
            RetryReason::Status(code) => write!(f, "status:{code}"),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            kind: RetryKind::None,
            retry_limit: DEFAULT_RETRY_LIMIT,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_scale: DEFAULT_BACKOFF_SCALE,
            retry_statuses: default_retry_statuses(),
        }
    }

    pub fn exponential(retry_limit: u32, backoff_base: f64, backoff_scale: f64) -> Self {
        Self {
            kind: RetryKind::Exponential,
            retry_limit,
            backoff_base,
            backoff_scale,
            retry_statuses: default_retry_statuses(),
        }
    }

    /// Replace the retryable status set.
    pub fn with_statuses<I: IntoIterator<Item = u16>>(mut self, statuses: I) -> Self {
        self.retry_statuses = statuses.into_iter().collect();
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponent = i32::try_from(attempt - 1).unwrap_or(i32::MAX);
        let secs = self.backoff_base * self.backoff_scale.powi(exponent);
        if secs.is_nan() || secs <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }

    /// Whether a response with `status` may be retried under this policy.
    /// Client errors are never retried.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        status >= 500 && self.retry_statuses.contains(&status)
    }

    /// Decide the fate of retry number `attempt` (1-based) given the outcome
    /// of the attempt that just finished.
    pub fn decide(&self, attempt: u32, outcome: AttemptOutcome<'_>) -> RetryDecision {
        if self.kind == RetryKind::None || attempt == 0 || attempt > self.retry_limit {
            return RetryDecision::Terminal;
        }
        let retryable = match outcome {
            AttemptOutcome::Status(code) => self.is_retryable_status(code),
            AttemptOutcome::Failed(err) => err.is_retryable(),
        };
        if retryable {
            RetryDecision::Retry(self.backoff(attempt))
        } else {
            RetryDecision::Terminal
        }
    }
}
