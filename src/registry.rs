//! Registry of live sessions keyed by origin.

use crate::auth::CredentialStore;
use crate::base::neterror::NetError;
use crate::config::SessionConfig;
use crate::http::headers::HeaderSet;
use crate::session::{Session, TaskTable};
use crate::transport::TransportFactory;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Parse `base_url` and reduce it to its origin key (`scheme://host[:port]`).
pub fn session_key(base_url: &str) -> Result<(String, Url), NetError> {
    let url = Url::parse(base_url.trim())
        .map_err(|e| NetError::MalformedUrl(format!("{base_url}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(NetError::MalformedUrl(base_url.to_string()));
    }
    Ok((url.origin().ascii_serialization(), url))
}

pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
    credentials: Arc<dyn CredentialStore>,
    transports: Arc<dyn TransportFactory>,
    tasks: Arc<TaskTable>,
    cancel_replaced: bool,
}

impl SessionRegistry {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            credentials,
            transports,
            tasks: Arc::new(TaskTable::new()),
            cancel_replaced: true,
        }
    }

    /// Whether replacing a session cancels the old one's in-flight operations.
    pub fn cancel_replaced(mut self, enabled: bool) -> Self {
        self.cancel_replaced = enabled;
        self
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// Create the session for `base_url`, replacing any existing one.
    pub fn create_session(
        &self,
        base_url: &str,
        config: SessionConfig,
    ) -> Result<Arc<Session>, NetError> {
        let (key, url) = session_key(base_url)?;
        let transport = self.transports.create(&config.tuning)?;
        let session = Arc::new(Session::new(
            key.clone(),
            url,
            config,
            transport,
            self.credentials.clone(),
            self.tasks.clone(),
        ));

        if let Some(previous) = self.sessions.insert(key.clone(), session.clone()) {
            previous.retire();
            if self.cancel_replaced {
                let cancelled = previous.cancel_all();
                if cancelled > 0 {
                    tracing::warn!(
                        session = %key,
                        cancelled,
                        "replaced session cancelled in-flight operations"
                    );
                }
            }
        }
        tracing::debug!(session = %key, "session created");
        Ok(session)
    }

    pub fn get_session(&self, base_url: &str) -> Option<Arc<Session>> {
        let (key, _) = session_key(base_url).ok()?;
        self.sessions.get(&key).map(|s| s.clone())
    }

    /// Like [`get_session`](Self::get_session) but distinguishes a bad URL
    /// from a missing session.
    pub fn require_session(&self, base_url: &str) -> Result<Arc<Session>, NetError> {
        let (key, _) = session_key(base_url)?;
        self.sessions
            .get(&key)
            .map(|s| s.clone())
            .ok_or(NetError::SessionNotFound(key))
    }

    /// Remove the session, cancel its operations and clear its credential.
    /// Idempotent.
    pub fn invalidate_session(&self, base_url: &str) -> Result<(), NetError> {
        let (key, url) = session_key(base_url)?;
        if let Some((_, session)) = self.sessions.remove(&key) {
            session.retire();
            let cancelled = session.cancel_all();
            tracing::debug!(session = %key, cancelled, "session invalidated");
        }
        if let Some(host) = url.host_str() {
            self.credentials.remove(&host.to_ascii_lowercase());
        }
        Ok(())
    }

    pub fn add_headers(&self, base_url: &str, headers: &HeaderSet) -> Result<(), NetError> {
        self.require_session(base_url)?.add_headers(headers);
        Ok(())
    }

    pub fn get_headers(&self, base_url: &str) -> Result<HeaderSet, NetError> {
        Ok(self.require_session(base_url)?.headers())
    }

    /// Cancel an in-flight operation on whichever session runs it, including
    /// a replaced session that was left to finish.
    pub fn cancel_request(&self, task_id: &str) -> Result<(), NetError> {
        if self.tasks.cancel(task_id) {
            Ok(())
        } else {
            Err(NetError::UnknownTask(task_id.to_string()))
        }
    }

    /// Operations in flight across every session.
    pub fn in_flight_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("cancel_replaced", &self.cancel_replaced)
            .finish_non_exhaustive()
    }
}
