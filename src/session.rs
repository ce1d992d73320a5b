//! One session per origin.
//!
//! A session owns its configuration, the header overlay added after
//! creation, the transport built from its tuning, the auth interceptor and
//! the handles of every operation currently in flight.

use crate::auth::{AuthInterceptor, CredentialStore};
use crate::base::neterror::NetError;
use crate::config::SessionConfig;
use crate::http::headers::HeaderSet;
use crate::transport::Transport;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{AbortHandle, AbortRegistration};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use url::Url;

/// In-flight operations of every session created by one registry.
///
/// Task ids are unique across the table, so `cancel_request` needs no base
/// URL. Generated ids skip over ids a caller has already taken.
#[derive(Default)]
pub struct TaskTable {
    tasks: DashMap<String, TaskHandle>,
    generations: AtomicU64,
    sessions: AtomicU64,
}

struct TaskHandle {
    abort: AbortHandle,
    generation: u64,
    session: u64,
}

impl TaskTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_session(&self) -> u64 {
        self.sessions.fetch_add(1, Ordering::Relaxed)
    }

    fn insert(
        &self,
        session: u64,
        task_id: Option<String>,
        abort: AbortHandle,
    ) -> Result<(String, u64), NetError> {
        loop {
            let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
            let supplied = task_id.is_some();
            let id = task_id.clone().unwrap_or_else(|| format!("task-{generation}"));
            match self.tasks.entry(id) {
                Entry::Occupied(slot) if supplied => {
                    return Err(NetError::InvalidOptions(format!(
                        "task id {} is already in flight",
                        slot.key()
                    )))
                }
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let id = slot.key().clone();
                    slot.insert(TaskHandle {
                        abort,
                        generation,
                        session,
                    });
                    return Ok((id, generation));
                }
            }
        }
    }

    fn release(&self, task_id: &str, generation: u64) {
        self.tasks.remove_if(task_id, |_, h| h.generation == generation);
    }

    /// Abort and forget one operation, whichever session runs it.
    pub fn cancel(&self, task_id: &str) -> bool {
        self.cancel_where(task_id, |_| true)
    }

    fn cancel_where(&self, task_id: &str, owned: impl FnOnce(&TaskHandle) -> bool) -> bool {
        match self.tasks.remove_if(task_id, |_, h| owned(h)) {
            Some((_, handle)) => {
                handle.abort.abort();
                tracing::debug!(task_id = %task_id, "task cancelled");
                true
            }
            None => false,
        }
    }

    fn cancel_session(&self, session: u64, keep: Option<&str>) -> usize {
        let mut cancelled = 0;
        self.tasks.retain(|id, handle| {
            if handle.session != session || keep == Some(id.as_str()) {
                return true;
            }
            handle.abort.abort();
            cancelled += 1;
            false
        });
        cancelled
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl fmt::Debug for TaskTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskTable")
            .field("in_flight", &self.tasks.len())
            .finish_non_exhaustive()
    }
}

pub struct Session {
    id: u64,
    key: String,
    base_url: Url,
    host: String,
    config: SessionConfig,
    overlay: RwLock<HeaderSet>,
    interceptor: AuthInterceptor,
    transport: Arc<dyn Transport>,
    tasks: Arc<TaskTable>,
    retired: AtomicBool,
}

impl Session {
    pub(crate) fn new(
        key: String,
        base_url: Url,
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialStore>,
        tasks: Arc<TaskTable>,
    ) -> Self {
        let host = base_url.host_str().unwrap_or_default().to_ascii_lowercase();
        let interceptor = AuthInterceptor::new(host.clone(), credentials, &config);
        Self {
            id: tasks.next_session(),
            key,
            base_url,
            host,
            config,
            overlay: RwLock::new(HeaderSet::new()),
            interceptor,
            transport,
            tasks,
            retired: AtomicBool::new(false),
        }
    }

    /// Normalized origin this session is registered under.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Host used as the credential key.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn interceptor(&self) -> &AuthInterceptor {
        &self.interceptor
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Effective headers: configuration merged with the overlay.
    pub fn headers(&self) -> HeaderSet {
        let overlay = self.overlay.read().unwrap_or_else(|p| p.into_inner());
        self.config.headers.merged(&overlay)
    }

    /// Merge into the overlay. Only requests dispatched afterwards see it.
    pub fn add_headers(&self, headers: &HeaderSet) {
        let mut overlay = self.overlay.write().unwrap_or_else(|p| p.into_inner());
        overlay.merge(headers);
    }

    pub fn is_retired(&self) -> bool {
        self.retired.load(Ordering::Acquire)
    }

    /// Mark the session as gone. New operations are rejected.
    pub(crate) fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }

    /// Register a cancellable operation.
    ///
    /// A supplied id must not collide with any operation still in flight on
    /// the registry. The handle is removed when the returned guard drops.
    pub fn register_task(
        self: &Arc<Self>,
        task_id: Option<String>,
    ) -> Result<(TaskGuard, AbortRegistration), NetError> {
        if self.is_retired() {
            return Err(NetError::SessionNotFound(self.key.clone()));
        }

        let (abort, registration) = AbortHandle::new_pair();
        let (id, generation) = self.tasks.insert(self.id, task_id, abort)?;

        // Lost a race with invalidate.
        if self.is_retired() {
            self.tasks.release(&id, generation);
            return Err(NetError::SessionNotFound(self.key.clone()));
        }

        tracing::debug!(session = %self.key, task_id = %id, "task registered");
        Ok((
            TaskGuard {
                session: Arc::clone(self),
                id,
                generation,
            },
            registration,
        ))
    }

    pub fn has_task(&self, task_id: &str) -> bool {
        self.tasks
            .tasks
            .get(task_id)
            .is_some_and(|h| h.session == self.id)
    }

    /// Abort and forget one of this session's operations. Returns false if it
    /// is not in flight here.
    pub fn cancel_task(&self, task_id: &str) -> bool {
        self.tasks.cancel_where(task_id, |h| h.session == self.id)
    }

    /// Abort every in-flight operation. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        self.tasks.cancel_session(self.id, None)
    }

    /// Abort every in-flight operation other than `task_id`.
    pub fn cancel_all_except(&self, task_id: &str) -> usize {
        self.tasks.cancel_session(self.id, Some(task_id))
    }

    pub fn in_flight_count(&self) -> usize {
        self.tasks
            .tasks
            .iter()
            .filter(|entry| entry.session == self.id)
            .count()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("in_flight", &self.in_flight_count())
            .field("retired", &self.is_retired())
            .finish_non_exhaustive()
    }
}

/// Removes its operation handle on drop, unless the id has since been
/// reused by a newer operation.
#[derive(Debug)]
pub struct TaskGuard {
    session: Arc<Session>,
    id: String,
    generation: u64,
}

impl TaskGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.session.tasks.release(&self.id, self.generation);
    }
}
