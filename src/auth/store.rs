//! Credential storage keyed by origin host.
//!
//! The engine only needs get/set/remove. [`MemoryCredentialStore`] is the
//! default; [`FileCredentialStore`] persists tokens as JSON so they survive a
//! restart. Platform keychains plug in through [`CredentialStore`].

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use zeroize::Zeroizing;

/// A bearer token. Wiped from memory on drop and redacted in `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Zeroizing<String>);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Zeroizing::new(token.into()))
    }

    /// The raw token. Callers must not log it.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Synchronous key to token store.
pub trait CredentialStore: Send + Sync {
    fn get(&self, host: &str) -> Option<Credential>;
    fn set(&self, host: &str, credential: Credential);
    fn remove(&self, host: &str);
}

impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    fn get(&self, host: &str) -> Option<Credential> {
        (**self).get(host)
    }

    fn set(&self, host: &str, credential: Credential) {
        (**self).set(host, credential)
    }

    fn remove(&self, host: &str) {
        (**self).remove(host)
    }
}

fn normalize(host: &str) -> String {
    host.to_ascii_lowercase()
}

/// Process-local store. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    tokens: Arc<DashMap<String, Credential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, host: &str) -> Option<Credential> {
        self.tokens.get(&normalize(host)).map(|c| c.clone())
    }

    fn set(&self, host: &str, credential: Credential) {
        self.tokens.insert(normalize(host), credential);
    }

    fn remove(&self, host: &str) {
        self.tokens.remove(&normalize(host));
    }
}

impl fmt::Debug for MemoryCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCredentialStore")
            .field("hosts", &self.tokens.len())
            .finish()
    }
}

/// JSON file backed store.
///
/// Every mutation rewrites the file through a temporary sibling and a
/// rename. A failed write is logged and the in-memory value is kept.
pub struct FileCredentialStore {
    path: PathBuf,
    tokens: Mutex<BTreeMap<String, Credential>>,
}

impl FileCredentialStore {
    /// Open the store at `path`, loading existing tokens. A missing file is
    /// an empty store.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let tokens = match fs::read(&path) {
            Ok(raw) => {
                let raw = Zeroizing::new(raw);
                let parsed: BTreeMap<String, String> = serde_json::from_slice(&raw)
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                parsed
                    .into_iter()
                    .map(|(host, token)| (normalize(&host), Credential::new(token)))
                    .collect()
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e),
        };
        tracing::debug!(path = %path.display(), hosts = tokens.len(), "credential store opened");
        Ok(Self {
            path,
            tokens: Mutex::new(tokens),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, tokens: &BTreeMap<String, Credential>) {
        if let Err(e) = write_atomic(&self.path, tokens) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "failed to persist credentials"
            );
        }
    }
}

fn write_atomic(path: &Path, tokens: &BTreeMap<String, Credential>) -> io::Result<()> {
    let plain: BTreeMap<&str, &str> = tokens
        .iter()
        .map(|(host, c)| (host.as_str(), c.expose()))
        .collect();
    let json = Zeroizing::new(
        serde_json::to_vec_pretty(&plain)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
    );

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&tmp)?;
    file.write_all(&json)?;
    file.sync_all()?;
    fs::rename(&tmp, path)
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, host: &str) -> Option<Credential> {
        let tokens = self.tokens.lock().unwrap_or_else(|p| p.into_inner());
        tokens.get(&normalize(host)).cloned()
    }

    fn set(&self, host: &str, credential: Credential) {
        let mut tokens = self.tokens.lock().unwrap_or_else(|p| p.into_inner());
        tokens.insert(normalize(host), credential);
        self.persist(&tokens);
    }

    fn remove(&self, host: &str) {
        let mut tokens = self.tokens.lock().unwrap_or_else(|p| p.into_inner());
        if tokens.remove(&normalize(host)).is_some() {
            self.persist(&tokens);
        }
    }
}

impl fmt::Debug for FileCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCredentialStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
