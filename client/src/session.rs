//! Session state: the bearer token, the signed-in identity, and the durable token slot.
//!
//! The in-memory token and the durable slot move together: every `set_token` writes the
//! slot first, then updates memory. Clearing the token removes the slot file and drops
//! the identity.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};

use atelier_types::{BearerToken, Identity};
use tempfile::NamedTempFile;

/// Durable single-slot storage for the bearer token.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> io::Result<Option<String>>;
    fn save(&self, token: &str) -> io::Result<()>;
    fn clear(&self) -> io::Result<()>;
}

/// Token slot backed by one file, written with temp + rename and owner-only permissions.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let token = content.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, token: &str) -> io::Result<()> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        fs::create_dir_all(parent)?;

        let mut tmp = NamedTempFile::new_in(parent)?;
        restrict_to_owner(tmp.path())?;
        tmp.write_all(token.as_bytes())?;
        tmp.as_file().sync_all()?;

        // Windows refuses to rename over an existing file.
        if let Err(err) = tmp.persist(&self.path) {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
                err.file.persist(&self.path).map_err(|e| e.error)?;
            } else {
                return Err(err.error);
            }
        }

        restrict_to_owner(&self.path)
    }

    fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// Token slot that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(token.into())),
        }
    }

    /// Current slot contents.
    #[must_use]
    pub fn peek(&self) -> Option<String> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> io::Result<Option<String>> {
        Ok(self.peek())
    }

    fn save(&self, token: &str) -> io::Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

impl<S: TokenStore + ?Sized> TokenStore for std::sync::Arc<S> {
    fn load(&self) -> io::Result<Option<String>> {
        (**self).load()
    }

    fn save(&self, token: &str) -> io::Result<()> {
        (**self).save(token)
    }

    fn clear(&self) -> io::Result<()> {
        (**self).clear()
    }
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<BearerToken>,
    identity: Option<Identity>,
}

/// Process-scoped holder of the current credentials.
///
/// Shared with the pipeline through `Arc`; reads are frequent, writes happen only on
/// login, logout, and server-side rejection.
pub struct SessionHolder {
    state: RwLock<SessionState>,
    store: Box<dyn TokenStore>,
    /// Held across the slot write and the memory update so writers cannot interleave.
    writes: Mutex<()>,
}

impl std::fmt::Debug for SessionHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("SessionHolder")
            .field("authenticated", &state.token.is_some())
            .field("identity", &state.identity)
            .finish_non_exhaustive()
    }
}

impl SessionHolder {
    /// Empty session over `store`. Call [`SessionHolder::initialize`] to hydrate.
    #[must_use]
    pub fn new(store: impl TokenStore + 'static) -> Self {
        Self {
            state: RwLock::new(SessionState::default()),
            store: Box::new(store),
            writes: Mutex::new(()),
        }
    }

    /// Construct and hydrate in one step.
    #[must_use]
    pub fn hydrated(store: impl TokenStore + 'static) -> Self {
        let session = Self::new(store);
        session.initialize();
        session
    }

    /// Memory-only session, for headless use.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryTokenStore::new())
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the token from the durable slot, if one is stored. No network calls.
    pub fn initialize(&self) {
        let _writes = self.lock_writes();
        match self.store.load() {
            Ok(Some(raw)) => match BearerToken::new(raw) {
                Ok(token) => {
                    self.write().token = Some(token);
                    tracing::debug!("Session restored from durable storage");
                }
                Err(_) => tracing::debug!("Ignoring blank stored token"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!("Failed to read stored session token: {e}"),
        }
    }

    #[must_use]
    pub fn token(&self) -> Option<BearerToken> {
        self.read().token.clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read().token.is_some()
    }

    #[must_use]
    pub fn identity(&self) -> Option<Identity> {
        self.read().identity.clone()
    }

    /// Replace the token. `None` or a blank string clears the durable slot and the identity.
    pub fn set_token(&self, token: Option<&str>) {
        let token = token.and_then(|raw| BearerToken::new(raw).ok());
        let _writes = self.lock_writes();

        match &token {
            Some(token) => {
                if let Err(e) = self.store.save(token.as_str()) {
                    tracing::warn!("Failed to persist session token: {e}");
                }
            }
            None => {
                if let Err(e) = self.store.clear() {
                    tracing::warn!("Failed to clear stored session token: {e}");
                }
            }
        }

        let mut state = self.write();
        if token.is_none() {
            state.identity = None;
        }
        state.token = token;
    }

    /// Record who is signed in. Ignored while no token is held.
    pub fn set_identity(&self, identity: Option<Identity>) {
        let _writes = self.lock_writes();
        let mut state = self.write();
        if identity.is_some() && state.token.is_none() {
            tracing::warn!("Ignoring identity update without an active session");
            return;
        }
        state.identity = identity;
    }

    /// Clear the token, the identity, and the durable slot.
    pub fn logout(&self) {
        self.set_token(None);
        tracing::info!("Session cleared");
    }
}
