//! Credential storage for the session token pair
//!
//! `CredentialStore` is the only seam through which the client touches
//! persistent authentication state. Two implementations are provided:
//! `MemoryCredentialStore` for tests and embedding, and `FileCredentialStore`,
//! which keeps a JSON file on disk. All file writes use atomic temp-file +
//! rename so a crash mid-refresh never leaves a half-written token file.
//!
//! Tokens leave the store wrapped in `Secret` so they never reach log output.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Boxed future returned by `CredentialStore` methods.
///
/// Boxed so the trait stays dyn-compatible (`Arc<dyn CredentialStore>`).
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Persistent session credentials.
///
/// `last_refresh_at` is a unix timestamp in milliseconds, written whenever a
/// new token pair is stored (refresh or login).
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_refresh_at: Option<u64>,
}

impl Credentials {
    /// Store a new token pair. A missing refresh token keeps the current one,
    /// since the refresh endpoint is allowed to omit it.
    fn apply_tokens(&mut self, access: String, refresh: Option<String>, now_millis: u64) {
        self.access_token = Some(access);
        if let Some(refresh) = refresh {
            self.refresh_token = Some(refresh);
        }
        self.last_refresh_at = Some(now_millis);
    }

    fn access_secret(&self) -> Option<Secret<String>> {
        non_empty(self.access_token.as_deref())
    }

    fn refresh_secret(&self) -> Option<Secret<String>> {
        non_empty(self.refresh_token.as_deref())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("last_refresh_at", &self.last_refresh_at)
            .finish()
    }
}

fn non_empty(token: Option<&str>) -> Option<Secret<String>> {
    token.filter(|t| !t.is_empty()).map(Secret::from)
}

/// Current time as unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Accessor contract for the session token pair.
///
/// Pure storage: no refresh logic, no validation beyond treating empty
/// strings as absent.
pub trait CredentialStore: Send + Sync {
    /// Current access token, if any.
    fn access_token(&self) -> StoreFuture<'_, Option<Secret<String>>>;

    /// Current refresh token, if any.
    fn refresh_token(&self) -> StoreFuture<'_, Option<Secret<String>>>;

    /// When tokens were last stored, as unix milliseconds.
    fn last_refresh_at(&self) -> StoreFuture<'_, Option<u64>>;

    /// Store a new token pair. `refresh = None` keeps the existing refresh token.
    fn set_tokens(&self, access: String, refresh: Option<String>) -> StoreFuture<'_, Result<()>>;

    /// Forget all credentials (logout).
    fn clear(&self) -> StoreFuture<'_, Result<()>>;
}

/// In-memory credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: Mutex<Credentials>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a token pair (no refresh timestamp).
    pub fn with_tokens(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(Credentials {
                access_token: Some(access.into()),
                refresh_token: Some(refresh.into()),
                last_refresh_at: None,
            }),
        }
    }

    /// Clone of the full credential record.
    pub async fn snapshot(&self) -> Credentials {
        self.state.lock().await.clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn access_token(&self) -> StoreFuture<'_, Option<Secret<String>>> {
        Box::pin(async move { self.state.lock().await.access_secret() })
    }

    fn refresh_token(&self) -> StoreFuture<'_, Option<Secret<String>>> {
        Box::pin(async move { self.state.lock().await.refresh_secret() })
    }

    fn last_refresh_at(&self) -> StoreFuture<'_, Option<u64>> {
        Box::pin(async move { self.state.lock().await.last_refresh_at })
    }

    fn set_tokens(&self, access: String, refresh: Option<String>) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            self.state
                .lock()
                .await
                .apply_tokens(access, refresh, now_millis());
            debug!("stored tokens in memory");
            Ok(())
        })
    }

    fn clear(&self) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.state.lock().await = Credentials::default();
            debug!("cleared in-memory credentials");
            Ok(())
        })
    }
}

/// JSON-file credential store.
///
/// The Mutex serializes all writes; reads clone out of the in-memory copy so
/// request-time reads never touch the disk.
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<Credentials>,
}

impl FileCredentialStore {
    /// Load credentials from the given file path.
    ///
    /// A missing file is a cold start: the store begins empty and creates the
    /// file so later loads take the normal path.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading credential file: {e}")))?;
            let credentials: Credentials = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
            info!(
                path = %path.display(),
                has_access = credentials.access_token.is_some(),
                has_refresh = credentials.refresh_token.is_some(),
                "loaded credentials"
            );
            credentials
        } else {
            info!(path = %path.display(), "credential file not found, starting signed out");
            let credentials = Credentials::default();
            write_atomic(&path, &credentials).await?;
            credentials
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone of the full credential record.
    pub async fn snapshot(&self) -> Credentials {
        self.state.lock().await.clone()
    }
}

impl CredentialStore for FileCredentialStore {
    fn access_token(&self) -> StoreFuture<'_, Option<Secret<String>>> {
        Box::pin(async move { self.state.lock().await.access_secret() })
    }

    fn refresh_token(&self) -> StoreFuture<'_, Option<Secret<String>>> {
        Box::pin(async move { self.state.lock().await.refresh_secret() })
    }

    fn last_refresh_at(&self) -> StoreFuture<'_, Option<u64>> {
        Box::pin(async move { self.state.lock().await.last_refresh_at })
    }

    fn set_tokens(&self, access: String, refresh: Option<String>) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.apply_tokens(access, refresh, now_millis());
            write_atomic(&self.path, &state).await
        })
    }

    fn clear(&self) -> StoreFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            *state = Credentials::default();
            debug!(path = %self.path.display(), "cleared credentials");
            write_atomic(&self.path, &state).await
        })
    }
}

/// Write credentials to a file atomically with 0600 permissions.
async fn write_atomic(path: &Path, data: &Credentials) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".credentials.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}
