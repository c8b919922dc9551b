use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read session file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write session file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Process-wide bearer token.
///
/// Lifecycle: `set` at login, `token` read by the request builder for every
/// outgoing call, `expire` on an authorization failure and `clear` on logout.
/// When backed by a file the token survives between CLI invocations.
#[derive(Debug)]
pub struct Session {
    path: Option<PathBuf>,
    token: RwLock<Option<String>>,
    expired: AtomicBool,
}

impl Session {
    pub fn in_memory(token: Option<String>) -> Self {
        Self {
            path: None,
            token: RwLock::new(token),
            expired: AtomicBool::new(false),
        }
    }

    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let token = match std::fs::read_to_string(path) {
            Ok(contents) => {
                let trimmed = contents.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(SessionError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        debug!(path = %path.display(), has_token = token.is_some(), "session loaded");

        Ok(Self {
            path: Some(path.to_path_buf()),
            token: RwLock::new(token),
            expired: AtomicBool::new(false),
        })
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub fn set(&self, token: String) -> Result<(), SessionError> {
        if let Some(path) = &self.path {
            std::fs::write(path, &token).map_err(|source| SessionError::Write {
                path: path.clone(),
                source,
            })?;
        }
        self.replace(Some(token));
        self.expired.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Explicit logout. Returns whether a token was present.
    pub fn clear(&self) -> Result<bool, SessionError> {
        let had_token = self.replace(None).is_some();
        self.remove_file()?;
        Ok(had_token)
    }

    /// Authorization failure hook. Clears local state and returns `true`
    /// only for the first failure since the token was last set, so the
    /// caller redirects to login exactly once.
    pub fn expire(&self) -> bool {
        self.replace(None);
        if let Err(err) = self.remove_file() {
            warn!(error = %err, "could not remove expired session file");
        }
        !self.expired.swap(true, Ordering::SeqCst)
    }

    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    fn replace(&self, token: Option<String>) -> Option<String> {
        match self.token.write() {
            Ok(mut guard) => std::mem::replace(&mut *guard, token),
            Err(poisoned) => {
                let mut guard = poisoned.into_inner();
                std::mem::replace(&mut *guard, token)
            }
        }
    }

    fn remove_file(&self) -> Result<(), SessionError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionError::Write {
                path: path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");

        let session = Session::load(&path).unwrap();
        assert!(!session.is_authenticated());
        session.set("abc123".to_string()).unwrap();

        let reloaded = Session::load(&path).unwrap();
        assert_eq!(reloaded.token().as_deref(), Some("abc123"));
    }

    #[test]
    fn logout_removes_the_session_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");
        let session = Session::load(&path).unwrap();
        session.set("abc123".to_string()).unwrap();

        assert!(session.clear().unwrap());
        assert!(!path.exists());
        assert!(!session.clear().unwrap());
    }

    #[test]
    fn expiry_redirects_once_until_next_login() {
        let session = Session::in_memory(Some("abc".to_string()));

        let redirects = (0..3).filter(|_| session.expire()).count();
        assert_eq!(redirects, 1);
        assert!(session.token().is_none());
        assert!(session.is_expired());

        session.set("fresh".to_string()).unwrap();
        assert!(!session.is_expired());
        assert!(session.expire());
    }

    #[test]
    fn blank_session_file_means_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session");
        std::fs::write(&path, "  \n").unwrap();
        assert!(!Session::load(&path).unwrap().is_authenticated());
    }
}
