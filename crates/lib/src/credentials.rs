//! Credential store: at most one opaque bearer token, file-backed.
//!
//! Opened once at startup (reading any previously saved token) and shared
//! process-wide; every other component treats it as the single source of
//! truth for "is there a credential". No network access here.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub struct CredentialStore {
    path: PathBuf,
    token: RwLock<Option<String>>,
}

impl CredentialStore {
    /// Open the store, loading the saved token if one exists.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let token = read_token(&path);
        Self {
            path,
            token: RwLock::new(token),
        }
    }

    /// Current token, if any.
    pub fn get(&self) -> Option<String> {
        self.token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the token and persist it to the credential file.
    pub fn set(&self, token: &str) -> Result<()> {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = Some(token.to_string());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating credential directory {}", parent.display()))?;
        }
        std::fs::write(&self.path, token)
            .with_context(|| format!("writing credential to {}", self.path.display()))?;
        Ok(())
    }

    /// Forget the credential. Memory is cleared even if the file removal fails.
    pub fn clear(&self) {
        *self.token.write().unwrap_or_else(|e| e.into_inner()) = None;
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!(
                    "failed to remove credential file {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

fn read_token(path: &Path) -> Option<String> {
    let s = std::fs::read_to_string(path).ok()?;
    let t = s.trim().to_string();
    if t.is_empty() {
        None
    } else {
        Some(t)
    }
}

/// Credential file location: `token` next to the config file.
pub fn credential_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .join("token")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_token_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("pustaka-cred-test-{}", uuid::Uuid::new_v4()))
            .join("token")
    }

    #[test]
    fn open_without_file_is_empty() {
        let store = CredentialStore::open(temp_token_path());
        assert_eq!(store.get(), None);
    }

    #[test]
    fn set_persists_across_reopen() {
        let path = temp_token_path();
        let store = CredentialStore::open(&path);
        store.set("tok-abc").expect("set");
        assert_eq!(store.get().as_deref(), Some("tok-abc"));

        let reopened = CredentialStore::open(&path);
        assert_eq!(reopened.get().as_deref(), Some("tok-abc"));
    }

    #[test]
    fn clear_is_durable() {
        let path = temp_token_path();
        let store = CredentialStore::open(&path);
        store.set("tok-abc").expect("set");
        store.clear();
        assert_eq!(store.get(), None);

        let reopened = CredentialStore::open(&path);
        assert_eq!(reopened.get(), None);
    }

    #[test]
    fn whitespace_only_file_reads_as_no_token() {
        let path = temp_token_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "  \n").unwrap();
        let store = CredentialStore::open(&path);
        assert_eq!(store.get(), None);
    }

    #[test]
    fn credential_path_is_sibling_of_config() {
        assert_eq!(
            credential_path(Path::new("/home/user/.pustaka/config.json")),
            PathBuf::from("/home/user/.pustaka/token")
        );
    }
}
