//! Saved-login persistence.
//!
//! A successful login flow writes the browser's authentication state
//! (cookies plus per-origin localStorage) to a single JSON file. Every batch
//! run starts by loading that file; its absence is the one precondition
//! failure that stops a batch before any navigation happens.
//!
//! The on-disk shape is the same storage-state layout browser tooling
//! commonly emits (`cookies` array + `origins` array with `localStorage`
//! name/value pairs), so state files captured by other tools for the same
//! account remain loadable. Cookie objects are kept as raw JSON and only
//! parsed into CDP params at injection time; one malformed cookie never
//! poisons the whole session.

pub mod login;

use crate::core::error::ScrapeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One origin's localStorage snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginState {
    pub origin: String,
    #[serde(rename = "localStorage", default)]
    pub local_storage: Vec<StorageEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

/// Serialized authentication state for one account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionState {
    /// Raw cookie objects, opaque until injection.
    #[serde(default)]
    pub cookies: Vec<serde_json::Value>,
    #[serde(default)]
    pub origins: Vec<OriginState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn new(cookies: Vec<serde_json::Value>, origins: Vec<OriginState>) -> Self {
        SessionState {
            cookies,
            origins,
            saved_at: Some(Utc::now()),
        }
    }

    /// localStorage entries stored for `origin`, if any were captured.
    pub fn storage_for(&self, origin: &str) -> Option<&OriginState> {
        self.origins.iter().find(|o| o.origin == origin)
    }
}

/// Durable store for [`SessionState`] at a fixed path.
///
/// No freshness validation happens here. An expired session is discovered
/// downstream when authenticated pages stop rendering expected content,
/// which surfaces as extraction degradation, not a store failure.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SessionStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the saved state. Fails with [`ScrapeError::SessionMissing`] when
    /// no state file exists so callers can tell the user to log in first.
    pub fn load(&self) -> Result<SessionState, ScrapeError> {
        if !self.path.exists() {
            return Err(ScrapeError::SessionMissing {
                path: self.path.clone(),
            });
        }
        let content = std::fs::read_to_string(&self.path)?;
        let state: SessionState = serde_json::from_str(&content)?;
        info!(
            "session: loaded {} cookies / {} origins from {}",
            state.cookies.len(),
            state.origins.len(),
            self.path.display()
        );
        Ok(state)
    }

    pub fn save(&self, state: &SessionState) -> Result<(), ScrapeError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(state)?)?;
        info!(
            "session: saved {} cookies / {} origins to {}",
            state.cookies.len(),
            state.origins.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Remove the stored state so the next run forces a fresh login.
    pub fn invalidate(&self) {
        if self.path.exists() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => info!("session: removed stale state at {}", self.path.display()),
                Err(e) => warn!(
                    "session: failed to remove state file {}: {}",
                    self.path.display(),
                    e
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_store(tag: &str) -> SessionStore {
        let path = std::env::temp_dir().join(format!(
            "profilecrawl-session-{}-{}.json",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        SessionStore::new(path)
    }

    #[test]
    fn missing_file_is_session_missing() {
        let store = temp_store("missing");
        match store.load() {
            Err(ScrapeError::SessionMissing { path }) => assert_eq!(path, store.path()),
            other => panic!("expected SessionMissing, got {other:?}"),
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = temp_store("roundtrip");
        let state = SessionState::new(
            vec![json!({"name": "li_at", "value": "tok", "domain": ".linkedin.com"})],
            vec![OriginState {
                origin: "https://www.linkedin.com".into(),
                local_storage: vec![StorageEntry {
                    name: "lang".into(),
                    value: "en_US".into(),
                }],
            }],
        );
        store.save(&state).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.cookies.len(), 1);
        assert_eq!(loaded.origins[0].origin, "https://www.linkedin.com");
        assert_eq!(loaded.origins[0].local_storage[0].name, "lang");
        assert!(loaded.saved_at.is_some());
        store.invalidate();
        assert!(!store.exists());
    }

    #[test]
    fn loads_storage_state_files_without_saved_at() {
        let store = temp_store("legacy");
        let raw = json!({
            "cookies": [
                {"name": "li_at", "value": "tok", "domain": ".linkedin.com",
                 "path": "/", "expires": -1, "httpOnly": true, "secure": true,
                 "sameSite": "None"}
            ],
            "origins": [
                {"origin": "https://www.linkedin.com",
                 "localStorage": [{"name": "theme", "value": "dark"}]}
            ]
        });
        std::fs::write(store.path(), serde_json::to_string_pretty(&raw).unwrap()).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.cookies.len(), 1);
        assert!(loaded.saved_at.is_none());
        assert!(loaded.storage_for("https://www.linkedin.com").is_some());
        store.invalidate();
    }
}
