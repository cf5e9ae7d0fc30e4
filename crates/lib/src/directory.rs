//! Chat session directory: the list of known conversation sessions
//! (metadata only) for the authenticated user.
//!
//! The remote store is authoritative: `refresh` replaces the whole
//! collection rather than merging. Anonymous mode has no sessions at all.

use crate::api::{ApiClient, ApiError};
use crate::conversation::Message;
use crate::credentials::CredentialStore;
use crate::state::StateCell;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One persisted conversation, as listed by the backend. Ordered by recency,
/// ids unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    #[serde(default)]
    pub message_count: u32,
}

pub struct SessionDirectory {
    api: ApiClient,
    credentials: Arc<CredentialStore>,
    sessions: StateCell<Vec<SessionMeta>>,
}

impl SessionDirectory {
    pub fn new(api: ApiClient, credentials: Arc<CredentialStore>) -> Self {
        Self {
            api,
            credentials,
            sessions: StateCell::default(),
        }
    }

    /// Observable session list for front-ends.
    pub fn state(&self) -> &StateCell<Vec<SessionMeta>> {
        &self.sessions
    }

    pub fn sessions(&self) -> Vec<SessionMeta> {
        self.sessions.snapshot()
    }

    /// Fetch the session list and replace the collection. No-op when
    /// anonymous.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        if self.credentials.get().is_none() {
            return Ok(());
        }
        let list = self.api.list_sessions().await?;
        self.sessions.set(list);
        Ok(())
    }

    /// Refresh where a failure only means stale sidebar data.
    pub async fn refresh_best_effort(&self) {
        if let Err(e) = self.refresh().await {
            log::debug!("session list refresh failed: {}", e);
        }
    }

    /// Request a new empty session and refresh the list. Returns `None` when
    /// anonymous (messages are ephemeral in that mode).
    pub async fn create(&self) -> Result<Option<String>, ApiError> {
        if self.credentials.get().is_none() {
            return Ok(None);
        }
        let created = self.api.create_session().await?;
        log::debug!("created session {}", created.id);
        let id = created.id.clone();
        self.refresh_best_effort().await;
        Ok(Some(id))
    }

    /// Fetch a session's full message history, mapped into the local thread
    /// shape. Each message gets a deterministic id derived from the session
    /// id and its position.
    pub async fn load(&self, session_id: &str) -> Result<Vec<Message>, ApiError> {
        let history = self.api.session_history(session_id).await?;
        Ok(history
            .messages
            .iter()
            .enumerate()
            .map(|(i, m)| Message::from_remote(session_id, i, m))
            .collect())
    }
}

/// Parse a backend timestamp. Values without an explicit offset are UTC.
pub fn parse_utc(ts: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(ts, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S%.f").ok())
        .map(|n| n.and_utc())
}

/// Human "time since update" label for the session list. Pure function of
/// (timestamp, now); unparseable input is shown as-is.
pub fn time_ago(ts: &str, now: DateTime<Utc>) -> String {
    let Some(then) = parse_utc(ts) else {
        return ts.to_string();
    };
    let elapsed = now.signed_duration_since(then);
    let hours = elapsed.num_hours();
    if hours < 1 {
        "just now".to_string()
    } else if hours < 24 {
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if elapsed.num_days() < 7 {
        let days = elapsed.num_days();
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        then.format("%d %b %Y").to_string()
    }
}
