//! Conversation state machine: the active message thread.
//!
//! Send flow: optimistic append of the user message, a composing flag while
//! the request is in flight, then either the bot reply (with retrieval
//! metadata) or a fixed local error message. The composing flag is reset on
//! every path. Switching conversations replaces the thread and the active
//! session id together; results that arrive for a conversation that is no
//! longer active are discarded instead of overwriting newer state.

use crate::api::{ApiClient, ApiError, ChatRequest, ChatResponse, RemoteMessage};
use crate::config::ChatConfig;
use crate::credentials::CredentialStore;
use crate::directory::{parse_utc, SessionDirectory};
use crate::state::StateCell;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Fixed reply appended when a chat request fails; the turn degrades instead
/// of corrupting the thread.
pub const FALLBACK_REPLY: &str = "Maaf, terjadi kesalahan. Silakan coba lagi nanti.";

/// Placeholder when the server answered 2xx but sent no answer text.
pub const EMPTY_ANSWER: &str = "Tidak ada respons.";

/// One message in the active thread.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Locally generated, unique within the thread.
    pub id: String,
    pub text: String,
    pub from_bot: bool,
    /// Display time (HH:MM), not a wire timestamp.
    pub timestamp: String,
    pub meta: Option<ReplyMeta>,
}

impl Message {
    /// Map a persisted message into the thread shape. The id is derived from
    /// the session id and the message's position, so reloading a session
    /// yields identical ids.
    pub fn from_remote(session_id: &str, position: usize, remote: &RemoteMessage) -> Self {
        let timestamp = remote
            .timestamp
            .as_deref()
            .and_then(parse_utc)
            .map(|dt| dt.with_timezone(&Local).format("%H:%M").to_string())
            .unwrap_or_default();
        Self {
            id: format!("{}:{}", session_id, position),
            text: remote.content.clone(),
            from_bot: remote.role != "user",
            timestamp,
            meta: remote.metadata.clone().filter(|m| !m.is_empty()),
        }
    }
}

/// Retrieval metadata attached to a bot reply. Every field is optional and
/// read independently; a reply with none of them carries no metadata at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplyMeta {
    /// Best-matching source label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Classified intent label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    /// Intent confidence, in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Hybrid relevance score of the best-matching source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl ReplyMeta {
    pub fn is_empty(&self) -> bool {
        self.source.is_none()
            && self.intent.is_none()
            && self.confidence.is_none()
            && self.score.is_none()
    }

    /// Build metadata from a chat response, field by field. An empty or
    /// absent sources array simply contributes nothing.
    pub fn from_response(resp: &ChatResponse) -> Option<Self> {
        let best = resp.sources.first();
        let meta = Self {
            source: best.and_then(|s| s.source.clone()),
            score: best.and_then(|s| s.score_hybrid),
            intent: resp.intent.as_ref().and_then(|i| i.label.clone()),
            confidence: resp.intent.as_ref().and_then(|i| i.confidence_percent),
        };
        if meta.is_empty() {
            None
        } else {
            Some(meta)
        }
    }
}

/// Published thread state.
#[derive(Debug, Clone, Default)]
pub struct Thread {
    pub messages: Vec<Message>,
    /// True while a send is in flight ("bot is composing").
    pub composing: bool,
    /// The session this thread belongs to; None until a session is loaded or
    /// the first authenticated message creates one.
    pub active_session: Option<String>,
}

/// Outcome of a send. The thread mutation is driven off this tag: the thread
/// gained a bot reply (Answered), a local error message (Failed), or nothing
/// because the conversation changed while the request was in flight
/// (Discarded).
#[derive(Debug)]
pub enum SendOutcome {
    Answered,
    Failed(ApiError),
    Discarded,
}

pub struct Conversation {
    api: ApiClient,
    directory: Arc<SessionDirectory>,
    credentials: Arc<CredentialStore>,
    tuning: ChatConfig,
    thread: StateCell<Thread>,
    next_id: AtomicU64,
    /// Bumped by `new_conversation`/`select_conversation`; in-flight results
    /// whose captured epoch no longer matches are discarded.
    epoch: AtomicU64,
}

impl Conversation {
    pub fn new(
        api: ApiClient,
        directory: Arc<SessionDirectory>,
        credentials: Arc<CredentialStore>,
        tuning: ChatConfig,
    ) -> Self {
        Self {
            api,
            directory,
            credentials,
            tuning,
            thread: StateCell::default(),
            next_id: AtomicU64::new(1),
            epoch: AtomicU64::new(0),
        }
    }

    /// Observable thread state for front-ends.
    pub fn state(&self) -> &StateCell<Thread> {
        &self.thread
    }

    pub fn thread(&self) -> Thread {
        self.thread.snapshot()
    }

    fn next_local_id(&self) -> String {
        format!("m-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn now_display() -> String {
        Local::now().format("%H:%M").to_string()
    }

    /// Send one user message. The user message is appended immediately; the
    /// reply (or the fixed error message) follows when the request settles.
    /// The composing flag never sticks, whatever happens in between.
    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let user_msg = Message {
            id: self.next_local_id(),
            text: text.to_string(),
            from_bot: false,
            timestamp: Self::now_display(),
            meta: None,
        };
        self.thread.update(|t| {
            t.messages.push(user_msg);
            t.composing = true;
        });

        let result = self.dispatch(text, epoch).await;

        if self.epoch.load(Ordering::SeqCst) != epoch {
            // The thread this send belonged to was replaced; its composing
            // flag died with it. Drop the result.
            log::debug!("discarding chat reply for a superseded conversation");
            return SendOutcome::Discarded;
        }

        let outcome = match result {
            Ok(resp) => {
                let text = resp
                    .answer
                    .clone()
                    .filter(|a| !a.trim().is_empty())
                    .unwrap_or_else(|| EMPTY_ANSWER.to_string());
                let reply = Message {
                    id: self.next_local_id(),
                    text,
                    from_bot: true,
                    timestamp: Self::now_display(),
                    meta: ReplyMeta::from_response(&resp),
                };
                self.thread.update(|t| t.messages.push(reply));
                if self.credentials.get().is_some() {
                    // Sidebar recency; stale data on failure is acceptable.
                    self.directory.refresh_best_effort().await;
                }
                SendOutcome::Answered
            }
            Err(e) => {
                log::warn!("chat request failed: {}", e);
                let reply = Message {
                    id: self.next_local_id(),
                    text: FALLBACK_REPLY.to_string(),
                    from_bot: true,
                    timestamp: Self::now_display(),
                    meta: None,
                };
                self.thread.update(|t| t.messages.push(reply));
                SendOutcome::Failed(e)
            }
        };
        self.thread.update(|t| t.composing = false);
        outcome
    }

    /// Issue the chat call, creating a session first when authenticated with
    /// no active one, so the opening message of a fresh authenticated
    /// conversation is persisted under a session from the start.
    async fn dispatch(&self, text: &str, epoch: u64) -> Result<ChatResponse, ApiError> {
        let mut session_id = self.thread.snapshot().active_session;
        if session_id.is_none() && self.credentials.get().is_some() {
            if let Some(id) = self.directory.create().await? {
                if self.epoch.load(Ordering::SeqCst) == epoch {
                    let adopted = id.clone();
                    self.thread.update(|t| t.active_session = Some(adopted));
                }
                session_id = Some(id);
            }
        }
        self.api
            .chat(&ChatRequest {
                message: text,
                session_id: session_id.as_deref(),
                top_k: self.tuning.top_k,
                method: &self.tuning.method,
            })
            .await
    }

    /// Start a fresh conversation: clears the thread and the active session
    /// id. Nothing is deleted remotely.
    pub fn new_conversation(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.thread.set(Thread::default());
    }

    /// Switch to a persisted session: load its history, then replace the
    /// thread and the active session id in one state update. A load that
    /// finishes after a newer switch is discarded.
    pub async fn select_conversation(&self, session_id: &str) -> Result<(), ApiError> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let messages = self.directory.load(session_id).await?;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            log::debug!("discarding stale history for session {}", session_id);
            return Ok(());
        }
        self.thread.set(Thread {
            messages,
            composing: false,
            active_session: Some(session_id.to_string()),
        });
        Ok(())
    }
}
