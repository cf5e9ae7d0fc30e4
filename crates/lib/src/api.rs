//! HTTP client for the Pustaka backend.
//!
//! Single choke point for remote calls: attaches the bearer token when a
//! credential exists, serializes JSON bodies, and surfaces non-2xx responses
//! as errors carrying the server's structured `detail` field when present.
//! Every other component goes through this client rather than issuing raw
//! requests, so auth attachment and error normalization happen exactly once.

use crate::auth::User;
use crate::credentials::CredentialStore;
use crate::directory::SessionMeta;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Client for the backend HTTP API.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
    credentials: Arc<CredentialStore>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request failed before a response was obtained.
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Non-2xx response; `detail` is the server's reason when it sent one.
    #[error("{detail}")]
    Server { status: u16, detail: String },
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, credentials: Arc<CredentialStore>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
            credentials,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the Authorization header when a credential exists.
    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.credentials.get() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Map a non-2xx response to `ApiError::Server`, reading the body's
    /// `detail` field when present, else a generic fallback.
    async fn check(res: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if res.status().is_success() {
            return Ok(res);
        }
        let status = res.status().as_u16();
        let detail = res
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|b| b.detail)
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("request failed with status {}", status));
        Err(ApiError::Server { status, detail })
    }

    /// POST /auth/login
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let res = self
            .client
            .post(self.url("/auth/login"))
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        Ok(Self::check(res).await?.json().await?)
    }

    /// POST /auth/register
    pub async fn register(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> Result<(), ApiError> {
        let res = self
            .client
            .post(self.url("/auth/register"))
            .json(&RegisterRequest {
                full_name,
                email,
                password,
            })
            .send()
            .await?;
        Self::check(res).await?;
        Ok(())
    }

    /// GET /auth/me?token=...
    pub async fn me(&self, token: &str) -> Result<User, ApiError> {
        let res = self
            .client
            .get(self.url("/auth/me"))
            .query(&[("token", token)])
            .send()
            .await?;
        Ok(Self::check(res).await?.json().await?)
    }

    /// PUT /auth/profile (auth header)
    pub async fn update_profile(&self, full_name: &str, email: &str) -> Result<(), ApiError> {
        let res = self
            .with_auth(self.client.put(self.url("/auth/profile")))
            .json(&ProfileRequest { full_name, email })
            .send()
            .await?;
        Self::check(res).await?;
        Ok(())
    }

    /// PUT /auth/password (auth header). Both passwords are forwarded as-is
    /// and never logged.
    pub async fn update_password(&self, current: &str, new: &str) -> Result<(), ApiError> {
        let res = self
            .with_auth(self.client.put(self.url("/auth/password")))
            .json(&PasswordRequest {
                current_password: current,
                new_password: new,
            })
            .send()
            .await?;
        Self::check(res).await?;
        Ok(())
    }

    /// GET /chat/sessions (auth header)
    pub async fn list_sessions(&self) -> Result<Vec<SessionMeta>, ApiError> {
        let res = self
            .with_auth(self.client.get(self.url("/chat/sessions")))
            .send()
            .await?;
        Ok(Self::check(res).await?.json().await?)
    }

    /// POST /chat/sessions (auth header) — request a new empty session.
    pub async fn create_session(&self) -> Result<SessionMeta, ApiError> {
        let res = self
            .with_auth(self.client.post(self.url("/chat/sessions")))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Ok(Self::check(res).await?.json().await?)
    }

    /// GET /chat/sessions/{id} (auth header) — full message history.
    pub async fn session_history(&self, session_id: &str) -> Result<SessionHistory, ApiError> {
        let res = self
            .with_auth(
                self.client
                    .get(self.url(&format!("/chat/sessions/{}", session_id))),
            )
            .send()
            .await?;
        Ok(Self::check(res).await?.json().await?)
    }

    /// POST /chat (auth header optional)
    pub async fn chat(&self, req: &ChatRequest<'_>) -> Result<ChatResponse, ApiError> {
        let res = self
            .with_auth(self.client.post(self.url("/chat")))
            .json(req)
            .send()
            .await?;
        Ok(Self::check(res).await?.json().await?)
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    full_name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRequest<'a> {
    full_name: &'a str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct PasswordRequest<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

/// Chat request body. `session_id` is serialized as `null` when absent
/// (anonymous or fresh conversation); `top_k` and `method` come from config
/// and are forwarded verbatim.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub message: &'a str,
    pub session_id: Option<&'a str>,
    pub top_k: u32,
    pub method: &'a str,
}

/// Chat response. Every field may be missing or partial; a malformed reply
/// must degrade, not fail the turn.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceHit>,
    #[serde(default)]
    pub intent: Option<IntentLabel>,
}

/// One retrieved source, best match first.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceHit {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub score_hybrid: Option<f64>,
}

/// Classified intent of the user message.
#[derive(Debug, Clone, Deserialize)]
pub struct IntentLabel {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub confidence_percent: Option<f64>,
}

/// GET /chat/sessions/{id} response.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionHistory {
    #[serde(default)]
    pub messages: Vec<RemoteMessage>,
}

/// One persisted message as the server stores it.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub metadata: Option<crate::conversation::ReplyMeta>,
}
