//! HTTP client wrapper for the content-management REST API.
//!
//! Every request goes through [`ApiClient::execute`], which attaches the
//! stored bearer token on the way out and, on the way back, picks up rolled
//! tokens from the refresh header or drops the session on a 401.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderName};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::{RequestTicket, SessionContext, SESSION_EXPIRED_MESSAGE};
use crate::models::{LoginRequest, LoginResponse, ProfilePatch, UserProfile};

// ============================================================================
// Constants
// ============================================================================

/// Response header the server uses to hand out a replacement token
pub const DEFAULT_REFRESH_HEADER: &str = "x-refresh-token";

/// HTTP request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Connection settings for [`ApiClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    pub refresh_header: String,
    pub timeout: Duration,
}

impl ClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            refresh_header: DEFAULT_REFRESH_HEADER.to_string(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

/// Whether a 401 on the request means the session is gone, or just that
/// the credentials being exchanged were wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthScope {
    Session,
    Credentials,
}

/// The profile endpoint answers with the bare profile or wrapped in `user`
#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileEnvelope {
    Wrapped { user: UserProfile },
    Bare(UserProfile),
}

impl ProfileEnvelope {
    fn into_profile(self) -> UserProfile {
        match self {
            ProfileEnvelope::Wrapped { user } => user,
            ProfileEnvelope::Bare(user) => user,
        }
    }
}

/// API client for the admin backend.
/// Clone is cheap - reqwest::Client and the session context are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    refresh_header: HeaderName,
    session: Arc<SessionContext>,
}

impl ApiClient {
    pub fn new(options: ClientOptions, session: Arc<SessionContext>) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let refresh_header = HeaderName::from_bytes(options.refresh_header.to_ascii_lowercase().as_bytes())
            .with_context(|| format!("Invalid refresh header name: {}", options.refresh_header))?;

        Ok(Self {
            client,
            base_url: options.base_url.trim_end_matches('/').to_string(),
            refresh_header,
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub(crate) fn get(&self, path: &str) -> RequestBuilder {
        self.client.get(self.url(path))
    }

    pub(crate) fn post(&self, path: &str) -> RequestBuilder {
        self.client.post(self.url(path))
    }

    pub(crate) fn put(&self, path: &str) -> RequestBuilder {
        self.client.put(self.url(path))
    }

    pub(crate) fn delete(&self, path: &str) -> RequestBuilder {
        self.client.delete(self.url(path))
    }

    // ===== Interception =====

    /// Attach the token currently in the store, if any, and return the
    /// ticket of the session that token belongs to
    async fn authorize(&self, request: RequestBuilder) -> (RequestTicket, RequestBuilder) {
        let (ticket, token) = self.session.credentials().await;
        let request = match token {
            Ok(Some(token)) => request.bearer_auth(token),
            Ok(None) => request,
            Err(e) => {
                warn!(error = %e, "Failed to read stored token, sending unauthenticated");
                request
            }
        };
        (ticket, request)
    }

    async fn execute(&self, request: RequestBuilder, scope: AuthScope) -> Result<Response, ApiError> {
        let (ticket, request) = self.authorize(request).await;
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            let url = response.url().clone();
            let body = response.text().await.unwrap_or_default();
            if scope == AuthScope::Session {
                warn!(url = %url, "Request unauthorized, dropping session");
                self.session.invalidate(ticket, SESSION_EXPIRED_MESSAGE).await;
            }
            return Err(ApiError::from_status(status, &body));
        }

        if let Some(token) = self.refreshed_token(response.headers()) {
            self.session.apply_refresh(ticket, &token).await;
        }

        Self::check_response(response).await
    }

    fn refreshed_token(&self, headers: &HeaderMap) -> Option<String> {
        let value = headers.get(&self.refresh_header)?;
        match value.to_str() {
            Ok(token) if !token.trim().is_empty() => Some(token.trim().to_string()),
            Ok(_) => None,
            Err(_) => {
                debug!("Ignoring non-ASCII refresh header");
                None
            }
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        let url = response.url().clone();
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", url, e)))
    }

    /// Send a session request and decode the JSON body
    pub(crate) async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.execute(request, AuthScope::Session).await?;
        Self::parse_json(response).await
    }

    /// Send a session request whose body, if any, is irrelevant
    pub(crate) async fn send_empty(&self, request: RequestBuilder) -> Result<(), ApiError> {
        self.execute(request, AuthScope::Session).await?;
        Ok(())
    }

    // ===== Authentication =====

    /// Exchange credentials for a token and profile. Nothing is persisted
    /// here; the session controller decides what to keep.
    pub async fn login(&self, identifier: &str, secret: &str) -> Result<LoginResponse, ApiError> {
        let request = self.post("/auth/login").json(&LoginRequest {
            email: identifier,
            password: secret,
        });
        let response = self.execute(request, AuthScope::Credentials).await?;
        Self::parse_json(response).await
    }

    /// Fetch the profile of the user the stored token belongs to
    pub async fn fetch_profile(&self) -> Result<UserProfile, ApiError> {
        let envelope: ProfileEnvelope = self.send_json(self.get("/auth/profile")).await?;
        Ok(envelope.into_profile())
    }

    pub async fn update_profile(&self, patch: &ProfilePatch) -> Result<UserProfile, ApiError> {
        let envelope: ProfileEnvelope = self.send_json(self.put("/auth/profile").json(patch)).await?;
        Ok(envelope.into_profile())
    }

    /// Ask the server to forget the current token
    pub async fn revoke_session(&self) -> Result<(), ApiError> {
        self.send_empty(self.post("/auth/logout")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryStore;

    fn client(base_url: &str) -> ApiClient {
        let session = SessionContext::new(Arc::new(MemoryStore::new()));
        ApiClient::new(ClientOptions::new(base_url), session).unwrap()
    }

    #[test]
    fn test_url_joining() {
        let api = client("https://cms.example.com/api/");
        assert_eq!(api.base_url(), "https://cms.example.com/api");
        assert_eq!(api.url("/auth/login"), "https://cms.example.com/api/auth/login");
        assert_eq!(api.url("posts"), "https://cms.example.com/api/posts");
    }

    #[tokio::test]
    async fn test_authorize_uses_current_store_value() {
        let api = client("https://cms.example.com/api");

        let request = api.authorize(api.get("/posts")).await.1.build().unwrap();
        assert!(request.headers().get(reqwest::header::AUTHORIZATION).is_none());

        api.session().store().set_token("abc").await.unwrap();
        let request = api.authorize(api.get("/posts")).await.1.build().unwrap();
        assert_eq!(request.headers()[reqwest::header::AUTHORIZATION], "Bearer abc");

        api.session().store().set_token("def").await.unwrap();
        let request = api.authorize(api.get("/posts")).await.1.build().unwrap();
        assert_eq!(request.headers()[reqwest::header::AUTHORIZATION], "Bearer def");
    }

    #[test]
    fn test_refreshed_token_header() {
        let api = client("https://cms.example.com/api");
        let mut headers = HeaderMap::new();
        assert_eq!(api.refreshed_token(&headers), None);

        headers.insert("x-refresh-token", " next ".parse().unwrap());
        assert_eq!(api.refreshed_token(&headers).as_deref(), Some("next"));

        headers.insert("x-refresh-token", "".parse().unwrap());
        assert_eq!(api.refreshed_token(&headers), None);
    }

    #[test]
    fn test_custom_refresh_header_is_case_insensitive() {
        let session = SessionContext::new(Arc::new(MemoryStore::new()));
        let mut options = ClientOptions::new("http://localhost");
        options.refresh_header = "X-Session-Token".to_string();
        let api = ApiClient::new(options, session).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-session-token", "rolled".parse().unwrap());
        assert_eq!(api.refreshed_token(&headers).as_deref(), Some("rolled"));
    }

    #[test]
    fn test_profile_envelope_shapes() {
        let bare: ProfileEnvelope =
            serde_json::from_str(r#"{"id":1,"email":"a@b.com","role":"admin"}"#).unwrap();
        assert_eq!(bare.into_profile().id, 1);

        let wrapped: ProfileEnvelope =
            serde_json::from_str(r#"{"user":{"id":2,"email":"c@d.com","role":"redakteur"}}"#).unwrap();
        assert_eq!(wrapped.into_profile().id, 2);
    }
}
