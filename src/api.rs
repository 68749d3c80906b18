use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::bookmark::BookmarkApi;
use crate::config::Config;
use crate::feed::PostSource;
use crate::filter::FilterSelection;
use crate::models::{PageResult, Post, Profile, ProfileUpdate, User};
use crate::query;
use crate::session::Session;

/// Error code the applicant endpoint returns before a profile exists.
pub const NO_PROFILE_CODE: &str = "APPLICANT_002";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("session expired or credentials rejected (401)")]
    Unauthorized,
    #[error("not logged in")]
    NoToken,
    #[error("request failed with status {status}: {message}")]
    Status {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),
}

impl ApiError {
    pub fn code(&self) -> Option<&str> {
        match self {
            ApiError::Status { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BookmarksResponse {
    #[serde(default)]
    posts: Vec<Post>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub auth_type: &'static str,
    pub info: SignupInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupInfo {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub email: String,
    pub password: String,
    pub success_code: String,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Query string for `GET /api/post`. Empty role/domain lists mean "no
/// constraint" and are left out entirely.
pub fn posts_query(selection: &FilterSelection) -> String {
    let roles: Vec<String> = selection.roles.iter().map(|r| r.to_string()).collect();
    let domains: Vec<String> = selection.domains.iter().map(|d| d.to_string()).collect();
    query::encode(&[
        ("positionTypes", (!roles.is_empty()).then_some(roles).into()),
        ("domains", (!domains.is_empty()).then_some(domains).into()),
        ("isActive", selection.active_only.as_filter().into()),
        ("order", selection.sort_order.code().into()),
        ("page", selection.page.into()),
    ])
}

/// Client for the listing API. The bearer credential is read from the
/// session on every request, so a login or an expiry elsewhere takes effect
/// immediately.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: Session,
}

impl ApiClient {
    pub fn new(config: &Config, session: Session) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("hasha/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: config.api_url.clone(),
            session,
        })
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }

    /// Attaches the credential when there is one.
    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Attaches the credential or fails without touching the network.
    fn bearer(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self.session.token().ok_or(ApiError::NoToken)?;
        Ok(request.bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let parsed: ErrorBody = serde_json::from_str(&body).unwrap_or_default();
            let message = parsed
                .message
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
            tracing::debug!(status = status.as_u16(), code = ?parsed.code, "API request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                code: parsed.code,
                message,
            });
        }
        Ok(body)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
    }

    // --- Posts ---

    pub async fn fetch_posts(&self, selection: &FilterSelection) -> Result<PageResult, ApiError> {
        let mut url = self.url("api/post")?;
        url.set_query(Some(&posts_query(selection)));
        tracing::debug!(%url, "fetching posts");
        self.send_json(self.authed(self.http.get(url))).await
    }

    pub async fn bookmark(&self, post_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("api/post/{}/bookmark", post_id))?;
        self.send(self.bearer(self.http.post(url))?).await?;
        Ok(())
    }

    pub async fn unbookmark(&self, post_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("api/post/{}/bookmark", post_id))?;
        self.send(self.bearer(self.http.delete(url))?).await?;
        Ok(())
    }

    pub async fn bookmarks(&self) -> Result<Vec<Post>, ApiError> {
        let url = self.url("api/post/bookmarks")?;
        let response: BookmarksResponse = self.send_json(self.bearer(self.http.get(url))?).await?;
        Ok(response.posts)
    }

    // --- Applicant profile ---

    /// `Ok(None)` when the applicant has not created a profile yet.
    pub async fn profile(&self) -> Result<Option<Profile>, ApiError> {
        let url = self.url("api/applicant/me")?;
        match self.send_json(self.bearer(self.http.get(url))?).await {
            Ok(profile) => Ok(Some(profile)),
            Err(e) if e.code() == Some(NO_PROFILE_CODE) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn save_profile(&self, update: &ProfileUpdate) -> Result<(), ApiError> {
        let url = self.url("api/applicant/me")?;
        self.send(self.bearer(self.http.put(url).json(update))?).await?;
        Ok(())
    }

    // --- Auth ---

    pub async fn signup(&self, request: &SignupRequest) -> Result<String, ApiError> {
        let url = self.url("api/auth/user")?;
        let response: TokenResponse = self.send_json(self.http.post(url).json(request)).await?;
        response
            .token
            .ok_or_else(|| ApiError::Decode("signup response carried no token".to_string()))
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<String, ApiError> {
        let url = self.url("api/auth/user/session")?;
        let body = LoginRequest { email, password };
        let response: TokenResponse = self.send_json(self.http.post(url).json(&body)).await?;
        response
            .token
            .ok_or_else(|| ApiError::Decode("login response carried no token".to_string()))
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        let url = self.url("api/auth/user/session")?;
        self.send(self.bearer(self.http.delete(url))?).await?;
        Ok(())
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        let url = self.url("api/auth/me")?;
        self.send_json(self.bearer(self.http.get(url))?).await
    }
}

#[async_trait]
impl PostSource for ApiClient {
    async fn fetch_posts(&self, selection: &FilterSelection) -> Result<PageResult, ApiError> {
        ApiClient::fetch_posts(self, selection).await
    }
}

#[async_trait]
impl BookmarkApi for ApiClient {
    async fn set_bookmark(&self, post_id: &str, bookmarked: bool) -> Result<(), ApiError> {
        if bookmarked {
            self.bookmark(post_id).await
        } else {
            self.unbookmark(post_id).await
        }
    }
}
