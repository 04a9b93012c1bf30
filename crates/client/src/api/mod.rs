//! InstaGo REST API client.
//!
//! Thin bearer-token-authenticated client over the server's list, search,
//! delete, and note-update endpoints. The cache layer consumes it through
//! the [`ScreenshotApi`] trait so tests can substitute a fake backend.
//!
//! ### Endpoints
//!
//! - `GET {base}/screenshot-note?skip&limit[&since]`: list, newest first;
//!   `since` (RFC 3339) restricts to records created/updated after it.
//! - `POST {base}/query` with `{query}`: semantic search, returns
//!   `[{screenshot, score}]`.
//! - `DELETE {base}/screenshot/{id}`: 204 with empty body on success;
//!   some deployments return a JSON body instead.
//! - `PUT {base}/screenshot-note/{id}` with `{user_note}`: returns the
//!   updated record.

pub mod error;
pub mod request;
pub mod response;

pub use error::ApiError;
pub use request::ListOptions;
pub use response::SearchHit;

use async_trait::async_trait;
use instago_core::{AppConfig, Screenshot};
use reqwest::{StatusCode, header};
use std::time::{Duration, Instant};

use request::{ListQuery, NoteBody, SearchBody};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "instago/0.1";

/// Default page size for list fetches.
const DEFAULT_PAGE_SIZE: u32 = 20;

/// API client configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the REST API, without trailing slash.
    pub base_url: String,
    /// Bearer token; required before any call is issued.
    pub token: Option<String>,
    /// Request timeout (default: 20s).
    pub timeout: Duration,
    /// User-agent string.
    pub user_agent: String,
    /// Page size applied when a list call does not specify one.
    pub page_size: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let app = AppConfig::default();
        Self {
            base_url: app.api_base_url,
            token: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ApiConfig {
    /// Build an API configuration from the loaded application config.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.api_base_url.clone(),
            token: config.api_token.clone(),
            timeout: config.timeout(),
            user_agent: config.user_agent.clone(),
            page_size: config.list_page_size,
        }
    }
}

/// The network surface the cache layer depends on.
#[async_trait]
pub trait ScreenshotApi: Send + Sync {
    /// Fetch a page of screenshots, optionally restricted to records
    /// changed after `opts.since`.
    async fn list(&self, opts: &ListOptions) -> Result<Vec<Screenshot>, ApiError>;

    /// Run a semantic search over the user's screenshots.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ApiError>;

    /// Delete a screenshot.
    async fn delete(&self, id: &str) -> Result<(), ApiError>;

    /// Replace the user note on a screenshot.
    async fn update_note(&self, id: &str, note: &str) -> Result<Screenshot, ApiError>;
}

/// InstaGo REST API client.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ApiConfig,
}

impl ApiClient {
    /// Create a new client with the given configuration.
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        url::Url::parse(&config.base_url)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid base URL: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| ApiError::Network(std::sync::Arc::new(e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    fn bearer(&self) -> Result<String, ApiError> {
        match self.config.token.as_deref() {
            Some(token) if !token.is_empty() => Ok(format!("Bearer {token}")),
            _ => Err(ApiError::MissingToken),
        }
    }

    fn check_status(status: StatusCode) -> Result<(), ApiError> {
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::AuthError);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited);
        }
        if status.is_client_error() || status.is_server_error() {
            return Err(ApiError::HttpError { status: status.as_u16() });
        }
        Ok(())
    }
}

#[async_trait]
impl ScreenshotApi for ApiClient {
    async fn list(&self, opts: &ListOptions) -> Result<Vec<Screenshot>, ApiError> {
        let start = Instant::now();
        let query = ListQuery {
            skip: opts.skip.unwrap_or(0),
            limit: opts.limit.unwrap_or(self.config.page_size),
            since: opts.since,
        };

        let response = self
            .http
            .get(self.endpoint("screenshot-note"))
            .header(header::AUTHORIZATION, self.bearer()?)
            .header(header::ACCEPT, "application/json")
            .query(&query)
            .send()
            .await?;

        let status = response.status();

        // The backend occasionally answers list requests with a 500; an
        // empty page keeps the gallery rendering from cache instead of
        // surfacing an error.
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::warn!("list endpoint returned 500, treating as empty page");
            return Ok(Vec::new());
        }

        Self::check_status(status)?;

        let records: Vec<Screenshot> = response.json().await.map_err(|e| ApiError::Parse(e.to_string()))?;

        tracing::debug!("listed {} screenshots in {:?}", records.len(), start.elapsed());
        Ok(records)
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, ApiError> {
        if query.trim().is_empty() {
            return Err(ApiError::InvalidRequest("query cannot be empty".to_string()));
        }

        let start = Instant::now();
        let response = self
            .http
            .post(self.endpoint("query"))
            .header(header::AUTHORIZATION, self.bearer()?)
            .json(&SearchBody { query })
            .send()
            .await?;

        Self::check_status(response.status())?;

        let hits: Vec<SearchHit> = response.json().await.map_err(|e| ApiError::Parse(e.to_string()))?;

        tracing::debug!("search for {query:?} returned {} hits in {:?}", hits.len(), start.elapsed());
        Ok(hits)
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let response = self
            .http
            .delete(self.endpoint(&format!("screenshot/{id}")))
            .header(header::AUTHORIZATION, self.bearer()?)
            .send()
            .await?;

        let status = response.status();

        // 204 means deleted with no body; other success codes may carry a
        // JSON body we don't need.
        if status == StatusCode::NO_CONTENT {
            tracing::debug!("deleted screenshot {id} (204)");
            return Ok(());
        }

        Self::check_status(status)?;

        let _ = response.bytes().await;
        tracing::debug!("deleted screenshot {id}");
        Ok(())
    }

    async fn update_note(&self, id: &str, note: &str) -> Result<Screenshot, ApiError> {
        let response = self
            .http
            .put(self.endpoint(&format!("screenshot-note/{id}")))
            .header(header::AUTHORIZATION, self.bearer()?)
            .json(&NoteBody { user_note: note })
            .send()
            .await?;

        Self::check_status(response.status())?;

        response.json().await.map_err(|e| ApiError::Parse(e.to_string()))
    }
}
