//! Authenticated HTTP client for the job-board API
//!
//! Wraps reqwest::Client with bearer token injection from the active session
//! and maps HTTP failures onto [`MessagingError`].

use anyhow::{Context, Result};
use url::Url;

use crate::config::Config;
use crate::messaging::MessagingError;
use crate::session::{self, Session};

/// Client bound to one session. Dropped (and rebuilt) when the session ends.
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
    session: Session,
}

impl ApiClient {
    pub fn new(base_url: &str, session: Session) -> Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("Invalid API base URL '{}'", base_url))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base,
            session,
        })
    }

    /// Build a client for the session stored in `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let session = session::load_active(config)?;
        Self::new(&config.api_base_url(), session)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Absolute URL for an API path with query parameters.
    pub fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, MessagingError> {
        let mut url = self.base.clone();
        let joined = format!("{}{}", url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// GET request (bearer auth with the session token).
    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<reqwest::Response, MessagingError> {
        let token = self.session.bearer()?;
        let url = self.url(path, query)?;
        tracing::debug!("GET {}", url);

        let resp = self.http.get(url.clone()).bearer_auth(token).send().await?;
        check_response(resp, &url).await
    }

    /// POST request with a JSON body.
    pub async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, MessagingError> {
        let token = self.session.bearer()?;
        let url = self.url(path, &[])?;
        tracing::debug!("POST {}", url);

        let resp = self
            .http
            .post(url.clone())
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        check_response(resp, &url).await
    }

    /// PUT request with a JSON body.
    pub async fn put(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, MessagingError> {
        let token = self.session.bearer()?;
        let url = self.url(path, &[])?;
        tracing::debug!("PUT {}", url);

        let resp = self
            .http
            .put(url.clone())
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;
        check_response(resp, &url).await
    }
}

/// Map an HTTP status onto the messaging error taxonomy.
fn classify(status: u16, url: &Url, body: String) -> MessagingError {
    match status {
        401 => MessagingError::Unauthorized,
        403 => MessagingError::PermissionDenied(if body.is_empty() {
            "forbidden".to_string()
        } else {
            body
        }),
        404 => MessagingError::NotFound(url.path().to_string()),
        500..=599 => MessagingError::Transport(format!("HTTP {} for {}", status, url)),
        _ => MessagingError::Rejected { status, body },
    }
}

/// Check HTTP response status code and return a typed error on failure.
async fn check_response(
    resp: reqwest::Response,
    url: &Url,
) -> Result<reqwest::Response, MessagingError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    tracing::debug!("HTTP {} for {}: {}", status.as_u16(), url, body);
    Err(classify(status.as_u16(), url, body))
}
