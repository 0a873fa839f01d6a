//! GitHub repository-listing source.
//!
//! Implements [`PageSource`] against `GET /users/{user}/repos`, mapping
//! the response body to records and the `Link` header's `rel="last"` URL
//! to a total-page estimate.

mod link;

pub use link::parse_last_page;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use repofeed_core::RepoRecord;
use repofeed_core::source::{Page, PageSource, TransportError};

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// A paged listing of one user's repositories.
pub struct GithubSource {
    base_url: String,
    user: String,
    token: Option<String>,
    user_agent: String,
}

impl GithubSource {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user: user.into(),
            token: None,
            user_agent: concat!("repofeed/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    /// Point at a different API host (GitHub Enterprise, a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Bearer token for authenticated requests (higher rate limits).
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn page_url(&self, page: u32, per_page: u32) -> String {
        format!(
            "{}/users/{}/repos?page={}&per_page={}",
            self.base_url.trim_end_matches('/'),
            self.user,
            page,
            per_page
        )
    }
}

impl PageSource for GithubSource {
    fn name(&self) -> &str {
        "GitHub"
    }

    fn fetch_page<'a>(
        &'a self,
        page: u32,
        per_page: u32,
        client: &'a reqwest::Client,
        timeout: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<Page, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.page_url(page, per_page);

            let mut request = client
                .get(&url)
                .header("Accept", "application/vnd.github+json")
                .header("User-Agent", &self.user_agent)
                .timeout(timeout);
            if let Some(ref token) = self.token {
                request = request.header("Authorization", format!("Bearer {token}"));
            }

            let resp = request.send().await?;
            let status = resp.status();

            // GitHub signals primary-rate-limit exhaustion with a 403
            // carrying x-ratelimit-remaining: 0; secondary limits use 429.
            let limit_exhausted = resp
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v == "0");
            if status.as_u16() == 429 || (status.as_u16() == 403 && limit_exhausted) {
                return Err(TransportError::RateLimited);
            }
            if !status.is_success() {
                return Err(TransportError::Status(status.as_u16()));
            }

            let last_page = resp
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_last_page);
            if let Some(last) = last_page {
                tracing::trace!(page, last, "pagination metadata parsed");
            }

            let body = resp.text().await?;
            let records: Vec<RepoRecord> = serde_json::from_str(&body)?;

            Ok(Page { records, last_page })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_page_urls() {
        let source = GithubSource::new("facebook");
        assert_eq!(
            source.page_url(3, 30),
            "https://api.github.com/users/facebook/repos?page=3&per_page=30"
        );
    }

    #[test]
    fn base_url_trailing_slash_is_tolerated() {
        let source = GithubSource::new("octocat").with_base_url("http://localhost:8080/");
        assert_eq!(
            source.page_url(1, 2),
            "http://localhost:8080/users/octocat/repos?page=1&per_page=2"
        );
    }

    #[test]
    fn repo_body_deserializes_to_records() {
        let body = r#"[
            {"id": 1, "name": "react", "description": "A library", "html_url": "https://github.com/facebook/react", "fork": false},
            {"id": 2, "name": "hhvm", "description": null, "html_url": "https://github.com/facebook/hhvm"}
        ]"#;
        let records: Vec<RepoRecord> = serde_json::from_str(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "react");
        assert!(records[1].description.is_none());
    }
}
