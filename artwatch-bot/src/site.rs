//! Upstream submission search client
//!
//! Read-only client for the art site's search API. Only the fields the
//! pipeline needs are deserialized; everything else in the response is
//! ignored. The server-side result id (`rid`) makes repeat polls cheap for
//! the upstream.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

const BODY_EXCERPT_LEN: usize = 256;

/// Upstream search errors
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("upstream returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// One file belonging to a submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionFile {
    pub file_url_full: String,
}

/// A submission as returned by the search API.
#[derive(Debug, Clone, Deserialize)]
pub struct Submission {
    pub submission_id: String,
    pub username: String,
    #[serde(default)]
    pub file_url_full: Option<String>,
    #[serde(default)]
    pub files: Vec<SubmissionFile>,
}

impl Submission {
    /// File URLs in page order; single-file submissions carry the URL on the
    /// submission itself.
    pub fn file_urls(&self) -> Vec<&str> {
        if self.files.is_empty() {
            self.file_url_full.as_deref().into_iter().collect()
        } else {
            self.files.iter().map(|f| f.file_url_full.as_str()).collect()
        }
    }
}

/// One page of search results.
#[derive(Debug, Default, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub rid: Option<String>,
    #[serde(default)]
    pub submissions: Vec<Submission>,
}

/// Search capability the watcher polls; stubbed in tests.
#[async_trait]
pub trait SearchSite: Send + Sync {
    async fn search(&self, rid: Option<&str>) -> Result<SearchPage, SiteError>;
}

/// HTTP search client authenticated by an opaque session token.
pub struct HttpSite {
    client: reqwest::Client,
    search_url: String,
    sid: String,
}

impl HttpSite {
    pub fn new(client: reqwest::Client, search_url: impl Into<String>, sid: impl Into<String>) -> Self {
        Self {
            client,
            search_url: search_url.into(),
            sid: sid.into(),
        }
    }
}

#[async_trait]
impl SearchSite for HttpSite {
    async fn search(&self, rid: Option<&str>) -> Result<SearchPage, SiteError> {
        let mut query = vec![("sid", self.sid.as_str()), ("get_rid", "true")];
        if let Some(rid) = rid {
            query.push(("rid", rid));
        }
        let response = self.client.get(&self.search_url).query(&query).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SiteError::Api {
                status: status.as_u16(),
                body: body.chars().take(BODY_EXCERPT_LEN).collect(),
            });
        }
        Ok(response.json().await?)
    }
}
