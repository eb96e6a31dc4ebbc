//! Adapters for the external collaborators: the arXiv search API and the translation service.

use async_trait::async_trait;
use paperfeed_core::{IngestionWindow, PaperDraft};
use paperfeed_storage::{FetchError, HttpFetcher};
use reqwest::Url;
use thiserror::Error;
use tracing::info;

mod feed;
mod translate;

pub use feed::{derive_pdf_url, natural_key, parse_feed, FeedError};
pub use translate::{HttpTranslator, TranslateError, Translator};

pub const CRATE_NAME: &str = "paperfeed-adapters";

pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";
pub const DEFAULT_CATEGORY: &str = "cs.AI";
/// Single page; the search is not paginated.
pub const MAX_RESULTS: usize = 200;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid request url: {0}")]
    Url(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("response body is not utf-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[async_trait]
pub trait PaperSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    /// Every paper submitted inside `window`, as far as one request returns.
    async fn fetch_window(&self, window: &IngestionWindow) -> Result<Vec<PaperDraft>, AdapterError>;
}

/// Category + submission-date query against the arXiv search endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArxivQuery {
    pub category: String,
    pub window: IngestionWindow,
}

impl ArxivQuery {
    pub fn search_query(&self) -> String {
        format!(
            "cat:{} AND submittedDate:[{} TO {}]",
            self.category,
            self.window.compact_start(),
            self.window.compact_end()
        )
    }

    pub fn url(&self, api_url: &str) -> Result<Url, AdapterError> {
        let search_query = self.search_query();
        let max_results = MAX_RESULTS.to_string();
        Url::parse_with_params(
            api_url,
            &[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", "submittedDate"),
                ("sortOrder", "descending"),
            ],
        )
        .map_err(|e| AdapterError::Url(format!("{api_url}: {e}")))
    }
}

#[derive(Debug, Clone)]
pub struct ArxivSource {
    http: HttpFetcher,
    api_url: String,
    category: String,
}

impl ArxivSource {
    pub fn new(http: HttpFetcher, api_url: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            http,
            api_url: api_url.into(),
            category: category.into(),
        }
    }
}

#[async_trait]
impl PaperSource for ArxivSource {
    fn source_id(&self) -> &'static str {
        "arxiv"
    }

    async fn fetch_window(&self, window: &IngestionWindow) -> Result<Vec<PaperDraft>, AdapterError> {
        let query = ArxivQuery {
            category: self.category.clone(),
            window: *window,
        };
        let url = query.url(&self.api_url)?;
        info!(search_query = %query.search_query(), "querying arxiv");
        let resp = self.http.fetch_bytes(url.as_str()).await?;
        let body = String::from_utf8(resp.body)?;
        Ok(parse_feed(&body)?)
    }
}

/// Serves a fixed feed document regardless of the window. Used for fixtures and dry runs.
#[derive(Debug, Clone)]
pub struct StaticFeedSource {
    xml: String,
}

impl StaticFeedSource {
    pub fn new(xml: impl Into<String>) -> Self {
        Self { xml: xml.into() }
    }
}

#[async_trait]
impl PaperSource for StaticFeedSource {
    fn source_id(&self) -> &'static str {
        "static-feed"
    }

    async fn fetch_window(&self, _window: &IngestionWindow) -> Result<Vec<PaperDraft>, AdapterError> {
        Ok(parse_feed(&self.xml)?)
    }
}
