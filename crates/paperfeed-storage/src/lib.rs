//! Paper persistence + HTTP fetch utilities for the paper feed.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use paperfeed_core::{Paper, PaperDraft};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{info_span, Instrument};
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemoryPaperStore;
pub use postgres::{PgPaperStore, MIGRATOR};

pub const CRATE_NAME: &str = "paperfeed-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("paper not found: {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a single insert attempt. A natural-key collision is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(Paper),
    Duplicate,
}

/// Hands out request-scoped sessions. Implementations must not keep a
/// session alive beyond the value returned here.
#[async_trait]
pub trait PaperStore: Send + Sync {
    async fn open_session(&self) -> StoreResult<Box<dyn PaperSession>>;
}

/// One acquired storage handle. Dropping it releases the underlying connection.
#[async_trait]
pub trait PaperSession: Send {
    async fn insert_paper(&mut self, draft: &PaperDraft) -> StoreResult<InsertOutcome>;

    /// All papers, newest publication first.
    async fn list_papers(&mut self) -> StoreResult<Vec<Paper>>;

    /// Writes both translated fields in one statement.
    async fn update_translation(
        &mut self,
        id: Uuid,
        title_ja: &str,
        abstract_ja: &str,
    ) -> StoreResult<Paper>;

    async fn set_favorite(&mut self, id: Uuid, favorite: bool) -> StoreResult<Paper>;

    async fn set_memo(&mut self, id: Uuid, memo: Option<&str>) -> StoreResult<Paper>;

    async fn set_read(&mut self, id: Uuid, is_read: bool) -> StoreResult<Paper>;
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

/// Shared HTTP client. Each call is a single attempt; re-running is the caller's business.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().gzip(true).timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    pub async fn fetch_bytes(&self, url: &str) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", url);
        async {
            let resp = self.client.get(url).send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();

            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }

            let body = resp.bytes().await?.to_vec();
            tracing::debug!(bytes = body.len(), "fetched");
            Ok(FetchedResponse {
                status,
                final_url,
                body,
            })
        }
        .instrument(span)
        .await
    }
}
