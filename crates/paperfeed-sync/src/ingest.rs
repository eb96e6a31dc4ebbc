//! Daily ingestion: fetch yesterday's submissions, insert each one independently.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use paperfeed_adapters::{AdapterError, PaperSource};
use paperfeed_core::{IngestionWindow, PaperDraft};
use paperfeed_storage::{InsertOutcome, PaperStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("upstream fetch failed: {0}")]
    Upstream(#[from] AdapterError),
    #[error("storage unavailable: {0}")]
    Storage(#[from] StoreError),
}

/// What happened to one parsed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Created { id: Uuid },
    Duplicate,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordReport {
    pub arxiv_id: String,
    #[serde(flatten)]
    pub outcome: RecordOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub run_id: Uuid,
    pub window: IngestionWindow,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub attempted: usize,
    pub created: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub records: Vec<RecordReport>,
}

impl IngestSummary {
    fn from_records(
        run_id: Uuid,
        window: IngestionWindow,
        started_at: DateTime<Utc>,
        records: Vec<RecordReport>,
    ) -> Self {
        let count = |pred: fn(&RecordOutcome) -> bool| records.iter().filter(|r| pred(&r.outcome)).count();
        Self {
            run_id,
            window,
            started_at,
            finished_at: Utc::now(),
            attempted: records.len(),
            created: count(|o| matches!(o, RecordOutcome::Created { .. })),
            duplicates: count(|o| matches!(o, RecordOutcome::Duplicate)),
            failed: count(|o| matches!(o, RecordOutcome::Failed { .. })),
            records,
        }
    }

    pub fn message(&self) -> String {
        if self.attempted == 0 {
            "No papers found".to_string()
        } else {
            format!("Created {} of {} papers", self.created, self.attempted)
        }
    }
}

#[derive(Clone)]
pub struct IngestPipeline {
    source: Arc<dyn PaperSource>,
    store: Arc<dyn PaperStore>,
}

impl IngestPipeline {
    pub fn new(source: Arc<dyn PaperSource>, store: Arc<dyn PaperStore>) -> Self {
        Self { source, store }
    }

    /// One run over the UTC day before `now`. Upstream and session-acquisition
    /// failures end the run; individual insert failures do not.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<IngestSummary, IngestError> {
        let run_id = Uuid::new_v4();
        let window = IngestionWindow::previous_utc_day(now);
        let span = info_span!("ingest_run", %run_id, source = self.source.source_id());

        async move {
            let drafts = match self.source.fetch_window(&window).await {
                Ok(drafts) => drafts,
                Err(err) => {
                    error!(error = %err, "fetching papers failed");
                    return Err(err.into());
                }
            };

            if drafts.is_empty() {
                info!(
                    from = %window.compact_start(),
                    to = %window.compact_end(),
                    "no papers found"
                );
                return Ok(IngestSummary::from_records(run_id, window, now, Vec::new()));
            }

            let records = self.persist_all(&drafts).await?;
            let summary = IngestSummary::from_records(run_id, window, now, records);
            info!(
                attempted = summary.attempted,
                created = summary.created,
                duplicates = summary.duplicates,
                failed = summary.failed,
                "ingest run finished"
            );
            Ok(summary)
        }
        .instrument(span)
        .await
    }

    async fn persist_all(&self, drafts: &[PaperDraft]) -> Result<Vec<RecordReport>, IngestError> {
        // Released when this function returns.
        let mut session = self.store.open_session().await?;
        let mut records = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let outcome = match session.insert_paper(draft).await {
                Ok(InsertOutcome::Created(paper)) => RecordOutcome::Created { id: paper.id },
                Ok(InsertOutcome::Duplicate) => {
                    info!(arxiv_id = %draft.arxiv_id, "already ingested, skipping");
                    RecordOutcome::Duplicate
                }
                Err(err) => {
                    warn!(arxiv_id = %draft.arxiv_id, error = %err, "insert failed, continuing");
                    RecordOutcome::Failed {
                        reason: err.to_string(),
                    }
                }
            };
            records.push(RecordReport {
                arxiv_id: draft.arxiv_id.clone(),
                outcome,
            });
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use paperfeed_adapters::StaticFeedSource;
    use paperfeed_storage::MemoryPaperStore;
    use tokio::sync::Mutex;

    const SAMPLE_FEED: &str = include_str!("../../../fixtures/arxiv/sample_feed.xml");
    const EMPTY_FEED: &str = include_str!("../../../fixtures/arxiv/empty_feed.xml");

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 1, 0, 0).single().unwrap()
    }

    fn pipeline(xml: &str, store: &MemoryPaperStore) -> IngestPipeline {
        IngestPipeline::new(
            Arc::new(StaticFeedSource::new(xml)),
            Arc::new(store.clone()),
        )
    }

    #[derive(Default)]
    struct RecordingSource {
        seen: Mutex<Vec<IngestionWindow>>,
    }

    #[async_trait]
    impl PaperSource for RecordingSource {
        fn source_id(&self) -> &'static str {
            "recording"
        }

        async fn fetch_window(&self, window: &IngestionWindow) -> Result<Vec<PaperDraft>, AdapterError> {
            self.seen.lock().await.push(*window);
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn empty_feed_succeeds_without_touching_storage() {
        let store = MemoryPaperStore::new();
        let summary = pipeline(EMPTY_FEED, &store).run_once(now()).await.unwrap();

        assert_eq!(summary.attempted, 0);
        assert_eq!(summary.message(), "No papers found");
        assert_eq!(store.write_count().await, 0);
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn source_is_asked_for_the_previous_utc_day() {
        let source = Arc::new(RecordingSource::default());
        let pipeline = IngestPipeline::new(source.clone(), Arc::new(MemoryPaperStore::new()));
        let summary = pipeline.run_once(now()).await.unwrap();

        let seen = source.seen.lock().await.clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].compact_start(), "202403040000");
        assert_eq!(seen[0].compact_end(), "202403042359");
        assert_eq!(summary.window, seen[0]);
    }

    #[tokio::test]
    async fn fresh_feed_creates_every_record() {
        let store = MemoryPaperStore::new();
        let summary = pipeline(SAMPLE_FEED, &store).run_once(now()).await.unwrap();

        assert_eq!(summary.attempted, 4);
        assert_eq!(summary.created, 4);
        assert_eq!(summary.duplicates, 0);
        assert_eq!(summary.message(), "Created 4 of 4 papers");
        assert_eq!(store.paper_count().await, 4);
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn rerun_is_idempotent_and_keeps_creation_time() {
        let store = MemoryPaperStore::new();
        let pipeline = pipeline(SAMPLE_FEED, &store);
        pipeline.run_once(now()).await.unwrap();
        let before = store.find_by_arxiv_id("2403.01234v1").await.unwrap();

        let summary = pipeline.run_once(now()).await.unwrap();
        assert_eq!(summary.created, 0);
        assert_eq!(summary.duplicates, 4);
        assert_eq!(summary.failed, 0);
        assert_eq!(store.paper_count().await, 4);

        let after = store.find_by_arxiv_id("2403.01234v1").await.unwrap();
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.id, before.id);
    }

    #[tokio::test]
    async fn single_collision_reports_n_minus_one_created() {
        let store = MemoryPaperStore::new();
        let drafts = paperfeed_adapters::parse_feed(SAMPLE_FEED).unwrap();
        {
            let mut session = store.open_session().await.unwrap();
            session.insert_paper(&drafts[2]).await.unwrap();
        }

        let summary = pipeline(SAMPLE_FEED, &store).run_once(now()).await.unwrap();
        assert_eq!(summary.attempted, 4);
        assert_eq!(summary.created, 3);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(
            summary.records[2],
            RecordReport {
                arxiv_id: drafts[2].arxiv_id.clone(),
                outcome: RecordOutcome::Duplicate,
            }
        );
    }

    #[tokio::test]
    async fn one_failed_insert_does_not_stop_the_rest() {
        let store = MemoryPaperStore::new();
        store.fail_inserts_for("2403.01111v2").await;

        let summary = pipeline(SAMPLE_FEED, &store).run_once(now()).await.unwrap();
        assert_eq!(summary.created, 3);
        assert_eq!(summary.failed, 1);
        assert!(matches!(summary.records[1].outcome, RecordOutcome::Failed { .. }));
        assert!(store.find_by_arxiv_id("2403.00042v1").await.is_some());
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn malformed_feed_is_an_upstream_failure_with_no_writes() {
        let store = MemoryPaperStore::new();
        let err = pipeline("<html>Service Unavailable</html>", &store)
            .run_once(now())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Upstream(_)));
        assert_eq!(store.write_count().await, 0);
        assert_eq!(store.open_sessions(), 0);
    }

    #[tokio::test]
    async fn unavailable_storage_fails_the_run() {
        let store = MemoryPaperStore::new();
        store.set_unavailable(true).await;
        let err = pipeline(SAMPLE_FEED, &store).run_once(now()).await.unwrap_err();
        assert!(matches!(err, IngestError::Storage(_)));
        assert_eq!(store.open_sessions(), 0);
    }

    #[test]
    fn record_reports_serialise_flat() {
        let report = RecordReport {
            arxiv_id: "2403.00001".into(),
            outcome: RecordOutcome::Failed {
                reason: "boom".into(),
            },
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["arxiv_id"], "2403.00001");
        assert_eq!(value["outcome"], "failed");
        assert_eq!(value["reason"], "boom");
    }
}
