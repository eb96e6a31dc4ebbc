//! Translate a newly inserted paper's title and abstract and store both.

use std::sync::Arc;

use paperfeed_adapters::{TranslateError, Translator};
use paperfeed_core::Paper;
use paperfeed_storage::{PaperStore, StoreError};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

pub const INSERT_EVENT: &str = "INSERT";

/// Row-change notification as delivered by the database webhook.
///
/// Only `INSERT` events carry a record we act on, so the record is decoded
/// lazily and other event types are accepted whatever their payload looks like.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub record: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangedRecord {
    pub id: Uuid,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    Ignored { event_type: String },
    Translated(Paper),
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("event record is missing or malformed: {0}")]
    InvalidRecord(String),
    #[error(transparent)]
    Translation(#[from] TranslateError),
    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Clone)]
pub struct TranslationHook {
    translator: Arc<dyn Translator>,
    store: Arc<dyn PaperStore>,
}

impl TranslationHook {
    pub fn new(translator: Arc<dyn Translator>, store: Arc<dyn PaperStore>) -> Self {
        Self { translator, store }
    }

    /// Both translations must succeed before anything is written; the two
    /// calls run concurrently and the result lands in a single update.
    pub async fn handle(&self, event: ChangeEvent) -> Result<HookOutcome, HookError> {
        if event.event_type != INSERT_EVENT {
            info!(event_type = %event.event_type, "ignoring non-insert event");
            return Ok(HookOutcome::Ignored {
                event_type: event.event_type,
            });
        }

        let record: ChangedRecord = event
            .record
            .ok_or_else(|| HookError::InvalidRecord("insert event without record".into()))
            .and_then(|value| {
                serde_json::from_value(value).map_err(|e| HookError::InvalidRecord(e.to_string()))
            })?;

        let span = info_span!("translate_paper", paper_id = %record.id);
        async move {
            let (title_ja, abstract_ja) = tokio::try_join!(
                self.translator.translate(&record.title),
                self.translator.translate(&record.abstract_text),
            )?;

            let mut session = self.store.open_session().await?;
            let paper = session
                .update_translation(record.id, &title_ja, &abstract_ja)
                .await?;
            info!("stored translation");
            Ok(HookOutcome::Translated(paper))
        }
        .instrument(span)
        .await
    }
}
