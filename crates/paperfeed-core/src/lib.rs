//! Core domain model for the paper feed.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "paperfeed-core";

/// Parsed handoff contract from source adapters into the ingestion pipeline.
///
/// Carries only what the upstream feed knows about a paper; user state and
/// bookkeeping timestamps are owned by storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperDraft {
    pub arxiv_id: String,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub published_at: DateTime<Utc>,
    pub pdf_url: String,
    pub journal_ref: Option<String>,
}

/// Canonical persisted paper, serialised in the camelCase shape the reader UI consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    pub id: Uuid,
    pub arxiv_id: String,
    pub title: String,
    pub title_ja: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub abstract_ja: Option<String>,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub published_at: DateTime<Utc>,
    pub pdf_url: String,
    pub journal_ref: Option<String>,
    pub favorite: bool,
    pub memo: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Paper {
    /// Fresh record as ingestion creates it: untranslated, unread, not favorited.
    pub fn from_draft(id: Uuid, draft: &PaperDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            arxiv_id: draft.arxiv_id.clone(),
            title: draft.title.clone(),
            title_ja: None,
            abstract_text: draft.abstract_text.clone(),
            abstract_ja: None,
            authors: draft.authors.clone(),
            categories: draft.categories.clone(),
            published_at: draft.published_at,
            pdf_url: draft.pdf_url.clone(),
            journal_ref: draft.journal_ref.clone(),
            favorite: false,
            memo: None,
            is_read: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_translated(&self) -> bool {
        self.title_ja.is_some() && self.abstract_ja.is_some()
    }
}

/// The UTC calendar day an ingestion run asks the upstream search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl IngestionWindow {
    /// The full UTC day before `now`: 00:00:00.000 through 23:59:59.999.
    pub fn previous_utc_day(now: DateTime<Utc>) -> Self {
        let day = now.date_naive() - Duration::days(1);
        let start = day.and_time(NaiveTime::MIN).and_utc();
        let end = start + Duration::days(1) - Duration::milliseconds(1);
        Self { start, end }
    }

    /// Compact `YYYYMMDDHHmm` form used by the upstream date-range filter.
    pub fn compact_start(&self) -> String {
        self.start.format("%Y%m%d%H%M").to_string()
    }

    pub fn compact_end(&self) -> String {
        self.end.format("%Y%m%d%H%M").to_string()
    }
}

/// Collapse a raw journal-reference value to `Some(text)` only when it carries text.
pub fn normalize_journal_ref(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draft() -> PaperDraft {
        PaperDraft {
            arxiv_id: "2401.00001v1".into(),
            title: "Attention Is Still All You Need".into(),
            abstract_text: "We revisit attention.".into(),
            authors: vec!["A. Author".into(), "B. Author".into()],
            categories: vec!["cs.AI".into(), "cs.LG".into()],
            published_at: Utc.with_ymd_and_hms(2024, 1, 1, 18, 0, 0).single().unwrap(),
            pdf_url: "http://arxiv.org/pdf/2401.00001v1".into(),
            journal_ref: None,
        }
    }

    #[test]
    fn new_paper_starts_untranslated_unread_and_unfavorited() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 1, 0, 0).single().unwrap();
        let paper = Paper::from_draft(Uuid::new_v4(), &draft(), now);
        assert!(!paper.favorite);
        assert!(!paper.is_read);
        assert!(!paper.is_translated());
        assert_eq!(paper.memo, None);
        assert_eq!(paper.created_at, now);
        assert_eq!(paper.updated_at, now);
    }

    #[test]
    fn paper_serialises_with_reader_field_names() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 1, 0, 0).single().unwrap();
        let paper = Paper::from_draft(Uuid::nil(), &draft(), now);
        let value = serde_json::to_value(&paper).unwrap();
        assert_eq!(value["arxivId"], "2401.00001v1");
        assert_eq!(value["abstract"], "We revisit attention.");
        assert!(value["titleJa"].is_null());
        assert_eq!(value["isRead"], false);
        assert!(value.get("abstract_text").is_none());
    }

    #[test]
    fn window_is_the_previous_utc_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 5, 0, 10, 0).single().unwrap();
        let window = IngestionWindow::previous_utc_day(now);
        assert_eq!(window.start.to_rfc3339(), "2024-03-04T00:00:00+00:00");
        assert_eq!(
            window.end,
            Utc.with_ymd_and_hms(2024, 3, 4, 23, 59, 59).single().unwrap()
                + Duration::milliseconds(999)
        );
        assert_eq!(window.compact_start(), "202403040000");
        assert_eq!(window.compact_end(), "202403042359");
    }

    #[test]
    fn window_crosses_month_and_year_boundaries() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 23, 59, 0).single().unwrap();
        let window = IngestionWindow::previous_utc_day(now);
        assert_eq!(window.compact_start(), "202412310000");
        assert_eq!(window.compact_end(), "202412312359");

        let leap = Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).single().unwrap();
        assert_eq!(IngestionWindow::previous_utc_day(leap).compact_start(), "202402290000");
    }

    #[test]
    fn journal_ref_blank_values_collapse_to_none() {
        assert_eq!(normalize_journal_ref(None), None);
        assert_eq!(normalize_journal_ref(Some("   ".into())), None);
        assert_eq!(
            normalize_journal_ref(Some(" NeurIPS 2023 ".into())),
            Some("NeurIPS 2023".to_string())
        );
    }
}
