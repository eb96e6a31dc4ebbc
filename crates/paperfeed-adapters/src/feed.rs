//! Atom feed parsing for the arXiv search API.
//!
//! The feed is decoded once, at this boundary, into [`PaperDraft`]s. Anything
//! the pipeline needs normalised (natural key, PDF link, journal reference,
//! whitespace) is settled here.

use chrono::{DateTime, Utc};
use paperfeed_core::{normalize_journal_ref, PaperDraft};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("xml error at byte {position}: {message}")]
    Xml { position: u64, message: String },
    #[error("malformed feed: {0}")]
    Malformed(String),
    #[error("search api returned an error: {0}")]
    Api(String),
}

/// Shape the `arxiv:journal_ref` element took in one entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum JournalRefShape {
    #[default]
    Absent,
    Empty,
    Text(String),
    /// Element carried child markup instead of plain text.
    Structured,
}

impl JournalRefShape {
    fn into_option(self) -> Option<String> {
        match self {
            Self::Text(text) => normalize_journal_ref(Some(text)),
            Self::Absent | Self::Empty | Self::Structured => None,
        }
    }
}

#[derive(Debug, Default)]
struct RawEntry {
    id: Option<String>,
    title: Option<String>,
    summary: Option<String>,
    published: Option<String>,
    authors: Vec<String>,
    categories: Vec<String>,
    journal_ref: JournalRefShape,
}

impl RawEntry {
    fn into_draft(self) -> Result<PaperDraft, FeedError> {
        let id = self
            .id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FeedError::Malformed("entry without <id>".into()))?;

        if id.contains("/api/errors") {
            return Err(FeedError::Api(collapse_whitespace(
                self.summary.as_deref().unwrap_or(&id),
            )));
        }

        let arxiv_id = natural_key(&id)
            .ok_or_else(|| FeedError::Malformed(format!("cannot derive natural key from {id}")))?;

        let published = self
            .published
            .ok_or_else(|| FeedError::Malformed(format!("entry {arxiv_id} has no <published>")))?;
        let published_at = DateTime::parse_from_rfc3339(published.trim())
            .map_err(|e| {
                FeedError::Malformed(format!("entry {arxiv_id} published={published:?}: {e}"))
            })?
            .with_timezone(&Utc);

        Ok(PaperDraft {
            pdf_url: derive_pdf_url(&id),
            arxiv_id,
            title: collapse_whitespace(self.title.as_deref().unwrap_or_default()),
            abstract_text: collapse_whitespace(self.summary.as_deref().unwrap_or_default()),
            authors: self.authors.into_iter().map(|a| collapse_whitespace(&a)).collect(),
            categories: self.categories,
            published_at,
            journal_ref: self.journal_ref.into_option(),
        })
    }
}

/// Last path segment of an entry identifier URL.
pub fn natural_key(id_url: &str) -> Option<String> {
    id_url
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && !s.contains(':'))
        .map(ToString::to_string)
}

/// The identifier URL with its `abs` path segment swapped for `pdf`.
pub fn derive_pdf_url(id_url: &str) -> String {
    id_url.trim().replacen("/abs/", "/pdf/", 1)
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn local_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn term_attribute(element: &BytesStart<'_>) -> Result<Option<String>, FeedError> {
    let attr = element
        .try_get_attribute("term")
        .map_err(|e| FeedError::Malformed(format!("bad category attribute: {e}")))?;
    match attr {
        Some(attr) => {
            let value = attr
                .unescape_value()
                .map_err(|e| FeedError::Malformed(format!("bad category term: {e}")))?;
            Ok(Some(value.trim().to_string()).filter(|s| !s.is_empty()))
        }
        None => Ok(None),
    }
}

/// Decode a search response into drafts, in feed order.
pub fn parse_feed(xml: &str) -> Result<Vec<PaperDraft>, FeedError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut drafts = Vec::new();
    let mut saw_feed = false;
    let mut current: Option<RawEntry> = None;
    // Element names open below the current <entry>.
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();

    loop {
        let event = reader.read_event().map_err(|e| FeedError::Xml {
            position: reader.buffer_position() as u64,
            message: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                let name = local_name(e.local_name().as_ref());
                text.clear();
                if name == "feed" && current.is_none() {
                    saw_feed = true;
                } else if name == "entry" && current.is_none() {
                    current = Some(RawEntry::default());
                    path.clear();
                } else if let Some(entry) = current.as_mut() {
                    if path.last().map(String::as_str) == Some("journal_ref") {
                        entry.journal_ref = JournalRefShape::Structured;
                    }
                    if name == "category" && path.is_empty() {
                        entry.categories.extend(term_attribute(&e)?);
                    }
                    path.push(name);
                }
            }
            Event::Empty(e) => {
                let Some(entry) = current.as_mut() else {
                    continue;
                };
                let name = local_name(e.local_name().as_ref());
                match (name.as_str(), path.last().map(String::as_str)) {
                    (_, Some("journal_ref")) => entry.journal_ref = JournalRefShape::Structured,
                    ("category", None) => entry.categories.extend(term_attribute(&e)?),
                    ("journal_ref", None) => entry.journal_ref = JournalRefShape::Empty,
                    _ => {}
                }
            }
            Event::Text(t) => {
                if current.is_some() {
                    let chunk = t.unescape().map_err(|e| FeedError::Xml {
                        position: reader.buffer_position() as u64,
                        message: e.to_string(),
                    })?;
                    text.push_str(&chunk);
                }
            }
            Event::CData(c) => {
                if current.is_some() {
                    text.push_str(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(e) => {
                let name = local_name(e.local_name().as_ref());
                if name == "entry" && path.is_empty() {
                    if let Some(raw) = current.take() {
                        drafts.push(raw.into_draft()?);
                    }
                    continue;
                }
                let Some(entry) = current.as_mut() else {
                    continue;
                };
                path.pop();
                let value = std::mem::take(&mut text);
                match (name.as_str(), path.last().map(String::as_str)) {
                    ("id", None) => entry.id = Some(value),
                    ("title", None) => entry.title = Some(value),
                    ("summary", None) => entry.summary = Some(value),
                    ("published", None) => entry.published = Some(value),
                    ("name", Some("author")) => entry.authors.push(value),
                    ("journal_ref", None) => {
                        if entry.journal_ref != JournalRefShape::Structured {
                            entry.journal_ref = if value.trim().is_empty() {
                                JournalRefShape::Empty
                            } else {
                                JournalRefShape::Text(value)
                            };
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_feed {
        return Err(FeedError::Malformed("missing <feed> root element".into()));
    }
    if current.is_some() {
        return Err(FeedError::Malformed("feed ended inside an <entry>".into()));
    }
    Ok(drafts)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_FEED: &str = include_str!("../../../fixtures/arxiv/sample_feed.xml");
    const EMPTY_FEED: &str = include_str!("../../../fixtures/arxiv/empty_feed.xml");

    fn wrap(entry_body: &str) -> String {
        format!(
            r#"<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
<entry>
  <id>http://arxiv.org/abs/2402.99999v1</id>
  <published>2024-02-29T10:00:00Z</published>
  <title>T</title>
  <summary>S</summary>
  {entry_body}
</entry>
</feed>"#
        )
    }

    #[test]
    fn sample_feed_decodes_every_entry_in_order() {
        let drafts = parse_feed(SAMPLE_FEED).unwrap();
        let ids = drafts.iter().map(|d| d.arxiv_id.as_str()).collect::<Vec<_>>();
        assert_eq!(
            ids,
            vec!["2403.01234v1", "2403.01111v2", "2403.00999v1", "2403.00042v1"]
        );

        let first = &drafts[0];
        assert_eq!(first.title, "Planning with Language Models: A Survey & Benchmark");
        assert_eq!(
            first.abstract_text,
            "We survey planning methods built on large language models. Our benchmark covers 12 domains."
        );
        assert_eq!(first.authors, vec!["Alice Zhang", "Bob Okafor"]);
        assert_eq!(first.categories, vec!["cs.AI", "cs.CL"]);
        assert_eq!(first.pdf_url, "http://arxiv.org/pdf/2403.01234v1");
        assert_eq!(first.published_at.to_rfc3339(), "2024-03-04T17:59:01+00:00");
        assert_eq!(first.journal_ref.as_deref(), Some("Proc. AAAI 2024, pp. 1-14"));

        assert_eq!(drafts[3].authors.len(), 3);
    }

    #[test]
    fn journal_ref_that_is_structured_empty_or_absent_is_none() {
        let drafts = parse_feed(SAMPLE_FEED).unwrap();
        assert_eq!(drafts[1].journal_ref, None, "nested markup");
        assert_eq!(drafts[2].journal_ref, None, "empty element");
        assert_eq!(drafts[3].journal_ref, None, "absent element");
    }

    #[test]
    fn whitespace_only_journal_ref_is_none() {
        let xml = wrap("<arxiv:journal_ref>   \n  </arxiv:journal_ref>");
        let drafts = parse_feed(&xml).unwrap();
        assert_eq!(drafts[0].journal_ref, None);
    }

    #[test]
    fn empty_feed_yields_no_drafts() {
        assert!(parse_feed(EMPTY_FEED).unwrap().is_empty());
    }

    #[test]
    fn natural_key_and_pdf_url_come_from_the_identifier() {
        assert_eq!(
            natural_key("https://example.org/abs/1234.5678").as_deref(),
            Some("1234.5678")
        );
        assert_eq!(
            derive_pdf_url("https://example.org/abs/1234.5678"),
            "https://example.org/pdf/1234.5678"
        );
        assert_eq!(natural_key("http://arxiv.org/abs/2403.01234v1/").as_deref(), Some("2403.01234v1"));
        assert_eq!(natural_key("urn:"), None);
    }

    #[test]
    fn pdf_url_only_swaps_the_path_segment() {
        assert_eq!(
            derive_pdf_url("http://abstracts.example.org/abs/abs-1"),
            "http://abstracts.example.org/pdf/abs-1"
        );
    }

    #[test]
    fn api_error_entry_is_reported() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom">
<entry>
  <id>http://arxiv.org/api/errors#incorrect_id_format_for_1234.12345</id>
  <title>Error</title>
  <summary>incorrect id format for 1234.12345</summary>
</entry>
</feed>"#;
        let err = parse_feed(xml).unwrap_err();
        assert!(matches!(err, FeedError::Api(msg) if msg.contains("incorrect id format")));
    }

    #[test]
    fn truncated_or_foreign_documents_are_rejected() {
        assert!(parse_feed("<html><body>rate limited</body></html>").is_err());
        assert!(parse_feed("<feed><entry><id>http://arxiv.org/abs/1</id>").is_err());
        assert!(parse_feed("not xml at all").is_err());
    }

    #[test]
    fn entry_without_identifier_is_malformed() {
        let xml = r#"<feed><entry><title>x</title><published>2024-01-01T00:00:00Z</published></entry></feed>"#;
        assert!(matches!(parse_feed(xml), Err(FeedError::Malformed(_))));
    }
}
