//! In-process backend with the same uniqueness and update semantics as Postgres.
//!
//! Used by tests and `serve --memory` dry runs. Besides the papers themselves it
//! tracks how many writes were issued and how many sessions are still open, and
//! can be told to fail inserts for specific natural keys.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use paperfeed_core::{Paper, PaperDraft};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{InsertOutcome, PaperSession, PaperStore, StoreError, StoreResult};

#[derive(Debug, Default)]
struct MemoryState {
    papers: Vec<Paper>,
    writes: usize,
    failing_keys: HashSet<String>,
    unavailable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryPaperStore {
    state: Arc<Mutex<MemoryState>>,
    open_sessions: Arc<AtomicUsize>,
}

impl MemoryPaperStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every insert of `arxiv_id` fail with a backend error.
    pub async fn fail_inserts_for(&self, arxiv_id: &str) {
        self.state.lock().await.failing_keys.insert(arxiv_id.to_string());
    }

    /// Make `open_session` fail, as an unreachable database would.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().await.unavailable = unavailable;
    }

    pub async fn write_count(&self) -> usize {
        self.state.lock().await.writes
    }

    pub async fn paper_count(&self) -> usize {
        self.state.lock().await.papers.len()
    }

    pub async fn find_by_arxiv_id(&self, arxiv_id: &str) -> Option<Paper> {
        self.state
            .lock()
            .await
            .papers
            .iter()
            .find(|p| p.arxiv_id == arxiv_id)
            .cloned()
    }

    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaperStore for MemoryPaperStore {
    async fn open_session(&self) -> StoreResult<Box<dyn PaperSession>> {
        if self.state.lock().await.unavailable {
            return Err(StoreError::Backend("memory store marked unavailable".into()));
        }
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            state: Arc::clone(&self.state),
            open_sessions: Arc::clone(&self.open_sessions),
        }))
    }
}

struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    open_sessions: Arc<AtomicUsize>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemorySession {
    async fn update_with<F>(&self, id: Uuid, apply: F) -> StoreResult<Paper>
    where
        F: FnOnce(&mut Paper) + Send,
    {
        let mut state = self.state.lock().await;
        let index = state
            .papers
            .iter()
            .position(|p| p.id == id)
            .ok_or(StoreError::NotFound(id))?;
        state.writes += 1;
        let paper = &mut state.papers[index];
        apply(paper);
        paper.updated_at = Utc::now();
        Ok(paper.clone())
    }
}

#[async_trait]
impl PaperSession for MemorySession {
    async fn insert_paper(&mut self, draft: &PaperDraft) -> StoreResult<InsertOutcome> {
        let mut state = self.state.lock().await;
        state.writes += 1;
        if state.failing_keys.contains(&draft.arxiv_id) {
            return Err(StoreError::Backend(format!(
                "injected insert failure for {}",
                draft.arxiv_id
            )));
        }
        if state.papers.iter().any(|p| p.arxiv_id == draft.arxiv_id) {
            return Ok(InsertOutcome::Duplicate);
        }
        let paper = Paper::from_draft(Uuid::new_v4(), draft, Utc::now());
        state.papers.push(paper.clone());
        Ok(InsertOutcome::Created(paper))
    }

    async fn list_papers(&mut self) -> StoreResult<Vec<Paper>> {
        let mut papers = self.state.lock().await.papers.clone();
        papers.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(papers)
    }

    async fn update_translation(
        &mut self,
        id: Uuid,
        title_ja: &str,
        abstract_ja: &str,
    ) -> StoreResult<Paper> {
        let (title_ja, abstract_ja) = (title_ja.to_string(), abstract_ja.to_string());
        self.update_with(id, move |p| {
            p.title_ja = Some(title_ja);
            p.abstract_ja = Some(abstract_ja);
        })
        .await
    }

    async fn set_favorite(&mut self, id: Uuid, favorite: bool) -> StoreResult<Paper> {
        self.update_with(id, move |p| p.favorite = favorite).await
    }

    async fn set_memo(&mut self, id: Uuid, memo: Option<&str>) -> StoreResult<Paper> {
        let memo = memo.map(ToString::to_string);
        self.update_with(id, move |p| p.memo = memo).await
    }

    async fn set_read(&mut self, id: Uuid, is_read: bool) -> StoreResult<Paper> {
        self.update_with(id, move |p| p.is_read = is_read).await
    }
}
