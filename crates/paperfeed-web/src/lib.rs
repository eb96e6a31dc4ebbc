//! Axum HTTP surface for the paper feed: ingest trigger, translation webhook,
//! paper list and per-paper user state.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::{header, HeaderMap},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use paperfeed_adapters::{PaperSource, Translator};
use paperfeed_core::Paper;
use paperfeed_storage::{PaperSession, PaperStore, StoreError};
use paperfeed_sync::{ChangeEvent, HookOutcome, IngestPipeline, TranslationHook, INSERT_EVENT};
use serde::{Deserialize, Deserializer, Serialize};
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

mod error;

pub use error::{ApiError, ApiResult, ErrorBody};

pub const CRATE_NAME: &str = "paperfeed-web";

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn PaperStore>,
    pipeline: IngestPipeline,
    hook: Option<TranslationHook>,
    cron_secret: String,
}

impl AppState {
    pub fn new(
        store: Arc<dyn PaperStore>,
        source: Arc<dyn PaperSource>,
        translator: Option<Arc<dyn Translator>>,
        cron_secret: impl Into<String>,
    ) -> Self {
        Self {
            pipeline: IngestPipeline::new(source, Arc::clone(&store)),
            hook: translator.map(|t| TranslationHook::new(t, Arc::clone(&store))),
            store,
            cron_secret: cron_secret.into(),
        }
    }

    pub fn pipeline(&self) -> &IngestPipeline {
        &self.pipeline
    }
}

/// `{ success, message }` plus run counts for the ingest trigger.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicates: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
}

impl JobResponse {
    fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            run_id: None,
            created: None,
            attempted: None,
            duplicates: None,
            failed: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct FavoriteBody {
    pub state: bool,
}

/// `memo` is `None` when the field is absent and `Some(None)` for an explicit `null`.
#[derive(Debug, Deserialize)]
pub struct MemoBody {
    #[serde(default, deserialize_with = "present")]
    pub memo: Option<Option<String>>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct ReadBody {
    #[serde(rename = "isRead")]
    pub is_read: bool,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/cron/papers", get(trigger_ingest_handler))
        .route("/translate", post(translate_handler))
        .route("/papers", get(list_papers_handler))
        .route("/papers/{id}/favorite", patch(favorite_handler))
        .route("/papers/{id}/memo", patch(memo_handler))
        .route("/papers/{id}/read", patch(read_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("binding port {port}"))?;
    info!(port, "paperfeed web listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn healthz_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn authorize(headers: &HeaderMap, secret: &str) -> ApiResult<()> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.as_bytes().strip_prefix(b"Bearer "));
    match token {
        Some(token) if !secret.is_empty() && bool::from(token.ct_eq(secret.as_bytes())) => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

async fn trigger_ingest_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<JobResponse>> {
    authorize(&headers, &state.cron_secret)?;
    let summary = state.pipeline.run_once(Utc::now()).await?;
    Ok(Json(JobResponse {
        success: true,
        message: summary.message(),
        run_id: Some(summary.run_id),
        created: Some(summary.created),
        attempted: Some(summary.attempted),
        duplicates: Some(summary.duplicates),
        failed: Some(summary.failed),
    }))
}

async fn translate_handler(
    State(state): State<Arc<AppState>>,
    event: Result<Json<ChangeEvent>, JsonRejection>,
) -> ApiResult<Json<JobResponse>> {
    let Json(event) = event?;
    let Some(hook) = state.hook.as_ref() else {
        if event.event_type != INSERT_EVENT {
            return Ok(Json(JobResponse::message("Ignored non-insert event")));
        }
        return Err(ApiError::TranslationUnavailable);
    };
    match hook.handle(event).await? {
        HookOutcome::Ignored { .. } => Ok(Json(JobResponse::message("Ignored non-insert event"))),
        HookOutcome::Translated(_) => Ok(Json(JobResponse::message("Translation completed"))),
    }
}

async fn list_papers_handler(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Paper>>> {
    let mut session = state.store.open_session().await.map_err(ApiError::List)?;
    let papers = session.list_papers().await.map_err(ApiError::List)?;
    Ok(Json(papers))
}

/// One single-field user-state change.
#[derive(Debug, Clone, PartialEq, Eq)]
enum UserStateUpdate {
    Favorite(bool),
    Memo(Option<String>),
    Read(bool),
}

impl UserStateUpdate {
    fn field(&self) -> &'static str {
        match self {
            Self::Favorite(_) => "favorite state",
            Self::Memo(_) => "memo",
            Self::Read(_) => "read state",
        }
    }

    async fn apply(self, session: &mut dyn PaperSession, id: Uuid) -> Result<Paper, StoreError> {
        match self {
            Self::Favorite(state) => session.set_favorite(id, state).await,
            Self::Memo(memo) => session.set_memo(id, memo.as_deref()).await,
            Self::Read(is_read) => session.set_read(id, is_read).await,
        }
    }
}

async fn update_paper(state: &AppState, id: Uuid, update: UserStateUpdate) -> ApiResult<Json<Paper>> {
    let field = update.field();
    let to_api = |source| ApiError::Update { field, source };
    let mut session = state.store.open_session().await.map_err(to_api)?;
    let paper = update.apply(session.as_mut(), id).await.map_err(to_api)?;
    info!(paper_id = %id, field, "user state updated");
    Ok(Json(paper))
}

async fn favorite_handler(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<FavoriteBody>, JsonRejection>,
) -> ApiResult<Json<Paper>> {
    let (Path(id), Json(body)) = (id?, body?);
    update_paper(&state, id, UserStateUpdate::Favorite(body.state)).await
}

async fn memo_handler(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<MemoBody>, JsonRejection>,
) -> ApiResult<Json<Paper>> {
    let (Path(id), Json(body)) = (id?, body?);
    let memo = body.memo.ok_or_else(|| ApiError::missing_field("memo"))?;
    update_paper(&state, id, UserStateUpdate::Memo(memo)).await
}

async fn read_handler(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
    body: Result<Json<ReadBody>, JsonRejection>,
) -> ApiResult<Json<Paper>> {
    let (Path(id), Json(body)) = (id?, body?);
    update_paper(&state, id, UserStateUpdate::Read(body.is_read)).await
}
