//! Postgres backend. Uniqueness of `arxiv_id` is enforced by the table constraint.

use std::time::Duration;

use async_trait::async_trait;
use paperfeed_core::{Paper, PaperDraft};
use sqlx::migrate::Migrator;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row};
use uuid::Uuid;

use crate::{InsertOutcome, PaperSession, PaperStore, StoreError, StoreResult};

pub static MIGRATOR: Migrator = sqlx::migrate!();

const UNIQUE_VIOLATION: &str = "23505";

const PAPER_COLUMNS: &str = "id, arxiv_id, title, title_ja, abstract, abstract_ja, authors, \
     categories, published_at, pdf_url, journal_ref, favorite, memo, is_read, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgPaperStore {
    pool: PgPool,
}

impl PgPaperStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl PaperStore for PgPaperStore {
    async fn open_session(&self) -> StoreResult<Box<dyn PaperSession>> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(PgSession { conn }))
    }
}

struct PgSession {
    conn: PoolConnection<Postgres>,
}

impl PgSession {
    async fn update_returning<'q>(
        &mut self,
        id: Uuid,
        query: sqlx::query::Query<'q, Postgres, sqlx::postgres::PgArguments>,
    ) -> StoreResult<Paper> {
        let row = query.fetch_optional(&mut *self.conn).await?;
        match row {
            Some(row) => paper_from_row(&row),
            None => Err(StoreError::NotFound(id)),
        }
    }
}

#[async_trait]
impl PaperSession for PgSession {
    async fn insert_paper(&mut self, draft: &PaperDraft) -> StoreResult<InsertOutcome> {
        let sql = format!(
            r#"
            INSERT INTO papers
                (id, arxiv_id, title, abstract, authors, categories, published_at, pdf_url, journal_ref)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (arxiv_id) DO NOTHING
            RETURNING {PAPER_COLUMNS}
            "#
        );
        let result = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(&draft.arxiv_id)
            .bind(&draft.title)
            .bind(&draft.abstract_text)
            .bind(&draft.authors[..])
            .bind(&draft.categories[..])
            .bind(draft.published_at)
            .bind(&draft.pdf_url)
            .bind(draft.journal_ref.as_deref())
            .fetch_optional(&mut *self.conn)
            .await;

        match result {
            Ok(Some(row)) => Ok(InsertOutcome::Created(paper_from_row(&row)?)),
            Ok(None) => Ok(InsertOutcome::Duplicate),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list_papers(&mut self) -> StoreResult<Vec<Paper>> {
        let sql = format!(
            "SELECT {PAPER_COLUMNS} FROM papers ORDER BY published_at DESC, created_at DESC"
        );
        let rows = sqlx::query(&sql).fetch_all(&mut *self.conn).await?;
        rows.iter().map(paper_from_row).collect()
    }

    async fn update_translation(
        &mut self,
        id: Uuid,
        title_ja: &str,
        abstract_ja: &str,
    ) -> StoreResult<Paper> {
        let sql = format!(
            r#"
            UPDATE papers
               SET title_ja = $2,
                   abstract_ja = $3,
                   updated_at = NOW()
             WHERE id = $1
            RETURNING {PAPER_COLUMNS}
            "#
        );
        let query = sqlx::query(&sql).bind(id).bind(title_ja).bind(abstract_ja);
        self.update_returning(id, query).await
    }

    async fn set_favorite(&mut self, id: Uuid, favorite: bool) -> StoreResult<Paper> {
        let sql = format!(
            "UPDATE papers SET favorite = $2, updated_at = NOW() WHERE id = $1 RETURNING {PAPER_COLUMNS}"
        );
        let query = sqlx::query(&sql).bind(id).bind(favorite);
        self.update_returning(id, query).await
    }

    async fn set_memo(&mut self, id: Uuid, memo: Option<&str>) -> StoreResult<Paper> {
        let sql = format!(
            "UPDATE papers SET memo = $2, updated_at = NOW() WHERE id = $1 RETURNING {PAPER_COLUMNS}"
        );
        let query = sqlx::query(&sql).bind(id).bind(memo);
        self.update_returning(id, query).await
    }

    async fn set_read(&mut self, id: Uuid, is_read: bool) -> StoreResult<Paper> {
        let sql = format!(
            "UPDATE papers SET is_read = $2, updated_at = NOW() WHERE id = $1 RETURNING {PAPER_COLUMNS}"
        );
        let query = sqlx::query(&sql).bind(id).bind(is_read);
        self.update_returning(id, query).await
    }
}

fn paper_from_row(row: &PgRow) -> StoreResult<Paper> {
    Ok(Paper {
        id: row.try_get("id")?,
        arxiv_id: row.try_get("arxiv_id")?,
        title: row.try_get("title")?,
        title_ja: row.try_get("title_ja")?,
        abstract_text: row.try_get("abstract")?,
        abstract_ja: row.try_get("abstract_ja")?,
        authors: row.try_get("authors")?,
        categories: row.try_get("categories")?,
        published_at: row.try_get("published_at")?,
        pdf_url: row.try_get("pdf_url")?,
        journal_ref: row.try_get("journal_ref")?,
        favorite: row.try_get("favorite")?,
        memo: row.try_get("memo")?,
        is_read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
