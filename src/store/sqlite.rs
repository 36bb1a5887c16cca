//! SQLite-backed [`VectorStore`] implementation.
//!
//! Section vectors are stored as little-endian `f32` BLOBs in a single
//! `section_vectors` table; metadata filters run in SQL and similarity is
//! computed by brute-force cosine over the filtered rows.
//!
//! The pool runs in WAL mode so concurrent searches do not block on an
//! in-flight upsert. Each upsert runs in one transaction, so readers see
//! either the old point set of a case or the new one.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::config::StoreConfig;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{check_dims, PrecedentError, Result, Service};
use crate::models::{CaseMetadata, SectionType, SectionVector};

use super::{point_id, rank_order, validate_batch, QueryFilter, ScoredPoint, StoreStats, VectorStore};

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteVectorStore {
    /// Wrap an existing pool. The schema must already exist (see [`migrate`]).
    pub fn new(pool: SqlitePool, dims: usize) -> Self {
        Self { pool, dims }
    }

    /// Connect, create the schema if needed, and verify that previously
    /// stored vectors match the configured dimension.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        let pool = connect(config).await?;
        migrate(&pool).await?;
        let store = Self::new(pool, config.dims);
        store.check_stored_dims().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn check_stored_dims(&self) -> Result<()> {
        let stored: Option<i64> =
            sqlx::query_scalar("SELECT dims FROM section_vectors WHERE dims != ? LIMIT 1")
                .bind(self.dims as i64)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx("open store", "dimension check"))?;
        match stored {
            Some(actual) => Err(PrecedentError::dimension_mismatch(
                self.dims,
                actual as usize,
                "existing index",
            )),
            None => Ok(()),
        }
    }
}

/// Create a connection pool to the configured SQLite database.
///
/// - Creates the database file and parent directories if they don't exist.
/// - Enables WAL journal mode for concurrent read/write.
/// - Returns a pool with up to 5 connections; acquiring a connection past
///   `acquire_timeout_secs` fails as [`ServiceUnavailable`](PrecedentError::ServiceUnavailable).
pub async fn connect(config: &StoreConfig) -> Result<SqlitePool> {
    let db_path = &config.path;
    let context = db_path.display().to_string();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            PrecedentError::unavailable(Service::VectorStore, "connect", &context, e)
        })?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))
        .map_err(map_sqlx("connect", &context))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect_with(options)
        .await
        .map_err(map_sqlx("connect", &context))
}

/// Create the `section_vectors` table and its indexes. Idempotent.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS section_vectors (
            point_id TEXT PRIMARY KEY,
            case_id TEXT NOT NULL,
            case_key TEXT NOT NULL,
            section_type TEXT NOT NULL,
            year INTEGER NOT NULL,
            text TEXT NOT NULL,
            metadata_json TEXT NOT NULL,
            embedding BLOB NOT NULL,
            dims INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(map_sqlx("migrate", "section_vectors"))?;

    for stmt in [
        "CREATE INDEX IF NOT EXISTS idx_section_vectors_case_id ON section_vectors(case_id)",
        "CREATE INDEX IF NOT EXISTS idx_section_vectors_case_key ON section_vectors(case_key)",
        "CREATE INDEX IF NOT EXISTS idx_section_vectors_year ON section_vectors(year)",
    ] {
        sqlx::query(stmt)
            .execute(pool)
            .await
            .map_err(map_sqlx("migrate", "indexes"))?;
    }

    Ok(())
}

/// Classify a sqlx error: connectivity problems and lock contention that
/// outlasted the busy timeout are `ServiceUnavailable`, everything else is a
/// wrapped backend failure.
fn map_sqlx<'a>(
    operation: &'static str,
    context: impl Into<String> + 'a,
) -> impl FnOnce(sqlx::Error) -> PrecedentError + 'a {
    move |e| {
        let context = context.into();
        match e {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => {
                PrecedentError::unavailable(Service::VectorStore, operation, context, e)
            }
            sqlx::Error::Database(_) if is_lock_contention(&e) => {
                PrecedentError::unavailable(Service::VectorStore, operation, context, e)
            }
            other => PrecedentError::backend(operation, context, other),
        }
    }
}

fn is_lock_contention(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => is_lock_code(db.code().as_deref()),
        _ => false,
    }
}

/// SQLITE_BUSY (5) or SQLITE_LOCKED (6), including their extended codes.
fn is_lock_code(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .is_some_and(|c| matches!(c & 0xff, 5 | 6))
}

fn decode_metadata(json: &str, point: &str) -> Result<CaseMetadata> {
    serde_json::from_str(json).map_err(|e| PrecedentError::backend("decode metadata", point, e))
}

fn decode_section(raw: &str, point: &str) -> Result<SectionType> {
    SectionType::from_str(raw).map_err(|e| PrecedentError::backend("decode section", point, e))
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, vectors: &[SectionVector]) -> Result<Vec<String>> {
        let (case_id, case_key) = validate_batch(self.dims, vectors)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(map_sqlx("upsert", &case_id))?;

        sqlx::query("DELETE FROM section_vectors WHERE case_key = ? OR case_id = ?")
            .bind(&case_key)
            .bind(&case_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx("upsert", &case_id))?;

        let mut ids = Vec::with_capacity(vectors.len());
        for v in vectors {
            let id = point_id(&case_key, v.section_type);
            let metadata_json = serde_json::to_string(&v.metadata)
                .map_err(|e| PrecedentError::backend("upsert", &case_id, e))?;

            sqlx::query(
                r#"
                INSERT INTO section_vectors (point_id, case_id, case_key, section_type, year,
                                             text, metadata_json, embedding, dims)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(point_id) DO UPDATE SET
                    case_id = excluded.case_id,
                    case_key = excluded.case_key,
                    section_type = excluded.section_type,
                    year = excluded.year,
                    text = excluded.text,
                    metadata_json = excluded.metadata_json,
                    embedding = excluded.embedding,
                    dims = excluded.dims
                "#,
            )
            .bind(&id)
            .bind(&v.case_id)
            .bind(&case_key)
            .bind(v.section_type.as_str())
            .bind(v.metadata.year)
            .bind(&v.text)
            .bind(&metadata_json)
            .bind(vec_to_blob(&v.vector))
            .bind(self.dims as i64)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx("upsert", &case_id))?;

            ids.push(id);
        }

        tx.commit().await.map_err(map_sqlx("upsert", &case_id))?;
        Ok(ids)
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &QueryFilter,
        score_threshold: Option<f64>,
    ) -> Result<Vec<ScoredPoint>> {
        check_dims(self.dims, vector, "query vector")?;

        let (year_min, year_max) = match filter.year_range {
            Some((lo, hi)) => (Some(lo), Some(hi)),
            None => (None, None),
        };

        let rows = sqlx::query(
            r#"
            SELECT point_id, case_id, section_type, text, metadata_json, embedding
            FROM section_vectors
            WHERE (?1 IS NULL OR section_type = ?1)
              AND (?2 IS NULL OR year >= ?2)
              AND (?3 IS NULL OR year <= ?3)
              AND (?4 IS NULL OR case_id = ?4)
            "#,
        )
        .bind(filter.section_type.map(|s| s.as_str()))
        .bind(year_min)
        .bind(year_max)
        .bind(filter.case_id.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx("query", "similarity search"))?;

        let mut scored = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let score = cosine_similarity(vector, &blob_to_vec(&blob));
            if score_threshold.is_some_and(|t| score < t) {
                continue;
            }
            let point: String = row.get("point_id");
            let section: String = row.get("section_type");
            let metadata: String = row.get("metadata_json");
            scored.push(ScoredPoint {
                section_type: decode_section(&section, &point)?,
                metadata: decode_metadata(&metadata, &point)?,
                case_id: row.get("case_id"),
                text: row.get("text"),
                score,
                point_id: point,
            });
        }

        scored.sort_by(rank_order);
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn delete(&self, case_id: &str) -> Result<usize> {
        let result = sqlx::query("DELETE FROM section_vectors WHERE case_id = ?")
            .bind(case_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx("delete", case_id))?;
        Ok(result.rows_affected() as usize)
    }

    async fn exists(&self, case_key: &str) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT case_id FROM section_vectors WHERE case_key = ? LIMIT 1")
            .bind(case_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx("exists", case_key))
    }

    async fn get_case(&self, case_id: &str) -> Result<Vec<SectionVector>> {
        let rows = sqlx::query(
            "SELECT point_id, section_type, text, metadata_json, embedding FROM section_vectors WHERE case_id = ?",
        )
        .bind(case_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx("get case", case_id))?;

        let mut sections = Vec::with_capacity(rows.len());
        for row in &rows {
            let point: String = row.get("point_id");
            let section: String = row.get("section_type");
            let metadata: String = row.get("metadata_json");
            let blob: Vec<u8> = row.get("embedding");
            sections.push(SectionVector {
                case_id: case_id.to_string(),
                section_type: decode_section(&section, &point)?,
                vector: blob_to_vec(&blob),
                text: row.get("text"),
                metadata: decode_metadata(&metadata, &point)?,
            });
        }
        sections.sort_by_key(|s| s.section_type);
        Ok(sections)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS points, COUNT(DISTINCT case_id) AS cases FROM section_vectors",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx("stats", "section_vectors"))?;

        let points: i64 = row.get("points");
        let cases: i64 = row.get("cases");
        Ok(StoreStats {
            points: points as usize,
            cases: cases as usize,
            dims: self.dims,
        })
    }
}
