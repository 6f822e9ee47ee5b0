//! SQLite-backed [`Store`] implementation.
//!
//! Vectors are stored as little-endian `f32` BLOBs next to the model that
//! produced them, so a restart can rebuild the index without re-embedding
//! and can detect a model change.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::error::Result;
use crate::migrate;
use crate::models::{Chunk, Document, Embedding};

use super::{SourceRecord, Store, StoreStats, StoredEntry};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to (or create) the database file and apply migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn from_timestamp(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_default()
}

fn source_record(row: &SqliteRow) -> SourceRecord {
    let version: i64 = row.get("version");
    let chunk_count: i64 = row.get("chunk_count");
    SourceRecord {
        source_path: row.get("source_path"),
        document_id: row.get("id"),
        version: version as u32,
        chunk_count: chunk_count as usize,
    }
}

const SOURCE_RECORD_SELECT: &str = r#"
    SELECT d.id, d.source_path, d.version,
           (SELECT COUNT(*) FROM chunks c WHERE c.document_id = d.id) AS chunk_count
    FROM documents d
"#;

#[async_trait]
impl Store for SqliteStore {
    async fn document_by_source(&self, source_path: &str) -> Result<Option<SourceRecord>> {
        let row = sqlx::query(&format!("{SOURCE_RECORD_SELECT} WHERE d.source_path = ?"))
            .bind(source_path)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(source_record))
    }

    async fn replace_document(
        &self,
        document: &Document,
        chunks: &[Chunk],
        embeddings: &[Embedding],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<String> =
            sqlx::query_scalar("SELECT id FROM documents WHERE source_path = ?")
                .bind(&document.source_path)
                .fetch_optional(&mut *tx)
                .await?;

        for doc_id in previous.iter().chain(std::iter::once(&document.id)) {
            sqlx::query("DELETE FROM embeddings WHERE document_id = ?")
                .bind(doc_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM chunks WHERE document_id = ?")
                .bind(doc_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM documents WHERE id = ?")
                .bind(doc_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO documents (id, source_path, content_type, raw_text, version, ingested_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&document.id)
        .bind(&document.source_path)
        .bind(&document.content_type)
        .bind(&document.raw_text)
        .bind(document.version as i64)
        .bind(document.ingested_at.timestamp())
        .execute(&mut *tx)
        .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, source_path, ordinal, start_char,
                                    text, token_count, hash)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(&chunk.source_path)
            .bind(chunk.ordinal as i64)
            .bind(chunk.start_char as i64)
            .bind(&chunk.text)
            .bind(chunk.token_count as i64)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await?;
        }

        for embedding in embeddings {
            sqlx::query(
                r#"
                INSERT INTO embeddings (chunk_id, document_id, model_id, dims, vector, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    document_id = excluded.document_id,
                    model_id = excluded.model_id,
                    dims = excluded.dims,
                    vector = excluded.vector,
                    created_at = excluded.created_at
                "#,
            )
            .bind(&embedding.chunk_id)
            .bind(&document.id)
            .bind(&embedding.model_id)
            .bind(embedding.vector.len() as i64)
            .bind(vec_to_blob(&embedding.vector))
            .bind(embedding.created_at.timestamp())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn remove_source(&self, source_path: &str) -> Result<Option<String>> {
        let mut tx = self.pool.begin().await?;

        let doc_id: Option<String> =
            sqlx::query_scalar("SELECT id FROM documents WHERE source_path = ?")
                .bind(source_path)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(doc_id) = doc_id else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM embeddings WHERE document_id = ?")
            .bind(&doc_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(&doc_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(&doc_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(doc_id))
    }

    async fn list_sources(&self) -> Result<Vec<SourceRecord>> {
        let rows = sqlx::query(&format!("{SOURCE_RECORD_SELECT} ORDER BY d.source_path ASC"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(source_record).collect())
    }

    async fn load_entries(&self) -> Result<Vec<StoredEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.document_id, c.source_path, c.ordinal, c.start_char,
                   c.text, c.token_count, c.hash,
                   e.model_id, e.vector, e.created_at
            FROM chunks c
            LEFT JOIN embeddings e ON e.chunk_id = c.id
            ORDER BY c.source_path ASC, c.ordinal ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let entries = rows
            .iter()
            .map(|row| {
                let ordinal: i64 = row.get("ordinal");
                let start_char: i64 = row.get("start_char");
                let token_count: i64 = row.get("token_count");
                let chunk = Chunk {
                    id: row.get("id"),
                    document_id: row.get("document_id"),
                    source_path: row.get("source_path"),
                    ordinal: ordinal as usize,
                    start_char: start_char as usize,
                    text: row.get("text"),
                    token_count: token_count as usize,
                    hash: row.get("hash"),
                };
                let model_id: Option<String> = row.get("model_id");
                let embedding = model_id.map(|model_id| {
                    let blob: Vec<u8> = row.get("vector");
                    let created_at: i64 = row.get("created_at");
                    Embedding {
                        chunk_id: chunk.id.clone(),
                        vector: blob_to_vec(&blob),
                        model_id,
                        created_at: from_timestamp(created_at),
                    }
                });
                StoredEntry { chunk, embedding }
            })
            .collect();
        Ok(entries)
    }

    async fn replace_embeddings(&self, embeddings: &[Embedding]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for embedding in embeddings {
            sqlx::query(
                r#"
                INSERT INTO embeddings (chunk_id, document_id, model_id, dims, vector, created_at)
                SELECT c.id, c.document_id, ?, ?, ?, ? FROM chunks c WHERE c.id = ?
                ON CONFLICT(chunk_id) DO UPDATE SET
                    model_id = excluded.model_id,
                    dims = excluded.dims,
                    vector = excluded.vector,
                    created_at = excluded.created_at
                "#,
            )
            .bind(&embedding.model_id)
            .bind(embedding.vector.len() as i64)
            .bind(vec_to_blob(&embedding.vector))
            .bind(embedding.created_at.timestamp())
            .bind(&embedding.chunk_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let embeddings: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM embeddings")
            .fetch_one(&self.pool)
            .await?;
        let model_ids: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT model_id FROM embeddings ORDER BY model_id")
                .fetch_all(&self.pool)
                .await?;

        Ok(StoreStats {
            documents: documents as usize,
            chunks: chunks as usize,
            embeddings: embeddings as usize,
            model_ids,
        })
    }
}
