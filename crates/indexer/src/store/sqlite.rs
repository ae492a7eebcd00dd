// SQLite chunk store: one row per embedded chunk plus a per-document index
// row carrying state, fingerprint and title vector.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use quire_common::Chunk;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ChunkSink, IndexRecord, IndexState};
use crate::embedding::Embedding;
use crate::orchestrator::{EmbeddedChunk, EmbeddingBuild};

const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE document_index (
    doc_id              TEXT PRIMARY KEY,
    state               TEXT NOT NULL CHECK (state IN ('current', 'outdated', 'deferred')),
    fingerprint         TEXT NULL,
    title_embedding     BLOB NULL,
    failed_chunks       TEXT NULL,
    chunk_count         INTEGER NOT NULL DEFAULT 0,
    updated_at          TEXT NOT NULL
);

CREATE TABLE document_chunks (
    doc_id              TEXT NOT NULL,
    ordinal             INTEGER NOT NULL,
    content             TEXT NOT NULL,
    chunk_index         INTEGER NULL,
    heading             TEXT NULL,
    heading_level       INTEGER NULL,
    header_breadcrumb   TEXT NULL,
    breadcrumb_hash     TEXT NULL,
    token_count         INTEGER NOT NULL,
    embedding           BLOB NOT NULL,
    PRIMARY KEY (doc_id, ordinal)
);

CREATE INDEX document_chunks_breadcrumb_idx
    ON document_chunks (doc_id, breadcrumb_hash);
"#;

const MIGRATIONS: &[(i64, &str)] = &[(1, MIGRATION_V1_SQL)];

#[derive(Debug)]
pub struct SqliteChunkStore {
    conn: Connection,
}

impl SqliteChunkStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create index parent directory `{}`", parent.display())
            })?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("failed to open index database at `{}`", path.display()))?;

        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            ",
        )
        .context("failed to configure sqlite pragmas for index database")?;

        ensure_migration_table(&conn)?;
        apply_pending_migrations(&mut conn)?;

        Ok(Self { conn })
    }

    pub fn schema_version(&self) -> Result<i64> {
        current_schema_version(&self.conn)
    }

    /// Stored chunks of `doc_id` in document order.
    pub fn load_chunks(&self, doc_id: Uuid) -> Result<Vec<EmbeddedChunk>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT content, chunk_index, heading, heading_level, header_breadcrumb,
                        breadcrumb_hash, token_count, embedding
                 FROM document_chunks WHERE doc_id = ?1 ORDER BY ordinal",
            )
            .context("failed to prepare chunk query")?;
        let rows = stmt
            .query_map(params![doc_id.to_string()], |row| {
                let chunk = Chunk {
                    content: row.get(0)?,
                    index: row.get::<_, Option<i64>>(1)?.map(|value| value as usize),
                    heading: row.get(2)?,
                    heading_level: row.get::<_, Option<i64>>(3)?.map(|value| value as u8),
                    header_breadcrumb: row.get(4)?,
                    breadcrumb_hash: row.get(5)?,
                };
                let token_count = row.get::<_, i64>(6)? as usize;
                let blob: Vec<u8> = row.get(7)?;
                Ok((chunk, token_count, blob))
            })
            .context("failed to query chunks")?;

        let mut chunks = Vec::new();
        for row in rows {
            let (chunk, token_count, blob) = row.context("failed to read chunk row")?;
            chunks.push(EmbeddedChunk { chunk, embedding: decode_vector(&blob)?, token_count });
        }
        Ok(chunks)
    }

    pub fn load_title_embedding(&self, doc_id: Uuid) -> Result<Option<Embedding>> {
        let blob: Option<Option<Vec<u8>>> = self
            .conn
            .query_row(
                "SELECT title_embedding FROM document_index WHERE doc_id = ?1",
                params![doc_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query title embedding")?;
        blob.flatten().map(|bytes| decode_vector(&bytes)).transpose()
    }

    fn upsert_state(
        &mut self,
        doc_id: Uuid,
        state: &str,
        failed_chunks: Option<String>,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO document_index (doc_id, state, failed_chunks, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (doc_id) DO UPDATE SET
                     state = excluded.state,
                     failed_chunks = excluded.failed_chunks,
                     updated_at = excluded.updated_at",
                params![doc_id.to_string(), state, failed_chunks, Utc::now().to_rfc3339()],
            )
            .with_context(|| format!("failed to mark document `{doc_id}` as {state}"))?;
        Ok(())
    }
}

impl ChunkSink for SqliteChunkStore {
    fn save_chunks(&mut self, doc_id: Uuid, build: &EmbeddingBuild) -> Result<()> {
        if !build.is_complete() {
            bail!(
                "refusing to save incomplete embeddings for `{doc_id}`: {} chunk(s) failed",
                build.failed_chunks.len()
            );
        }

        let doc_key = doc_id.to_string();
        let tx = self.conn.transaction().context("failed to start chunk save transaction")?;
        tx.execute("DELETE FROM document_chunks WHERE doc_id = ?1", params![doc_key])
            .context("failed to clear previous chunks")?;
        for (ordinal, embedded) in build.chunks.iter().enumerate() {
            let chunk = &embedded.chunk;
            tx.execute(
                "INSERT INTO document_chunks (
                    doc_id, ordinal, content, chunk_index, heading, heading_level,
                    header_breadcrumb, breadcrumb_hash, token_count, embedding
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    doc_key,
                    ordinal as i64,
                    chunk.content,
                    chunk.index.map(|value| value as i64),
                    chunk.heading,
                    chunk.heading_level.map(i64::from),
                    chunk.header_breadcrumb,
                    chunk.breadcrumb_hash,
                    embedded.token_count as i64,
                    encode_vector(&embedded.embedding),
                ],
            )
            .with_context(|| format!("failed to insert chunk {ordinal}"))?;
        }
        tx.execute(
            "INSERT INTO document_index (
                doc_id, state, fingerprint, title_embedding, failed_chunks, chunk_count, updated_at
             ) VALUES (?1, 'current', ?2, ?3, NULL, ?4, ?5)
             ON CONFLICT (doc_id) DO UPDATE SET
                 state = 'current',
                 fingerprint = excluded.fingerprint,
                 title_embedding = excluded.title_embedding,
                 failed_chunks = NULL,
                 chunk_count = excluded.chunk_count,
                 updated_at = excluded.updated_at",
            params![
                doc_key,
                build.fingerprint,
                build.title_embedding.as_deref().map(encode_vector),
                build.chunks.len() as i64,
                Utc::now().to_rfc3339(),
            ],
        )
        .context("failed to update document index row")?;
        tx.commit().context("failed to commit chunk save")?;

        info!(doc_id = %doc_id, chunks = build.chunks.len(), "saved document chunks");
        Ok(())
    }

    fn mark_index_outdated(&mut self, doc_id: Uuid) -> Result<()> {
        debug!(doc_id = %doc_id, "marking index outdated");
        self.upsert_state(doc_id, "outdated", None)
    }

    fn mark_index_deferred(&mut self, doc_id: Uuid, failed_chunks: &[usize]) -> Result<()> {
        let encoded = serde_json::to_string(failed_chunks).context("failed to encode failed chunks")?;
        self.upsert_state(doc_id, "deferred", Some(encoded))
    }

    fn index_record(&self, doc_id: Uuid) -> Result<Option<IndexRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT state, fingerprint, failed_chunks, chunk_count, updated_at
                 FROM document_index WHERE doc_id = ?1",
                params![doc_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .context("failed to query document index row")?;

        let Some((state, fingerprint, failed_chunks, chunk_count, updated_at)) = row else {
            return Ok(None);
        };
        let state = match state.as_str() {
            "current" => IndexState::Current,
            "outdated" => IndexState::Outdated,
            "deferred" => IndexState::Deferred {
                failed_chunks: match failed_chunks {
                    Some(json) => serde_json::from_str(&json).context("failed to decode failed chunks")?,
                    None => Vec::new(),
                },
            },
            other => bail!("unknown index state `{other}`"),
        };
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .context("failed to parse index timestamp")?
            .with_timezone(&Utc);

        Ok(Some(IndexRecord { state, fingerprint, chunk_count: chunk_count as usize, updated_at }))
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|value| value.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Result<Embedding> {
    if bytes.len() % 4 != 0 {
        bail!("embedding blob length {} is not a multiple of 4", bytes.len());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|word| f32::from_le_bytes([word[0], word[1], word[2], word[3]]))
        .collect())
}

fn ensure_migration_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT NOT NULL
        );
        ",
    )
    .context("failed to ensure schema_migrations table exists")
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| row.get(0))
        .context("failed to read current schema version")
}

fn apply_pending_migrations(conn: &mut Connection) -> Result<()> {
    let mut current_version = current_schema_version(conn)?;

    for (version, sql) in MIGRATIONS {
        if *version <= current_version {
            continue;
        }

        let tx = conn.transaction().context("failed to start migration transaction")?;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to apply index migration v{version}"))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, datetime('now'))",
            params![version],
        )
        .with_context(|| format!("failed to record migration v{version}"))?;
        tx.commit().with_context(|| format!("failed to commit migration v{version}"))?;
        current_version = *version;
    }

    Ok(())
}
