//! The document store: SQLite persistence plus vector search.

use rusqlite::Connection;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use redclaw_core::config::RagConfig;
use redclaw_core::error::{RedClawError, Result};
use redclaw_core::types::{Document, SearchHit};

use crate::embedder::Embedder;
use crate::search;

/// Per-collection statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub document_count: usize,
    pub description: String,
}

/// Statistics over the whole store.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub total_documents: usize,
    pub collections: BTreeMap<String, CollectionInfo>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// SQLite-backed vector document store.
///
/// The embedder runs before the connection lock is taken, so the blocking
/// mutex never spans an await point.
pub struct RagStore {
    conn: Mutex<Connection>,
    embedder: Box<dyn Embedder>,
    config: RagConfig,
}

impl RagStore {
    /// Open (or create) the store at the configured path.
    pub fn open(config: RagConfig, embedder: Box<dyn Embedder>) -> Result<Self> {
        let db_path = config.resolve_db_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&db_path)?;
        Self::with_connection(conn, config, embedder)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory(config: RagConfig, embedder: Box<dyn Embedder>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, config, embedder)
    }

    fn with_connection(
        conn: Connection,
        config: RagConfig,
        embedder: Box<dyn Embedder>,
    ) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                description TEXT NOT NULL DEFAULT ''
            );
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_documents_collection
                ON documents(collection);",
        )?;

        // Seed the well-known collections.
        for (name, description) in &config.collections {
            conn.execute(
                "INSERT OR IGNORE INTO collections (name, description) VALUES (?1, ?2)",
                rusqlite::params![name, description],
            )?;
        }

        tracing::info!(
            collections = config.collections.len(),
            "RAG store initialized"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            embedder,
            config,
        })
    }

    /// Content-hash document id: content plus the filename/source metadata
    /// keys, so the same text from two sources stays distinct.
    pub fn document_id(doc: &Document) -> String {
        let mut hasher = Sha256::new();
        hasher.update(doc.content.as_bytes());
        for key in ["filename", "source"] {
            if let Some(v) = doc.metadata.get(key) {
                hasher.update(stringify_value(v).as_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }

    /// Add a document. Returns the id; adding an existing id is a no-op.
    pub async fn add_document(&self, doc: &Document, collection: &str) -> Result<String> {
        let doc_id = Self::document_id(doc);

        if self.document_exists(&doc_id)? {
            tracing::debug!(%doc_id, "Document already exists");
            return Ok(doc_id);
        }

        let embedding = self.embedder.embed(&doc.content).await?;
        let metadata = stringify_metadata(&doc.metadata);
        let metadata_json = serde_json::to_string(&metadata)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO collections (name, description) VALUES (?1, ?2)",
            rusqlite::params![collection, format!("Auto-created collection for {collection}")],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO documents (id, collection, content, metadata, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                doc_id,
                collection,
                doc.content,
                metadata_json,
                search::encode_vector(&embedding),
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;

        tracing::info!(%doc_id, collection, "Added document");
        Ok(doc_id)
    }

    pub fn document_exists(&self, doc_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM documents WHERE id = ?1",
            rusqlite::params![doc_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    /// Similarity search over one collection, or all of them.
    ///
    /// Hits below the configured similarity threshold are dropped; the rest
    /// come back sorted by score descending, at most `n` of them.
    pub async fn search_similar(
        &self,
        query: &str,
        collection: Option<&str>,
        n: Option<usize>,
    ) -> Result<Vec<SearchHit>> {
        let n = n.unwrap_or(self.config.max_results);
        let query_vec = self.embedder.embed(query).await?;

        let hits = self.scan_similar(&query_vec, collection)?;
        let ranked = search::rank_hits(hits, self.config.similarity_threshold, n);

        let preview: String = query.chars().take(50).collect();
        tracing::info!(
            results = ranked.len(),
            query = %preview,
            "Similarity search complete"
        );
        Ok(ranked)
    }

    fn scan_similar(&self, query_vec: &[f32], collection: Option<&str>) -> Result<Vec<SearchHit>> {
        let conn = self.lock()?;
        let mut hits = Vec::new();

        let mut run = |sql: &str, params: &[&dyn rusqlite::ToSql]| -> Result<()> {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, |row| {
                Ok((
                    row.get::<_, String>(0)?, // collection
                    row.get::<_, String>(1)?, // content
                    row.get::<_, String>(2)?, // metadata
                    row.get::<_, Vec<u8>>(3)?, // embedding
                ))
            })?;
            for row in rows {
                let (coll, content, metadata_json, blob) = row?;
                let doc_vec = search::decode_vector(&blob);
                let score = search::cosine_similarity(query_vec, &doc_vec);
                hits.push(SearchHit {
                    content,
                    metadata: parse_metadata(&metadata_json),
                    similarity_score: score,
                    collection: coll,
                    matched_tags: vec![],
                });
            }
            Ok(())
        };

        match collection {
            Some(name) => run(
                "SELECT collection, content, metadata, embedding FROM documents WHERE collection = ?1",
                &[&name],
            )?,
            None => run(
                "SELECT collection, content, metadata, embedding FROM documents",
                &[],
            )?,
        }

        Ok(hits)
    }

    /// Tag search: case-insensitive match against the stored `tags`
    /// metadata (a JSON array string, or a single plain string).
    pub fn search_by_tags(
        &self,
        tags: &[String],
        collection: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let wanted: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
        let conn = self.lock()?;

        let (sql, params): (&str, Vec<&dyn rusqlite::ToSql>) = match collection {
            Some(ref name) => (
                "SELECT collection, content, metadata FROM documents WHERE collection = ?1",
                vec![name as &dyn rusqlite::ToSql],
            ),
            None => ("SELECT collection, content, metadata FROM documents", vec![]),
        };

        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut hits = Vec::new();
        for row in rows {
            let (coll, content, metadata_json) = row?;
            let metadata = parse_metadata(&metadata_json);
            let doc_tags = extract_tags(&metadata);

            let matched: Vec<String> = wanted
                .iter()
                .filter(|w| doc_tags.iter().any(|d| d == *w))
                .cloned()
                .collect();

            if !matched.is_empty() {
                hits.push(SearchHit {
                    content,
                    metadata,
                    similarity_score: 1.0,
                    collection: coll,
                    matched_tags: matched,
                });
            }
        }

        tracing::info!(results = hits.len(), ?tags, "Tag search complete");
        Ok(hits)
    }

    /// Build an LLM context block for a query from the top hits.
    pub async fn context_for_query(&self, query: &str, max_context_len: usize) -> Result<String> {
        let hits = self.search_similar(query, None, Some(5)).await?;
        Ok(search::build_context(&hits, max_context_len))
    }

    pub fn collection_stats(&self) -> Result<CollectionStats> {
        let conn = self.lock()?;
        let mut collections = BTreeMap::new();
        let mut total = 0usize;

        let mut stmt = conn.prepare(
            "SELECT c.name, c.description, COUNT(d.id)
             FROM collections c LEFT JOIN documents d ON d.collection = c.name
             GROUP BY c.name, c.description",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        for row in rows {
            let (name, description, count) = row?;
            total += count as usize;
            collections.insert(
                name,
                CollectionInfo {
                    document_count: count as usize,
                    description,
                },
            );
        }

        Ok(CollectionStats {
            total_documents: total,
            collections,
            timestamp: chrono::Utc::now(),
        })
    }

    /// Delete a document. Returns whether anything was removed.
    pub fn delete_document(&self, doc_id: &str, collection: &str) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM documents WHERE id = ?1 AND collection = ?2",
            rusqlite::params![doc_id, collection],
        )?;
        Ok(removed > 0)
    }

    /// Replace a document: delete the old id, insert the new content.
    pub async fn update_document(
        &self,
        doc_id: &str,
        doc: &Document,
        collection: &str,
    ) -> Result<String> {
        self.delete_document(doc_id, collection)?;
        self.add_document(doc, collection).await
    }

    /// Remove every document in a collection. The collection row survives.
    pub fn clear_collection(&self, collection: &str) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM documents WHERE collection = ?1",
            rusqlite::params![collection],
        )?;
        tracing::info!(collection, removed, "Cleared collection");
        Ok(removed)
    }

    /// Dump a collection (content + metadata + embeddings) to a JSON file.
    pub fn backup_collection(&self, collection: &str, path: &Path) -> Result<usize> {
        #[derive(Serialize)]
        struct BackupDoc {
            id: String,
            content: String,
            metadata: BTreeMap<String, String>,
            embedding: Vec<f32>,
        }
        #[derive(Serialize)]
        struct Backup {
            collection_name: String,
            timestamp: chrono::DateTime<chrono::Utc>,
            document_count: usize,
            documents: Vec<BackupDoc>,
        }

        let documents = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(
                "SELECT id, content, metadata, embedding FROM documents WHERE collection = ?1",
            )?;
            let rows = stmt.query_map(rusqlite::params![collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })?;

            let mut documents = Vec::new();
            for row in rows {
                let (id, content, metadata_json, blob) = row?;
                documents.push(BackupDoc {
                    id,
                    content,
                    metadata: parse_metadata(&metadata_json),
                    embedding: search::decode_vector(&blob),
                });
            }
            documents
        };

        let backup = Backup {
            collection_name: collection.to_string(),
            timestamp: chrono::Utc::now(),
            document_count: documents.len(),
            documents,
        };

        std::fs::write(path, serde_json::to_string_pretty(&backup)?)?;
        tracing::info!(collection, count = backup.document_count, "Backed up collection");
        Ok(backup.document_count)
    }

    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    pub fn known_collections(&self) -> Vec<String> {
        self.config.collections.keys().cloned().collect()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RedClawError::Rag(format!("Store lock poisoned: {e}")))
    }
}

/// ChromaDB required string metadata values; we keep the same contract.
fn stringify_metadata(
    metadata: &BTreeMap<String, serde_json::Value>,
) -> BTreeMap<String, String> {
    metadata
        .iter()
        .map(|(k, v)| (k.clone(), stringify_value(v)))
        .collect()
}

fn stringify_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => value.to_string(),
        other => other.to_string(),
    }
}

fn parse_metadata(json: &str) -> BTreeMap<String, String> {
    serde_json::from_str(json).unwrap_or_default()
}

/// Tags live in metadata as a JSON array string or a bare string.
fn extract_tags(metadata: &BTreeMap<String, String>) -> Vec<String> {
    let Some(raw) = metadata.get("tags") else {
        return vec![];
    };
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(list) => list.into_iter().map(|t| t.to_lowercase()).collect(),
        Err(_) => vec![raw.to_lowercase()],
    }
}
