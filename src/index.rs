//! Persisted vector index over document chunks.
//!
//! The index lives in a SQLite database inside the configured persistence
//! directory. Each processing run writes a new *collection*: one
//! `collections` row plus one `embeddings` row per chunk, in chunk order.
//! Collections are append-only and stay on disk across process runs, so a
//! later run can reopen one by ID.
//!
//! Similarity search is brute-force cosine similarity over the vectors of a
//! single collection, computed in Rust.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::IndexConfig;
use crate::db;
use crate::embedding::{self, EmbedKind, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::migrate;
use crate::models::Chunk;

/// Something that can return the chunk texts most relevant to a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Returns up to `k` chunk texts, most relevant first.
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>>;
}

/// Metadata of one persisted collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub id: String,
    pub created_at: i64,
    pub embedding_model: String,
    pub dims: i64,
    pub chunk_count: i64,
}

/// A chunk returned by [`VectorIndex::query`] with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_index: i64,
    pub text: String,
    pub score: f32,
}

/// Connects to the index database under `config.persist_dir` and makes
/// sure the schema exists.
pub async fn open_store(config: &IndexConfig) -> Result<SqlitePool> {
    let pool = db::connect(&config.db_path()).await?;
    migrate::run_migrations(&pool).await?;
    Ok(pool)
}

/// Lists persisted collections, newest first.
pub async fn list_collections(pool: &SqlitePool) -> Result<Vec<CollectionInfo>> {
    let rows = sqlx::query(
        "SELECT id, created_at, embedding_model, dims, chunk_count FROM collections \
         ORDER BY created_at DESC, id ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_info).collect())
}

fn row_to_info(row: &sqlx::sqlite::SqliteRow) -> CollectionInfo {
    CollectionInfo {
        id: row.get("id"),
        created_at: row.get("created_at"),
        embedding_model: row.get("embedding_model"),
        dims: row.get("dims"),
        chunk_count: row.get("chunk_count"),
    }
}

/// Handle to one collection of the persisted index.
#[derive(Clone)]
pub struct VectorIndex {
    pool: SqlitePool,
    collection_id: String,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("collection_id", &self.collection_id)
            .field("model", &self.embedder.model_name())
            .finish()
    }
}

impl VectorIndex {
    /// Embeds `chunks` and stores them as a new collection.
    ///
    /// Texts are sent to the provider in batches of `batch_size`. Every batch
    /// is embedded before anything is written, and all rows are inserted in
    /// one transaction, so a failed run leaves no partial collection.
    ///
    /// # Errors
    ///
    /// [`Error::NoDocuments`] for an empty chunk list and
    /// [`Error::InvalidResponse`] when the provider returns a different number
    /// of vectors than texts. Any embedding failure aborts the build.
    pub async fn build(
        pool: SqlitePool,
        embedder: Arc<dyn EmbeddingProvider>,
        chunks: &[Chunk],
        batch_size: usize,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::NoDocuments(
                "the uploaded documents contain no extractable text".to_string(),
            ));
        }

        let batch_size = batch_size.max(1);
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for (n, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            debug!(batch = n, size = texts.len(), "embedding batch");
            vectors.extend(embedder.embed(&texts, EmbedKind::Document).await?);
        }
        if vectors.len() != chunks.len() {
            return Err(Error::invalid_response(
                embedder.model_name(),
                format!(
                    "expected {} embeddings, got {}",
                    chunks.len(),
                    vectors.len()
                ),
            ));
        }

        let collection_id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        let mut tx = pool.begin().await?;
        sqlx::query(
            "INSERT INTO collections (id, created_at, embedding_model, dims, chunk_count) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&collection_id)
        .bind(now)
        .bind(embedder.model_name())
        .bind(embedder.dims() as i64)
        .bind(chunks.len() as i64)
        .execute(&mut *tx)
        .await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                "INSERT INTO embeddings (id, collection_id, chunk_index, text, hash, embedding) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&collection_id)
            .bind(chunk.index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(embedding::vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        info!(
            collection = %collection_id,
            chunks = chunks.len(),
            model = embedder.model_name(),
            "index collection written"
        );

        Ok(Self {
            pool,
            collection_id,
            embedder,
        })
    }

    /// Reopens a collection written by an earlier run.
    pub async fn open(
        pool: SqlitePool,
        embedder: Arc<dyn EmbeddingProvider>,
        collection_id: &str,
    ) -> Result<Self> {
        let row = sqlx::query(
            "SELECT id, created_at, embedding_model, dims, chunk_count FROM collections WHERE id = ?",
        )
        .bind(collection_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| Error::CollectionNotFound(collection_id.to_string()))?;

        let info = row_to_info(&row);
        if info.embedding_model != embedder.model_name() {
            warn!(
                collection = %collection_id,
                stored = %info.embedding_model,
                configured = embedder.model_name(),
                "collection was embedded with a different model"
            );
        }

        Ok(Self {
            pool,
            collection_id: info.id,
            embedder,
        })
    }

    pub fn collection_id(&self) -> &str {
        &self.collection_id
    }

    /// Number of records stored in this collection.
    pub async fn len(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM embeddings WHERE collection_id = ?")
                .bind(&self.collection_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Chunk texts of this collection in chunk order.
    pub async fn texts(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT text FROM embeddings WHERE collection_id = ? ORDER BY chunk_index ASC",
        )
        .bind(&self.collection_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(|r| r.get("text")).collect())
    }

    /// Embeds `text` and returns the `k` nearest chunks by cosine similarity.
    /// Ties are broken by chunk order.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query_vec = embedding::embed_query(self.embedder.as_ref(), text).await?;

        let rows = sqlx::query(
            "SELECT chunk_index, text, embedding FROM embeddings WHERE collection_id = ?",
        )
        .bind(&self.collection_id)
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<ScoredChunk> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = embedding::blob_to_vec(&blob);
                ScoredChunk {
                    chunk_index: row.get("chunk_index"),
                    text: row.get("text"),
                    score: embedding::cosine_similarity(&query_vec, &vec),
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        scored.truncate(k);

        debug!(collection = %self.collection_id, hits = scored.len(), "index query");
        Ok(scored)
    }
}

#[async_trait]
impl Retriever for VectorIndex {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<String>> {
        Ok(self
            .query(query, k)
            .await?
            .into_iter()
            .map(|c| c.text)
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Deterministic embedder: one dimension per keyword, counting occurrences.
    pub(crate) struct KeywordEmbedder {
        pub keywords: Vec<&'static str>,
        pub calls: AtomicUsize,
        pub fail: bool,
    }

    impl KeywordEmbedder {
        pub(crate) fn new(keywords: Vec<&'static str>) -> Self {
            Self {
                keywords,
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(vec!["x"])
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        fn model_name(&self) -> &str {
            "keyword-test"
        }
        fn dims(&self) -> usize {
            self.keywords.len()
        }
        async fn embed(&self, texts: &[String], _kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::remote("test", "quota exceeded"));
            }
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    self.keywords
                        .iter()
                        .map(|k| lower.matches(k).count() as f32)
                        .collect()
                })
                .collect())
        }
    }

    pub(crate) async fn temp_pool() -> (TempDir, SqlitePool) {
        let tmp = TempDir::new().unwrap();
        let config = IndexConfig {
            persist_dir: tmp.path().join("chroma_db"),
        };
        let pool = open_store(&config).await.unwrap();
        (tmp, pool)
    }

    fn chunks(texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk {
                index: i as i64,
                text: t.to_string(),
                hash: String::new(),
            })
            .collect()
    }

    #[tokio::test]
    async fn build_stores_one_record_per_chunk() {
        let (_tmp, pool) = temp_pool().await;
        let embedder = Arc::new(KeywordEmbedder::new(vec!["rust", "python"]));
        let chunks = chunks(&[
            "rust ownership and borrowing rules",
            "python generators and iterators",
            "rust traits and generics explained",
        ]);
        let index = VectorIndex::build(pool.clone(), embedder, &chunks, 2)
            .await
            .unwrap();
        assert_eq!(index.len().await.unwrap(), chunks.len() as i64);

        let collections = list_collections(&pool).await.unwrap();
        assert_eq!(collections.len(), 1);
        assert_eq!(collections[0].chunk_count, chunks.len() as i64);
        assert_eq!(collections[0].embedding_model, "keyword-test");
    }

    #[tokio::test]
    async fn batches_respect_batch_size() {
        let (_tmp, pool) = temp_pool().await;
        let embedder = Arc::new(KeywordEmbedder::new(vec!["a"]));
        let chunks: Vec<Chunk> = (0..5)
            .map(|i| Chunk {
                index: i,
                text: format!("chunk {}", i),
                hash: String::new(),
            })
            .collect();
        VectorIndex::build(pool, embedder.clone(), &chunks, 2)
            .await
            .unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn query_returns_most_similar_first() {
        let (_tmp, pool) = temp_pool().await;
        let embedder = Arc::new(KeywordEmbedder::new(vec!["rust", "python"]));
        let chunks = chunks(&[
            "python generators and iterators",
            "rust ownership and borrowing rules",
        ]);
        let index = VectorIndex::build(pool, embedder, &chunks, 64)
            .await
            .unwrap();

        let hits = index.query("tell me about rust", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].text.contains("rust ownership"));

        let texts = index.retrieve("python please", 5).await.unwrap();
        assert_eq!(texts.len(), 2);
        assert!(texts[0].contains("python"));
    }

    #[tokio::test]
    async fn empty_chunks_rejected() {
        let (_tmp, pool) = temp_pool().await;
        let embedder = Arc::new(KeywordEmbedder::new(vec!["a"]));
        let err = VectorIndex::build(pool, embedder, &[], 64).await.unwrap_err();
        assert!(matches!(err, Error::NoDocuments(_)));
    }

    #[tokio::test]
    async fn failed_embedding_writes_nothing() {
        let (_tmp, pool) = temp_pool().await;
        let embedder = Arc::new(KeywordEmbedder::failing());
        let err = VectorIndex::build(pool.clone(), embedder, &chunks(&["some text"]), 64)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
        assert!(list_collections(&pool).await.unwrap().is_empty());
    }

    /// Drops the last vector of every batch.
    struct ShortEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short-test"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String], _kind: EmbedKind) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0]).collect())
        }
    }

    #[tokio::test]
    async fn missing_vectors_write_nothing() {
        let (_tmp, pool) = temp_pool().await;
        let err = VectorIndex::build(
            pool.clone(),
            Arc::new(ShortEmbedder),
            &chunks(&["first", "second", "third"]),
            64,
        )
        .await
        .unwrap_err();
        match err {
            Error::InvalidResponse { provider, message } => {
                assert_eq!(provider, "short-test");
                assert_eq!(message, "expected 3 embeddings, got 2");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(list_collections(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn collections_persist_and_reopen() {
        let (_tmp, pool) = temp_pool().await;
        let embedder = Arc::new(KeywordEmbedder::new(vec!["rust"]));
        let first = VectorIndex::build(pool.clone(), embedder.clone(), &chunks(&["rust one"]), 64)
            .await
            .unwrap();
        let second = VectorIndex::build(
            pool.clone(),
            embedder.clone(),
            &chunks(&["rust two", "rust three"]),
            64,
        )
        .await
        .unwrap();
        assert_ne!(first.collection_id(), second.collection_id());

        let reopened = VectorIndex::open(pool.clone(), embedder.clone(), first.collection_id())
            .await
            .unwrap();
        assert_eq!(reopened.texts().await.unwrap(), vec!["rust one".to_string()]);
        assert_eq!(second.len().await.unwrap(), 2);

        let err = VectorIndex::open(pool, embedder, "missing").await.unwrap_err();
        assert!(matches!(err, Error::CollectionNotFound(_)));
    }
}
