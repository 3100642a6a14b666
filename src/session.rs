//! Per-user chat session state.
//!
//! A [`Session`] is either *idle* (nothing processed, no history) or
//! *active* (a conversation bound to the most recently built collection).
//! Processing always resets to idle first, so a failed run never leaves the
//! previous conversation behind.

use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::chunk::chunk_text;
use crate::config::{ChatConfig, Config, EmbeddingConfig};
use crate::conversation::{Answer, Conversation};
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::extract::extract_documents;
use crate::index::{self, VectorIndex};
use crate::llm::{create_chat_model, ChatModel};
use crate::models::{Turn, UploadedFile};

type EmbedderFn = dyn Fn(&EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync;
type ChatFn = dyn Fn(&ChatConfig) -> Result<Arc<dyn ChatModel>> + Send + Sync;

/// Constructors for the embedding and chat models.
///
/// Resolved on every processing run, so credentials are read when they are
/// needed rather than at startup.
pub struct Backends {
    embedder: Box<EmbedderFn>,
    chat: Box<ChatFn>,
}

impl Backends {
    pub fn new(
        embedder: impl Fn(&EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> + Send + Sync + 'static,
        chat: impl Fn(&ChatConfig) -> Result<Arc<dyn ChatModel>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            embedder: Box::new(embedder),
            chat: Box::new(chat),
        }
    }

    /// The configured hosted providers.
    pub fn hosted() -> Self {
        Self::new(
            |config| create_embedder(config).map(Arc::from),
            create_chat_model,
        )
    }
}

impl Default for Backends {
    fn default() -> Self {
        Self::hosted()
    }
}

/// Outcome of a successful processing run.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub collection_id: String,
    pub files: usize,
    pub characters: usize,
    pub chunks: usize,
}

pub struct Session {
    config: Config,
    pool: SqlitePool,
    backends: Backends,
    conversation: Option<Conversation>,
    collection_id: Option<String>,
    last_error: Option<String>,
}

impl Session {
    /// Opens the index store named in `config` with the hosted backends.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = index::open_store(&config.index).await?;
        Ok(Self::with_backends(config, pool, Backends::hosted()))
    }

    pub fn with_backends(config: Config, pool: SqlitePool, backends: Backends) -> Self {
        Self {
            config,
            pool,
            backends,
            conversation: None,
            collection_id: None,
            last_error: None,
        }
    }

    /// Drops the conversation and its history.
    pub fn reset(&mut self) {
        self.conversation = None;
        self.collection_id = None;
    }

    pub fn is_active(&self) -> bool {
        self.conversation.is_some()
    }

    /// Turns of the active conversation; `None` while idle.
    pub fn history(&self) -> Option<&[Turn]> {
        self.conversation.as_ref().map(|c| c.history())
    }

    /// Collection backing the active conversation.
    pub fn collection_id(&self) -> Option<&str> {
        self.collection_id.as_deref()
    }

    /// Message of the most recent failed action, cleared by the next success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Extracts, chunks, and indexes `files`, then starts a fresh conversation.
    ///
    /// The session is reset before any work starts. On failure it stays idle
    /// and the error is also kept in [`Session::last_error`].
    pub async fn process(&mut self, files: &[UploadedFile]) -> Result<ProcessSummary> {
        self.reset();
        let result = self.build(files).await;
        self.record(&result);
        let (summary, conversation) = result?;

        info!(
            collection = %summary.collection_id,
            files = summary.files,
            chunks = summary.chunks,
            "documents processed"
        );
        self.collection_id = Some(summary.collection_id.clone());
        self.conversation = Some(conversation);
        Ok(summary)
    }

    async fn build(&self, files: &[UploadedFile]) -> Result<(ProcessSummary, Conversation)> {
        if files.is_empty() {
            return Err(Error::NoDocuments("no PDF files were uploaded".to_string()));
        }

        let text = extract_documents(files)?;
        let chunks = chunk_text(&text, &self.config.chunking);
        if chunks.is_empty() {
            return Err(Error::NoDocuments(
                "the uploaded documents contain no extractable text".to_string(),
            ));
        }

        let embedder = (self.backends.embedder)(&self.config.embedding)?;
        let llm = (self.backends.chat)(&self.config.chat)?;

        let index = VectorIndex::build(
            self.pool.clone(),
            embedder,
            &chunks,
            self.config.embedding.batch_size,
        )
        .await?;

        let summary = ProcessSummary {
            collection_id: index.collection_id().to_string(),
            files: files.len(),
            characters: text.chars().count(),
            chunks: chunks.len(),
        };
        let conversation = Conversation::new(Arc::new(index), llm, self.config.chat.top_k);
        Ok((summary, conversation))
    }

    /// Starts a fresh conversation over a collection built by an earlier run.
    pub async fn resume(&mut self, collection_id: &str) -> Result<()> {
        self.reset();
        let result = self.open_collection(collection_id).await;
        self.record(&result);
        let conversation = result?;

        self.collection_id = Some(collection_id.to_string());
        self.conversation = Some(conversation);
        Ok(())
    }

    async fn open_collection(&self, collection_id: &str) -> Result<Conversation> {
        let embedder = (self.backends.embedder)(&self.config.embedding)?;
        let llm = (self.backends.chat)(&self.config.chat)?;
        let index = VectorIndex::open(self.pool.clone(), embedder, collection_id).await?;
        Ok(Conversation::new(
            Arc::new(index),
            llm,
            self.config.chat.top_k,
        ))
    }

    /// Asks the active conversation a question.
    ///
    /// # Errors
    ///
    /// [`Error::NotProcessed`] while idle; the session stays idle.
    pub async fn ask(&mut self, question: &str) -> Result<Answer> {
        let result = match self.conversation.as_mut() {
            Some(conversation) => conversation.ask(question).await,
            None => Err(Error::NotProcessed),
        };
        self.record(&result);
        result
    }

    fn record<T>(&mut self, result: &Result<T>) {
        match result {
            Ok(_) => self.last_error = None,
            Err(e) => {
                warn!(error = %e, "session action failed");
                self.last_error = Some(e.to_string());
            }
        }
    }
}
