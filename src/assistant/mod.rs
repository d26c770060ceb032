// Question-answering pipeline
// Owns the catalog chunks, the course index and the chat model


pub mod prompt;

pub use prompt::{SYSTEM_PERSONA, build_user_prompt};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::catalog::load_course_records;
use crate::chunking::{CourseChunk, build_chunks};
use crate::config::Config;
use crate::database::{CourseIndex, InsertOutcome};
use crate::provider::{ChatModel, Embedder};
use crate::stats::CatalogStats;
use crate::{DandoriError, Result};

pub const EMPTY_MESSAGE_ERROR: &str = "No message provided";

/// Retrieval-augmented answering over the course catalog.
///
/// Built once at startup and shared behind an `Arc`; queries only need `&self`.
pub struct CourseAssistant {
    chunks: Vec<CourseChunk>,
    index: CourseIndex,
    chat: Arc<dyn ChatModel>,
    catalog_path: PathBuf,
    top_k: usize,
    ingest: InsertOutcome,
}

impl fmt::Debug for CourseAssistant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CourseAssistant")
            .field("courses", &self.chunks.len())
            .field("index", &self.index)
            .field("catalog_path", &self.catalog_path)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl CourseAssistant {
    /// Load the catalog, open the index and ingest it when the index is empty.
    ///
    /// Any catalog, provider or storage failure aborts initialization.
    #[inline]
    pub async fn initialize(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
    ) -> Result<Self> {
        info!("Initialising RAG system...");

        let catalog_path = config.catalog_path().to_path_buf();
        let records = load_course_records(&catalog_path)?;
        let chunks = build_chunks(&records);
        info!(
            "Loaded {} courses from {}",
            chunks.len(),
            catalog_path.display()
        );

        let mut index = CourseIndex::open_or_create(config, embedder).await?;
        let ingest = index.insert_if_empty(&chunks).await?;

        match ingest {
            InsertOutcome::Inserted(n) => info!("Indexed {} course chunks", n),
            InsertOutcome::Skipped(n) => info!("Reusing existing index with {} rows", n),
        }

        Ok(Self {
            chunks,
            index,
            chat,
            catalog_path,
            top_k: config.index.top_k,
            ingest,
        })
    }

    /// Answer one question.
    ///
    /// Blank messages are rejected before any provider call.
    #[inline]
    pub async fn query(&self, message: &str) -> Result<String> {
        if message.trim().is_empty() {
            return Err(DandoriError::Validation(EMPTY_MESSAGE_ERROR.to_string()));
        }

        let retrieved = self.index.query(message, self.top_k).await?;
        debug!("Retrieved {} chunks for question", retrieved.len());

        let stats = self.stats();
        let user_prompt = build_user_prompt(&stats, &retrieved, message);

        let chat = Arc::clone(&self.chat);
        let answer =
            tokio::task::spawn_blocking(move || chat.complete(SYSTEM_PERSONA, &user_prompt))
                .await??;

        debug!("Answer generated ({} chars)", answer.len());
        Ok(answer)
    }

    /// Overview figures across every loaded course.
    #[inline]
    pub fn stats(&self) -> CatalogStats {
        CatalogStats::from_chunks(&self.chunks)
    }

    #[inline]
    pub fn chunks(&self) -> &[CourseChunk] {
        &self.chunks
    }

    #[inline]
    pub fn index(&self) -> &CourseIndex {
        &self.index
    }

    #[inline]
    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    /// What startup ingestion did.
    #[inline]
    pub fn ingest_outcome(&self) -> InsertOutcome {
        self.ingest
    }
}
