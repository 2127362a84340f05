//! Document ingestion pipeline: extract text by content
//! type, chunk with overlap, batch-embed, optionally enrich each chunk with
//! surrounding context. The extractor registry reuses the same name-keyed
//! dispatch idiom as `ToolRegistry`, and chunk storage reuses
//! `memory::Store`'s namespacing rather than inventing a new one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::error::{AgentError, Result};
use crate::memory::{Namespace, Store};
use crate::provider::Provider;

/// Pulls plain text out of a document's raw bytes for one content type.
/// Concrete extractors (PDF, HTML, DOCX, ...) are supplied
/// by the embedding application; this crate only defines the seam.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, bytes: &[u8]) -> std::result::Result<String, String>;
}

/// Extractors keyed by MIME/content-type string.
#[derive(Default, Clone)]
pub struct ExtractorRegistry {
    extractors: HashMap<String, Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, content_type: impl Into<String>, extractor: Arc<dyn Extractor>) {
        self.extractors.insert(content_type.into(), extractor);
    }

    pub async fn extract(&self, content_type: &str, bytes: &[u8]) -> Result<String> {
        let extractor = self
            .extractors
            .get(content_type)
            .ok_or_else(|| AgentError::ProcessorRejected {
                stage: "ingestion_extract",
                message: format!("no extractor registered for content type {content_type:?}"),
            })?;
        extractor
            .extract(bytes)
            .await
            .map_err(|message| AgentError::ProcessorRejected {
                stage: "ingestion_extract",
                message,
            })
    }
}

#[derive(Clone, Debug)]
pub struct ChunkingConfig {
    pub chunk_size_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size_chars: 2000,
            overlap_chars: 200,
        }
    }
}

/// Splits `text` into overlapping windows. Character-based
/// rather than token-based: the rest of the pipeline only needs consistent,
/// boundaries, not exact token accounting.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = text.chars().collect();
    let step = config.chunk_size_chars.saturating_sub(config.overlap_chars).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.chunk_size_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

#[derive(Clone, Debug)]
pub struct IngestedChunk {
    pub index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Clone, Debug, Default)]
pub struct IngestionConfig {
    pub chunking: ChunkingConfig,
    /// Bounded worker pool size for the optional contextual-enrichment pass.
    pub enrichment_concurrency: usize,
}

/// Adds surrounding-document context to a chunk before embedding.
#[async_trait]
pub trait ChunkEnricher: Send + Sync {
    async fn enrich(&self, chunk: &str, document_text: &str) -> std::result::Result<String, String>;
}

pub struct IngestionPipeline {
    pub extractors: ExtractorRegistry,
    pub provider: Arc<dyn Provider>,
    pub store: Arc<dyn Store>,
    pub config: IngestionConfig,
    pub enricher: Option<Arc<dyn ChunkEnricher>>,
}

impl IngestionPipeline {
    pub fn new(
        extractors: ExtractorRegistry,
        provider: Arc<dyn Provider>,
        store: Arc<dyn Store>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            extractors,
            provider,
            store,
            config,
            enricher: None,
        }
    }

    pub fn with_enricher(mut self, enricher: Arc<dyn ChunkEnricher>) -> Self {
        self.enricher = enricher.into();
        self
    }

    /// Runs the full pipeline: extract -> chunk -> (optional) enrich ->
    /// batch-embed -> store each chunk under `namespace`.
    /// A single chunk's enrichment failure is logged and the chunk falls
    /// back to its un-enriched text rather than aborting the whole document.
    pub async fn ingest(
        &self,
        document_id: &str,
        content_type: &str,
        bytes: &[u8],
        namespace: Namespace,
    ) -> Result<Vec<IngestedChunk>> {
        let text = self.extractors.extract(content_type, bytes).await?;
        let raw_chunks = chunk_text(&text, &self.config.chunking);
        if raw_chunks.is_empty() {
            return Ok(Vec::new());
        }

        let enriched = self.enrich_all(&raw_chunks, &text).await;

        let embeddings = self
            .provider
            .embed(&enriched)
            .await
            .map_err(AgentError::Provider)?;

        let mut chunks = Vec::with_capacity(enriched.len());
        for (index, (text, embedding)) in enriched.into_iter().zip(embeddings).enumerate() {
            let chunk_key = format!("{document_id}#{index}");
            let value = serde_json::json!({
                "document_id": document_id,
                "index": index,
                "text": text,
                "embedding": embedding,
            });
            self.store
                .put(&namespace, &chunk_key, &value)
                .await
                .map_err(|e| AgentError::ProcessorRejected {
                    stage: "ingestion_store",
                    message: e.to_string(),
                })?;
            chunks.push(IngestedChunk { index, text, embedding });
        }

        Ok(chunks)
    }

    async fn enrich_all(&self, raw_chunks: &[String], document_text: &str) -> Vec<String> {
        let Some(enricher) = &self.enricher else {
            return raw_chunks.to_vec();
        };
        let concurrency = self.config.enrichment_concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));

        let futures = raw_chunks.iter().map(|chunk| {
            let enricher = enricher.clone();
            let semaphore = semaphore.clone();
            let chunk = chunk.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                match enricher.enrich(&chunk, document_text).await {
                    Ok(enriched) => enriched,
                    Err(message) => {
                        tracing::warn!(error = %message, "chunk enrichment failed, using raw chunk text");
                        chunk
                    }
                }
            }
        });

        futures::future::join_all(futures).await
    }
}
