// Translation
// Chunked translation to English with per-chunk fallback to the source text

use crate::services::providers::ProviderError;
use crate::services::text_processor::chunk_text;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{info, warn};

use super::AnalysisError;

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String, ProviderError>;
}

/// Translate `text` chunk by chunk and join the results with single spaces.
/// A chunk that fails or times out is kept untranslated.
pub async fn translate_to_english(
    translator: &dyn Translator,
    text: &str,
    chunk_size: usize,
    timeout: Duration,
) -> Result<String, AnalysisError> {
    let chunks = chunk_text(text, chunk_size)?;
    let mut out = Vec::with_capacity(chunks.len());
    let mut fallbacks = 0;

    for chunk in &chunks {
        match tokio::time::timeout(timeout, translator.translate(chunk)).await {
            Ok(Ok(translated)) => out.push(translated),
            Ok(Err(e)) => {
                warn!(chunk_chars = chunk.chars().count(), error = %e, "translation.chunk_failed");
                fallbacks += 1;
                out.push(chunk.to_string());
            }
            Err(_) => {
                warn!(chunk_chars = chunk.chars().count(), "translation.chunk_timeout");
                fallbacks += 1;
                out.push(chunk.to_string());
            }
        }
    }

    info!(chunks = chunks.len(), fallbacks, "translation.completed");
    Ok(out.join(" "))
}
