// Aggregation Logic
// Combines per-chunk toxicity scores of one unit and scores whole documents

use crate::models::{ChunkPolicy, DocumentToxicity, LabelScoreMap, Scored, ThresholdTable, ToxicityScores};
use crate::services::text_processor::chunk_text;
use std::collections::BTreeSet;
use tracing::info;

use super::adapter::ClassificationAdapter;
use super::severity::aggregate;
use super::AnalysisError;

/// Combine the chunk scores of a single unit.
///
/// Combined scores are the per-label mean (`Average`) or max (`AnyChunk`);
/// a single chunk keeps its scores. Binary flags are always recomputed
/// against `thresholds`, so flags agree with the severity verdict whatever
/// the unit length. A label missing from a chunk counts as 0.0.
pub fn combine_chunk_scores(
    chunks: &[ToxicityScores],
    policy: ChunkPolicy,
    thresholds: &ThresholdTable,
) -> ToxicityScores {
    let predictions: LabelScoreMap = match chunks {
        [] => return ToxicityScores::default(),
        [only] => only.predictions.clone(),
        _ => {
            let labels: BTreeSet<&String> = chunks.iter().flat_map(|c| c.predictions.keys()).collect();
            labels
                .into_iter()
                .map(|label| {
                    let values = chunks
                        .iter()
                        .map(|c| c.predictions.get(label).copied().unwrap_or(0.0));
                    let combined = match policy {
                        ChunkPolicy::Average => values.sum::<f64>() / chunks.len() as f64,
                        ChunkPolicy::AnyChunk => values.fold(0.0, f64::max),
                    };
                    (label.clone(), combined)
                })
                .collect()
        }
    };
    let labels = thresholds.flags(&predictions);
    ToxicityScores { predictions, labels }
}

/// Score a whole document: chunk, score every chunk, combine per policy.
pub async fn score_document(
    adapter: &ClassificationAdapter,
    text: &str,
    chunk_size: usize,
    policy: ChunkPolicy,
    thresholds: &ThresholdTable,
) -> Result<DocumentToxicity, AnalysisError> {
    let chunks = chunk_text(text, chunk_size)?;
    if text.trim().is_empty() {
        return Err(AnalysisError::EmptyInput);
    }

    let mut scored = Vec::with_capacity(chunks.len());
    let mut degraded_chunks = 0;
    for chunk in &chunks {
        match adapter.score_toxicity(chunk).await {
            Scored::Ok(scores) => scored.push(scores),
            Scored::Degraded { scores, .. } => {
                degraded_chunks += 1;
                scored.push(scores);
            }
        }
    }

    let combined = combine_chunk_scores(&scored, policy, thresholds);
    let verdict = aggregate(&combined.predictions, thresholds);

    info!(
        chunks = chunks.len(),
        degraded_chunks,
        verdict = %verdict,
        policy = ?policy,
        "document.scored"
    );

    Ok(DocumentToxicity {
        predictions: combined.predictions,
        labels: combined.labels,
        verdict,
        policy,
        chunk_count: chunks.len(),
        degraded_chunks,
    })
}
