// Analysis Module
// Content-classification pipeline organized into specialized submodules:
// - adapter: model service boundary (toxicity, zero-shot) with timeout/retry/degrade
// - severity: label scores + thresholds -> severity verdict
// - sensitivity: named threshold presets
// - aggregation: combining per-chunk scores, whole-document scoring
// - translation: chunked translation to English
// - pipeline: segmentation -> classification -> report

pub mod adapter;
pub mod aggregation;
pub mod pipeline;
pub mod sensitivity;
pub mod severity;
pub mod translation;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("nothing to analyze: input text is empty")]
    EmptyInput,
    #[error("classifier unavailable: {0}")]
    ClassifierUnavailable(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("report serialization failed: {0}")]
    SerializationFailure(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub use adapter::{CategoryScorer, ClassificationAdapter, ToxicityScorer};
pub use aggregation::{combine_chunk_scores, score_document};
pub use pipeline::{AnalysisPipeline, PipelineSettings};
pub use sensitivity::{threshold_preset, Sensitivity};
pub use severity::{aggregate, count_exceeding};
pub use translation::{translate_to_english, Translator};
