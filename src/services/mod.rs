// Toxiscan Core Services

pub mod text_processor;
pub mod config_store;
pub mod providers;
pub mod analysis;
pub mod report;

pub use text_processor::*;
pub use config_store::*;
pub use providers::*;

pub use analysis::{
    aggregate,
    combine_chunk_scores,
    count_exceeding,
    score_document,
    threshold_preset,
    translate_to_english,
    AnalysisError,
    AnalysisPipeline,
    CategoryScorer,
    ClassificationAdapter,
    PipelineSettings,
    Sensitivity,
    ToxicityScorer,
    Translator,
};
pub use report::{Export, ExportedFiles, JsonRecord, ReportError};
