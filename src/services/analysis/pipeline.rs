// Analysis Pipeline
// Segmentation -> per-unit classification -> severity -> report.
// Units are processed strictly one at a time, in source order.

use crate::models::{
    AnalysisRecord, CategoryLabel, ChunkPolicy, FailurePolicy, Report, Scored, ThresholdTable,
    ToxicityScores, UnitMode,
};
use crate::services::text_processor::{chunk_text, chunk_units, sentence_units};
use std::time::Instant;
use tracing::{info, warn};

use super::adapter::ClassificationAdapter;
use super::aggregation::combine_chunk_scores;
use super::severity::aggregate;
use super::AnalysisError;

/// Validated pipeline options.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub unit_mode: UnitMode,
    pub chunk_size: usize,
    pub chunk_policy: ChunkPolicy,
    pub thresholds: ThresholdTable,
    pub categories: Vec<CategoryLabel>,
    pub score_categories: bool,
    pub on_failure: FailurePolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            unit_mode: UnitMode::Sentence,
            chunk_size: 400,
            chunk_policy: ChunkPolicy::Average,
            thresholds: ThresholdTable::default(),
            categories: crate::models::default_categories(),
            score_categories: true,
            on_failure: FailurePolicy::MarkError,
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.thresholds.is_empty() {
            return Err(AnalysisError::InvalidConfiguration(
                "threshold table has no labels".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(AnalysisError::InvalidConfiguration(
                "chunk size must be positive".to_string(),
            ));
        }
        for label in self.thresholds.labels() {
            let t = self.thresholds.threshold(label);
            if !(0.0..=1.0).contains(&t) {
                return Err(AnalysisError::InvalidConfiguration(format!(
                    "threshold for '{}' must be within [0, 1], got {}",
                    label, t
                )));
            }
        }
        if self.score_categories && self.categories.is_empty() {
            return Err(AnalysisError::InvalidConfiguration(
                "category scoring enabled without candidate labels".to_string(),
            ));
        }
        Ok(())
    }
}

pub struct AnalysisPipeline {
    adapter: ClassificationAdapter,
    settings: PipelineSettings,
    candidate_labels: Vec<String>,
}

impl AnalysisPipeline {
    /// Fails fast on invalid settings, before any text is processed.
    pub fn new(adapter: ClassificationAdapter, settings: PipelineSettings) -> Result<Self, AnalysisError> {
        settings.validate()?;
        if settings.score_categories && !adapter.has_categories() {
            return Err(AnalysisError::InvalidConfiguration(
                "category scoring enabled but no category scorer configured".to_string(),
            ));
        }
        let candidate_labels = settings.categories.iter().map(|c| c.label.clone()).collect();
        Ok(Self {
            adapter,
            settings,
            candidate_labels,
        })
    }

    /// Analyze one document. Per-unit classifier failures never abort the run.
    pub async fn analyze(&self, source: &str, text: &str) -> Result<Report, AnalysisError> {
        if text.trim().is_empty() {
            return Err(AnalysisError::EmptyInput);
        }

        let started = Instant::now();
        let units = match self.settings.unit_mode {
            UnitMode::Sentence => sentence_units(source, text),
            UnitMode::Chunk => chunk_units(source, text, self.settings.chunk_size)?,
        };
        info!(
            source,
            units = units.len(),
            mode = ?self.settings.unit_mode,
            policy = ?self.settings.chunk_policy,
            "pipeline.start"
        );

        let mut report = Report::new(source, self.settings.categories.clone());
        let mut skipped = 0;

        for unit in units {
            if unit.text.trim().is_empty() {
                continue;
            }

            let pieces = chunk_text(&unit.text, self.settings.chunk_size)?;
            let chunk_count = pieces.len();
            let mut chunk_scores: Vec<ToxicityScores> = Vec::with_capacity(chunk_count);
            let mut toxicity_error: Option<String> = None;
            for piece in pieces {
                let (scores, error) = self.adapter.score_toxicity(piece).await.into_parts();
                if toxicity_error.is_none() {
                    toxicity_error = error;
                }
                chunk_scores.push(scores);
            }

            if toxicity_error.is_some() && self.settings.on_failure == FailurePolicy::Skip {
                warn!(index = unit.index, "pipeline.unit_skipped");
                skipped += 1;
                continue;
            }

            let toxicity = combine_chunk_scores(
                &chunk_scores,
                self.settings.chunk_policy,
                &self.settings.thresholds,
            );
            let verdict = aggregate(&toxicity.predictions, &self.settings.thresholds);

            let (category, category_error) = if self.settings.score_categories {
                match self.adapter.score_categories(&unit.text, &self.candidate_labels).await {
                    Scored::Ok(scores) => (Some(scores), None),
                    Scored::Degraded { scores, reason } => (Some(scores), Some(reason)),
                }
            } else {
                (None, None)
            };

            report.push(AnalysisRecord {
                unit,
                toxicity,
                verdict,
                toxicity_error,
                category,
                category_error,
                chunk_count,
            });
        }

        let summary = report.summary();
        info!(
            source,
            records = summary.total,
            skipped,
            errors = summary.errors,
            mild = summary.mild,
            high = summary.high,
            max = summary.max,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline.completed"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SeverityVerdict, UnitKind};
    use crate::services::analysis::adapter::tests::{labels, FixedToxicity, KeywordCategories};
    use std::sync::Arc;

    const EXAMPLE: &str = "You are wonderful. Go back to your country, you don't belong here.";

    fn example_scorer() -> FixedToxicity {
        FixedToxicity::default()
            .with("You are wonderful.", &[("toxic", 0.01), ("insult", 0.02)])
            .with(
                "Go back to your country, you don't belong here.",
                &[
                    ("toxic", 0.82),
                    ("insult", 0.4),
                    ("threat", 0.05),
                    ("obscene", 0.01),
                    ("severe_toxic", 0.02),
                    ("identity_hate", 0.2),
                ],
            )
    }

    fn pipeline(scorer: FixedToxicity, settings: PipelineSettings) -> AnalysisPipeline {
        let adapter = ClassificationAdapter::new(Arc::new(scorer), labels())
            .with_categories(Arc::new(KeywordCategories));
        AnalysisPipeline::new(adapter, settings).unwrap()
    }

    #[tokio::test]
    async fn test_example_end_to_end() {
        let p = pipeline(example_scorer(), PipelineSettings::default());
        let report = p.analyze("example.txt", EXAMPLE).await.unwrap();

        assert_eq!(report.len(), 2);
        let records = report.records();
        assert_eq!(records[0].unit.index, 0);
        assert_eq!(records[0].verdict, SeverityVerdict::None);
        assert_eq!(records[1].verdict, SeverityVerdict::High);
        assert_eq!(records[1].toxicity_level(), "HIGH");
        assert_eq!(records[1].predicted_label(), "xenophobic language");
        assert_eq!(records[1].unit.kind, UnitKind::Sentence);
        assert_eq!(records[1].chunk_count, 1);
        // flags follow the configured thresholds, not the service's own
        assert_eq!(records[1].toxicity.labels["toxic"], 1);
        assert_eq!(records[1].toxicity.labels["insult"], 1);
        assert_eq!(records[1].toxicity.labels["threat"], 0);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let p = pipeline(example_scorer(), PipelineSettings::default());
        assert!(matches!(p.analyze("x", " \n\t").await, Err(AnalysisError::EmptyInput)));
    }

    #[test]
    fn test_invalid_settings_fail_fast() {
        let adapter = ClassificationAdapter::new(Arc::new(FixedToxicity::default()), labels());
        let settings = PipelineSettings {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            AnalysisPipeline::new(adapter, settings),
            Err(AnalysisError::InvalidConfiguration(_))
        ));

        let mut thresholds = ThresholdTable::default();
        thresholds.set("toxic", 1.5);
        let settings = PipelineSettings {
            thresholds,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = PipelineSettings {
            thresholds: ThresholdTable::new(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_category_scoring_requires_scorer() {
        let adapter = ClassificationAdapter::new(Arc::new(FixedToxicity::default()), labels());
        assert!(matches!(
            AnalysisPipeline::new(adapter, PipelineSettings::default()),
            Err(AnalysisError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_unit_is_marked_not_aborting() {
        let scorer = example_scorer().failing_on("You are wonderful.");
        let p = pipeline(scorer, PipelineSettings::default());
        let report = p.analyze("example.txt", EXAMPLE).await.unwrap();

        assert_eq!(report.len(), 2);
        assert_eq!(report.records()[0].toxicity_level(), "ERROR");
        assert!(report.records()[0].toxicity_error.is_some());
        assert_eq!(report.records()[1].verdict, SeverityVerdict::High);
        assert_eq!(report.summary().errors, 1);
    }

    #[tokio::test]
    async fn test_failed_unit_skipped_when_configured() {
        let scorer = example_scorer().failing_on("You are wonderful.");
        let settings = PipelineSettings {
            on_failure: FailurePolicy::Skip,
            ..Default::default()
        };
        let report = pipeline(scorer, settings).analyze("example.txt", EXAMPLE).await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report.records()[0].unit.index, 1);
    }

    #[tokio::test]
    async fn test_long_sentence_is_chunked_and_combined() {
        let scorer = FixedToxicity::default()
            .with("aaaaa", &[("toxic", 0.99)])
            .with("bbbbb", &[("toxic", 0.0)])
            .with("c.", &[("toxic", 0.0)]);
        let base = PipelineSettings {
            chunk_size: 5,
            score_categories: false,
            ..Default::default()
        };

        let avg = pipeline(scorer, base.clone()).analyze("d", "aaaaabbbbbc.").await.unwrap();
        let record = &avg.records()[0];
        assert_eq!(record.chunk_count, 3);
        assert!((record.toxicity.predictions["toxic"] - 0.33).abs() < 1e-9);
        assert_eq!(record.verdict, SeverityVerdict::Mild);
        assert!(record.category.is_none());

        let scorer = FixedToxicity::default()
            .with("aaaaa", &[("toxic", 0.99)])
            .with("bbbbb", &[("toxic", 0.0)])
            .with("c.", &[("toxic", 0.0)]);
        let any = pipeline(
            scorer,
            PipelineSettings {
                chunk_policy: ChunkPolicy::AnyChunk,
                ..base
            },
        )
        .analyze("d", "aaaaabbbbbc.")
        .await
        .unwrap();
        assert_eq!(any.records()[0].toxicity.predictions["toxic"], 0.99);
        assert_eq!(any.records()[0].toxicity.labels["toxic"], 1);
    }

    #[tokio::test]
    async fn test_flags_agree_for_short_and_long_units() {
        let scorer = FixedToxicity::default()
            .with("Hi.", &[("toxic", 0.4)])
            .with("Short", &[("toxic", 0.4)])
            .with(" one.", &[("toxic", 0.4)]);
        let settings = PipelineSettings {
            chunk_size: 5,
            score_categories: false,
            ..Default::default()
        };
        let report = pipeline(scorer, settings).analyze("d", "Hi. Short one.").await.unwrap();

        let records = report.records();
        assert_eq!(records[0].chunk_count, 1);
        assert_eq!(records[1].chunk_count, 2);
        assert_eq!(records[0].toxicity.labels["toxic"], 1);
        assert_eq!(records[0].toxicity.labels, records[1].toxicity.labels);
        assert_eq!(records[0].verdict, records[1].verdict);
    }

    #[tokio::test]
    async fn test_one_degraded_chunk_marks_unit_error() {
        for (policy, expected) in [(ChunkPolicy::Average, 0.45), (ChunkPolicy::AnyChunk, 0.9)] {
            let scorer = FixedToxicity::default()
                .with("aaaaa", &[("toxic", 0.9)])
                .failing_on("bbbbb");
            let settings = PipelineSettings {
                chunk_size: 5,
                chunk_policy: policy,
                score_categories: false,
                ..Default::default()
            };
            let report = pipeline(scorer, settings).analyze("d", "aaaaabbbbb").await.unwrap();

            let record = &report.records()[0];
            assert_eq!(record.chunk_count, 2);
            assert_eq!(record.toxicity_level(), "ERROR");
            assert!(record.toxicity_error.is_some());
            // the degraded chunk still contributes its zeros
            assert!((record.toxicity.predictions["toxic"] - expected).abs() < 1e-9);
            assert_eq!(record.toxicity.predictions["insult"], 0.0);
        }
    }

    #[tokio::test]
    async fn test_chunk_mode_units() {
        let settings = PipelineSettings {
            unit_mode: UnitMode::Chunk,
            chunk_size: 10,
            ..Default::default()
        };
        let report = pipeline(FixedToxicity::default(), settings)
            .analyze("d", "0123456789abcdefghijKLM")
            .await
            .unwrap();
        assert_eq!(report.len(), 3);
        assert!(report.records().iter().all(|r| r.unit.kind == UnitKind::Chunk));
        assert_eq!(report.records()[2].unit.text, "KLM");
        assert_eq!(report.records()[2].unit.index, 2);
    }

    #[tokio::test]
    async fn test_units_scored_in_order() {
        let scorer = Arc::new(FixedToxicity::default());
        let adapter = ClassificationAdapter::new(scorer.clone(), labels());
        let settings = PipelineSettings {
            score_categories: false,
            ..Default::default()
        };
        let p = AnalysisPipeline::new(adapter, settings).unwrap();
        p.analyze("d", "First. Second. Third.").await.unwrap();
        assert_eq!(
            scorer.seen.lock().unwrap().as_slice(),
            ["First.".to_string(), "Second.".to_string(), "Third.".to_string()]
        );
    }
}
