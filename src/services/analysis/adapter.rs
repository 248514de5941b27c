// Classification Adapter
// Boundary between the pipeline and the model services. Backends are
// swappable behind the scorer traits; the adapter owns truncation, timeouts,
// bounded retry and the degraded-result contract.

use crate::models::{CategoryScores, Scored, ToxicityScores};
use crate::services::providers::ProviderError;
use crate::services::text_processor::truncate_chars;
use super::AnalysisError;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[async_trait]
pub trait ToxicityScorer: Send + Sync {
    async fn score(&self, text: &str) -> Result<ToxicityScores, ProviderError>;

    fn name(&self) -> &str;
}

#[async_trait]
pub trait CategoryScorer: Send + Sync {
    /// Score `text` against each candidate label; `top_label` is the best match.
    async fn classify(
        &self,
        text: &str,
        candidate_labels: &[String],
    ) -> Result<CategoryScores, ProviderError>;

    fn name(&self) -> &str;
}

pub struct ClassificationAdapter {
    toxicity: Arc<dyn ToxicityScorer>,
    categories: Option<Arc<dyn CategoryScorer>>,
    toxicity_labels: Vec<String>,
    max_input_chars: usize,
    timeout: Duration,
    max_attempts: usize,
}

impl ClassificationAdapter {
    /// `toxicity_labels` are the keys reported (as zeros) when a call degrades.
    pub fn new(toxicity: Arc<dyn ToxicityScorer>, toxicity_labels: Vec<String>) -> Self {
        Self {
            toxicity,
            categories: None,
            toxicity_labels,
            max_input_chars: 2000,
            timeout: Duration::from_secs(30),
            max_attempts: 1,
        }
    }

    pub fn with_categories(mut self, categories: Arc<dyn CategoryScorer>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_max_input_chars(mut self, max_chars: usize) -> Self {
        self.max_input_chars = max_chars.max(1);
        self
    }

    pub fn has_categories(&self) -> bool {
        self.categories.is_some()
    }

    pub async fn score_toxicity(&self, text: &str) -> Scored<ToxicityScores> {
        let input = truncate_chars(text, self.max_input_chars);
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self.attempt(self.toxicity.score(input)).await {
                Ok(scores) => return Scored::Ok(scores),
                Err(reason) => {
                    warn!(
                        scorer = self.toxicity.name(),
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %reason,
                        "toxicity.score_failed"
                    );
                    last_error = reason.to_string();
                }
            }
        }

        Scored::Degraded {
            scores: ToxicityScores::zeroed(self.toxicity_labels.iter().map(|l| l.as_str())),
            reason: last_error,
        }
    }

    pub async fn score_categories(
        &self,
        text: &str,
        candidate_labels: &[String],
    ) -> Scored<CategoryScores> {
        let Some(scorer) = self.categories.as_ref() else {
            return Scored::Degraded {
                scores: CategoryScores::zeroed(candidate_labels),
                reason: "no category scorer configured".to_string(),
            };
        };

        let input = truncate_chars(text, self.max_input_chars);
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match self.attempt(scorer.classify(input, candidate_labels)).await {
                Ok(scores) => return Scored::Ok(scores),
                Err(reason) => {
                    warn!(
                        scorer = scorer.name(),
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %reason,
                        "categories.score_failed"
                    );
                    last_error = reason.to_string();
                }
            }
        }

        Scored::Degraded {
            scores: CategoryScores::zeroed(candidate_labels),
            reason: last_error,
        }
    }

    async fn attempt<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, AnalysisError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(AnalysisError::ClassifierUnavailable(e.to_string())),
            Err(_) => Err(AnalysisError::ClassifierUnavailable(format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}
