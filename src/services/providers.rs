// Model Service Clients
// HTTP clients for the toxicity, zero-shot and translation services

use crate::models::{CategoryScores, ToxicityScores};
use crate::services::analysis::{CategoryScorer, ToxicityScorer, Translator};
use crate::services::config_store::ServicesConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

pub const TOXICITY_DEFAULT_URL: &str = "http://127.0.0.1:5000/predict";
pub const ZERO_SHOT_DEFAULT_URL: &str = "http://127.0.0.1:5001/zero-shot";
pub const TRANSLATION_DEFAULT_URL: &str = "http://127.0.0.1:5002/translate";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing content in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    JsonError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize)]
struct ToxicityRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct ToxicityResponse {
    predictions: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    labels: BTreeMap<String, u8>,
}

#[derive(Debug, Clone, Serialize)]
struct ZeroShotRequest<'a> {
    text: &'a str,
    candidate_labels: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
struct ZeroShotResponse {
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    scores: Vec<f64>,
}

#[derive(Debug, Clone, Serialize)]
struct TranslationRequest<'a> {
    text: &'a str,
    max_length: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct TranslationResponse {
    translation_text: Option<String>,
}

/// One HTTP client shared by all model services.
pub struct ServiceClient {
    client: Client,
    toxicity_url: String,
    zero_shot_url: String,
    translation_url: String,
    translation_max_length: u32,
}

impl ServiceClient {
    /// Build from configuration (URLs, timeout and optional proxy).
    pub fn from_config(config: &ServicesConfig) -> Result<Self, ProviderError> {
        let mut builder = Client::builder().timeout(Duration::from_secs(config.timeout_secs.max(1)));
        if let Some(proxy_url) = config.proxy.as_ref().and_then(|p| p.url()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }

        Ok(Self {
            client: builder.build()?,
            toxicity_url: config.toxicity_url.clone(),
            zero_shot_url: config.zero_shot_url.clone(),
            translation_url: config.translation_url.clone(),
            translation_max_length: config.translation_max_length,
        })
    }

    async fn post_json<Req, Resp>(&self, url: &str, body: &Req) -> Result<(Resp, i64), ProviderError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let start = Instant::now();

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as i64;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: Resp = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        Ok((data, latency_ms))
    }

    pub async fn predict_toxicity(&self, text: &str) -> Result<ToxicityScores, ProviderError> {
        let (data, latency_ms): (ToxicityResponse, i64) = self
            .post_json(&self.toxicity_url, &ToxicityRequest { text })
            .await?;
        debug!(latency_ms, "toxicity.predict");

        let predictions = data.predictions.ok_or(ProviderError::MissingContent)?;
        if predictions.is_empty() {
            return Err(ProviderError::MissingContent);
        }
        if let Some((label, score)) = predictions.iter().find(|(_, s)| !(0.0..=1.0).contains(*s)) {
            return Err(ProviderError::InvalidResponse(format!(
                "score for '{}' out of range: {}",
                label, score
            )));
        }

        Ok(ToxicityScores {
            predictions,
            labels: data.labels,
        })
    }

    pub async fn zero_shot(
        &self,
        text: &str,
        candidate_labels: &[String],
    ) -> Result<CategoryScores, ProviderError> {
        let (data, latency_ms): (ZeroShotResponse, i64) = self
            .post_json(
                &self.zero_shot_url,
                &ZeroShotRequest {
                    text,
                    candidate_labels,
                },
            )
            .await?;
        debug!(latency_ms, "zero_shot.classify");

        parse_zero_shot(data)
    }

    pub async fn translate_text(&self, text: &str) -> Result<String, ProviderError> {
        let (data, latency_ms): (TranslationResponse, i64) = self
            .post_json(
                &self.translation_url,
                &TranslationRequest {
                    text,
                    max_length: self.translation_max_length,
                },
            )
            .await?;
        debug!(latency_ms, "translation.translate");

        data.translation_text.ok_or(ProviderError::MissingContent)
    }
}

fn parse_zero_shot(data: ZeroShotResponse) -> Result<CategoryScores, ProviderError> {
    if data.labels.is_empty() {
        return Err(ProviderError::MissingContent);
    }
    if data.labels.len() != data.scores.len() {
        return Err(ProviderError::InvalidResponse(format!(
            "{} labels but {} scores",
            data.labels.len(),
            data.scores.len()
        )));
    }

    // labels arrive ranked, highest first
    let top_label = data.labels[0].clone();
    let scores = data.labels.into_iter().zip(data.scores).collect();
    Ok(CategoryScores { top_label, scores })
}

#[async_trait]
impl ToxicityScorer for ServiceClient {
    async fn score(&self, text: &str) -> Result<ToxicityScores, ProviderError> {
        self.predict_toxicity(text).await
    }

    fn name(&self) -> &str {
        "http-toxicity"
    }
}

#[async_trait]
impl CategoryScorer for ServiceClient {
    async fn classify(
        &self,
        text: &str,
        candidate_labels: &[String],
    ) -> Result<CategoryScores, ProviderError> {
        self.zero_shot(text, candidate_labels).await
    }

    fn name(&self) -> &str {
        "http-zero-shot"
    }
}

#[async_trait]
impl Translator for ServiceClient {
    async fn translate(&self, text: &str) -> Result<String, ProviderError> {
        self.translate_text(text).await
    }
}
