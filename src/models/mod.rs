// Toxiscan Data Models
// Units of analysis, score maps, verdicts and report records

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label name -> probability in [0.0, 1.0].
pub type LabelScoreMap = BTreeMap<String, f64>;

/// Label name -> 0|1 flag as returned by the toxicity service.
pub type BinaryLabels = BTreeMap<String, u8>;

pub const TOXICITY_LABELS: [&str; 6] = [
    "toxic",
    "severe_toxic",
    "obscene",
    "threat",
    "insult",
    "identity_hate",
];

// ============ Text Units ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    Sentence,
    Chunk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextUnit {
    pub index: usize,
    pub source: String,
    pub kind: UnitKind,
    pub text: String,
}

// ============ Thresholds & Verdicts ============

/// Per-label thresholds. A label missing from the table has threshold 0.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThresholdTable(BTreeMap<String, f64>);

impl ThresholdTable {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Same threshold for every toxicity label.
    pub fn uniform(value: f64) -> Self {
        TOXICITY_LABELS.iter().map(|l| (*l, value)).collect()
    }

    pub fn threshold(&self, label: &str) -> f64 {
        self.0.get(label).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, label: impl Into<String>, value: f64) {
        self.0.insert(label.into(), value);
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Binary flag per scored label: 1 when the score meets its threshold.
    pub fn flags(&self, scores: &LabelScoreMap) -> BinaryLabels {
        scores
            .iter()
            .map(|(label, score)| (label.clone(), u8::from(*score >= self.threshold(label))))
            .collect()
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::uniform(0.3)
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for ThresholdTable {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SeverityVerdict {
    None,
    Mild,
    High,
    Max,
}

impl SeverityVerdict {
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => Self::None,
            1 => Self::Mild,
            2 => Self::High,
            _ => Self::Max,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Mild => "MILD",
            Self::High => "HIGH",
            Self::Max => "MAX",
        }
    }
}

impl fmt::Display for SeverityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Classifier Outputs ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToxicityScores {
    pub predictions: LabelScoreMap,
    pub labels: BinaryLabels,
}

impl ToxicityScores {
    /// All-zero scores over the given labels.
    pub fn zeroed<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let mut out = Self::default();
        for label in labels {
            out.predictions.insert(label.to_string(), 0.0);
            out.labels.insert(label.to_string(), 0);
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryScores {
    /// Highest ranked candidate label; empty when the call degraded.
    pub top_label: String,
    pub scores: LabelScoreMap,
}

impl CategoryScores {
    pub fn zeroed(candidate_labels: &[String]) -> Self {
        Self {
            top_label: String::new(),
            scores: candidate_labels.iter().map(|l| (l.clone(), 0.0)).collect(),
        }
    }
}

/// Outcome of a classifier call. `Degraded` carries zero scores and the
/// failure reason so callers never mistake a failure for a clean result.
#[derive(Debug, Clone, PartialEq)]
pub enum Scored<T> {
    Ok(T),
    Degraded { scores: T, reason: String },
}

impl<T> Scored<T> {
    pub fn value(&self) -> &T {
        match self {
            Self::Ok(v) => v,
            Self::Degraded { scores, .. } => scores,
        }
    }

    pub fn into_parts(self) -> (T, Option<String>) {
        match self {
            Self::Ok(v) => (v, None),
            Self::Degraded { scores, reason } => (scores, Some(reason)),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Ok(_) => None,
            Self::Degraded { reason, .. } => Some(reason),
        }
    }
}

// ============ Pipeline Options ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitMode {
    #[default]
    Sentence,
    Chunk,
}

impl UnitMode {
    pub fn parse(val: &str) -> Option<Self> {
        match val.trim().to_lowercase().as_str() {
            "sentence" | "sentences" => Some(Self::Sentence),
            "chunk" | "chunks" => Some(Self::Chunk),
            _ => None,
        }
    }
}

/// How per-chunk scores of one unit are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkPolicy {
    /// Mean score per label, then threshold.
    #[default]
    Average,
    /// Label counts when any chunk met its threshold.
    AnyChunk,
}

impl ChunkPolicy {
    pub fn parse(val: &str) -> Option<Self> {
        match val.trim().to_lowercase().as_str() {
            "average" | "avg" | "mean" => Some(Self::Average),
            "any" | "any_chunk" | "any-chunk" | "max" => Some(Self::AnyChunk),
            _ => None,
        }
    }
}

/// What to do with a unit whose toxicity call degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    MarkError,
    Skip,
}

/// Zero-shot candidate label and the short key used in report columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLabel {
    pub label: String,
    pub key: String,
}

impl CategoryLabel {
    pub fn new(label: &str, key: &str) -> Self {
        Self {
            label: label.to_string(),
            key: key.to_string(),
        }
    }
}

pub fn default_categories() -> Vec<CategoryLabel> {
    vec![
        CategoryLabel::new("xenophobic language", "xenophobic"),
        CategoryLabel::new("misinformation", "misinformation"),
        CategoryLabel::new("neutral", "neutral"),
    ]
}

// ============ Records & Report ============

pub const ERROR_LEVEL: &str = "ERROR";

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub unit: TextUnit,
    pub toxicity: ToxicityScores,
    pub verdict: SeverityVerdict,
    pub toxicity_error: Option<String>,
    pub category: Option<CategoryScores>,
    pub category_error: Option<String>,
    /// Number of model-sized chunks the unit was scored in.
    pub chunk_count: usize,
}

impl AnalysisRecord {
    /// Verdict name, or `ERROR` when the toxicity call degraded.
    pub fn toxicity_level(&self) -> &str {
        if self.toxicity_error.is_some() {
            ERROR_LEVEL
        } else {
            self.verdict.as_str()
        }
    }

    pub fn predicted_label(&self) -> &str {
        match (&self.category, &self.category_error) {
            (_, Some(_)) => ERROR_LEVEL,
            (Some(c), None) => c.top_label.as_str(),
            (None, None) => "",
        }
    }

    pub fn category_score(&self, label: &str) -> f64 {
        self.category
            .as_ref()
            .and_then(|c| c.scores.get(label).copied())
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total: usize,
    pub none: usize,
    pub mild: usize,
    pub high: usize,
    pub max: usize,
    pub errors: usize,
}

/// Records of one analysis run, in source order.
#[derive(Debug, Clone)]
pub struct Report {
    pub source: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub categories: Vec<CategoryLabel>,
    records: Vec<AnalysisRecord>,
}

impl Report {
    pub fn new(source: impl Into<String>, categories: Vec<CategoryLabel>) -> Self {
        Self {
            source: source.into(),
            created_at: chrono::Utc::now(),
            categories,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: AnalysisRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[AnalysisRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary {
            total: self.records.len(),
            ..Default::default()
        };
        for record in &self.records {
            if record.toxicity_error.is_some() {
                summary.errors += 1;
                continue;
            }
            match record.verdict {
                SeverityVerdict::None => summary.none += 1,
                SeverityVerdict::Mild => summary.mild += 1,
                SeverityVerdict::High => summary.high += 1,
                SeverityVerdict::Max => summary.max += 1,
            }
        }
        summary
    }
}

/// Whole-document toxicity, as shown on the results view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentToxicity {
    pub predictions: LabelScoreMap,
    pub labels: BinaryLabels,
    pub verdict: SeverityVerdict,
    pub policy: ChunkPolicy,
    pub chunk_count: usize,
    pub degraded_chunks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_from_count() {
        assert_eq!(SeverityVerdict::from_count(0), SeverityVerdict::None);
        assert_eq!(SeverityVerdict::from_count(1), SeverityVerdict::Mild);
        assert_eq!(SeverityVerdict::from_count(2), SeverityVerdict::High);
        assert_eq!(SeverityVerdict::from_count(3), SeverityVerdict::Max);
        assert_eq!(SeverityVerdict::from_count(6), SeverityVerdict::Max);
    }

    #[test]
    fn test_verdict_serializes_uppercase() {
        let json = serde_json::to_string(&SeverityVerdict::High).unwrap();
        assert_eq!(json, "\"HIGH\"");
        let parsed: SeverityVerdict = serde_json::from_str("\"MAX\"").unwrap();
        assert_eq!(parsed, SeverityVerdict::Max);
    }

    #[test]
    fn test_threshold_table_missing_label_defaults_to_zero() {
        let table: ThresholdTable = [("toxic", 0.3)].into_iter().collect();
        assert_eq!(table.threshold("toxic"), 0.3);
        assert_eq!(table.threshold("threat"), 0.0);
    }

    #[test]
    fn test_threshold_flags() {
        let table = ThresholdTable::uniform(0.5);
        let scores: LabelScoreMap = [("toxic".to_string(), 0.7), ("insult".to_string(), 0.2)]
            .into_iter()
            .collect();
        let flags = table.flags(&scores);
        assert_eq!(flags["toxic"], 1);
        assert_eq!(flags["insult"], 0);
    }

    #[test]
    fn test_record_levels() {
        let record = AnalysisRecord {
            unit: TextUnit {
                index: 0,
                source: "doc".to_string(),
                kind: UnitKind::Sentence,
                text: "Hi.".to_string(),
            },
            toxicity: ToxicityScores::zeroed(TOXICITY_LABELS),
            verdict: SeverityVerdict::None,
            toxicity_error: Some("connection refused".to_string()),
            category: None,
            category_error: None,
            chunk_count: 1,
        };
        assert_eq!(record.toxicity_level(), "ERROR");
        assert_eq!(record.predicted_label(), "");
        assert_eq!(record.category_score("neutral"), 0.0);
    }

    #[test]
    fn test_summary_counts() {
        let mut report = Report::new("doc", default_categories());
        for (i, verdict) in [SeverityVerdict::None, SeverityVerdict::High, SeverityVerdict::High]
            .into_iter()
            .enumerate()
        {
            report.push(AnalysisRecord {
                unit: TextUnit {
                    index: i,
                    source: "doc".to_string(),
                    kind: UnitKind::Sentence,
                    text: format!("Sentence {}.", i),
                },
                toxicity: ToxicityScores::default(),
                verdict,
                toxicity_error: None,
                category: None,
                category_error: None,
                chunk_count: 1,
            });
        }
        let summary = report.summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.none, 1);
        assert_eq!(summary.high, 2);
        assert_eq!(summary.errors, 0);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(ChunkPolicy::parse("any"), Some(ChunkPolicy::AnyChunk));
        assert_eq!(ChunkPolicy::parse("Average"), Some(ChunkPolicy::Average));
        assert_eq!(ChunkPolicy::parse("median"), None);
        assert_eq!(UnitMode::parse("chunks"), Some(UnitMode::Chunk));
    }
}
