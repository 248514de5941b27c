// Sensitivity presets
// Sensitivity selects a threshold table; it never changes raw scores.

use crate::models::{ThresholdTable, TOXICITY_LABELS};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Sensitivity {
    Low,
    Medium,
    High,
}

impl Sensitivity {
    pub fn parse(val: &str) -> Option<Self> {
        match val.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// Threshold table for a sensitivity level. Higher sensitivity flags more.
pub fn threshold_preset(sensitivity: Sensitivity) -> ThresholdTable {
    match sensitivity {
        Sensitivity::Low => [
            ("toxic", 0.8),
            ("severe_toxic", 0.5),
            ("obscene", 0.7),
            ("threat", 0.5),
            ("insult", 0.75),
            ("identity_hate", 0.6),
        ]
        .into_iter()
        .collect(),
        Sensitivity::Medium => ThresholdTable::uniform(0.5),
        Sensitivity::High => ThresholdTable::uniform(0.3),
    }
}
