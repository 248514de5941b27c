// Severity Aggregator
// Reduces a label score map against a threshold table into a verdict

use crate::models::{LabelScoreMap, SeverityVerdict, ThresholdTable};

/// Number of labels whose score meets or exceeds its threshold.
pub fn count_exceeding(scores: &LabelScoreMap, thresholds: &ThresholdTable) -> usize {
    scores
        .iter()
        .filter(|(label, score)| **score >= thresholds.threshold(label))
        .count()
}

pub fn aggregate(scores: &LabelScoreMap, thresholds: &ThresholdTable) -> SeverityVerdict {
    SeverityVerdict::from_count(count_exceeding(scores, thresholds))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(&str, f64)]) -> LabelScoreMap {
        pairs.iter().map(|(l, s)| (l.to_string(), *s)).collect()
    }

    #[test]
    fn test_empty_scores_is_none() {
        assert_eq!(aggregate(&LabelScoreMap::new(), &ThresholdTable::default()), SeverityVerdict::None);
        assert_eq!(aggregate(&LabelScoreMap::new(), &ThresholdTable::new()), SeverityVerdict::None);
    }

    #[test]
    fn test_three_labels_over_threshold_is_max() {
        let s = scores(&[("toxic", 0.9), ("insult", 0.9), ("threat", 0.9)]);
        let t: ThresholdTable = [("toxic", 0.3), ("insult", 0.3), ("threat", 0.3)].into_iter().collect();
        assert_eq!(aggregate(&s, &t), SeverityVerdict::Max);
    }

    #[test]
    fn test_below_threshold_is_none() {
        let t: ThresholdTable = [("toxic", 0.3)].into_iter().collect();
        assert_eq!(aggregate(&scores(&[("toxic", 0.2)]), &t), SeverityVerdict::None);
    }

    #[test]
    fn test_equal_to_threshold_counts() {
        let t: ThresholdTable = [("toxic", 0.3)].into_iter().collect();
        assert_eq!(aggregate(&scores(&[("toxic", 0.3)]), &t), SeverityVerdict::Mild);
    }

    #[test]
    fn test_two_labels_is_high() {
        let s = scores(&[
            ("toxic", 0.82),
            ("insult", 0.4),
            ("threat", 0.01),
            ("obscene", 0.05),
            ("severe_toxic", 0.02),
            ("identity_hate", 0.1),
        ]);
        assert_eq!(aggregate(&s, &ThresholdTable::uniform(0.3)), SeverityVerdict::High);
    }

    #[test]
    fn test_label_without_threshold_always_counts() {
        let t: ThresholdTable = [("toxic", 0.3)].into_iter().collect();
        let s = scores(&[("toxic", 0.1), ("spam", 0.0)]);
        assert_eq!(count_exceeding(&s, &t), 1);
        assert_eq!(aggregate(&s, &t), SeverityVerdict::Mild);
    }

    #[test]
    fn test_verdict_is_monotonic_in_count() {
        let t = ThresholdTable::uniform(0.5);
        let labels = ["toxic", "severe_toxic", "obscene", "threat", "insult"];
        let mut prev = SeverityVerdict::None;
        for n in 0..=labels.len() {
            let s: LabelScoreMap = labels
                .iter()
                .enumerate()
                .map(|(i, l)| (l.to_string(), if i < n { 0.9 } else { 0.1 }))
                .collect();
            let v = aggregate(&s, &t);
            assert!(v >= prev);
            prev = v;
        }
        assert_eq!(prev, SeverityVerdict::Max);
    }
}
