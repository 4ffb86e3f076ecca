use crate::aggregate::SubjectAverage;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// Deltas with an absolute value under this many percent are "stable".
pub const STABLE_BAND_PERCENT: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Trend {
    Improved,
    Declined,
    Stable,
}

pub fn classify(percent_delta: f64) -> Trend {
    if percent_delta.abs() < STABLE_BAND_PERCENT {
        Trend::Stable
    } else if percent_delta > 0.0 {
        Trend::Improved
    } else {
        Trend::Declined
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendComparison {
    pub discipline_id: String,
    pub discipline_name: String,
    pub current_average: f64,
    pub previous_average: f64,
    pub percent_delta: f64,
    pub classification: Trend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorWindow {
    pub has_comparison: bool,
    pub labels: Vec<u32>,
}

impl PriorWindow {
    fn none() -> Self {
        Self {
            has_comparison: false,
            labels: Vec::new(),
        }
    }

    /// Labels as stored, for querying.
    pub fn label_strings(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.to_string()).collect()
    }
}

/// The same number of periods immediately before the current window,
/// clipped at the first period of the year.
pub fn infer_prior_window(labels: &[u32]) -> PriorWindow {
    let current: BTreeSet<u32> = labels.iter().copied().collect();
    let Some(&min) = current.iter().next() else {
        return PriorWindow::none();
    };
    if min == 1 {
        return PriorWindow::none();
    }

    let k = current.len() as i64;
    let m = min as i64;
    let prior: Vec<u32> = (0..k)
        .map(|i| m - k + i)
        .filter(|p| *p > 0)
        .map(|p| p as u32)
        .collect();

    if prior.is_empty() {
        return PriorWindow::none();
    }
    PriorWindow {
        has_comparison: true,
        labels: prior,
    }
}

/// Pairs each current discipline with its prior average. Disciplines without
/// a positive baseline are left out.
pub fn compare(current: &[SubjectAverage], prior: &[SubjectAverage]) -> Vec<TrendComparison> {
    let baseline: HashMap<&str, f64> = prior
        .iter()
        .map(|p| (p.discipline_id.as_str(), p.average))
        .collect();

    let mut out = Vec::new();
    for c in current {
        let Some(&previous) = baseline.get(c.discipline_id.as_str()) else {
            continue;
        };
        if previous <= 0.0 {
            continue;
        }
        let percent_delta = (c.average - previous) / previous * 100.0;
        out.push(TrendComparison {
            discipline_id: c.discipline_id.clone(),
            discipline_name: c.discipline_name.clone(),
            current_average: c.average,
            previous_average: previous,
            percent_delta,
            classification: classify(percent_delta),
        });
    }
    out
}

/// "1, 2, 3" style description of a window.
pub fn describe_window(labels: &[u32]) -> String {
    let sorted: BTreeSet<u32> = labels.iter().copied().collect();
    sorted
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn avg(id: &str, average: f64) -> SubjectAverage {
        SubjectAverage {
            discipline_id: id.to_string(),
            discipline_name: id.to_uppercase(),
            scores: vec![average],
            average,
        }
    }

    #[test]
    fn first_period_has_no_prior_window() {
        assert_eq!(infer_prior_window(&[1]), PriorWindow::none());
        assert_eq!(infer_prior_window(&[1, 2, 3]), PriorWindow::none());
    }

    #[test]
    fn prior_window_is_clipped_at_year_start() {
        let w = infer_prior_window(&[2, 3]);
        assert!(w.has_comparison);
        assert_eq!(w.labels, vec![1]);
        assert_eq!(w.label_strings(), vec!["1".to_string()]);
    }

    #[test]
    fn prior_window_mirrors_window_size() {
        let w = infer_prior_window(&[6, 4, 5]);
        assert!(w.has_comparison);
        assert_eq!(w.labels, vec![1, 2, 3]);

        let single = infer_prior_window(&[4]);
        assert_eq!(single.labels, vec![3]);
    }

    #[test]
    fn duplicate_labels_count_once() {
        let w = infer_prior_window(&[3, 3]);
        assert_eq!(w.labels, vec![2]);
    }

    #[test]
    fn empty_window_has_no_comparison() {
        assert!(!infer_prior_window(&[]).has_comparison);
    }

    #[test]
    fn classification_boundaries() {
        assert_eq!(classify(0.999999), Trend::Stable);
        assert_eq!(classify(-0.999999), Trend::Stable);
        assert_eq!(classify(0.0), Trend::Stable);
        assert_eq!(classify(1.0), Trend::Improved);
        assert_eq!(classify(-1.0), Trend::Declined);
        assert_eq!(classify(42.0), Trend::Improved);
    }

    #[test]
    fn compare_computes_percent_delta() {
        let current = vec![avg("math", 8.0), avg("art", 5.0), avg("bio", 6.03)];
        let prior = vec![avg("math", 6.4), avg("art", 10.0), avg("bio", 6.0)];
        let out = compare(&current, &prior);
        assert_eq!(out.len(), 3);

        assert_eq!(out[0].discipline_id, "math");
        assert!((out[0].percent_delta - 25.0).abs() < 1e-9);
        assert_eq!(out[0].classification, Trend::Improved);

        assert!((out[1].percent_delta + 50.0).abs() < 1e-9);
        assert_eq!(out[1].classification, Trend::Declined);

        assert_eq!(out[2].classification, Trend::Stable);
    }

    #[test]
    fn disciplines_without_positive_baseline_are_excluded() {
        let current = vec![avg("math", 8.0), avg("new", 7.0), avg("zero", 5.0)];
        let prior = vec![avg("math", 8.0), avg("zero", 0.0)];
        let out = compare(&current, &prior);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].discipline_id, "math");
        assert_eq!(out[0].classification, Trend::Stable);
    }

    #[test]
    fn window_description_is_numeric_order() {
        assert_eq!(describe_window(&[10, 2, 1]), "1, 2, 10");
    }
}
