use crate::records::{AttendanceRecord, GradeRecord};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub discipline_id: String,
    pub discipline_name: String,
    pub scores: Vec<f64>,
    pub average: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total_classes: i64,
    pub total_present: i64,
    pub percentage: f64,
}

impl AttendanceSummary {
    pub fn total_absent(&self) -> i64 {
        self.total_classes - self.total_present
    }
}

/// Arithmetic mean, 0 for an empty slice.
///
/// Values are summed in sorted order with Neumaier compensation so the result
/// does not depend on the order records came back from storage.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mut sum = 0.0_f64;
    let mut comp = 0.0_f64;
    for v in sorted {
        let t = sum + v;
        if sum.abs() >= v.abs() {
            comp += (sum - t) + v;
        } else {
            comp += (v - t) + sum;
        }
        sum = t;
    }
    (sum + comp) / (values.len() as f64)
}

/// Groups scores by discipline id and averages each group.
/// Output is ordered by discipline name, then id.
pub fn aggregate_grades(records: &[GradeRecord]) -> Vec<SubjectAverage> {
    let mut by_discipline: HashMap<&str, SubjectAverage> = HashMap::new();
    for r in records {
        by_discipline
            .entry(r.discipline_id.as_str())
            .or_insert_with(|| SubjectAverage {
                discipline_id: r.discipline_id.clone(),
                discipline_name: r.discipline_name.clone(),
                scores: Vec::new(),
                average: 0.0,
            })
            .scores
            .push(r.score);
    }

    let mut out: Vec<SubjectAverage> = by_discipline
        .into_values()
        .map(|mut s| {
            s.average = mean(&s.scores);
            s
        })
        .collect();
    out.sort_by(|a, b| match a.discipline_name.cmp(&b.discipline_name) {
        Ordering::Equal => a.discipline_id.cmp(&b.discipline_id),
        other => other,
    });
    out
}

pub fn aggregate_attendance(records: &[AttendanceRecord]) -> AttendanceSummary {
    let total_classes = records.len() as i64;
    let total_present = records.iter().filter(|r| r.present).count() as i64;
    let percentage = if total_classes > 0 {
        (total_present as f64 / total_classes as f64) * 100.0
    } else {
        0.0
    };
    AttendanceSummary {
        total_classes,
        total_present,
        percentage,
    }
}

/// Plain mean of the per-discipline averages. Disciplines with more scores
/// carry no extra weight.
pub fn overall_average(subjects: &[SubjectAverage]) -> f64 {
    let averages: Vec<f64> = subjects.iter().map(|s| s.average).collect();
    mean(&averages)
}
