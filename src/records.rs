use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PeriodType {
    Monthly,
    Bimonthly,
    Quarterly,
    Semester,
}

impl PeriodType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monthly" => Some(Self::Monthly),
            "bimonthly" => Some(Self::Bimonthly),
            "quarterly" => Some(Self::Quarterly),
            "semester" => Some(Self::Semester),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Bimonthly => "bimonthly",
            Self::Quarterly => "quarterly",
            Self::Semester => "semester",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Monthly => "Monthly",
            Self::Bimonthly => "Bimonthly",
            Self::Quarterly => "Quarterly",
            Self::Semester => "Semester",
        }
    }

    /// Number of reporting periods in one school year.
    pub fn periods_per_year(self) -> u32 {
        match self {
            Self::Monthly => 12,
            Self::Bimonthly => 6,
            Self::Quarterly => 4,
            Self::Semester => 2,
        }
    }
}

/// One score as fetched from storage, already scoped to a school and student.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRecord {
    pub student_id: String,
    pub discipline_id: String,
    pub discipline_name: String,
    pub year: String,
    pub period_type: PeriodType,
    pub period_label: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub student_id: String,
    pub date: NaiveDate,
    pub present: bool,
}

/// A persisted teacher-to-class binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentLink {
    pub id: String,
    pub teacher_id: String,
    pub class_id: String,
}
