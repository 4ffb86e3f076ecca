use super::roster::school_of;
use super::with_conn;
use crate::aggregate::{self, SubjectAverage};
use crate::db::{self, StudentContext};
use crate::ipc::error::{db_err, HandlerErr};
use crate::ipc::helpers::{
    parse_period_label, required_period_type, required_periods, required_str, required_year,
};
use crate::ipc::types::{AppState, Request};
use crate::periods::{self, PriorWindow, TrendComparison};
use crate::records::PeriodType;
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

const MAX_SCORE: f64 = 10.0;

/// Everything a report card needs, computed from one window of grades.
pub(super) struct GradeSummary {
    pub ctx: StudentContext,
    pub year: String,
    pub period_type: PeriodType,
    pub periods: Vec<u32>,
    pub subjects: Vec<SubjectAverage>,
    pub prior: PriorWindow,
    pub comparisons: Vec<TrendComparison>,
    pub overall_average: f64,
}

impl GradeSummary {
    pub fn to_json(&self) -> Value {
        json!({
            "studentName": self.ctx.student_name,
            "className": self.ctx.class_name,
            "schoolName": self.ctx.school_name,
            "year": self.year,
            "periodType": self.period_type,
            "periods": self.periods,
            "subjects": self.subjects,
            "overallAverage": self.overall_average,
            "priorWindow": self.prior,
            "comparisons": self.comparisons,
        })
    }
}

pub(super) fn student_or_not_found(
    conn: &Connection,
    school_id: &str,
    student_id: &str,
) -> Result<StudentContext, HandlerErr> {
    db::student_context(conn, school_id, student_id)
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| {
            HandlerErr::not_found("student not found")
                .with_details(json!({ "schoolId": school_id, "studentId": student_id }))
        })
}

pub(super) fn build_grade_summary(
    conn: &Connection,
    params: &Value,
) -> Result<GradeSummary, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let student_id = required_str(params, "studentId")?;
    let year = required_year(params)?;
    let period_type = required_period_type(params)?;
    let periods = required_periods(params, period_type)?;

    let ctx = student_or_not_found(conn, &school_id, &student_id)?;

    let labels: Vec<String> = periods.iter().map(|p| p.to_string()).collect();
    let current = db::fetch_grades(conn, &school_id, &student_id, &year, period_type, &labels)
        .map_err(db_err("db_query_failed"))?;
    let subjects = aggregate::aggregate_grades(&current);

    let prior = periods::infer_prior_window(&periods);
    let comparisons = if prior.has_comparison {
        let previous = db::fetch_grades(
            conn,
            &school_id,
            &student_id,
            &year,
            period_type,
            &prior.label_strings(),
        )
        .map_err(db_err("db_query_failed"))?;
        periods::compare(&subjects, &aggregate::aggregate_grades(&previous))
    } else {
        Vec::new()
    };
    let overall_average = aggregate::overall_average(&subjects);

    Ok(GradeSummary {
        ctx,
        year,
        period_type,
        periods,
        subjects,
        prior,
        comparisons,
        overall_average,
    })
}

fn grades_record(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let discipline_id = required_str(params, "disciplineId")?;
    let year = required_year(params)?;
    let period_type = required_period_type(params)?;
    let label_raw = match params.get("periodLabel") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(HandlerErr::bad_params("missing periodLabel")),
    };
    let label = parse_period_label(&label_raw, period_type)?;
    let score = params
        .get("score")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| HandlerErr::bad_params("score must be a number"))?;
    if !(0.0..=MAX_SCORE).contains(&score) {
        return Err(HandlerErr::bad_params(format!(
            "score must be in 0..={}",
            MAX_SCORE
        )));
    }

    let Some(student_school) = school_of(conn, "students", &student_id)? else {
        return Err(HandlerErr::not_found("student not found")
            .with_details(json!({ "studentId": student_id })));
    };
    let Some(discipline_school) = school_of(conn, "disciplines", &discipline_id)? else {
        return Err(HandlerErr::not_found("discipline not found")
            .with_details(json!({ "disciplineId": discipline_id })));
    };
    if student_school != discipline_school {
        return Err(HandlerErr::bad_params(
            "student and discipline belong to different schools",
        ));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO grades(id, student_id, discipline_id, year, period_type, period_label, score)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &student_id,
            &discipline_id,
            &year,
            period_type.as_str(),
            label.to_string(),
            score,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "grades" }))
    })?;
    Ok(json!({ "gradeId": id }))
}

fn grades_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let student_id = required_str(params, "studentId")?;
    let year = required_year(params)?;
    let period_type = required_period_type(params)?;
    let periods = required_periods(params, period_type)?;

    let labels: Vec<String> = periods.iter().map(|p| p.to_string()).collect();
    let grades = db::fetch_grades(conn, &school_id, &student_id, &year, period_type, &labels)
        .map_err(db_err("db_query_failed"))?;
    Ok(json!({ "grades": grades }))
}

fn grades_averages(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    Ok(build_grade_summary(conn, params)?.to_json())
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "grades.record" => grades_record,
        "grades.list" => grades_list,
        "grades.averages" => grades_averages,
        _ => return None,
    };
    Some(with_conn(state, req, f))
}
