use super::attendance::required_range;
use super::grades::{build_grade_summary, student_or_not_found};
use super::setup::{layout_config, report_prefs};
use super::student_reports::find_report;
use super::with_conn;
use crate::aggregate;
use crate::db;
use crate::ipc::error::{db_err, HandlerErr};
use crate::ipc::helpers::{file_slug, generated_at, required_str};
use crate::ipc::types::{AppState, Request};
use crate::layout::{self, Document, DocumentHeader, LayoutConfig, ReportOptions};
use crate::periods::describe_window;
use crate::records::PeriodType;
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::info;

fn document_settings(
    conn: &Connection,
    params: &Value,
) -> Result<(LayoutConfig, ReportOptions), HandlerErr> {
    let cfg = layout_config(conn).map_err(db_err("db_query_failed"))?;
    let prefs = report_prefs(conn).map_err(db_err("db_query_failed"))?;
    let options = ReportOptions {
        show_legend: prefs.show_legend,
        footer_text: prefs.footer_text,
        generated_at: generated_at(params)?,
    };
    Ok((cfg, options))
}

fn document_result(kind: &str, file_name: String, doc: Document, data: Value) -> Value {
    info!(kind = %kind, file = %file_name, pages = doc.page_count, "document laid out");
    json!({
        "fileName": file_name,
        "pageCount": doc.page_count,
        "instructions": doc.instructions,
        "data": data
    })
}

fn line(label: &str, value: impl Into<String>) -> (String, String) {
    (label.to_string(), value.into())
}

fn reports_grade_card(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let summary = build_grade_summary(conn, params)?;
    if summary.subjects.is_empty() {
        return Err(HandlerErr::not_found("no grades found for the requested periods")
            .with_details(json!({ "periods": summary.periods })));
    }
    let (cfg, options) = document_settings(conn, params)?;

    let header = DocumentHeader {
        school_name: summary.ctx.school_name.clone(),
        title: "REPORT CARD".to_string(),
        lines: vec![
            line("Student", summary.ctx.student_name.clone()),
            line("Class", summary.ctx.class_name.clone()),
            line("School year", summary.year.clone()),
            line(
                "Period",
                format!(
                    "{} - {}",
                    summary.period_type.label(),
                    describe_window(&summary.periods)
                ),
            ),
        ],
    };
    let comparisons = summary
        .prior
        .has_comparison
        .then_some(summary.comparisons.as_slice());
    let doc = layout::layout_grade_card(&header, &summary.subjects, comparisons, &options, &cfg)?;

    let file_name = format!("report-card-{}.pdf", file_slug(&summary.ctx.student_name));
    Ok(document_result("gradeCard", file_name, doc, summary.to_json()))
}

fn reports_attendance(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let student_id = required_str(params, "studentId")?;
    let (from, to) = required_range(params)?;
    let ctx = student_or_not_found(conn, &school_id, &student_id)?;
    let (cfg, options) = document_settings(conn, params)?;

    let calls = db::fetch_attendance(conn, &school_id, &student_id, from, to)
        .map_err(db_err("db_query_failed"))?;
    let summary = aggregate::aggregate_attendance(&calls);

    let header = DocumentHeader {
        school_name: ctx.school_name.clone(),
        title: "ATTENDANCE REPORT".to_string(),
        lines: vec![
            line("Student", ctx.student_name.clone()),
            line("Class", ctx.class_name.clone()),
            line(
                "Period",
                format!("{} to {}", from.format("%d/%m/%Y"), to.format("%d/%m/%Y")),
            ),
        ],
    };
    let doc = layout::layout_attendance(&header, &calls, &summary, &options, &cfg)?;

    let file_name = format!("attendance-{}.pdf", file_slug(&ctx.student_name));
    let data = json!({
        "studentName": ctx.student_name,
        "className": ctx.class_name,
        "schoolName": ctx.school_name,
        "summary": summary,
        "totalAbsent": summary.total_absent(),
        "calls": calls
    });
    Ok(document_result("attendance", file_name, doc, data))
}

fn reports_student_report(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let id = required_str(params, "id")?;
    let report = find_report(conn, &school_id, &id)?;
    let ctx = student_or_not_found(conn, &school_id, &report.student_id)?;
    let (cfg, options) = document_settings(conn, params)?;

    let period_type = PeriodType::parse(&report.period_type)
        .map(|p| p.label().to_string())
        .unwrap_or_else(|| report.period_type.clone());
    let header = DocumentHeader {
        school_name: ctx.school_name.clone(),
        title: "STUDENT PERFORMANCE REPORT".to_string(),
        lines: vec![
            line("Student", report.student_name.clone()),
            line("Class", report.class_name.clone()),
            line("Teacher", report.teacher_name.clone()),
            line("Period", format!("{} - {}", period_type, report.period)),
        ],
    };
    let doc = layout::layout_narrative(&header, &report.content, &options, &cfg)?;

    let file_name = format!(
        "student-report-{}-{}.pdf",
        file_slug(&report.student_name),
        file_slug(&report.period)
    );
    let data = json!({
        "id": report.id,
        "studentName": report.student_name,
        "className": report.class_name,
        "teacherName": report.teacher_name,
        "period": report.period,
        "periodType": report.period_type,
        "createdAt": report.created_at
    });
    Ok(document_result("studentReport", file_name, doc, data))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "reports.gradeCard" => reports_grade_card,
        "reports.attendance" => reports_attendance,
        "reports.studentReport" => reports_student_report,
        _ => return None,
    };
    Some(with_conn(state, req, f))
}
