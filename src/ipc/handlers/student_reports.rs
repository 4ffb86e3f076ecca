use super::roster::school_of;
use super::with_conn;
use crate::ipc::error::{db_err, HandlerErr};
use crate::ipc::helpers::{optional_str, required_period_type, required_str};
use crate::ipc::types::{AppState, Request};
use crate::records::PeriodType;
use chrono::Local;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

const MAX_CONTENT_CHARS: usize = 20_000;

/// A stored narrative report joined with the names its document prints.
#[derive(Debug, Clone)]
pub(super) struct StudentReportRow {
    pub id: String,
    pub student_id: String,
    pub student_name: String,
    pub class_id: String,
    pub class_name: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub content: String,
    pub period: String,
    pub period_type: String,
    pub created_at: String,
}

impl StudentReportRow {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "studentId": self.student_id,
            "studentName": self.student_name,
            "classId": self.class_id,
            "className": self.class_name,
            "teacherId": self.teacher_id,
            "teacherName": self.teacher_name,
            "content": self.content,
            "period": self.period,
            "periodType": self.period_type,
            "createdAt": self.created_at
        })
    }
}

const SELECT_REPORTS: &str = "SELECT r.id, s.id, s.name, c.id, c.name, t.id, t.name,
        r.content, r.period, r.period_type, r.created_at
     FROM student_reports r
     JOIN students s ON s.id = r.student_id
     JOIN classes c ON c.id = s.class_id
     JOIN teachers t ON t.id = r.teacher_id";

fn map_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<StudentReportRow> {
    Ok(StudentReportRow {
        id: r.get(0)?,
        student_id: r.get(1)?,
        student_name: r.get(2)?,
        class_id: r.get(3)?,
        class_name: r.get(4)?,
        teacher_id: r.get(5)?,
        teacher_name: r.get(6)?,
        content: r.get(7)?,
        period: r.get(8)?,
        period_type: r.get(9)?,
        created_at: r.get(10)?,
    })
}

pub(super) fn find_report(
    conn: &Connection,
    school_id: &str,
    id: &str,
) -> Result<StudentReportRow, HandlerErr> {
    let sql = format!("{} WHERE r.id = ? AND c.school_id = ?", SELECT_REPORTS);
    conn.query_row(&sql, (id, school_id), map_row)
        .optional()
        .map_err(db_err("db_query_failed"))?
        .ok_or_else(|| {
            HandlerErr::not_found("student report not found").with_details(json!({ "id": id }))
        })
}

fn content_and_period(params: &Value) -> Result<(String, String, PeriodType), HandlerErr> {
    let content = required_str(params, "content")?;
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(HandlerErr::bad_params(format!(
            "content length must be <= {}",
            MAX_CONTENT_CHARS
        )));
    }
    let period = required_str(params, "period")?;
    let period_type = required_period_type(params)?;
    Ok((content, period, period_type))
}

fn student_reports_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let student_id = required_str(params, "studentId")?;
    let teacher_id = required_str(params, "teacherId")?;
    let (content, period, period_type) = content_and_period(params)?;

    let Some(student_school) = school_of(conn, "students", &student_id)? else {
        return Err(HandlerErr::not_found("student not found")
            .with_details(json!({ "studentId": student_id })));
    };
    let Some(teacher_school) = school_of(conn, "teachers", &teacher_id)? else {
        return Err(HandlerErr::not_found("teacher not found")
            .with_details(json!({ "teacherId": teacher_id })));
    };
    if student_school != teacher_school {
        return Err(HandlerErr::bad_params(
            "student and teacher belong to different schools",
        ));
    }

    let id = Uuid::new_v4().to_string();
    let created_at = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string();
    conn.execute(
        "INSERT INTO student_reports(
           id, student_id, teacher_id, content, period, period_type, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &student_id,
            &teacher_id,
            &content,
            &period,
            period_type.as_str(),
            &created_at,
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "student_reports" }))
    })?;
    Ok(json!({ "reportId": id, "createdAt": created_at }))
}

fn student_reports_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let id = required_str(params, "id")?;
    let (content, period, period_type) = content_and_period(params)?;

    let changed = conn
        .execute(
            "UPDATE student_reports SET content = ?, period = ?, period_type = ? WHERE id = ?",
            (&content, &period, period_type.as_str(), &id),
        )
        .map_err(db_err("db_update_failed"))?;
    if changed == 0 {
        return Err(HandlerErr::not_found("student report not found")
            .with_details(json!({ "id": id })));
    }
    Ok(json!({ "ok": true }))
}

fn student_reports_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let class_id = optional_str(params, "classId");
    let teacher_id = optional_str(params, "teacherId");
    let period = optional_str(params, "period");
    let period_type = match optional_str(params, "periodType") {
        Some(_) => Some(required_period_type(params)?.as_str()),
        None => None,
    };

    let sql = format!(
        "{} WHERE c.school_id = ?1
           AND (?2 IS NULL OR c.id = ?2)
           AND (?3 IS NULL OR t.id = ?3)
           AND (?4 IS NULL OR r.period = ?4)
           AND (?5 IS NULL OR r.period_type = ?5)
         ORDER BY r.created_at DESC, r.rowid DESC",
        SELECT_REPORTS
    );
    let mut stmt = conn.prepare(&sql).map_err(db_err("db_query_failed"))?;
    let reports = stmt
        .query_map(
            (&school_id, &class_id, &teacher_id, &period, &period_type),
            map_row,
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?;
    Ok(json!({
        "reports": reports.iter().map(StudentReportRow::to_json).collect::<Vec<_>>()
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "studentReports.create" => student_reports_create,
        "studentReports.update" => student_reports_update,
        "studentReports.list" => student_reports_list,
        _ => return None,
    };
    Some(with_conn(state, req, f))
}
