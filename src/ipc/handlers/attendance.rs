use super::grades::student_or_not_found;
use super::roster::school_of;
use super::with_conn;
use crate::aggregate;
use crate::db;
use crate::ipc::error::{db_err, HandlerErr};
use crate::ipc::helpers::{required_date, required_str};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

/// `dateFrom..=dateTo`, rejected when reversed.
pub(super) fn required_range(params: &Value) -> Result<(NaiveDate, NaiveDate), HandlerErr> {
    let from = required_date(params, "dateFrom")?;
    let to = required_date(params, "dateTo")?;
    if from > to {
        return Err(HandlerErr::bad_params("dateFrom must not be after dateTo")
            .with_details(json!({ "dateFrom": from.to_string(), "dateTo": to.to_string() })));
    }
    Ok((from, to))
}

struct CallEntry {
    student_id: String,
    present: bool,
}

fn parse_entries(params: &Value) -> Result<Vec<CallEntry>, HandlerErr> {
    let items = params
        .get("entries")
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params("entries must be an array"))?;
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let student_id = item
            .get("studentId")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| HandlerErr::bad_params(format!("entries[{}].studentId missing", i)))?;
        let present = item
            .get("present")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| {
                HandlerErr::bad_params(format!("entries[{}].present must be boolean", i))
            })?;
        out.push(CallEntry { student_id, present });
    }
    Ok(out)
}

fn attendance_record_call(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let date = required_date(params, "date")?;
    let entries = parse_entries(params)?;
    if school_of(conn, "classes", &class_id)?.is_none() {
        return Err(HandlerErr::not_found("class not found")
            .with_details(json!({ "classId": class_id })));
    }

    let call_date = date.format("%Y-%m-%d").to_string();
    let tx = conn
        .unchecked_transaction()
        .map_err(db_err("db_tx_failed"))?;
    for entry in &entries {
        let enrolled = tx
            .query_row(
                "SELECT 1 FROM students WHERE class_id = ? AND id = ?",
                (&class_id, &entry.student_id),
                |r| r.get::<_, i64>(0),
            )
            .optional()
            .map_err(db_err("db_query_failed"))?
            .is_some();
        if !enrolled {
            // Dropping the transaction rolls back rows written so far.
            return Err(HandlerErr::bad_params("student is not enrolled in class")
                .with_details(json!({ "classId": class_id, "studentId": entry.student_id })));
        }
        tx.execute(
            "INSERT INTO attendance_calls(id, class_id, student_id, call_date, present)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(student_id, call_date) DO UPDATE SET
               class_id = excluded.class_id,
               present = excluded.present",
            (
                Uuid::new_v4().to_string(),
                &class_id,
                &entry.student_id,
                &call_date,
                entry.present as i64,
            ),
        )
        .map_err(|e| {
            HandlerErr::new("db_update_failed", e.to_string())
                .with_details(json!({ "table": "attendance_calls" }))
        })?;
    }
    tx.commit().map_err(db_err("db_commit_failed"))?;

    Ok(json!({ "date": call_date, "recorded": entries.len() }))
}

/// Calls taken for the students currently in a class, by name then date.
fn attendance_list_call(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let class_id = required_str(params, "classId")?;
    let (from, to) = required_range(params)?;
    match school_of(conn, "classes", &class_id)? {
        Some(s) if s == school_id => {}
        _ => {
            return Err(HandlerErr::not_found("class not found")
                .with_details(json!({ "classId": class_id })));
        }
    }

    let mut stmt = conn
        .prepare(
            "SELECT a.id, a.student_id, s.name, a.call_date, a.present
             FROM attendance_calls a
             JOIN students s ON s.id = a.student_id
             WHERE s.class_id = ?1 AND a.call_date >= ?2 AND a.call_date <= ?3
             ORDER BY s.name, a.call_date",
        )
        .map_err(db_err("db_query_failed"))?;
    let calls = stmt
        .query_map(
            (
                &class_id,
                from.format("%Y-%m-%d").to_string(),
                to.format("%Y-%m-%d").to_string(),
            ),
            |r| {
                let id: String = r.get(0)?;
                let student_id: String = r.get(1)?;
                let student_name: String = r.get(2)?;
                let date: String = r.get(3)?;
                let present: i64 = r.get(4)?;
                Ok(json!({
                    "id": id,
                    "studentId": student_id,
                    "studentName": student_name,
                    "date": date,
                    "present": present != 0
                }))
            },
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?;
    Ok(json!({ "calls": calls }))
}

fn attendance_summary(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let student_id = required_str(params, "studentId")?;
    let (from, to) = required_range(params)?;
    student_or_not_found(conn, &school_id, &student_id)?;

    let calls = db::fetch_attendance(conn, &school_id, &student_id, from, to)
        .map_err(db_err("db_query_failed"))?;
    let summary = aggregate::aggregate_attendance(&calls);
    Ok(json!({
        "summary": summary,
        "totalAbsent": summary.total_absent(),
        "calls": calls
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "attendance.recordCall" => attendance_record_call,
        "attendance.listCall" => attendance_list_call,
        "attendance.summary" => attendance_summary,
        _ => return None,
    };
    Some(with_conn(state, req, f))
}
