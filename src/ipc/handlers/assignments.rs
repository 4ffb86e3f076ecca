use super::roster::school_of;
use super::with_conn;
use crate::ipc::error::{db_err, HandlerErr};
use crate::ipc::helpers::{optional_str, required_str, required_str_list};
use crate::ipc::types::{AppState, Request};
use crate::reconcile::{self, LinkStore, ReconciliationPlan, SqliteLinkStore};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

fn teacher_school(conn: &Connection, teacher_id: &str) -> Result<String, HandlerErr> {
    school_of(conn, "teachers", teacher_id)?.ok_or_else(|| {
        HandlerErr::not_found("teacher not found").with_details(json!({ "teacherId": teacher_id }))
    })
}

/// Every class id must exist in the teacher's school.
fn check_classes(
    conn: &Connection,
    school_id: &str,
    class_ids: &[String],
) -> Result<(), HandlerErr> {
    for class_id in class_ids {
        match school_of(conn, "classes", class_id)? {
            Some(s) if s == school_id => {}
            Some(_) => {
                return Err(HandlerErr::bad_params("class belongs to another school")
                    .with_details(json!({ "classId": class_id })))
            }
            None => {
                return Err(HandlerErr::not_found("class not found")
                    .with_details(json!({ "classId": class_id })))
            }
        }
    }
    Ok(())
}

fn class_name(conn: &Connection, class_id: &str) -> Result<String, HandlerErr> {
    conn.query_row("SELECT name FROM classes WHERE id = ?", [class_id], |r| r.get(0))
        .optional()
        .map_err(db_err("db_query_failed"))
        .map(|n| n.unwrap_or_default())
}

fn plan_for(conn: &Connection, params: &Value) -> Result<ReconciliationPlan, HandlerErr> {
    let teacher_id = required_str(params, "teacherId")?;
    let class_ids = required_str_list(params, "classIds")?;
    let school_id = teacher_school(conn, &teacher_id)?;
    check_classes(conn, &school_id, &class_ids)?;

    let store = SqliteLinkStore::new(conn);
    let actual = store.links_for_teacher(&teacher_id)?;
    Ok(reconcile::reconcile(&teacher_id, &class_ids, &actual))
}

fn assignments_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let teacher_id = optional_str(params, "teacherId");
    let class_id = optional_str(params, "classId");

    let mut stmt = conn
        .prepare(
            "SELECT tc.id, t.id, t.name, c.id, c.name
             FROM teacher_classes tc
             JOIN teachers t ON t.id = tc.teacher_id
             JOIN classes c ON c.id = tc.class_id
             WHERE c.school_id = ?1
               AND (?2 IS NULL OR t.id = ?2)
               AND (?3 IS NULL OR c.id = ?3)
             ORDER BY c.name, t.name",
        )
        .map_err(db_err("db_query_failed"))?;
    let links = stmt
        .query_map((&school_id, &teacher_id, &class_id), |r| {
            let id: String = r.get(0)?;
            let teacher_id: String = r.get(1)?;
            let teacher_name: String = r.get(2)?;
            let class_id: String = r.get(3)?;
            let class_name: String = r.get(4)?;
            Ok(json!({
                "id": id,
                "teacherId": teacher_id,
                "teacherName": teacher_name,
                "classId": class_id,
                "className": class_name
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?;
    Ok(json!({ "links": links }))
}

fn assignments_link(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let teacher_id = required_str(params, "teacherId")?;
    let class_id = required_str(params, "classId")?;
    let school_id = teacher_school(conn, &teacher_id)?;
    check_classes(conn, &school_id, std::slice::from_ref(&class_id))?;

    let link = reconcile::link(&SqliteLinkStore::new(conn), &teacher_id, &class_id)?;
    Ok(json!({ "link": link }))
}

fn assignments_unlink(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let teacher_id = required_str(params, "teacherId")?;
    let class_id = required_str(params, "classId")?;

    let removed = reconcile::unlink(&SqliteLinkStore::new(conn), &teacher_id, &class_id)?;
    Ok(json!({ "removed": removed }))
}

fn assignments_preview(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let plan = plan_for(conn, params)?;
    Ok(json!({
        "toAdd": plan.to_add,
        "toRemove": plan.to_remove.iter().map(|l| &l.class_id).collect::<Vec<_>>(),
        "toKeep": plan.to_keep.iter().map(|l| &l.class_id).collect::<Vec<_>>(),
        "noop": plan.is_noop()
    }))
}

fn assignments_reconcile(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let plan = plan_for(conn, params)?;
    let store = SqliteLinkStore::new(conn);
    let outcome = reconcile::apply(&store, &plan)?;

    let mut added_classes = Vec::with_capacity(outcome.added_links.len());
    for link in &outcome.added_links {
        added_classes.push(json!({
            "id": link.class_id,
            "name": class_name(conn, &link.class_id)?
        }));
    }
    let total_links = outcome.added + outcome.kept;
    Ok(json!({
        "added": outcome.added,
        "removed": outcome.removed,
        "kept": outcome.kept,
        "totalLinks": total_links,
        "addedClasses": added_classes
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "assignments.list" => assignments_list,
        "assignments.link" => assignments_link,
        "assignments.unlink" => assignments_unlink,
        "assignments.preview" => assignments_preview,
        "assignments.reconcile" => assignments_reconcile,
        _ => return None,
    };
    Some(with_conn(state, req, f))
}
