use super::with_conn;
use crate::ipc::error::{db_err, HandlerErr};
use crate::ipc::helpers::{optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

/// School that owns a row of `table`, if the row exists.
pub(super) fn school_of(
    conn: &Connection,
    table: &str,
    id: &str,
) -> Result<Option<String>, HandlerErr> {
    let sql = match table {
        "classes" | "teachers" | "disciplines" => {
            format!("SELECT school_id FROM {} WHERE id = ?", table)
        }
        "students" => "SELECT c.school_id FROM students s
                       JOIN classes c ON c.id = s.class_id
                       WHERE s.id = ?"
            .to_string(),
        "schools" => "SELECT id FROM schools WHERE id = ?".to_string(),
        other => return Err(HandlerErr::new("internal", format!("unknown table {}", other))),
    };
    conn.query_row(&sql, [id], |r| r.get(0))
        .optional()
        .map_err(db_err("db_query_failed"))
}

fn require_school(conn: &Connection, school_id: &str) -> Result<(), HandlerErr> {
    if school_of(conn, "schools", school_id)?.is_none() {
        return Err(HandlerErr::not_found("school not found")
            .with_details(json!({ "schoolId": school_id })));
    }
    Ok(())
}

fn insert_failed(table: &'static str) -> impl Fn(rusqlite::Error) -> HandlerErr {
    move |e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": table }))
    }
}

fn list_rows<F>(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
    map: F,
) -> Result<Vec<Value>, HandlerErr>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<Value>,
{
    let mut stmt = conn.prepare(sql).map_err(db_err("db_query_failed"))?;
    let rows = stmt
        .query_map(params, map)
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err("db_query_failed"))?;
    Ok(rows)
}

fn schools_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = required_str(params, "name")?;
    let id = Uuid::new_v4().to_string();
    conn.execute("INSERT INTO schools(id, name) VALUES(?, ?)", (&id, &name))
        .map_err(insert_failed("schools"))?;
    Ok(json!({ "schoolId": id, "name": name }))
}

fn schools_list(conn: &Connection, _params: &Value) -> Result<Value, HandlerErr> {
    let schools = list_rows(conn, "SELECT id, name FROM schools ORDER BY name", [], |r| {
        let id: String = r.get(0)?;
        let name: String = r.get(1)?;
        Ok(json!({ "id": id, "name": name }))
    })?;
    Ok(json!({ "schools": schools }))
}

fn classes_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let name = required_str(params, "name")?;
    require_school(conn, &school_id)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, school_id, name) VALUES(?, ?, ?)",
        (&id, &school_id, &name),
    )
    .map_err(insert_failed("classes"))?;
    Ok(json!({ "classId": id, "name": name }))
}

fn classes_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let classes = list_rows(
        conn,
        "SELECT
           c.id,
           c.name,
           (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count
         FROM classes c
         WHERE c.school_id = ?
         ORDER BY c.name",
        [&school_id],
        |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let student_count: i64 = r.get(2)?;
            Ok(json!({ "id": id, "name": name, "studentCount": student_count }))
        },
    )?;
    Ok(json!({ "classes": classes }))
}

fn students_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let class_id = required_str(params, "classId")?;
    let name = required_str(params, "name")?;
    let registration = optional_str(params, "registration");
    if school_of(conn, "classes", &class_id)?.is_none() {
        return Err(HandlerErr::not_found("class not found")
            .with_details(json!({ "classId": class_id })));
    }

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, name, registration) VALUES(?, ?, ?, ?)",
        (&id, &class_id, &name, &registration),
    )
    .map_err(insert_failed("students"))?;
    Ok(json!({ "studentId": id, "name": name }))
}

fn students_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let class_id = optional_str(params, "classId");
    let students = list_rows(
        conn,
        "SELECT s.id, s.name, s.registration, c.id, c.name
         FROM students s
         JOIN classes c ON c.id = s.class_id
         WHERE c.school_id = ?1 AND (?2 IS NULL OR c.id = ?2)
         ORDER BY c.name, s.name",
        (&school_id, &class_id),
        |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let registration: Option<String> = r.get(2)?;
            let class_id: String = r.get(3)?;
            let class_name: String = r.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "registration": registration,
                "classId": class_id,
                "className": class_name
            }))
        },
    )?;
    Ok(json!({ "students": students }))
}

/// Moves a student to another class of the same school. Grades, attendance
/// and narrative reports follow the student.
fn students_transfer(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let student_id = required_str(params, "studentId")?;
    let class_id = required_str(params, "classId")?;

    let previous: Option<(String, String)> = conn
        .query_row(
            "SELECT s.class_id, c.school_id
             FROM students s
             JOIN classes c ON c.id = s.class_id
             WHERE s.id = ?",
            [&student_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(db_err("db_query_failed"))?;
    let previous_class_id = match previous {
        Some((class, school)) if school == school_id => class,
        _ => {
            return Err(HandlerErr::not_found("student not found")
                .with_details(json!({ "studentId": student_id })));
        }
    };
    match school_of(conn, "classes", &class_id)? {
        Some(s) if s == school_id => {}
        Some(_) => {
            return Err(HandlerErr::bad_params("class belongs to another school")
                .with_details(json!({ "classId": class_id })));
        }
        None => {
            return Err(HandlerErr::not_found("class not found")
                .with_details(json!({ "classId": class_id })));
        }
    }

    if previous_class_id != class_id {
        conn.execute(
            "UPDATE students SET class_id = ? WHERE id = ?",
            (&class_id, &student_id),
        )
        .map_err(db_err("db_update_failed"))?;
        info!(
            student_id = %student_id,
            from = %previous_class_id,
            to = %class_id,
            "student transferred"
        );
    }
    Ok(json!({
        "studentId": student_id,
        "classId": class_id,
        "previousClassId": previous_class_id
    }))
}

fn teachers_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let name = required_str(params, "name")?;
    let email = required_str(params, "email")?;
    if !email.contains('@') {
        return Err(HandlerErr::bad_params("email must contain '@'"));
    }
    require_school(conn, &school_id)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO teachers(id, school_id, name, email) VALUES(?, ?, ?, ?)",
        (&id, &school_id, &name, &email),
    )
    .map_err(insert_failed("teachers"))?;
    Ok(json!({ "teacherId": id, "name": name }))
}

fn teachers_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let teachers = list_rows(
        conn,
        "SELECT
           t.id,
           t.name,
           t.email,
           (SELECT COUNT(*) FROM teacher_classes tc WHERE tc.teacher_id = t.id) AS class_count
         FROM teachers t
         WHERE t.school_id = ?
         ORDER BY t.name",
        [&school_id],
        |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            let email: String = r.get(2)?;
            let class_count: i64 = r.get(3)?;
            Ok(json!({ "id": id, "name": name, "email": email, "classCount": class_count }))
        },
    )?;
    Ok(json!({ "teachers": teachers }))
}

fn disciplines_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let name = required_str(params, "name")?;
    require_school(conn, &school_id)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO disciplines(id, school_id, name) VALUES(?, ?, ?)",
        (&id, &school_id, &name),
    )
    .map_err(insert_failed("disciplines"))?;
    Ok(json!({ "disciplineId": id, "name": name }))
}

fn disciplines_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let school_id = required_str(params, "schoolId")?;
    let disciplines = list_rows(
        conn,
        "SELECT id, name FROM disciplines WHERE school_id = ? ORDER BY name",
        [&school_id],
        |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            Ok(json!({ "id": id, "name": name }))
        },
    )?;
    Ok(json!({ "disciplines": disciplines }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let f: fn(&Connection, &Value) -> Result<Value, HandlerErr> = match req.method.as_str() {
        "schools.create" => schools_create,
        "schools.list" => schools_list,
        "classes.create" => classes_create,
        "classes.list" => classes_list,
        "students.create" => students_create,
        "students.list" => students_list,
        "students.transfer" => students_transfer,
        "teachers.create" => teachers_create,
        "teachers.list" => teachers_list,
        "disciplines.create" => disciplines_create,
        "disciplines.list" => disciplines_list,
        _ => return None,
    };
    Some(with_conn(state, req, f))
}
