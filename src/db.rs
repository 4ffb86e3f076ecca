use crate::records::{AttendanceRecord, GradeRecord, PeriodType};
use chrono::NaiveDate;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("school.sqlite3");
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schools(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classes_school ON classes(school_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            registration TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS disciplines(
            id TEXT PRIMARY KEY,
            school_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(school_id) REFERENCES schools(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            discipline_id TEXT NOT NULL,
            year TEXT NOT NULL,
            period_type TEXT NOT NULL,
            period_label TEXT NOT NULL,
            score REAL NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(discipline_id) REFERENCES disciplines(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student_window
         ON grades(student_id, year, period_type, period_label)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_calls(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            call_date TEXT NOT NULL,
            present INTEGER NOT NULL,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(student_id, call_date)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teacher_classes(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(teacher_id, class_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teacher_classes_class ON teacher_classes(class_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_reports(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            content TEXT NOT NULL,
            period TEXT NOT NULL,
            period_type TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

pub fn settings_get_json(
    conn: &Connection,
    key: &str,
) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value_json FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// Names printed in a document header for one student.
#[derive(Debug, Clone)]
pub struct StudentContext {
    pub student_name: String,
    pub class_id: String,
    pub class_name: String,
    pub school_name: String,
}

pub fn student_context(
    conn: &Connection,
    school_id: &str,
    student_id: &str,
) -> anyhow::Result<Option<StudentContext>> {
    let ctx = conn
        .query_row(
            "SELECT s.name, c.id, c.name, sc.name
             FROM students s
             JOIN classes c ON c.id = s.class_id
             JOIN schools sc ON sc.id = c.school_id
             WHERE s.id = ? AND c.school_id = ?",
            (student_id, school_id),
            |r| {
                Ok(StudentContext {
                    student_name: r.get(0)?,
                    class_id: r.get(1)?,
                    class_name: r.get(2)?,
                    school_name: r.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(ctx)
}

/// Scores for one student restricted to a year, period type and set of labels.
pub fn fetch_grades(
    conn: &Connection,
    school_id: &str,
    student_id: &str,
    year: &str,
    period_type: PeriodType,
    labels: &[String],
) -> anyhow::Result<Vec<GradeRecord>> {
    if labels.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = vec!["?"; labels.len()].join(", ");
    let sql = format!(
        "SELECT g.student_id, g.discipline_id, d.name, g.year, g.period_label, g.score
         FROM grades g
         JOIN disciplines d ON d.id = g.discipline_id
         JOIN students s ON s.id = g.student_id
         JOIN classes c ON c.id = s.class_id
         WHERE c.school_id = ?
           AND g.student_id = ?
           AND g.year = ?
           AND g.period_type = ?
           AND g.period_label IN ({})
         ORDER BY d.name, g.period_label, g.rowid",
        placeholders
    );

    let mut bind: Vec<Value> = vec![
        Value::Text(school_id.to_string()),
        Value::Text(student_id.to_string()),
        Value::Text(year.to_string()),
        Value::Text(period_type.as_str().to_string()),
    ];
    bind.extend(labels.iter().map(|l| Value::Text(l.clone())));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(bind), |r| {
            Ok(GradeRecord {
                student_id: r.get(0)?,
                discipline_id: r.get(1)?,
                discipline_name: r.get(2)?,
                year: r.get(3)?,
                period_type,
                period_label: r.get(4)?,
                score: r.get(5)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

pub fn fetch_attendance(
    conn: &Connection,
    school_id: &str,
    student_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<Vec<AttendanceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT a.student_id, a.call_date, a.present
         FROM attendance_calls a
         JOIN classes c ON c.id = a.class_id
         WHERE c.school_id = ?
           AND a.student_id = ?
           AND a.call_date >= ?
           AND a.call_date <= ?
         ORDER BY a.call_date",
    )?;
    let raw = stmt
        .query_map(
            (
                school_id,
                student_id,
                from.format("%Y-%m-%d").to_string(),
                to.format("%Y-%m-%d").to_string(),
            ),
            |r| {
                let student_id: String = r.get(0)?;
                let date: String = r.get(1)?;
                let present: i64 = r.get(2)?;
                Ok((student_id, date, present != 0))
            },
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let mut out = Vec::with_capacity(raw.len());
    for (student_id, date, present) in raw {
        out.push(AttendanceRecord {
            student_id,
            date: NaiveDate::parse_from_str(&date, "%Y-%m-%d")?,
            present,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> Connection {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        conn.execute_batch(
            "INSERT INTO schools(id, name) VALUES('sch', 'Riverside'), ('other', 'Hillside');
             INSERT INTO classes(id, school_id, name)
               VALUES('c1', 'sch', '7A'), ('c9', 'other', '9Z');
             INSERT INTO students(id, class_id, name)
               VALUES('s1', 'c1', 'Ana'), ('s9', 'c9', 'Zed');
             INSERT INTO disciplines(id, school_id, name)
               VALUES('math', 'sch', 'Mathematics'), ('art', 'sch', 'Art');
             INSERT INTO grades(
               id, student_id, discipline_id, year, period_type, period_label, score
             ) VALUES
               ('g1', 's1', 'math', '2025', 'bimonthly', '1', 6.0),
               ('g2', 's1', 'math', '2025', 'bimonthly', '2', 8.0),
               ('g3', 's1', 'art', '2025', 'bimonthly', '2', 9.5),
               ('g4', 's1', 'math', '2025', 'quarterly', '2', 1.0),
               ('g5', 's1', 'math', '2024', 'bimonthly', '2', 1.0);",
        )
        .expect("seed");
        conn
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = seeded();
        init_schema(&conn).expect("second run");
    }

    #[test]
    fn fetch_grades_filters_window() {
        let conn = seeded();
        let rows = fetch_grades(
            &conn,
            "sch",
            "s1",
            "2025",
            PeriodType::Bimonthly,
            &["2".to_string()],
        )
        .expect("fetch");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].discipline_name, "Art");
        assert_eq!(rows[1].score, 8.0);
    }

    #[test]
    fn fetch_grades_is_scoped_to_school() {
        let conn = seeded();
        let rows = fetch_grades(
            &conn,
            "other",
            "s1",
            "2025",
            PeriodType::Bimonthly,
            &["1".to_string(), "2".to_string()],
        )
        .expect("fetch");
        assert!(rows.is_empty());
        assert!(student_context(&conn, "other", "s1").expect("ctx").is_none());
        let ctx = student_context(&conn, "sch", "s1").expect("ctx").expect("found");
        assert_eq!(ctx.class_name, "7A");
        assert_eq!(ctx.school_name, "Riverside");
    }

    #[test]
    fn settings_round_trip() {
        let conn = seeded();
        assert!(settings_get_json(&conn, "setup.layout").expect("get").is_none());
        settings_set_json(&conn, "setup.layout", &serde_json::json!({ "gradeRowHeight": 28 }))
            .expect("set");
        settings_set_json(&conn, "setup.layout", &serde_json::json!({ "gradeRowHeight": 26 }))
            .expect("overwrite");
        let v = settings_get_json(&conn, "setup.layout").expect("get").expect("present");
        assert_eq!(v["gradeRowHeight"], 26);
    }
}
