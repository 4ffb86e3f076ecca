mod test_support;

use serde_json::{json, Value};
use std::io::{BufRead, Write};
use test_support::{error_code, request, spawn_sidecar, temp_dir, Fixture};

#[test]
fn data_methods_require_a_workspace() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let health = request(&mut stdin, &mut reader, "1", "health", json!({}));
    assert_eq!(health["ok"], true);
    assert!(health["result"]["workspacePath"].is_null());

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "classes.list",
        json!({ "schoolId": "x" }),
    );
    assert_eq!(error_code(&resp), "no_workspace");

    let resp = request(&mut stdin, &mut reader, "3", "marksets.list", json!({}));
    assert_eq!(error_code(&resp), "not_implemented");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn malformed_lines_answer_bad_json_and_blank_lines_are_skipped() {
    let workspace = temp_dir("schoolreport-bad-json");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    writeln!(stdin).expect("blank");
    writeln!(stdin, "{{not json").expect("garbage");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read");
    let value: Value = serde_json::from_str(line.trim()).expect("json");
    assert_eq!(value["ok"], false);
    assert_eq!(error_code(&value), "bad_json");

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(resp["ok"], true);
    assert!(workspace.join("school.sqlite3").exists());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let mut f = Fixture::new("schoolreport-router-smoke");
    let school_id = f.school_id.clone();
    let class_id = f.class_id.clone();
    let student_id = f.student_id.clone();

    let teacher_id = f.create_id(
        "teachers.create",
        json!({ "schoolId": school_id, "name": "Carla Mendes", "email": "carla@school.test" }),
        "teacherId",
    );
    let discipline_id = f.create_id(
        "disciplines.create",
        json!({ "schoolId": school_id, "name": "Mathematics" }),
        "disciplineId",
    );
    f.ok(
        "grades.record",
        json!({
            "studentId": student_id,
            "disciplineId": discipline_id,
            "year": "2025",
            "periodType": "bimonthly",
            "periodLabel": "1",
            "score": 7.5
        }),
    );
    f.ok(
        "attendance.recordCall",
        json!({
            "classId": class_id,
            "date": "2025-03-10",
            "entries": [{ "studentId": student_id, "present": true }]
        }),
    );
    let report_id = f.create_id(
        "studentReports.create",
        json!({
            "studentId": student_id,
            "teacherId": teacher_id,
            "content": "Participates actively.",
            "period": "1",
            "periodType": "bimonthly"
        }),
        "reportId",
    );

    let window = json!({
        "schoolId": school_id,
        "studentId": student_id,
        "year": "2025",
        "periodType": "bimonthly",
        "periods": "1"
    });
    let range = json!({
        "schoolId": school_id,
        "studentId": student_id,
        "dateFrom": "2025-03-01",
        "dateTo": "2025-03-31"
    });
    let calls: Vec<(&str, Value)> = vec![
        ("health", json!({})),
        ("setup.get", json!({})),
        ("schools.list", json!({})),
        ("classes.list", json!({ "schoolId": school_id })),
        ("students.list", json!({ "schoolId": school_id })),
        ("teachers.list", json!({ "schoolId": school_id })),
        ("disciplines.list", json!({ "schoolId": school_id })),
        ("grades.list", window.clone()),
        ("grades.averages", window.clone()),
        ("attendance.summary", range.clone()),
        (
            "attendance.listCall",
            json!({
                "schoolId": school_id,
                "classId": class_id,
                "dateFrom": "2025-03-01",
                "dateTo": "2025-03-31"
            }),
        ),
        (
            "students.transfer",
            json!({ "schoolId": school_id, "studentId": student_id, "classId": class_id }),
        ),
        ("assignments.link", json!({ "teacherId": teacher_id, "classId": class_id })),
        ("assignments.list", json!({ "schoolId": school_id })),
        ("assignments.preview", json!({ "teacherId": teacher_id, "classIds": [] })),
        ("assignments.reconcile", json!({ "teacherId": teacher_id, "classIds": [class_id] })),
        ("assignments.unlink", json!({ "teacherId": teacher_id, "classId": class_id })),
        ("studentReports.list", json!({ "schoolId": school_id })),
        (
            "studentReports.update",
            json!({
                "id": report_id,
                "content": "Much improved.",
                "period": "1",
                "periodType": "bimonthly"
            }),
        ),
        ("reports.gradeCard", window),
        ("reports.attendance", range),
        ("reports.studentReport", json!({ "schoolId": school_id, "id": report_id })),
    ];
    for (method, params) in calls {
        let resp = f.call(method, params);
        assert_eq!(resp["ok"], true, "{} failed: {}", method, resp);
    }
}
