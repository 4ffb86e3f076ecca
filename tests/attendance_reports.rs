mod test_support;

use chrono::{Duration, NaiveDate};
use serde_json::json;
use test_support::{count_ops, error_code, texts, Fixture};

fn call_roll(f: &mut Fixture, date: &str, present: bool) {
    let class_id = f.class_id.clone();
    let student_id = f.student_id.clone();
    f.ok(
        "attendance.recordCall",
        json!({
            "classId": class_id,
            "date": date,
            "entries": [{ "studentId": student_id, "present": present }]
        }),
    );
}

#[test]
fn attendance_summary_counts_calls_in_range() {
    let mut f = Fixture::new("schoolreport-attendance");
    call_roll(&mut f, "2025-03-03", true);
    call_roll(&mut f, "2025-03-04", false);
    call_roll(&mut f, "2025-03-05", true);
    call_roll(&mut f, "2025-03-06", true);
    call_roll(&mut f, "2025-04-01", false);
    // Recording the same day again overwrites the earlier mark.
    call_roll(&mut f, "2025-03-04", true);

    let summary = f.ok(
        "attendance.summary",
        json!({
            "schoolId": f.school_id,
            "studentId": f.student_id,
            "dateFrom": "2025-03-01",
            "dateTo": "2025-03-31"
        }),
    );
    assert_eq!(summary["summary"]["totalClasses"], 4);
    assert_eq!(summary["summary"]["totalPresent"], 4);
    assert_eq!(summary["summary"]["percentage"], 100.0);
    assert_eq!(summary["totalAbsent"], 0);

    let reversed = f.call(
        "attendance.summary",
        json!({
            "schoolId": f.school_id,
            "studentId": f.student_id,
            "dateFrom": "2025-03-31",
            "dateTo": "2025-03-01"
        }),
    );
    assert_eq!(error_code(&reversed), "bad_params");
}

#[test]
fn roll_call_is_all_or_nothing() {
    let mut f = Fixture::new("schoolreport-attendance-tx");
    let other_class = f.create_id(
        "classes.create",
        json!({ "schoolId": f.school_id, "name": "8B" }),
        "classId",
    );
    let outsider = f.create_id(
        "students.create",
        json!({ "classId": other_class, "name": "Bruno Lima" }),
        "studentId",
    );

    let resp = f.call(
        "attendance.recordCall",
        json!({
            "classId": f.class_id,
            "date": "2025-05-02",
            "entries": [
                { "studentId": f.student_id, "present": true },
                { "studentId": outsider, "present": true }
            ]
        }),
    );
    assert_eq!(error_code(&resp), "bad_params");

    let summary = f.ok(
        "attendance.summary",
        json!({
            "schoolId": f.school_id,
            "studentId": f.student_id,
            "dateFrom": "2025-05-01",
            "dateTo": "2025-05-31"
        }),
    );
    assert_eq!(summary["summary"]["totalClasses"], 0);
    assert_eq!(summary["summary"]["percentage"], 0.0);
}

#[test]
fn attendance_document_lists_calls_and_paginates() {
    let mut f = Fixture::new("schoolreport-attendance-doc");
    let start = NaiveDate::from_ymd_opt(2025, 2, 1).expect("date");
    for i in 0..40 {
        let day = start + Duration::days(i);
        call_roll(&mut f, &day.format("%Y-%m-%d").to_string(), i % 4 != 0);
    }

    let doc = f.ok(
        "reports.attendance",
        json!({
            "schoolId": f.school_id,
            "studentId": f.student_id,
            "dateFrom": "2025-02-01",
            "dateTo": "2025-03-31",
            "generatedAt": "2025-04-01T09:00:00Z"
        }),
    );
    assert_eq!(doc["fileName"], "attendance-Ana-Souza.pdf");
    assert_eq!(doc["data"]["summary"]["totalClasses"], 40);
    assert_eq!(doc["data"]["summary"]["totalPresent"], 30);
    assert_eq!(doc["data"]["totalAbsent"], 10);

    let pages = doc["pageCount"].as_u64().expect("pages") as usize;
    assert!(pages >= 2);
    assert_eq!(count_ops(&doc, "pageBreak"), pages - 1);

    let t = texts(&doc);
    assert_eq!(t.iter().filter(|s| *s == "ABSENT").count(), 10);
    assert_eq!(t.iter().filter(|s| *s == "PRESENT").count(), 30);
    assert!(t.iter().any(|s| s == "01/02/2025"));
    assert!(t.iter().any(|s| s == "75.00%"));
    assert!(t.iter().any(|s| s == "01/02/2025 to 31/03/2025"));
}

#[test]
fn class_call_history_lists_current_students_in_range() {
    let mut f = Fixture::new("schoolreport-attendance-list");
    let school_id = f.school_id.clone();
    let class_id = f.class_id.clone();
    let ana = f.student_id.clone();
    let bruno = f.create_id(
        "students.create",
        json!({ "classId": class_id, "name": "Bruno Lima" }),
        "studentId",
    );
    for (date, bruno_present) in [("2025-05-06", true), ("2025-05-05", false)] {
        f.ok(
            "attendance.recordCall",
            json!({
                "classId": class_id,
                "date": date,
                "entries": [
                    { "studentId": bruno, "present": bruno_present },
                    { "studentId": ana, "present": true }
                ]
            }),
        );
    }
    call_roll(&mut f, "2025-06-02", false);

    let may = json!({
        "schoolId": school_id,
        "classId": class_id,
        "dateFrom": "2025-05-01",
        "dateTo": "2025-05-31"
    });
    let listed = f.ok("attendance.listCall", may.clone());
    let calls = listed["calls"].as_array().expect("calls");
    let rows: Vec<(&str, &str, bool)> = calls
        .iter()
        .map(|c| {
            (
                c["studentName"].as_str().unwrap_or(""),
                c["date"].as_str().unwrap_or(""),
                c["present"].as_bool().unwrap_or(true),
            )
        })
        .collect();
    assert_eq!(
        rows,
        vec![
            ("Ana Souza", "2025-05-05", true),
            ("Ana Souza", "2025-05-06", true),
            ("Bruno Lima", "2025-05-05", false),
            ("Bruno Lima", "2025-05-06", true),
        ]
    );
    assert_eq!(calls[0]["studentId"], ana.as_str());

    let other_school = f.create_id("schools.create", json!({ "name": "Hillside" }), "schoolId");
    let hidden = f.call(
        "attendance.listCall",
        json!({
            "schoolId": other_school,
            "classId": class_id,
            "dateFrom": "2025-05-01",
            "dateTo": "2025-05-31"
        }),
    );
    assert_eq!(error_code(&hidden), "not_found");

    let reversed = f.call(
        "attendance.listCall",
        json!({
            "schoolId": school_id,
            "classId": class_id,
            "dateFrom": "2025-05-31",
            "dateTo": "2025-05-01"
        }),
    );
    assert_eq!(error_code(&reversed), "bad_params");
}
