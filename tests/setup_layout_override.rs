mod test_support;

use serde_json::json;
use test_support::{error_code, texts, Fixture};

#[test]
fn setup_defaults_match_the_stock_geometry() {
    let mut f = Fixture::new("schoolreport-setup-defaults");
    let setup = f.ok("setup.get", json!({}));
    assert_eq!(setup["reports"]["showLegend"], true);
    assert_eq!(
        setup["reports"]["footerText"],
        "Generated by the school reporting system"
    );
    assert_eq!(setup["layout"]["gradeRowHeight"], 30.0);
    assert_eq!(setup["layout"]["subjectWidth"], 300.0);
    assert_eq!(setup["layout"]["attendanceRowHeight"], 25.0);
    assert_eq!(setup["layout"]["pageBreakY"], 700.0);
}

#[test]
fn layout_and_report_sections_persist_and_validate() {
    let mut f = Fixture::new("schoolreport-setup-layout");

    f.ok(
        "setup.update",
        json!({ "section": "layout", "patch": { "gradeRowHeight": 20, "subjectWidth": 280 } }),
    );
    f.ok(
        "setup.update",
        json!({
            "section": "reports",
            "patch": { "showLegend": false, "footerText": "Riverside office" }
        }),
    );

    let setup = f.ok("setup.get", json!({}));
    assert_eq!(setup["layout"]["gradeRowHeight"], 20.0);
    assert_eq!(setup["layout"]["subjectWidth"], 280.0);
    assert_eq!(setup["layout"]["averageWidth"], 90.0);
    assert_eq!(setup["reports"]["showLegend"], false);

    let rejected = [
        json!({ "section": "layout", "patch": { "gradeRowHeight": 5 } }),
        json!({ "section": "layout", "patch": { "marginLeft": 10 } }),
        json!({ "section": "reports", "patch": { "footerText": "" } }),
        json!({ "section": "reports", "patch": { "showLegend": "no" } }),
        json!({ "section": "security", "patch": {} }),
        json!({ "section": "layout", "patch": [] }),
        // Each value is in range on its own but the table no longer fits the page.
        json!({ "section": "layout", "patch": { "subjectWidth": 400 } }),
        json!({ "section": "layout", "patch": { "attendanceColumnWidth": 260 } }),
        json!({ "section": "layout", "patch": { "pageBreakY": 760 } }),
    ];
    for params in rejected {
        let resp = f.call("setup.update", params.clone());
        assert_eq!(error_code(&resp), "bad_params", "{}", params);
    }
    let setup = f.ok("setup.get", json!({}));
    assert_eq!(setup["layout"]["gradeRowHeight"], 20.0);
    assert_eq!(setup["layout"]["subjectWidth"], 280.0);
    assert_eq!(setup["layout"]["pageBreakY"], 700.0);

    let school_id = f.school_id.clone();
    let student_id = f.student_id.clone();
    let math = f.create_id(
        "disciplines.create",
        json!({ "schoolId": school_id, "name": "Mathematics" }),
        "disciplineId",
    );
    for label in ["1", "2"] {
        f.ok(
            "grades.record",
            json!({
                "studentId": student_id,
                "disciplineId": math,
                "year": "2025",
                "periodType": "semester",
                "periodLabel": label,
                "score": 7.0
            }),
        );
    }

    let card = f.ok(
        "reports.gradeCard",
        json!({
            "schoolId": school_id,
            "studentId": student_id,
            "year": "2025",
            "periodType": "semester",
            "periods": "2",
            "generatedAt": "2025-12-15T10:30:00+00:00"
        }),
    );
    let ops = card["instructions"].as_array().expect("ops");
    let header_band = ops
        .iter()
        .find(|op| op["op"] == "rect" && op["fill"] == "#2E5090")
        .expect("header band");
    assert_eq!(header_band["height"], 20.0);
    assert_eq!(header_band["width"], 280.0 + 90.0 + 100.0);

    let t = texts(&card);
    assert!(t.iter().any(|s| s == "TREND"));
    assert!(!t.iter().any(|s| s == "TREND LEGEND:"), "legend switched off");
    assert!(t.iter().any(|s| s == "Riverside office on 15/12/2025 10:30"));
}
