use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::layout::LayoutConfig;
use serde_json::{json, Map, Value};

const DEFAULT_FOOTER: &str = "Generated by the school reporting system";

#[derive(Clone, Copy)]
enum SetupSection {
    Reports,
    Layout,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "reports" => Some(Self::Reports),
            "layout" => Some(Self::Layout),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Reports => "setup.reports",
            Self::Layout => "setup.layout",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Reports => json!({
            "showLegend": true,
            "footerText": DEFAULT_FOOTER
        }),
        SetupSection::Layout => {
            serde_json::to_value(LayoutConfig::default()).unwrap_or_else(|_| json!({}))
        }
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool()
        .ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_f64_range(v: &Value, key: &str, min: f64, max: f64) -> Result<f64, String> {
    let n = v
        .as_f64()
        .ok_or_else(|| format!("{} must be a number", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Reports => match k.as_str() {
                "showLegend" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                "footerText" => {
                    let s = parse_string_max(v, k, 120)?;
                    if s.is_empty() {
                        return Err("footerText must not be empty".into());
                    }
                    obj.insert(k.clone(), Value::String(s));
                }
                _ => return Err(format!("unknown reports field: {}", k)),
            },
            SetupSection::Layout => match k.as_str() {
                "gradeRowHeight" | "attendanceRowHeight" => {
                    obj.insert(k.clone(), json!(parse_f64_range(v, k, 15.0, 60.0)?));
                }
                "subjectWidth" => {
                    obj.insert(k.clone(), json!(parse_f64_range(v, k, 60.0, 400.0)?));
                }
                "averageWidth" | "trendWidth" => {
                    obj.insert(k.clone(), json!(parse_f64_range(v, k, 40.0, 200.0)?));
                }
                "attendanceColumnWidth" => {
                    obj.insert(k.clone(), json!(parse_f64_range(v, k, 60.0, 300.0)?));
                }
                "pageBreakY" => {
                    obj.insert(k.clone(), json!(parse_f64_range(v, k, 400.0, 780.0)?));
                }
                "wrapChars" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 40, 140)?));
                }
                _ => return Err(format!("unknown layout field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Keys are merged one at a time; a malformed one keeps its default.
            for (k, v) in saved_obj {
                let single: Map<String, Value> = [(k.clone(), v.clone())].into_iter().collect();
                let _ = merge_section_patch(section, &mut current, &single);
            }
        }
    }
    Ok(current)
}

/// Geometry used by the document builders, defaults merged with saved overrides.
pub fn layout_config(conn: &rusqlite::Connection) -> anyhow::Result<LayoutConfig> {
    let v = load_section(conn, SetupSection::Layout)?;
    Ok(serde_json::from_value(v)?)
}

#[derive(Debug, Clone)]
pub struct ReportPrefs {
    pub show_legend: bool,
    pub footer_text: String,
}

pub fn report_prefs(conn: &rusqlite::Connection) -> anyhow::Result<ReportPrefs> {
    let v = load_section(conn, SetupSection::Reports)?;
    Ok(ReportPrefs {
        show_legend: v.get("showLegend").and_then(|b| b.as_bool()).unwrap_or(true),
        footer_text: v
            .get("footerText")
            .and_then(|s| s.as_str())
            .unwrap_or(DEFAULT_FOOTER)
            .to_string(),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let reports = match load_section(conn, SetupSection::Reports) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let layout = match load_section(conn, SetupSection::Layout) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(&req.id, json!({ "reports": reports, "layout": layout }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let SetupSection::Layout = section {
        let cfg: LayoutConfig = match serde_json::from_value(current.clone()) {
            Ok(c) => c,
            Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
        };
        if let Err(e) = cfg.validate() {
            return err(&req.id, "bad_params", e.to_string(), None);
        }
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
