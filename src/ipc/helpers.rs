use super::error::HandlerErr;
use crate::records::PeriodType;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde_json::Value;
use std::collections::BTreeSet;

pub fn required_str(params: &Value, key: &str) -> Result<String, HandlerErr> {
    let s = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))?;
    if s.is_empty() {
        return Err(HandlerErr::bad_params(format!("{} must not be empty", key)));
    }
    Ok(s)
}

pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn required_year(params: &Value) -> Result<String, HandlerErr> {
    let year = required_str(params, "year")?;
    if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
        return Err(HandlerErr::bad_params("year must have 4 digits"));
    }
    Ok(year)
}

pub fn required_period_type(params: &Value) -> Result<PeriodType, HandlerErr> {
    let raw = required_str(params, "periodType")?;
    PeriodType::parse(&raw).ok_or_else(|| {
        HandlerErr::bad_params("periodType must be one of: monthly, bimonthly, quarterly, semester")
            .with_details(serde_json::json!({ "periodType": raw }))
    })
}

pub fn parse_period_label(raw: &str, period_type: PeriodType) -> Result<u32, HandlerErr> {
    let max = period_type.periods_per_year();
    match raw.trim().parse::<u32>() {
        Ok(n) if (1..=max).contains(&n) => Ok(n),
        _ => Err(HandlerErr::bad_params(format!(
            "period {:?} must be an integer in 1..={} for {}",
            raw,
            max,
            period_type.as_str()
        ))),
    }
}

/// Accepts `"1,2,3"` or `["1", 2, "3"]`. Returns the distinct labels in order.
pub fn required_periods(params: &Value, period_type: PeriodType) -> Result<Vec<u32>, HandlerErr> {
    let raw: Vec<String> = match params.get("periods") {
        Some(Value::String(s)) => s.split(',').map(|p| p.trim().to_string()).collect(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .collect(),
        _ => return Err(HandlerErr::bad_params("missing periods")),
    };

    let mut labels = BTreeSet::new();
    for p in raw.iter().filter(|p| !p.is_empty()) {
        labels.insert(parse_period_label(p, period_type)?);
    }
    if labels.is_empty() {
        return Err(HandlerErr::bad_params("provide at least one valid period"));
    }
    Ok(labels.into_iter().collect())
}

pub fn required_date(params: &Value, key: &str) -> Result<NaiveDate, HandlerErr> {
    let raw = required_str(params, key)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("{} must be YYYY-MM-DD", key)))
}

/// Optional RFC 3339 `generatedAt`; defaults to the local clock.
pub fn generated_at(params: &Value) -> Result<NaiveDateTime, HandlerErr> {
    match optional_str(params, "generatedAt") {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.naive_local())
            .map_err(|_| HandlerErr::bad_params("generatedAt must be an RFC 3339 timestamp")),
        None => Ok(Local::now().naive_local()),
    }
}

pub fn required_str_list(params: &Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let items = params
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| HandlerErr::bad_params(format!("{} must be an array", key)))?;
    let mut out = Vec::with_capacity(items.len());
    for (i, v) in items.iter().enumerate() {
        let s = v
            .as_str()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                HandlerErr::bad_params(format!("{}[{}] must be a non-empty string", key, i))
            })?;
        out.push(s.to_string());
    }
    Ok(out)
}

/// "Ana Souza" -> "Ana-Souza", for download file names.
pub fn file_slug(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn periods_accept_csv_and_arrays() {
        let p = json!({ "periods": " 3, 1,,2 ,3" });
        assert_eq!(required_periods(&p, PeriodType::Bimonthly).expect("csv"), vec![1, 2, 3]);
        let p = json!({ "periods": ["2", 4] });
        assert_eq!(required_periods(&p, PeriodType::Quarterly).expect("array"), vec![2, 4]);
    }

    #[test]
    fn periods_are_bounded_by_period_type() {
        let p = json!({ "periods": "3" });
        assert!(required_periods(&p, PeriodType::Semester).is_err());
        let p = json!({ "periods": "0" });
        assert!(required_periods(&p, PeriodType::Monthly).is_err());
        let p = json!({ "periods": " , " });
        assert!(required_periods(&p, PeriodType::Monthly).is_err());
    }

    #[test]
    fn year_must_be_four_digits() {
        assert!(required_year(&json!({ "year": "2025" })).is_ok());
        assert!(required_year(&json!({ "year": "25" })).is_err());
        assert!(required_year(&json!({ "year": "20x5" })).is_err());
    }

    #[test]
    fn generated_at_keeps_wall_clock_of_offset() {
        let ts = generated_at(&json!({ "generatedAt": "2025-06-30T14:05:00-03:00" })).expect("ts");
        assert_eq!(ts.format("%d/%m/%Y %H:%M").to_string(), "30/06/2025 14:05");
    }

    #[test]
    fn slug_joins_words() {
        assert_eq!(file_slug("  Ana   Maria Souza "), "Ana-Maria-Souza");
    }
}
