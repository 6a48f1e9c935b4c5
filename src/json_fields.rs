//! Helpers for lifting loosely typed JSON source objects onto
//! [`RawRecord`](catalog_core::RawRecord) fields.
//!
//! Every helper *removes* the keys it consumes so that whatever is left
//! over can be kept verbatim as the record's pass-through map.

use catalog_core::models::is_present;
use catalog_core::RawDate;
use serde_json::{Map, Value};

/// Text of the first key that holds a usable scalar. All listed keys are
/// consumed.
pub fn take_text(obj: &mut Map<String, Value>, keys: &[&str]) -> Option<String> {
    let mut found = None;
    for key in keys {
        if let Some(value) = obj.remove(*key) {
            if found.is_none() {
                found = scalar_text(&value);
            }
        }
    }
    found
}

/// Raw date of the first populated key: numbers stay epochs, strings stay
/// text for the normalizer to parse.
pub fn take_date(obj: &mut Map<String, Value>, keys: &[&str]) -> Option<RawDate> {
    let mut found = None;
    for key in keys {
        if let Some(value) = obj.remove(*key) {
            if found.is_some() {
                continue;
            }
            found = match value {
                Value::Number(n) => n.as_f64().map(RawDate::Epoch),
                Value::String(s) if is_present(Some(s.as_str())) => Some(RawDate::Text(s.trim().to_string())),
                _ => None,
            };
        }
    }
    found
}

/// Non-negative integer count, accepting numeric strings and floats.
pub fn take_count(obj: &mut Map<String, Value>, keys: &[&str]) -> Option<u64> {
    let mut found = None;
    for key in keys {
        if let Some(value) = obj.remove(*key) {
            if found.is_some() {
                continue;
            }
            found = match value {
                Value::Number(n) => n
                    .as_u64()
                    .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
                Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64),
                _ => None,
            };
        }
    }
    found
}

/// List of strings from an array, or from a comma separated string.
pub fn take_list(obj: &mut Map<String, Value>, keys: &[&str]) -> Vec<String> {
    let mut found = Vec::new();
    for key in keys {
        let Some(value) = obj.remove(*key) else {
            continue;
        };
        if !found.is_empty() {
            continue;
        }
        found = match value {
            Value::Array(items) => items.iter().filter_map(scalar_text).collect(),
            Value::String(s) => s
                .split(',')
                .map(str::trim)
                .filter(|p| is_present(Some(*p)))
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };
    }
    found
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if is_present(Some(s.as_str())) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_take_text_falls_back_and_consumes_all_keys() {
        let mut o = obj(json!({"Study Title": "  ", "Study Publication Title": "Bone loss", "x": 1}));
        assert_eq!(
            take_text(&mut o, &["Study Title", "Study Publication Title"]).as_deref(),
            Some("Bone loss")
        );
        assert_eq!(o.len(), 1);
        assert!(o.contains_key("x"));
    }

    #[test]
    fn test_take_date_keeps_numbers_as_epochs() {
        let mut o = obj(json!({"Study Public Release Date": 1556668800}));
        assert_eq!(
            take_date(&mut o, &["Study Public Release Date", "release_date"]),
            Some(RawDate::Epoch(1556668800.0))
        );
        let mut o = obj(json!({"release_date": "05/01/2019"}));
        assert_eq!(
            take_date(&mut o, &["Study Public Release Date", "release_date"]),
            Some(RawDate::Text("05/01/2019".to_string()))
        );
    }

    #[test]
    fn test_take_count_accepts_strings() {
        let mut o = obj(json!({"cited_by": "12"}));
        assert_eq!(take_count(&mut o, &["cited_by"]), Some(12));
        let mut o = obj(json!({"cited_by": -3}));
        assert_eq!(take_count(&mut o, &["cited_by"]), None);
    }

    #[test]
    fn test_take_list_splits_strings() {
        let mut o = obj(json!({"fig_ids": "F1, F2,,"}));
        assert_eq!(take_list(&mut o, &["fig_ids"]), vec!["F1", "F2"]);
        let mut o = obj(json!({"fig_ids": ["F3", 4]}));
        assert_eq!(take_list(&mut o, &["fig_ids"]), vec!["F3", "4"]);
    }
}
