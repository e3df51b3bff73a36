// Display-name property heuristic.
//
// Adapted from Cesium's ImageryLayerFeatureInfo property scan: given one
// representative feature's properties, pick the attribute most likely to
// hold a human-readable region name.

use indexmap::IndexMap;
use serde_json::Value;

/// Pick the best display-name property from a feature's property map.
///
/// Single pass over the keys, case-insensitive, retaining the
/// highest-priority match seen so far:
/// 1. key is exactly "name"
/// 2. key is exactly "title"
/// 3. key contains "name"
/// 4. key contains "title"
///
/// Candidates with falsy values (null, empty string, zero, false) are
/// rejected. Known quirk kept from the original scan: a legitimately
/// zero-valued name column is skipped in favour of lower tiers.
///
/// Returns `None` when no key matches any tier; callers omit the
/// `nameProp` field in that case rather than defaulting it.
pub fn determine_name_property(properties: &IndexMap<String, Value>) -> Option<String> {
    let mut precedence = u8::MAX;
    let mut name_property = None;

    for (key, value) in properties {
        if is_falsy(value) {
            continue;
        }
        let lower = key.to_lowercase();
        let tier = if lower == "name" {
            1
        } else if lower == "title" {
            2
        } else if lower.contains("name") {
            3
        } else if lower.contains("title") {
            4
        } else {
            continue;
        };
        if tier < precedence {
            precedence = tier;
            name_property = Some(key.clone());
        }
    }

    name_property
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
