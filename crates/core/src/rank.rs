//! Rank normalization.
//!
//! A rank is either a positive integer position or absent. Zero, negative,
//! fractional-garbage and non-numeric values never reach storage.

use serde_json::Value;

/// Normalize a raw rank into a storable position.
///
/// Finite numbers are rounded to the nearest integer; anything that is not
/// a positive integer afterwards becomes `None`.
pub fn normalize_rank(raw: f64) -> Option<i32> {
    if !raw.is_finite() {
        return None;
    }
    let rounded = raw.round();
    if rounded < 1.0 || rounded > f64::from(i32::MAX) {
        return None;
    }
    Some(rounded as i32)
}

/// Normalize a rank taken from a collaborator's JSON output.
///
/// Accepts numbers and numeric strings; `null`, booleans, objects and
/// unparsable strings count as "not found".
pub fn rank_from_json(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_f64().and_then(normalize_rank),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(normalize_rank),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn positive_ranks_pass_through() {
        assert_eq!(normalize_rank(1.0), Some(1));
        assert_eq!(normalize_rank(20.0), Some(20));
    }

    #[test]
    fn non_positive_ranks_become_none() {
        assert_eq!(normalize_rank(0.0), None);
        assert_eq!(normalize_rank(-3.0), None);
        assert_eq!(normalize_rank(0.4), None);
    }

    #[test]
    fn non_finite_ranks_become_none() {
        assert_eq!(normalize_rank(f64::NAN), None);
        assert_eq!(normalize_rank(f64::INFINITY), None);
    }

    #[test]
    fn json_values() {
        assert_eq!(rank_from_json(&json!(3)), Some(3));
        assert_eq!(rank_from_json(&json!("7")), Some(7));
        assert_eq!(rank_from_json(&json!(0)), None);
        assert_eq!(rank_from_json(&json!(null)), None);
        assert_eq!(rank_from_json(&json!("n/a")), None);
        assert_eq!(rank_from_json(&json!({"rank": 1})), None);
    }
}
