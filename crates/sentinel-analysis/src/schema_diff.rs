//! Structural JSON schema diff engine.
//!
//! Compares an expected schema (the contract) against an actual response
//! body and produces a list of concrete, machine-readable differences.
//! The walk descends nested objects recursively so it catches changes at
//! any depth (e.g. `data.user.address.zip` disappeared).
//!
//! Pure logic: no I/O, no database, no side effects, never panics.

use serde_json::Value;
use tracing::{debug, warn};

/// Category of a single difference
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    /// Key present in expected, absent in actual
    MissingField,
    /// Key present in actual, absent in expected
    NewField,
    /// Key present in both with differing canonical types
    TypeMismatch,
}

/// One concrete difference between expected and actual
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SchemaDifference {
    pub kind: DiffKind,
    /// Dot-joined path, e.g. `data.user.name` or `items[].price`
    pub path: String,
    pub expected_type: Option<String>,
    pub actual_type: Option<String>,
}

/// Aggregate result of a schema comparison
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SchemaDiffResult {
    pub missing_fields: Vec<SchemaDifference>,
    pub new_fields: Vec<SchemaDifference>,
    pub type_mismatches: Vec<SchemaDifference>,
    pub total_differences: usize,
}

impl SchemaDiffResult {
    pub fn has_drift(&self) -> bool {
        self.total_differences > 0
    }
}

/// Canonical type label for a JSON value
pub fn type_label(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                "int"
            } else {
                "float"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Compare an expected schema against an actual response body.
///
/// Both arguments must be JSON objects; callers handle the non-object case
/// with a skip reason before calling this function (see [`SchemaValidator`]).
pub fn compute_diff(
    expected: &serde_json::Map<String, Value>,
    actual: &serde_json::Map<String, Value>,
) -> SchemaDiffResult {
    let mut result = SchemaDiffResult::default();
    walk(expected, actual, "", &mut result);
    result.total_differences = result.missing_fields.len()
        + result.new_fields.len()
        + result.type_mismatches.len();
    result
}

fn walk(
    expected: &serde_json::Map<String, Value>,
    actual: &serde_json::Map<String, Value>,
    prefix: &str,
    out: &mut SchemaDiffResult,
) {
    // Sorted key enumeration keeps reports deterministic
    let mut expected_keys: Vec<&String> = expected.keys().collect();
    expected_keys.sort();
    let mut actual_keys: Vec<&String> = actual.keys().collect();
    actual_keys.sort();

    for key in &expected_keys {
        if !actual.contains_key(*key) {
            out.missing_fields.push(SchemaDifference {
                kind: DiffKind::MissingField,
                path: format!("{prefix}{key}"),
                expected_type: Some(type_label(&expected[*key]).to_string()),
                actual_type: None,
            });
        }
    }

    for key in &actual_keys {
        if !expected.contains_key(*key) {
            out.new_fields.push(SchemaDifference {
                kind: DiffKind::NewField,
                path: format!("{prefix}{key}"),
                expected_type: None,
                actual_type: Some(type_label(&actual[*key]).to_string()),
            });
        }
    }

    for key in &expected_keys {
        let Some(act_val) = actual.get(*key) else {
            continue;
        };
        let exp_val = &expected[*key];
        let path = format!("{prefix}{key}");

        // Null in actual means the field exists but is null; only a mismatch
        // when expected is not also null.
        if act_val.is_null() && !exp_val.is_null() {
            out.type_mismatches.push(SchemaDifference {
                kind: DiffKind::TypeMismatch,
                path,
                expected_type: Some(type_label(exp_val).to_string()),
                actual_type: Some("null".to_string()),
            });
            continue;
        }

        // Expected null means "unspecified here"; any actual value passes.
        if exp_val.is_null() {
            continue;
        }

        let exp_type = type_label(exp_val);
        let act_type = type_label(act_val);
        if exp_type != act_type {
            out.type_mismatches.push(SchemaDifference {
                kind: DiffKind::TypeMismatch,
                path,
                expected_type: Some(exp_type.to_string()),
                actual_type: Some(act_type.to_string()),
            });
            continue;
        }

        if let (Value::Object(exp_map), Value::Object(act_map)) = (exp_val, act_val) {
            walk(exp_map, act_map, &format!("{path}."), out);
        }

        // Arrays of objects: compare element structure of the first item only;
        // heterogeneous arrays are not pair-walked beyond element zero.
        if let (Value::Array(exp_arr), Value::Array(act_arr)) = (exp_val, act_val) {
            if let (Some(Value::Object(exp_first)), Some(Value::Object(act_first))) =
                (exp_arr.first(), act_arr.first())
            {
                walk(exp_first, act_first, &format!("{path}[]."), out);
            }
        }
    }
}

/// Result from the schema validator, passed through the pipeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriftAnalysis {
    pub diff: Option<SchemaDiffResult>,
    pub skipped_reason: Option<String>,
}

impl DriftAnalysis {
    pub fn has_drift(&self) -> bool {
        self.diff.as_ref().map(|d| d.has_drift()).unwrap_or(false)
    }

    pub fn drift_count(&self) -> usize {
        self.diff.as_ref().map(|d| d.total_differences).unwrap_or(0)
    }

    fn skipped(reason: &str) -> Self {
        DriftAnalysis {
            diff: None,
            skipped_reason: Some(reason.to_string()),
        }
    }
}

/// Compares an endpoint's expected schema against a captured response body,
/// yielding a skip reason whenever the comparison is impossible.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn validate(
        &self,
        expected_schema: Option<&Value>,
        response_body: Option<&Value>,
    ) -> DriftAnalysis {
        let Some(expected) = expected_schema else {
            return DriftAnalysis::skipped("No expected schema configured");
        };
        let Some(body) = response_body else {
            return DriftAnalysis::skipped("No response body to compare");
        };
        let Some(expected_map) = expected.as_object() else {
            return DriftAnalysis::skipped("Expected schema is not an object");
        };
        let Some(body_map) = body.as_object() else {
            return DriftAnalysis::skipped("Response body is not an object");
        };

        let diff = compute_diff(expected_map, body_map);
        if diff.has_drift() {
            warn!(
                "Schema drift detected: {} difference(s)",
                diff.total_differences
            );
        } else {
            debug!("Schema check passed — no drift");
        }

        DriftAnalysis {
            diff: Some(diff),
            skipped_reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diff(expected: Value, actual: Value) -> SchemaDiffResult {
        compute_diff(
            expected.as_object().unwrap(),
            actual.as_object().unwrap(),
        )
    }

    #[test]
    fn identical_objects_have_no_drift() {
        let result = diff(
            json!({"ok": true, "count": 3}),
            json!({"ok": true, "count": 5}),
        );
        assert_eq!(result.total_differences, 0);
        assert!(!result.has_drift());
    }

    #[test]
    fn detects_missing_new_and_mismatched_fields() {
        let result = diff(
            json!({"user": {"name": "x", "age": 0}}),
            json!({"user": {"name": "x", "email": "y"}}),
        );
        assert_eq!(result.total_differences, 2);
        assert_eq!(result.missing_fields[0].path, "user.age");
        assert_eq!(result.missing_fields[0].expected_type.as_deref(), Some("int"));
        assert_eq!(result.new_fields[0].path, "user.email");
        assert_eq!(result.new_fields[0].actual_type.as_deref(), Some("string"));
    }

    #[test]
    fn type_change_is_reported_with_both_labels() {
        let result = diff(json!({"total": 1}), json!({"total": "1"}));
        assert_eq!(result.type_mismatches.len(), 1);
        let mm = &result.type_mismatches[0];
        assert_eq!(mm.path, "total");
        assert_eq!(mm.expected_type.as_deref(), Some("int"));
        assert_eq!(mm.actual_type.as_deref(), Some("string"));
    }

    #[test]
    fn int_and_float_are_distinct_labels() {
        let result = diff(json!({"price": 1}), json!({"price": 1.5}));
        assert_eq!(result.type_mismatches.len(), 1);
        assert_eq!(result.type_mismatches[0].actual_type.as_deref(), Some("float"));
    }

    #[test]
    fn null_in_actual_is_a_mismatch_against_non_null() {
        let result = diff(json!({"name": "x"}), json!({"name": null}));
        assert_eq!(result.type_mismatches.len(), 1);
        assert_eq!(result.type_mismatches[0].actual_type.as_deref(), Some("null"));
    }

    #[test]
    fn null_in_expected_accepts_anything() {
        let result = diff(json!({"meta": null}), json!({"meta": {"a": 1}}));
        assert_eq!(result.total_differences, 0);
    }

    #[test]
    fn walks_arrays_of_objects_through_first_element() {
        let result = diff(
            json!({"items": [{"price": 1.0, "sku": "a"}]}),
            json!({"items": [{"sku": "a"}, {"bogus": true}]}),
        );
        assert_eq!(result.total_differences, 1);
        assert_eq!(result.missing_fields[0].path, "items[].price");
    }

    #[test]
    fn empty_arrays_are_not_descended() {
        let result = diff(json!({"items": []}), json!({"items": [1, 2]}));
        assert_eq!(result.total_differences, 0);
    }

    #[test]
    fn swap_preserves_total_and_exchanges_missing_with_new() {
        let expected = json!({"a": 1, "b": "x", "nested": {"c": true}});
        let actual = json!({"b": 2, "d": [1], "nested": {"e": "y"}});

        let forward = diff(expected.clone(), actual.clone());
        let backward = diff(actual, expected);

        assert_eq!(forward.total_differences, backward.total_differences);
        assert_eq!(forward.missing_fields.len(), backward.new_fields.len());
        assert_eq!(forward.new_fields.len(), backward.missing_fields.len());
    }

    #[test]
    fn reported_paths_are_sorted() {
        let result = diff(json!({"z": 1, "a": 1, "m": 1}), json!({}));
        let paths: Vec<&str> = result.missing_fields.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "m", "z"]);
    }

    #[test]
    fn validator_skips_non_object_inputs() {
        let validator = SchemaValidator;

        let no_schema = validator.validate(None, Some(&json!({"ok": true})));
        assert!(no_schema.skipped_reason.is_some());
        assert!(!no_schema.has_drift());

        let no_body = validator.validate(Some(&json!({"ok": true})), None);
        assert!(no_body.skipped_reason.is_some());

        let scalar_body = validator.validate(Some(&json!({"ok": true})), Some(&json!(42)));
        assert!(scalar_body.skipped_reason.is_some());
        assert_eq!(scalar_body.drift_count(), 0);
    }

    #[test]
    fn validator_reports_drift_counts() {
        let validator = SchemaValidator;
        let analysis = validator.validate(
            Some(&json!({"a": 1, "b": 2})),
            Some(&json!({"a": 1})),
        );
        assert!(analysis.has_drift());
        assert_eq!(analysis.drift_count(), 1);
        assert!(analysis.skipped_reason.is_none());
    }
}
