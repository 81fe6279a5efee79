//! Recursive delta merge for JSON documents.

use serde_json::Value;

/// Merges `delta` into `existing`.
///
/// Where both sides hold an object under the same key the merge recurses
/// field by field; any other value in `delta` (scalars, arrays, `null`)
/// overwrites what `existing` had. Keys absent from `delta` are untouched.
/// Applying the same delta twice yields the same document as applying it
/// once.
pub fn merge(delta: &Value, existing: &mut Value) {
    match (delta, existing) {
        (Value::Object(src), Value::Object(dest)) => {
            for (key, value) in src {
                match dest.get_mut(key) {
                    Some(slot) if value.is_object() && slot.is_object() => merge(value, slot),
                    _ => {
                        dest.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (delta, existing) => *existing = delta.clone(),
    }
}

/// Top-level keys a delta touches.
#[must_use]
pub fn touched_fields(delta: &Value) -> Vec<String> {
    delta
        .as_object()
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_objects_merge_field_by_field() {
        let mut existing = json!({
            "name": "cfg",
            "parameters": {"echo": "a", "repeat": 1, "extra": {"keep": true}}
        });
        merge(
            &json!({"parameters": {"repeat": 3, "extra": {"add": 1}}}),
            &mut existing,
        );
        assert_eq!(
            existing,
            json!({
                "name": "cfg",
                "parameters": {"echo": "a", "repeat": 3, "extra": {"keep": true, "add": 1}}
            })
        );
    }

    #[test]
    fn non_objects_overwrite() {
        let mut existing = json!({"tags": ["a", "b"], "parameters": {"echo": "a"}});
        merge(&json!({"tags": ["c"], "parameters": "reset"}), &mut existing);
        assert_eq!(existing, json!({"tags": ["c"], "parameters": "reset"}));
    }

    #[test]
    fn object_replaces_scalar() {
        let mut existing = json!({"parameters": null});
        merge(&json!({"parameters": {"echo": "x"}}), &mut existing);
        assert_eq!(existing, json!({"parameters": {"echo": "x"}}));
    }

    #[test]
    fn merge_is_idempotent() {
        let delta = json!({"a": {"b": 1, "c": [1, 2]}, "d": "x", "e": {"f": {"g": null}}});
        let mut once = json!({"a": {"b": 0, "z": true}, "e": 5, "k": "keep"});
        merge(&delta, &mut once);
        let mut twice = once.clone();
        merge(&delta, &mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn touched_fields_lists_top_level_keys() {
        let mut fields = touched_fields(&json!({"name": 1, "parameters": {"x": 1}}));
        fields.sort();
        assert_eq!(fields, ["name", "parameters"]);
        assert!(touched_fields(&json!("scalar")).is_empty());
    }
}
