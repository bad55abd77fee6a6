// JSON path resolution for watched values
// Paths are dot separated; all-digit segments index arrays, anything else is an object key.

use crate::errors::{DecodeError, PathError, ResolveError};
use crate::models::WatchValue;
use serde_json::Value;
use tracing::instrument;

/// One step of a path expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Index(usize),
    Key(&'a str),
}

impl<'a> Segment<'a> {
    fn parse(raw: &'a str) -> Self {
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            // Overlong digit runs cannot index anything; keep them as an out-of-range index.
            Segment::Index(raw.parse().unwrap_or(usize::MAX))
        } else {
            Segment::Key(raw)
        }
    }
}

/// Split a path expression into its segments
pub fn segments(path: &str) -> impl Iterator<Item = Segment<'_>> {
    path.split('.').map(Segment::parse)
}

/// Parse `document` and resolve `path` to a scalar
#[instrument(skip(document), fields(document_len = document.len()))]
pub fn resolve(document: &str, path: &str) -> Result<WatchValue, ResolveError> {
    let parsed: Value = serde_json::from_str(document).map_err(|e| DecodeError {
        reason: e.to_string(),
        raw: document.to_string(),
    })?;

    Ok(resolve_value(&parsed, path)?)
}

/// Resolve `path` against an already parsed document
pub fn resolve_value(value: &Value, path: &str) -> Result<WatchValue, PathError> {
    let mut current = value;

    for (raw, segment) in path.split('.').zip(segments(path)) {
        let next = match (segment, current) {
            (Segment::Index(index), Value::Array(items)) => items.get(index).ok_or_else(|| {
                format!("index {} out of range (length {})", index, items.len())
            }),
            (Segment::Index(_), other) => Err(format!("expected an array, found {}", kind(other))),
            (Segment::Key(key), Value::Object(map)) => {
                map.get(key).ok_or_else(|| format!("key '{}' not found", key))
            }
            (Segment::Key(_), other) => Err(format!("expected an object, found {}", kind(other))),
        };

        current = next.map_err(|reason| PathError {
            path: path.to_string(),
            segment: raw.to_string(),
            reason,
            partial: current.clone(),
        })?;
    }

    WatchValue::from_json(current).ok_or_else(|| PathError {
        path: path.to_string(),
        segment: path.rsplit('.').next().unwrap_or(path).to_string(),
        reason: format!("resolves to {}, not a scalar", kind(current)),
        partial: current.clone(),
    })
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_nested_key() {
        let doc = r#"{"object": {"sha": "abc123", "type": "commit"}}"#;
        assert_eq!(resolve(doc, "object.sha").unwrap(), WatchValue::from("abc123"));
    }

    #[test]
    fn test_resolve_array_index() {
        let doc = r#"[{"name": "v2.0.0"}, {"name": "v1.9.0"}]"#;
        assert_eq!(resolve(doc, "0.name").unwrap(), WatchValue::from("v2.0.0"));
        assert_eq!(resolve(doc, "1.name").unwrap(), WatchValue::from("v1.9.0"));
    }

    #[test]
    fn test_resolve_number_leaf() {
        let doc = r#"{"release": {"id": 4021}}"#;
        assert_eq!(resolve(doc, "release.id").unwrap(), WatchValue::from("4021"));
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let err = resolve("not valid json", "a.b").unwrap_err();
        match err {
            ResolveError::Decode(e) => assert_eq!(e.raw, "not valid json"),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_key_is_path_error() {
        let err = resolve(r#"{"a": {"b": 1}}"#, "a.c").unwrap_err();
        match err {
            ResolveError::Path(e) => {
                assert_eq!(e.path, "a.c");
                assert_eq!(e.segment, "c");
                assert_eq!(e.partial, json!({"b": 1}));
            }
            other => panic!("expected path error, got {:?}", other),
        }
    }

    #[test]
    fn test_index_out_of_range() {
        let err = resolve_value(&json!({"tags": ["a"]}), "tags.3").unwrap_err();
        assert!(err.reason.contains("out of range"));
    }

    #[test]
    fn test_segment_on_scalar() {
        let err = resolve_value(&json!({"name": "x"}), "name.first").unwrap_err();
        assert_eq!(err.segment, "first");
        assert_eq!(err.partial, json!("x"));
    }

    #[test]
    fn test_digit_segment_requires_array() {
        let err = resolve_value(&json!({"0": "zero"}), "0").unwrap_err();
        assert!(err.reason.contains("expected an array"));
    }

    #[test]
    fn test_container_leaf_rejected() {
        let err = resolve_value(&json!({"object": {"sha": "x"}}), "object").unwrap_err();
        assert!(err.reason.contains("not a scalar"));
    }

    #[test]
    fn test_segments_parse() {
        let parsed: Vec<_> = segments("items.12.name").collect();
        assert_eq!(
            parsed,
            vec![Segment::Key("items"), Segment::Index(12), Segment::Key("name")]
        );
    }
}
