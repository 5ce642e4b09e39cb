//! Plain patch application over `serde_json::Value` documents.
//!
//! `None` stands for "the document does not exist". Application is atomic:
//! the input is never modified, and on error no partial result escapes.

use serde_json::{Map, Value};

use palimpsest_types::{format_path, Patch, PatchOp, PathSegment};

use crate::{PatchError, Result};

/// Apply `patch` to `document`, returning the new document or `None` if the
/// patch deleted it.
pub fn apply_patch(document: Option<&Value>, patch: &Patch) -> Result<Option<Value>> {
    let mut state = document.cloned();

    for op in patch.ops() {
        match op {
            PatchOp::Replace { value } => state = Some(value.clone()),
            PatchOp::Delete => state = None,
            PatchOp::Set { path, value } => {
                let root = require(&mut state, op)?;
                set_at(root, path, value.clone())?;
            }
            PatchOp::Unset { path } => {
                let root = require(&mut state, op)?;
                unset_at(root, path)?;
            }
            PatchOp::Insert { path, index, items } => {
                let root = require(&mut state, op)?;
                let target = array_at(root, path)?;
                if *index > target.len() {
                    return Err(PatchError::IndexOutOfBounds {
                        path: format_path(path),
                        index: *index,
                        len: target.len(),
                    });
                }
                target.splice(*index..*index, items.iter().cloned());
            }
            PatchOp::Remove { path, index, count } => {
                let root = require(&mut state, op)?;
                let target = array_at(root, path)?;
                let end = index.saturating_add(*count);
                if end > target.len() {
                    return Err(PatchError::IndexOutOfBounds {
                        path: format_path(path),
                        index: end.saturating_sub(1),
                        len: target.len(),
                    });
                }
                target.drain(*index..end);
            }
        }
    }

    tracing::trace!(ops = patch.len(), exists = state.is_some(), "applied patch");
    Ok(state)
}

fn require<'a>(state: &'a mut Option<Value>, op: &PatchOp) -> Result<&'a mut Value> {
    state.as_mut().ok_or(PatchError::MissingDocument { op: op.name() })
}

/// JSON type name for error messages.
pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn expected_for(segment: &PathSegment) -> &'static str {
    match segment {
        PathSegment::Key(_) => "object",
        PathSegment::Index(_) => "array",
    }
}

/// Walk `path` from `root`. With `create`, missing object keys are filled
/// with empty objects on the way down.
fn node_at<'a>(
    root: &'a mut Value,
    path: &[PathSegment],
    create: bool,
) -> Result<&'a mut Value> {
    let mut node = root;
    for (depth, segment) in path.iter().enumerate() {
        node = match (node, segment) {
            (Value::Object(map), PathSegment::Key(key)) => {
                if create {
                    map.entry(key.clone()).or_insert_with(|| Value::Object(Map::new()))
                } else {
                    map.get_mut(key).ok_or_else(|| PatchError::PathNotFound {
                        path: format_path(&path[..=depth]),
                    })?
                }
            }
            (Value::Array(items), PathSegment::Index(index)) => {
                let len = items.len();
                items.get_mut(*index).ok_or_else(|| PatchError::IndexOutOfBounds {
                    path: format_path(&path[..depth]),
                    index: *index,
                    len,
                })?
            }
            (other, segment) => {
                return Err(PatchError::TypeMismatch {
                    path: format_path(&path[..depth]),
                    expected: expected_for(segment),
                    found: json_type(other),
                });
            }
        };
    }
    Ok(node)
}

fn array_at<'a>(root: &'a mut Value, path: &[PathSegment]) -> Result<&'a mut Vec<Value>> {
    match node_at(root, path, false)? {
        Value::Array(items) => Ok(items),
        other => Err(PatchError::TypeMismatch {
            path: format_path(path),
            expected: "array",
            found: json_type(other),
        }),
    }
}

fn set_at(root: &mut Value, path: &[PathSegment], value: Value) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        return Err(PatchError::PathNotFound { path: format_path(path) });
    };

    match (node_at(root, parents, true)?, last) {
        (Value::Object(map), PathSegment::Key(key)) => {
            map.insert(key.clone(), value);
        }
        (Value::Array(items), PathSegment::Index(index)) => {
            let len = items.len();
            if *index < len {
                items[*index] = value;
            } else if *index == len {
                items.push(value);
            } else {
                return Err(PatchError::IndexOutOfBounds {
                    path: format_path(parents),
                    index: *index,
                    len,
                });
            }
        }
        (other, segment) => {
            return Err(PatchError::TypeMismatch {
                path: format_path(parents),
                expected: expected_for(segment),
                found: json_type(other),
            });
        }
    }
    Ok(())
}

fn unset_at(root: &mut Value, path: &[PathSegment]) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        return Err(PatchError::PathNotFound { path: format_path(path) });
    };

    match (node_at(root, parents, false)?, last) {
        (Value::Object(map), PathSegment::Key(key)) => {
            // Unsetting an absent key is a no-op.
            map.remove(key);
        }
        (Value::Array(items), PathSegment::Index(index)) => {
            if *index >= items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    path: format_path(parents),
                    index: *index,
                    len: items.len(),
                });
            }
            items.remove(*index);
        }
        (other, segment) => {
            return Err(PatchError::TypeMismatch {
                path: format_path(parents),
                expected: expected_for(segment),
                found: json_type(other),
            });
        }
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(ops: Value) -> Patch {
        serde_json::from_value(ops).unwrap()
    }

    #[test]
    fn test_replace_creates_document() {
        let p = patch(json!([{"op": "replace", "value": {"title": "Hi"}}]));
        assert_eq!(apply_patch(None, &p).unwrap(), Some(json!({"title": "Hi"})));
    }

    #[test]
    fn test_delete_removes_document() {
        let doc = json!({"title": "Hi"});
        assert_eq!(apply_patch(Some(&doc), &Patch::delete()).unwrap(), None);
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let doc = json!({"title": "Hi"});
        let p = patch(json!([{"op": "set", "path": ["meta", "seo", "slug"], "value": "hi"}]));
        let out = apply_patch(Some(&doc), &p).unwrap().unwrap();
        assert_eq!(out, json!({"title": "Hi", "meta": {"seo": {"slug": "hi"}}}));
    }

    #[test]
    fn test_array_ops() {
        let doc = json!({"tags": ["a", "d"]});
        let p = patch(json!([
            {"op": "insert", "path": ["tags"], "index": 1, "items": ["b", "c"]},
            {"op": "set", "path": ["tags", 4], "value": "e"},
            {"op": "remove", "path": ["tags"], "index": 0, "count": 1},
            {"op": "unset", "path": ["tags", 0]},
        ]));
        let out = apply_patch(Some(&doc), &p).unwrap().unwrap();
        assert_eq!(out, json!({"tags": ["c", "d", "e"]}));
    }

    #[test]
    fn test_input_is_untouched_on_error() {
        let doc = json!({"tags": ["a"]});
        let p = patch(json!([
            {"op": "set", "path": ["title"], "value": "x"},
            {"op": "remove", "path": ["tags"], "index": 0, "count": 2},
        ]));
        let err = apply_patch(Some(&doc), &p).unwrap_err();
        assert!(matches!(err, PatchError::IndexOutOfBounds { .. }));
        assert_eq!(doc, json!({"tags": ["a"]}));
    }

    #[test]
    fn test_path_op_on_missing_document() {
        let p = patch(json!([{"op": "set", "path": ["title"], "value": "x"}]));
        assert_eq!(
            apply_patch(None, &p).unwrap_err(),
            PatchError::MissingDocument { op: "set" }
        );
    }

    #[test]
    fn test_type_mismatch() {
        let doc = json!({"title": "Hi"});
        let p = patch(json!([{"op": "insert", "path": ["title"], "index": 0, "items": [1]}]));
        assert_eq!(
            apply_patch(Some(&doc), &p).unwrap_err(),
            PatchError::TypeMismatch {
                path: ".title".into(),
                expected: "array",
                found: "string",
            }
        );
    }

    #[test]
    fn test_unset_missing_key_is_noop() {
        let doc = json!({"title": "Hi"});
        let p = patch(json!([{"op": "unset", "path": ["nope"]}]));
        assert_eq!(apply_patch(Some(&doc), &p).unwrap(), Some(doc));
    }
}
