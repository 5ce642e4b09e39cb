//! Building patches from snapshots.
//!
//! Given two versions of a document, produce the field-level patch that moves
//! one to the other. Objects are diffed key by key; anything else that
//! changed is set whole.

use serde_json::{Map, Value};

use palimpsest_types::{Patch, PatchOp, PatchPair, PathSegment};

use crate::Result;

/// Patch that turns `from` into `to`. `None` means "no document".
pub fn derive_patch(from: Option<&Value>, to: Option<&Value>) -> Result<Patch> {
    let patch = match (from, to) {
        (None, None) => Patch::default(),
        (Some(_), None) => Patch::delete(),
        (None, Some(value)) => Patch::replace(value.clone())?,
        (Some(Value::Object(old)), Some(Value::Object(new))) => {
            let mut ops = Vec::new();
            diff_fields(old, new, &mut Vec::new(), &mut ops);
            Patch::new(ops)?
        }
        (Some(_), Some(value)) => Patch::replace(value.clone())?,
    };
    Ok(patch)
}

/// Forward patch and inverse between two snapshots.
pub fn patch_pair(from: Option<&Value>, to: Option<&Value>) -> Result<PatchPair> {
    Ok(PatchPair::new(derive_patch(from, to)?, derive_patch(to, from)?))
}

fn diff_fields(
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    path: &mut Vec<PathSegment>,
    ops: &mut Vec<PatchOp>,
) {
    for key in old.keys().filter(|k| !new.contains_key(*k)) {
        ops.push(PatchOp::Unset { path: child(path, key) });
    }

    for (key, value) in new {
        match old.get(key) {
            Some(prev) if prev == value => {}
            Some(Value::Object(prev)) if value.is_object() => {
                if let Value::Object(next) = value {
                    path.push(PathSegment::Key(key.clone()));
                    diff_fields(prev, next, path, ops);
                    path.pop();
                }
            }
            _ => ops.push(PatchOp::Set { path: child(path, key), value: value.clone() }),
        }
    }
}

fn child(path: &[PathSegment], key: &str) -> Vec<PathSegment> {
    let mut out = path.to_vec();
    out.push(PathSegment::Key(key.to_string()));
    out
}

// ============================================================================
// Tests
// ============================================================================
