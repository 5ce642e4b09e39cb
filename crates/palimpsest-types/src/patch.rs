//! Patch language for document versions.
//!
//! A [`Patch`] is an ordered list of [`PatchOp`]s applied to a document's
//! attribute tree. The set of operations is closed: anything arriving over the
//! wire is validated when it is deserialized, so the replay engine never has
//! to second-guess a patch it holds.
//!
//! ```text
//! [{"op": "set", "path": ["title"], "value": "Hello"},
//!  {"op": "insert", "path": ["tags"], "index": 0, "items": ["news"]}]
//! ```
//!
//! The document root is always an object, so every path starts with a key.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PatchValidationError;

/// One step of a path into a document: an object key or an array index.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "[{i}]"),
            PathSegment::Key(k) => write!(f, ".{k}"),
        }
    }
}

/// Path from the document root to a node.
pub type Path = Vec<PathSegment>;

/// Render a path for error messages, e.g. `.body[2].text`.
pub fn format_path(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "<root>".to_string();
    }
    path.iter().map(|s| s.to_string()).collect()
}

/// A single patch operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PatchOp {
    /// Replace the whole document. Also how a document comes into existence.
    Replace { value: Value },

    /// The document stops existing.
    Delete,

    /// Set the value at `path`, creating missing intermediate objects.
    Set { path: Path, value: Value },

    /// Remove the key or array item at `path`.
    Unset { path: Path },

    /// Splice `items` into the array at `path` before `index`.
    Insert {
        path: Path,
        index: usize,
        items: Vec<Value>,
    },

    /// Remove `count` items from the array at `path` starting at `index`.
    Remove {
        path: Path,
        index: usize,
        count: usize,
    },
}

impl PatchOp {
    /// Short name, matching the wire tag.
    pub fn name(&self) -> &'static str {
        match self {
            PatchOp::Replace { .. } => "replace",
            PatchOp::Delete => "delete",
            PatchOp::Set { .. } => "set",
            PatchOp::Unset { .. } => "unset",
            PatchOp::Insert { .. } => "insert",
            PatchOp::Remove { .. } => "remove",
        }
    }

    fn path(&self) -> Option<&[PathSegment]> {
        match self {
            PatchOp::Set { path, .. }
            | PatchOp::Unset { path }
            | PatchOp::Insert { path, .. }
            | PatchOp::Remove { path, .. } => Some(path),
            PatchOp::Replace { .. } | PatchOp::Delete => None,
        }
    }
}

/// A validated sequence of patch operations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PatchOp>", into = "Vec<PatchOp>")]
pub struct Patch(Vec<PatchOp>);

impl Patch {
    /// Build a patch, checking the structural rules of the patch language.
    pub fn new(ops: Vec<PatchOp>) -> Result<Self, PatchValidationError> {
        let last = ops.len().saturating_sub(1);
        for (i, op) in ops.iter().enumerate() {
            match op {
                PatchOp::Delete if i != last => {
                    return Err(PatchValidationError::DeleteNotLast { position: i });
                }
                PatchOp::Replace { value } if !value.is_object() => {
                    return Err(PatchValidationError::ReplaceNotObject { position: i });
                }
                PatchOp::Remove { count: 0, .. } => {
                    return Err(PatchValidationError::EmptyRemove { position: i });
                }
                _ => {}
            }
            if let Some(path) = op.path() {
                match path.first() {
                    None => {
                        return Err(PatchValidationError::EmptyPath { position: i, op: op.name() });
                    }
                    Some(PathSegment::Index(_)) => {
                        return Err(PatchValidationError::RootNotObject { position: i });
                    }
                    Some(PathSegment::Key(_)) => {}
                }
            }
        }
        Ok(Self(ops))
    }

    /// A patch that replaces the whole document.
    ///
    /// Fails if `value` is not an object.
    pub fn replace(value: Value) -> Result<Self, PatchValidationError> {
        Self::new(vec![PatchOp::Replace { value }])
    }

    /// A patch that deletes the document.
    pub fn delete() -> Self {
        Self(vec![PatchOp::Delete])
    }

    /// The operations, in application order.
    pub fn ops(&self) -> &[PatchOp] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if applying this patch leaves no document behind.
    pub fn is_delete(&self) -> bool {
        matches!(self.0.last(), Some(PatchOp::Delete))
    }

    /// True if this patch starts by replacing the whole document.
    pub fn is_replace(&self) -> bool {
        matches!(self.0.first(), Some(PatchOp::Replace { .. }))
    }
}

impl TryFrom<Vec<PatchOp>> for Patch {
    type Error = PatchValidationError;

    fn try_from(ops: Vec<PatchOp>) -> Result<Self, Self::Error> {
        Patch::new(ops)
    }
}

impl From<Patch> for Vec<PatchOp> {
    fn from(patch: Patch) -> Self {
        patch.0
    }
}

/// A forward patch and its inverse.
///
/// `apply` moves a version forward through a transaction, `revert` moves it
/// back. Replay in either direction only ever needs one of the two.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchPair {
    pub apply: Patch,
    pub revert: Patch,
}

impl PatchPair {
    pub fn new(apply: Patch, revert: Patch) -> Self {
        Self { apply, revert }
    }

    /// The version did not exist before this effect.
    pub fn creates(&self) -> bool {
        self.revert.is_delete()
    }

    /// The version does not exist after this effect.
    pub fn deletes(&self) -> bool {
        self.apply.is_delete()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_wire_patch() {
        let patch: Patch = serde_json::from_value(json!([
            {"op": "set", "path": ["title"], "value": "Hello"},
            {"op": "insert", "path": ["tags"], "index": 0, "items": ["news"]},
            {"op": "unset", "path": ["body", 2, "text"]},
        ]))
        .unwrap();

        assert_eq!(patch.len(), 3);
        assert_eq!(
            patch.ops()[2],
            PatchOp::Unset {
                path: vec!["body".into(), 2.into(), "text".into()],
            }
        );
        assert!(!patch.is_delete());
        assert!(!patch.is_replace());
    }

    #[test]
    fn test_delete_must_be_last() {
        let err = Patch::new(vec![
            PatchOp::Delete,
            PatchOp::Set { path: vec!["a".into()], value: json!(1) },
        ])
        .unwrap_err();
        assert_eq!(err, PatchValidationError::DeleteNotLast { position: 0 });
    }

    #[test]
    fn test_wire_validation_rejects_bad_patches() {
        let bad = [
            json!([{"op": "replace", "value": [1, 2]}]),
            json!([{"op": "set", "path": [], "value": 1}]),
            json!([{"op": "set", "path": [0], "value": 1}]),
            json!([{"op": "remove", "path": ["tags"], "index": 0, "count": 0}]),
            json!([{"op": "frobnicate"}]),
        ];
        for value in bad {
            assert!(serde_json::from_value::<Patch>(value.clone()).is_err(), "accepted {value}");
        }
    }

    #[test]
    fn test_delete_and_create_markers() {
        let pair = PatchPair::new(Patch::replace(json!({"title": "x"})).unwrap(), Patch::delete());
        assert!(pair.creates());
        assert!(!pair.deletes());
        assert!(pair.apply.is_replace());
    }

    #[test]
    fn test_format_path() {
        let path: Path = vec!["body".into(), 2.into(), "text".into()];
        assert_eq!(format_path(&path), ".body[2].text");
        assert_eq!(format_path(&[]), "<root>");
    }
}
