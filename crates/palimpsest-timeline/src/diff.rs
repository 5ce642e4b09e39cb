//! Structural diffs with provenance.
//!
//! The timeline replays a range of history forward over annotated values, so
//! every node of the final value knows which transaction last touched it.
//! [`diff_value`] compares that final value with the value at the start of
//! the range and turns the annotations into [`Annotation`]s through an
//! [`AnnotationSource`].

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use palimpsest_patch::{Annotated, Content};
use palimpsest_types::Chunk;

/// Where a change came from, attached to nodes during forward replay.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    pub chunk: Arc<Chunk>,
    pub chunk_index: i64,
    pub transaction_index: i64,
}

/// Who changed a node, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotation {
    pub chunk_id: String,
    pub chunk_index: i64,
    pub transaction_index: i64,
    pub author: String,
    /// Unix millis.
    pub timestamp: u64,
}

/// Resolves provenance into annotation details.
pub trait AnnotationSource {
    fn annotation(&self, provenance: &Provenance) -> Annotation;
}

/// Diff between two JSON values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ValueDiff {
    Unchanged {
        value: Value,
    },
    Added {
        to: Value,
        annotation: Option<Annotation>,
    },
    Removed {
        from: Value,
        annotation: Option<Annotation>,
    },
    Changed {
        from: Value,
        to: Value,
        annotation: Option<Annotation>,
    },
    Object {
        fields: BTreeMap<String, ValueDiff>,
        annotation: Option<Annotation>,
    },
    Array {
        items: Vec<ValueDiff>,
        annotation: Option<Annotation>,
    },
}

impl ValueDiff {
    pub fn is_changed(&self) -> bool {
        !matches!(self, ValueDiff::Unchanged { .. })
    }

    pub fn annotation(&self) -> Option<&Annotation> {
        match self {
            ValueDiff::Unchanged { .. } => None,
            ValueDiff::Added { annotation, .. }
            | ValueDiff::Removed { annotation, .. }
            | ValueDiff::Changed { annotation, .. }
            | ValueDiff::Object { annotation, .. }
            | ValueDiff::Array { annotation, .. } => annotation.as_ref(),
        }
    }

    /// Diff of one object field.
    pub fn field(&self, name: &str) -> Option<&ValueDiff> {
        match self {
            ValueDiff::Object { fields, .. } => fields.get(name),
            _ => None,
        }
    }

    /// Diff of one array item.
    pub fn item(&self, index: usize) -> Option<&ValueDiff> {
        match self {
            ValueDiff::Array { items, .. } => items.get(index),
            _ => None,
        }
    }
}

/// The result of a reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentDiff {
    pub initial_attributes: Option<Value>,
    pub final_attributes: Option<Value>,
    pub root: ValueDiff,
}

/// Compare the document at the start of a range with the replayed document
/// at its end. A null root means the document did not exist.
pub fn diff_value<S>(source: &S, from: &Annotated<Provenance>, to: &Annotated<Provenance>) -> ValueDiff
where
    S: AnnotationSource + ?Sized,
{
    match (from.is_null(), to.is_null()) {
        (true, true) => ValueDiff::Unchanged { value: Value::Null },
        (true, false) => ValueDiff::Added { to: to.to_value(), annotation: annotate(source, to) },
        (false, true) => ValueDiff::Removed {
            from: from.to_value(),
            annotation: annotate(source, to),
        },
        (false, false) => diff_node(source, from, to),
    }
}

fn annotate<S>(source: &S, node: &Annotated<Provenance>) -> Option<Annotation>
where
    S: AnnotationSource + ?Sized,
{
    node.meta().map(|p| source.annotation(p))
}

fn diff_node<S>(source: &S, from: &Annotated<Provenance>, to: &Annotated<Provenance>) -> ValueDiff
where
    S: AnnotationSource + ?Sized,
{
    if from.same_content(to) {
        return ValueDiff::Unchanged { value: to.to_value() };
    }

    // Removals are credited to the container that lost the child.
    let annotation = annotate(source, to);
    match (from.content(), to.content()) {
        (Content::Object(old), Content::Object(new)) => {
            let mut fields = BTreeMap::new();
            for (key, prev) in old {
                let diff = match new.get(key) {
                    Some(next) => diff_node(source, prev, next),
                    None => ValueDiff::Removed { from: prev.to_value(), annotation: annotation.clone() },
                };
                fields.insert(key.clone(), diff);
            }
            for (key, next) in new.iter().filter(|(k, _)| !old.contains_key(*k)) {
                fields.insert(
                    key.clone(),
                    ValueDiff::Added { to: next.to_value(), annotation: annotate(source, next) },
                );
            }
            ValueDiff::Object { fields, annotation }
        }
        (Content::Array(old), Content::Array(new)) => {
            let mut items: Vec<ValueDiff> =
                old.iter().zip(new).map(|(prev, next)| diff_node(source, prev, next)).collect();
            items.extend(old.iter().skip(new.len()).map(|prev| ValueDiff::Removed {
                from: prev.to_value(),
                annotation: annotation.clone(),
            }));
            items.extend(
                new.iter()
                    .skip(old.len())
                    .map(|next| ValueDiff::Added { to: next.to_value(), annotation: annotate(source, next) }),
            );
            ValueDiff::Array { items, annotation }
        }
        _ => ValueDiff::Changed { from: from.to_value(), to: to.to_value(), annotation },
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use palimpsest_patch::{incremental, wrap};
    use palimpsest_types::{ChunkHandle, ChunkState, ChunkType, Patch};
    use serde_json::json;

    struct Authors;

    impl AnnotationSource for Authors {
        fn annotation(&self, provenance: &Provenance) -> Annotation {
            Annotation {
                chunk_id: provenance.chunk.id.clone(),
                chunk_index: provenance.chunk_index,
                transaction_index: provenance.transaction_index,
                author: provenance.chunk.author.clone(),
                timestamp: provenance.chunk.end_timestamp,
            }
        }
    }

    fn provenance(tx: i64) -> Provenance {
        let chunk = Chunk {
            index: 1,
            id: format!("tx{tx}"),
            kind: ChunkType::EditDraft,
            start: tx,
            end: tx + 1,
            start_timestamp: 10,
            end_timestamp: 10,
            author: "alice".into(),
            authors: BTreeSet::from(["alice".to_string()]),
            draft_state: ChunkState::Present,
            published_state: ChunkState::Unknown,
            handle: ChunkHandle::next(),
        };
        Provenance { chunk: Arc::new(chunk), chunk_index: 1, transaction_index: tx }
    }

    fn apply(value: &Annotated<Provenance>, ops: Value, tx: i64) -> Annotated<Provenance> {
        let patch: Patch = serde_json::from_value(ops).unwrap();
        incremental::apply_patch(value, &patch, &provenance(tx)).unwrap()
    }

    #[test]
    fn test_field_changes_are_annotated() {
        let start = wrap(Some(&json!({"title": "A", "gone": 1, "same": true})), None);
        let end = apply(
            &start,
            json!([
                {"op": "set", "path": ["title"], "value": "B"},
                {"op": "unset", "path": ["gone"]},
                {"op": "set", "path": ["new"], "value": [1]},
            ]),
            7,
        );

        let diff = diff_value(&Authors, &start, &end);
        assert!(diff.is_changed());
        assert_eq!(
            diff.field("title"),
            Some(&ValueDiff::Changed {
                from: json!("A"),
                to: json!("B"),
                annotation: Some(Authors.annotation(&provenance(7))),
            })
        );
        assert!(matches!(diff.field("gone"), Some(ValueDiff::Removed { annotation: Some(_), .. })));
        assert!(matches!(diff.field("new"), Some(ValueDiff::Added { .. })));
        assert_eq!(diff.field("same"), Some(&ValueDiff::Unchanged { value: json!(true) }));
    }

    #[test]
    fn test_array_items() {
        let start = wrap(Some(&json!({"tags": ["a", "b"]})), None);
        let end = apply(
            &start,
            json!([{"op": "set", "path": ["tags", 1], "value": "c"},
                   {"op": "insert", "path": ["tags"], "index": 2, "items": ["d"]}]),
            3,
        );
        let tags = diff_value(&Authors, &start, &end);
        let tags = tags.field("tags").unwrap();
        assert!(!tags.item(0).unwrap().is_changed());
        assert!(matches!(tags.item(1), Some(ValueDiff::Changed { .. })));
        assert!(matches!(tags.item(2), Some(ValueDiff::Added { .. })));
    }

    #[test]
    fn test_document_existence() {
        let missing = wrap::<Provenance>(None, None);
        let created = apply(&missing, json!([{"op": "replace", "value": {"a": 1}}]), 1);
        assert!(matches!(diff_value(&Authors, &missing, &created), ValueDiff::Added { .. }));
        assert_eq!(
            diff_value(&Authors, &missing, &missing),
            ValueDiff::Unchanged { value: Value::Null }
        );
    }

    #[test]
    fn test_serialized_shape() {
        let diff = ValueDiff::Changed { from: json!(1), to: json!(2), annotation: None };
        assert_eq!(
            serde_json::to_value(&diff).unwrap(),
            json!({"type": "changed", "from": 1, "to": 2, "annotation": null})
        );
    }
}
