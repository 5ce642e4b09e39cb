//! Incremental, annotated values.
//!
//! An [`Annotated`] value mirrors a JSON tree where every node carries an
//! optional piece of metadata `M`. Applying a patch with some metadata tags
//! exactly the nodes the patch touched (and their ancestors); untouched nodes
//! keep whatever annotation they had. The timeline uses this to remember which
//! transaction last changed each part of a document.
//!
//! ```text
//! {title: "A"}  --set title="B" @tx7-->  {title: "B" @tx7} @tx7
//!                                         body  (unchanged, keeps old meta)
//! ```

use std::collections::BTreeMap;

use serde_json::{Map, Number, Value};
use strum::{Display, EnumString, IntoStaticStr};

use palimpsest_types::{format_path, Patch, PatchOp, PathSegment};

use crate::apply::expected_for;
use crate::{PatchError, Result};

/// JSON type of an annotated node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    Null,
    Boolean,
    Number,
    String,
    Array,
    Object,
}

/// Node payload of an [`Annotated`] tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Content<M> {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Annotated<M>>),
    Object(BTreeMap<String, Annotated<M>>),
}

impl<M> Content<M> {
    pub fn value_type(&self) -> ValueType {
        match self {
            Content::Null => ValueType::Null,
            Content::Bool(_) => ValueType::Boolean,
            Content::Number(_) => ValueType::Number,
            Content::String(_) => ValueType::String,
            Content::Array(_) => ValueType::Array,
            Content::Object(_) => ValueType::Object,
        }
    }
}

/// A JSON node with provenance metadata.
///
/// `meta` is `None` for nodes that predate everything the caller applied.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotated<M> {
    pub meta: Option<M>,
    pub content: Content<M>,
}

impl<M> Annotated<M> {
    /// A null node: the document does not exist.
    pub fn null(meta: Option<M>) -> Self {
        Self { meta, content: Content::Null }
    }

    pub fn meta(&self) -> Option<&M> {
        self.meta.as_ref()
    }

    pub fn content(&self) -> &Content<M> {
        &self.content
    }

    pub fn is_null(&self) -> bool {
        matches!(self.content, Content::Null)
    }

    /// Strip annotations.
    pub fn to_value(&self) -> Value {
        match &self.content {
            Content::Null => Value::Null,
            Content::Bool(b) => Value::Bool(*b),
            Content::Number(n) => Value::Number(n.clone()),
            Content::String(s) => Value::String(s.clone()),
            Content::Array(items) => Value::Array(items.iter().map(Annotated::to_value).collect()),
            Content::Object(fields) => Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.to_value())).collect::<Map<_, _>>(),
            ),
        }
    }

    /// Strip annotations, mapping a null root to "no document".
    pub fn to_document(&self) -> Option<Value> {
        if self.is_null() { None } else { Some(self.to_value()) }
    }

    /// Child node at one segment.
    pub fn get(&self, segment: &PathSegment) -> Option<&Annotated<M>> {
        match (&self.content, segment) {
            (Content::Object(fields), PathSegment::Key(key)) => fields.get(key),
            (Content::Array(items), PathSegment::Index(index)) => items.get(*index),
            _ => None,
        }
    }

    /// Node at `path`, if every step exists.
    pub fn at(&self, path: &[PathSegment]) -> Option<&Annotated<M>> {
        path.iter().try_fold(self, |node, segment| node.get(segment))
    }

    /// Structural equality ignoring annotations.
    pub fn same_content(&self, other: &Annotated<M>) -> bool {
        match (&self.content, &other.content) {
            (Content::Null, Content::Null) => true,
            (Content::Bool(a), Content::Bool(b)) => a == b,
            (Content::Number(a), Content::Number(b)) => a == b,
            (Content::String(a), Content::String(b)) => a == b,
            (Content::Array(a), Content::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_content(y))
            }
            (Content::Object(a), Content::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, x)| b.get(k).is_some_and(|y| x.same_content(y)))
            }
            _ => false,
        }
    }

    /// Whether this node holds exactly `value`.
    pub fn matches_value(&self, value: &Value) -> bool {
        match (&self.content, value) {
            (Content::Null, Value::Null) => true,
            (Content::Bool(a), Value::Bool(b)) => a == b,
            (Content::Number(a), Value::Number(b)) => a == b,
            (Content::String(a), Value::String(b)) => a == b,
            (Content::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.matches_value(y))
            }
            (Content::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, x)| b.get(k).is_some_and(|y| x.matches_value(y)))
            }
            _ => false,
        }
    }
}

/// JSON type of an annotated node.
pub fn value_type<M>(value: &Annotated<M>) -> ValueType {
    value.content.value_type()
}

/// Lift a plain document into an annotated tree, tagging every node with
/// `meta`. A missing document becomes a null node.
pub fn wrap<M: Clone>(document: Option<&Value>, meta: Option<M>) -> Annotated<M> {
    match document {
        None => Annotated::null(meta),
        Some(value) => wrap_value(value, &meta),
    }
}

fn wrap_value<M: Clone>(value: &Value, meta: &Option<M>) -> Annotated<M> {
    let content = match value {
        Value::Null => Content::Null,
        Value::Bool(b) => Content::Bool(*b),
        Value::Number(n) => Content::Number(n.clone()),
        Value::String(s) => Content::String(s.clone()),
        Value::Array(items) => Content::Array(items.iter().map(|v| wrap_value(v, meta)).collect()),
        Value::Object(fields) => Content::Object(
            fields.iter().map(|(k, v)| (k.clone(), wrap_value(v, meta))).collect(),
        ),
    };
    Annotated { meta: meta.clone(), content }
}

/// Re-express `value` on top of `base`, reusing `base` wherever the two agree.
///
/// Identical subtrees come back from `base` with their original annotations;
/// only the parts that actually differ carry `value`'s annotations.
pub fn rebase_value<M: Clone>(base: &Annotated<M>, value: Annotated<M>) -> Annotated<M> {
    if base.same_content(&value) {
        return base.clone();
    }

    let Annotated { meta, content } = value;
    let content = match (&base.content, content) {
        (Content::Object(old), Content::Object(new)) => Content::Object(
            new.into_iter()
                .map(|(key, node)| {
                    let node = match old.get(&key) {
                        Some(prev) => rebase_value(prev, node),
                        None => node,
                    };
                    (key, node)
                })
                .collect(),
        ),
        (Content::Array(old), Content::Array(new)) => Content::Array(
            new.into_iter()
                .enumerate()
                .map(|(i, node)| match old.get(i) {
                    Some(prev) => rebase_value(prev, node),
                    None => node,
                })
                .collect(),
        ),
        (_, other) => other,
    };
    Annotated { meta, content }
}

/// Apply `patch` to an annotated tree, tagging every node it changes with
/// `meta`. The input is left untouched.
pub fn apply_patch<M: Clone>(state: &Annotated<M>, patch: &Patch, meta: &M) -> Result<Annotated<M>> {
    let mut next = state.clone();

    for op in patch.ops() {
        match op {
            PatchOp::Replace { value } => {
                next = rebase_value(&next, wrap(Some(value), Some(meta.clone())));
            }
            PatchOp::Delete => {
                if !next.is_null() {
                    next = Annotated::null(Some(meta.clone()));
                }
            }
            PatchOp::Set { path, value } => {
                require(&next, op)?;
                if next.at(path).is_some_and(|node| node.matches_value(value)) {
                    continue;
                }
                set_at(&mut next, path, value, meta)?;
            }
            PatchOp::Unset { path } => {
                require(&next, op)?;
                if let Some((PathSegment::Key(key), parents)) = path.split_last() {
                    let absent = matches!(
                        next.at(parents).map(|n| &n.content),
                        Some(Content::Object(fields)) if !fields.contains_key(key)
                    );
                    if absent {
                        continue;
                    }
                }
                unset_at(&mut next, path, meta)?;
            }
            PatchOp::Insert { path, index, items } => {
                require(&next, op)?;
                let target = array_at(&mut next, path, meta)?;
                if *index > target.len() {
                    return Err(PatchError::IndexOutOfBounds {
                        path: format_path(path),
                        index: *index,
                        len: target.len(),
                    });
                }
                let fresh = items.iter().map(|v| wrap_value(v, &Some(meta.clone())));
                target.splice(*index..*index, fresh);
            }
            PatchOp::Remove { path, index, count } => {
                require(&next, op)?;
                let target = array_at(&mut next, path, meta)?;
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

    Ok(next)
}

fn require<M>(state: &Annotated<M>, op: &PatchOp) -> Result<()> {
    if state.is_null() {
        return Err(PatchError::MissingDocument { op: op.name() });
    }
    Ok(())
}

fn mismatch<M>(path: &[PathSegment], segment: &PathSegment, found: &Content<M>) -> PatchError {
    PatchError::TypeMismatch {
        path: format_path(path),
        expected: expected_for(segment),
        found: found.value_type().into(),
    }
}

/// Walk `path`, tagging the root and every node passed with `meta`.
fn node_at_mut<'a, M: Clone>(
    root: &'a mut Annotated<M>,
    path: &[PathSegment],
    create: bool,
    meta: &M,
) -> Result<&'a mut Annotated<M>> {
    let mut node = root;
    node.meta = Some(meta.clone());
    for (depth, segment) in path.iter().enumerate() {
        node = match (&mut node.content, segment) {
            (Content::Object(fields), PathSegment::Key(key)) => {
                if create {
                    fields.entry(key.clone()).or_insert_with(|| Annotated {
                        meta: None,
                        content: Content::Object(BTreeMap::new()),
                    })
                } else {
                    fields.get_mut(key).ok_or_else(|| PatchError::PathNotFound {
                        path: format_path(&path[..=depth]),
                    })?
                }
            }
            (Content::Array(items), PathSegment::Index(index)) => {
                let len = items.len();
                items.get_mut(*index).ok_or_else(|| PatchError::IndexOutOfBounds {
                    path: format_path(&path[..depth]),
                    index: *index,
                    len,
                })?
            }
            (other, segment) => return Err(mismatch(&path[..depth], segment, other)),
        };
        node.meta = Some(meta.clone());
    }
    Ok(node)
}

fn array_at<'a, M: Clone>(
    root: &'a mut Annotated<M>,
    path: &[PathSegment],
    meta: &M,
) -> Result<&'a mut Vec<Annotated<M>>> {
    match &mut node_at_mut(root, path, false, meta)?.content {
        Content::Array(items) => Ok(items),
        other => Err(PatchError::TypeMismatch {
            path: format_path(path),
            expected: "array",
            found: other.value_type().into(),
        }),
    }
}

fn set_at<M: Clone>(root: &mut Annotated<M>, path: &[PathSegment], value: &Value, meta: &M) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        return Err(PatchError::PathNotFound { path: format_path(path) });
    };
    let fresh = wrap_value(value, &Some(meta.clone()));

    let parent = node_at_mut(root, parents, true, meta)?;
    match (&mut parent.content, last) {
        (Content::Object(fields), PathSegment::Key(key)) => {
            let leaf = match fields.remove(key) {
                Some(old) => rebase_value(&old, fresh),
                None => fresh,
            };
            fields.insert(key.clone(), leaf);
        }
        (Content::Array(items), PathSegment::Index(index)) => {
            let len = items.len();
            if *index < len {
                let leaf = rebase_value(&items[*index], fresh);
                items[*index] = leaf;
            } else if *index == len {
                items.push(fresh);
            } else {
                return Err(PatchError::IndexOutOfBounds {
                    path: format_path(parents),
                    index: *index,
                    len,
                });
            }
        }
        (other, segment) => return Err(mismatch(parents, segment, other)),
    }
    Ok(())
}

fn unset_at<M: Clone>(root: &mut Annotated<M>, path: &[PathSegment], meta: &M) -> Result<()> {
    let Some((last, parents)) = path.split_last() else {
        return Err(PatchError::PathNotFound { path: format_path(path) });
    };

    let parent = node_at_mut(root, parents, false, meta)?;
    match (&mut parent.content, last) {
        (Content::Object(fields), PathSegment::Key(key)) => {
            fields.remove(key);
        }
        (Content::Array(items), PathSegment::Index(index)) => {
            if *index >= items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    path: format_path(parents),
                    index: *index,
                    len: items.len(),
                });
            }
            items.remove(*index);
        }
        (other, segment) => return Err(mismatch(parents, segment, other)),
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
