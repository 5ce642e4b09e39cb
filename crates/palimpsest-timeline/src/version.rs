//! Live document versions.

use serde_json::Value;

use palimpsest_patch::apply_patch;
use palimpsest_types::Patch;

use crate::{Result, TimelineError};

/// The current state of one document version.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentVersion {
    pub rev: String,
    /// The document without its `_rev`.
    pub attributes: Value,
}

/// Split a stored document into revision and attributes. `None` stays `None`.
pub fn create_version(document: Option<&Value>) -> Result<Option<DocumentVersion>> {
    let Some(document) = document else {
        return Ok(None);
    };
    let Value::Object(fields) = document else {
        return Err(TimelineError::InvalidDocument);
    };

    let rev = match fields.get("_rev") {
        Some(Value::String(rev)) if !rev.is_empty() => rev.clone(),
        _ => return Err(TimelineError::MissingRevision),
    };
    let mut attributes = fields.clone();
    attributes.remove("_rev");

    Ok(Some(DocumentVersion { rev, attributes: Value::Object(attributes) }))
}

/// Move a version forward by `patch`, stamping it with `rev`.
pub fn patch_version(
    version: Option<&DocumentVersion>,
    rev: &str,
    patch: &Patch,
) -> Result<Option<DocumentVersion>> {
    let attributes = apply_patch(version.map(|v| &v.attributes), patch)?;
    Ok(attributes.map(|attributes| DocumentVersion { rev: rev.to_string(), attributes }))
}
