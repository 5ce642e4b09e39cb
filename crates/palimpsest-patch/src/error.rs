//! Error types for patch application.

use palimpsest_types::PatchValidationError;
use thiserror::Error;

/// Errors that can occur while applying a patch to a document.
///
/// A well-formed log never produces these: they mean a patch was applied to
/// a state it was not computed against.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    /// A path operation ran against a document that does not exist.
    #[error("{op} applied to a missing document")]
    MissingDocument { op: &'static str },

    /// An intermediate key on the path is absent.
    #[error("path not found: {path}")]
    PathNotFound { path: String },

    /// A node on the path has the wrong type for the next segment.
    #[error("expected {expected} at {path}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// Array index past the end of the array.
    #[error("index {index} out of bounds at {path} (length {len})")]
    IndexOutOfBounds { path: String, index: usize, len: usize },

    /// A derived patch broke the patch language rules.
    #[error(transparent)]
    Invalid(#[from] PatchValidationError),
}
