//! Error types for history types.

use thiserror::Error;

/// A patch that breaks the rules of the patch language.
///
/// Raised when a patch is built in code or deserialized from the wire, so an
/// invalid patch never reaches the replay engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchValidationError {
    /// `delete` leaves nothing to operate on, so it must come last.
    #[error("delete at position {position} is not the last operation")]
    DeleteNotLast { position: usize },

    /// Documents are objects; replacing one with anything else is meaningless.
    #[error("replace at position {position} does not carry an object")]
    ReplaceNotObject { position: usize },

    /// Path operations address a node below the root.
    #[error("{op} at position {position} has an empty path")]
    EmptyPath { position: usize, op: &'static str },

    /// The root is an object, so the first path segment must be a key.
    #[error("path at position {position} indexes into the document root")]
    RootNotObject { position: usize },

    #[error("remove at position {position} removes zero items")]
    EmptyRemove { position: usize },
}
