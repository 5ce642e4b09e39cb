//! Patch engine for Palimpsest.
//!
//! Two ways to run the patch language from `palimpsest-types`:
//!
//! - [`apply_patch`] over plain `serde_json::Value` documents, used to keep
//!   live versions current and to replay history backward.
//! - [`incremental`] over [`Annotated`] trees, used to replay history forward
//!   while remembering which transaction changed each node.
//!
//! [`derive_patch`] and [`patch_pair`] go the other way and build patches
//! from two snapshots.

mod apply;
pub mod derive;
pub mod error;
pub mod incremental;

pub use apply::apply_patch;
pub use derive::{derive_patch, patch_pair};
pub use error::PatchError;
pub use incremental::{rebase_value, value_type, wrap, Annotated, Content, ValueType};

/// Result type for patch operations.
pub type Result<T> = std::result::Result<T, PatchError>;
