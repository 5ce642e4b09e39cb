//! Error types for timeline operations.

use palimpsest_patch::PatchError;
use strum::{Display, IntoStaticStr};
use thiserror::Error;

/// Errors that can occur while building or querying a timeline.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TimelineError {
    /// A document handed to the timeline has no `_rev`.
    #[error("document must have _rev")]
    MissingRevision,

    /// A document handed to the timeline is not a JSON object.
    #[error("document must be an object")]
    InvalidDocument,

    /// Reconstruction was queried before `set_range`.
    #[error("range required")]
    RangeRequired,

    /// Start attributes were queried on a range with no start chunk.
    #[error("start required")]
    StartRequired,

    /// The start chunk lies after the end chunk.
    #[error("range start {start} is after range end {end}")]
    InvertedRange { start: i64, end: i64 },

    /// A boundary chunk was replaced since it was handed out.
    #[error("chunk {id} at index {index} is no longer part of the timeline")]
    StaleChunk { id: String, index: i64 },

    /// History entries only arrive until the earliest one is reached.
    #[error("translog entry {id} arrived after the earliest entry")]
    EntryAfterEarliest { id: String },

    /// A recorded trace cannot be replayed.
    #[error("invalid trace: {0}")]
    InvalidTrace(String),

    /// The chunk walk ran off the sequence or hit a gap.
    #[error("transaction {0} does not belong in any chunk")]
    NoChunkForTransaction(i64),

    /// A chunk points at a transaction the log no longer holds.
    #[error("transaction {0} missing from the log")]
    MissingTransaction(i64),

    /// A chunk index inside a range has no chunk.
    #[error("chunk {0} missing from the timeline")]
    MissingChunk(i64),

    /// Replaying a patch failed.
    #[error("patch failed: {0}")]
    Patch(#[from] PatchError),
}

/// Who is at fault for an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorClass {
    /// The caller broke a documented precondition.
    Precondition,
    /// The timeline's own structures disagree, or the log is corrupt.
    Inconsistency,
}

impl TimelineError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TimelineError::MissingRevision
            | TimelineError::InvalidDocument
            | TimelineError::RangeRequired
            | TimelineError::StartRequired
            | TimelineError::InvertedRange { .. }
            | TimelineError::StaleChunk { .. }
            | TimelineError::EntryAfterEarliest { .. }
            | TimelineError::InvalidTrace(_) => ErrorClass::Precondition,
            TimelineError::NoChunkForTransaction(_)
            | TimelineError::MissingTransaction(_)
            | TimelineError::MissingChunk(_)
            | TimelineError::Patch(_) => ErrorClass::Inconsistency,
        }
    }
}
