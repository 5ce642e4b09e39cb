//! Document history timeline for Palimpsest.
//!
//! Organizes the history of one draft/published document pair: raw
//! transactions go in, labeled chunks, resolved time references, past
//! snapshots and provenance-annotated diffs come out. The timeline does not
//! fetch anything; callers feed it translog entries and live mutations.
//!
//! # Flow
//!
//! ```text
//! TranslogEvent ──add_translog_entry──▶ ┐
//!                                       ├─▶ transactions ──update_chunks──▶ chunks
//! RemoteMutation ─add_remote_mutation─▶ ┘                                   │
//!                                                                           ▼
//!                     parse_time_id ──▶ set_range ──▶ start/end_attributes, current_diff
//! ```
//!
//! # Threading
//!
//! A timeline is single-writer: every mutation takes `&mut self`. It is
//! `Send`, so it can live inside an actor or behind a lock owned by the
//! caller.

pub mod chunker;
pub mod config;
pub mod diff;
pub mod error;
mod reconstruction;
pub mod timeline;
pub mod trace;
pub mod two_ended;
pub mod version;

pub use chunker::{classify, ChunkPolicy, WindowedChunkPolicy};
pub use config::{ConfigError, TimelineConfig};
pub use diff::{diff_value, Annotation, AnnotationSource, DocumentDiff, Provenance, ValueDiff};
pub use error::{ErrorClass, TimelineError};
pub use reconstruction::CombinedDocument;
pub use timeline::{TimeRef, Timeline, TimelineOptions, LAST_PUBLISHED};
pub use trace::{replay, TraceEvent, TraceRecorder, TraceSink};
pub use two_ended::{Indexed, Merge, TwoEndedArray};
pub use version::{create_version, patch_version, DocumentVersion};

/// Result type for timeline operations.
pub type Result<T> = std::result::Result<T, TimelineError>;
