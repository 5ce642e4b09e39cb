//! Shared history types for Palimpsest.
//!
//! This crate is the vocabulary of the document-history engine: the patch
//! language, transactions, chunks, and the events delivered by the history
//! service. It has **no internal palimpsest dependencies**; it is a pure leaf crate
//! that the patch engine and the timeline build on.
//!
//! # Model Overview
//!
//! ```text
//! TranslogEvent / RemoteMutation   ← what the history service delivers
//!     └── Transaction (index, id, author, timestamp)
//!         ├── draft_effect:     PatchPair { apply, revert }
//!         └── published_effect: PatchPair { apply, revert }
//!
//! Chunk [start, end)               ← contiguous transactions, one label
//!     └── ChunkType (initial, create, edit, editDraft, publish, ...)
//! ```
//!
//! # Key Types
//!
//! |---------------------|--------------------------------------------------|
//! | Type                | Purpose                                          |
//! |---------------------|--------------------------------------------------|
//! | [`Patch`]           | Validated list of [`PatchOp`]s                   |
//! | [`PatchPair`]       | Forward patch and its inverse                    |
//! | [`Transaction`]     | One log entry's effects on draft and published   |
//! | [`Chunk`]           | Labeled run of transactions                      |
//! | [`ChunkHandle`]     | Identity of a chunk value                        |
//! | [`TranslogEvent`]   | Finalized historical entry                       |
//! | [`RemoteMutation`]  | Live, single-version mutation                    |
//! |---------------------|--------------------------------------------------|

pub mod chunk;
pub mod error;
pub mod event;
pub mod patch;
pub mod transaction;

// Re-export primary types at crate root for convenience.
pub use chunk::{Chunk, ChunkHandle, ChunkState, ChunkType, INITIAL_CHUNK_ID};
pub use error::PatchValidationError;
pub use event::{MutationVersion, RemoteMutation, TranslogEvent};
pub use patch::{format_path, Patch, PatchOp, PatchPair, Path, PathSegment};
pub use transaction::Transaction;
