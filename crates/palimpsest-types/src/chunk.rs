//! Chunks: contiguous runs of transactions under one semantic label.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Id of the synthetic chunk that marks the start of history.
pub const INITIAL_CHUNK_ID: &str = "@initial";

/// What a chunk of history did to the document.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ChunkType {
    /// Synthetic first chunk, present once the oldest entry is known.
    Initial,
    /// The document came into existence.
    Create,
    /// The published version was edited directly.
    #[serde(alias = "editLive")]
    #[strum(to_string = "edit", serialize = "editLive")]
    Edit,
    /// The draft was edited.
    EditDraft,
    /// The draft was published (draft removed, published updated).
    Publish,
    /// The published version was removed.
    Unpublish,
    /// The draft was removed without publishing.
    DiscardDraft,
    /// Both versions were removed.
    Delete,
}

impl ChunkType {
    /// Publish-like boundaries that `@lastPublished` may resolve to.
    pub fn is_publish_boundary(self) -> bool {
        matches!(self, ChunkType::Publish | ChunkType::Initial)
    }

    /// Edit sessions; consecutive chunks of these types can be merged.
    pub fn is_edit(self) -> bool {
        matches!(self, ChunkType::Edit | ChunkType::EditDraft)
    }
}

/// Existence of one version after a chunk's last transaction.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum ChunkState {
    Present,
    Missing,
    /// The chunk never touched this version.
    #[default]
    Unknown,
}

impl ChunkState {
    /// State after `self` followed by `later`: the later chunk wins unless it
    /// never touched the version.
    pub fn then(self, later: ChunkState) -> ChunkState {
        match later {
            ChunkState::Unknown => self,
            known => known,
        }
    }
}

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Identity of one chunk value.
///
/// A fresh handle is minted every time a chunk is created or changed, so two
/// chunks with the same handle are the same chunk. Clones share the handle.
/// Handles are local to the process and never serialized.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkHandle(u64);

impl ChunkHandle {
    pub fn next() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ChunkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkHandle({})", self.0)
    }
}

/// One or more contiguous transactions, `[start, end)` in the transaction log.
///
/// `index` is the chunk's own position in the chunk sequence. Chunk values are
/// never edited in place by the timeline; merging or relabeling produces a new
/// chunk with a new [`ChunkHandle`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    pub index: i64,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChunkType,
    pub start: i64,
    pub end: i64,
    pub start_timestamp: u64,
    pub end_timestamp: u64,
    /// Author of the chunk's last transaction.
    pub author: String,
    pub authors: BTreeSet<String>,
    pub draft_state: ChunkState,
    pub published_state: ChunkState,
    /// A deserialized chunk gets a fresh handle.
    #[serde(skip, default = "ChunkHandle::next")]
    pub handle: ChunkHandle,
}

impl Chunk {
    /// Number of transactions covered.
    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether transaction `idx` belongs to this chunk.
    pub fn contains(&self, idx: i64) -> bool {
        self.start <= idx && idx < self.end
    }

    /// Same chunk value, by handle.
    pub fn same_as(&self, other: &Chunk) -> bool {
        self.handle == other.handle
    }

    /// Copy of this chunk with a different type and a fresh handle.
    pub fn relabeled(&self, kind: ChunkType) -> Chunk {
        Chunk {
            kind,
            handle: ChunkHandle::next(),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(kind: ChunkType) -> Chunk {
        Chunk {
            index: 0,
            id: "tx".into(),
            kind,
            start: 3,
            end: 5,
            start_timestamp: 10,
            end_timestamp: 20,
            author: "alice".into(),
            authors: BTreeSet::from(["alice".to_string()]),
            draft_state: ChunkState::Present,
            published_state: ChunkState::Unknown,
            handle: ChunkHandle::next(),
        }
    }

    #[test]
    fn test_chunk_type_strings() {
        assert_eq!(ChunkType::EditDraft.to_string(), "editDraft");
        assert_eq!("editLive".parse::<ChunkType>().unwrap(), ChunkType::Edit);
        assert_eq!("discardDraft".parse::<ChunkType>().unwrap(), ChunkType::DiscardDraft);
        let parsed: ChunkType = serde_json::from_str("\"editLive\"").unwrap();
        assert_eq!(parsed, ChunkType::Edit);
    }

    #[test]
    fn test_state_combination() {
        assert_eq!(ChunkState::Present.then(ChunkState::Unknown), ChunkState::Present);
        assert_eq!(ChunkState::Present.then(ChunkState::Missing), ChunkState::Missing);
        assert_eq!(ChunkState::Unknown.then(ChunkState::Present), ChunkState::Present);
    }

    #[test]
    fn test_contains_and_len() {
        let c = chunk(ChunkType::EditDraft);
        assert_eq!(c.len(), 2);
        assert!(c.contains(3));
        assert!(c.contains(4));
        assert!(!c.contains(5));
        assert!(!c.contains(2));
    }

    #[test]
    fn test_relabel_mints_new_handle() {
        let c = chunk(ChunkType::EditDraft);
        let clone = c.clone();
        assert!(clone.same_as(&c));

        let relabeled = c.relabeled(ChunkType::Create);
        assert_eq!(relabeled.kind, ChunkType::Create);
        assert_eq!(relabeled.start, c.start);
        assert!(!relabeled.same_as(&c));
    }

    #[test]
    fn test_handle_stays_out_of_json() {
        let c = chunk(ChunkType::Publish);
        let json = serde_json::to_value(&c).unwrap();
        assert!(json.get("handle").is_none());
        assert_eq!(json["type"], "publish");

        let a: Chunk = serde_json::from_value(json.clone()).unwrap();
        let b: Chunk = serde_json::from_value(json).unwrap();
        assert_eq!(a.id, c.id);
        assert!(!a.same_as(&c));
        assert!(!a.same_as(&b));
    }
}
