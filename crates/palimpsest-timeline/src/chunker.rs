//! Grouping transactions into chunks.
//!
//! A [`ChunkPolicy`] decides what a single transaction looks like as a chunk
//! and whether two adjacent chunks belong together. The timeline drives the
//! policy through [`TwoEndedArray::merge_at_end`] and
//! [`TwoEndedArray::merge_at_beginning`], so a policy never sees more than two
//! neighbours at a time.
//!
//! [`TwoEndedArray::merge_at_end`]: crate::TwoEndedArray::merge_at_end
//! [`TwoEndedArray::merge_at_beginning`]: crate::TwoEndedArray::merge_at_beginning

use std::collections::BTreeSet;

use palimpsest_types::{Chunk, ChunkHandle, ChunkState, ChunkType, PatchPair, Transaction};

use crate::two_ended::Merge;

/// Labels transactions and merges neighbouring chunks.
pub trait ChunkPolicy: Send + Sync {
    /// A one-transaction chunk for `transaction`.
    fn chunk_from_transaction(&self, transaction: &Transaction) -> Chunk;

    /// Combine two adjacent chunks, `left` immediately before `right`.
    fn merge(&self, left: &Chunk, right: &Chunk) -> Merge<Chunk>;
}

/// Default grouping: consecutive edits of the same kind within a time window
/// collapse into one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowedChunkPolicy {
    pub window_ms: u64,
}

impl WindowedChunkPolicy {
    pub fn new(window_ms: u64) -> Self {
        Self { window_ms }
    }

    fn can_merge(&self, left: &Chunk, right: &Chunk) -> bool {
        left.end == right.start
            && left.kind == right.kind
            && left.kind.is_edit()
            && right.start_timestamp.saturating_sub(left.end_timestamp) <= self.window_ms
    }
}

/// What a transaction did, judged from its two effects.
pub fn classify(transaction: &Transaction) -> ChunkType {
    let draft = transaction.draft_effect.as_ref();
    let published = transaction.published_effect.as_ref();
    let draft_deleted = draft.is_some_and(PatchPair::deletes);
    let published_deleted = published.is_some_and(PatchPair::deletes);

    if draft_deleted && published_deleted {
        ChunkType::Delete
    } else if published_deleted {
        ChunkType::Unpublish
    } else if draft_deleted && published.is_some() {
        ChunkType::Publish
    } else if draft_deleted {
        ChunkType::DiscardDraft
    } else if let Some(published) = published {
        if published.creates() && draft.is_none() {
            ChunkType::Create
        } else {
            ChunkType::Edit
        }
    } else if draft.is_some_and(PatchPair::creates) {
        ChunkType::Create
    } else {
        ChunkType::EditDraft
    }
}

fn state_after(effect: Option<&PatchPair>) -> ChunkState {
    match effect {
        None => ChunkState::Unknown,
        Some(effect) if effect.deletes() => ChunkState::Missing,
        Some(_) => ChunkState::Present,
    }
}

impl ChunkPolicy for WindowedChunkPolicy {
    fn chunk_from_transaction(&self, transaction: &Transaction) -> Chunk {
        Chunk {
            index: 0,
            id: transaction.id.clone(),
            kind: classify(transaction),
            start: transaction.index,
            end: transaction.index + 1,
            start_timestamp: transaction.timestamp,
            end_timestamp: transaction.timestamp,
            author: transaction.author.clone(),
            authors: BTreeSet::from([transaction.author.clone()]),
            draft_state: state_after(transaction.draft_effect.as_ref()),
            published_state: state_after(transaction.published_effect.as_ref()),
            handle: ChunkHandle::next(),
        }
    }

    fn merge(&self, left: &Chunk, right: &Chunk) -> Merge<Chunk> {
        if self.can_merge(left, right) {
            return Merge::Merged(Chunk {
                index: left.index,
                id: right.id.clone(),
                kind: right.kind,
                start: left.start,
                end: right.end,
                start_timestamp: left.start_timestamp,
                end_timestamp: right.end_timestamp,
                author: right.author.clone(),
                authors: left.authors.union(&right.authors).cloned().collect(),
                draft_state: left.draft_state.then(right.draft_state),
                published_state: left.published_state.then(right.published_state),
                handle: ChunkHandle::next(),
            });
        }

        // Draft edits on a deleted document bring it back.
        let right = match right.kind {
            ChunkType::EditDraft if left.kind == ChunkType::Delete => right.relabeled(ChunkType::Create),
            ChunkType::Create if left.published_state == ChunkState::Present => {
                right.relabeled(ChunkType::EditDraft)
            }
            _ => right.clone(),
        };
        Merge::Separate(left.clone(), right)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use palimpsest_types::Patch;
    use serde_json::json;

    const MINUTE: u64 = 60_000;

    fn edit() -> PatchPair {
        let set: Patch = serde_json::from_value(json!([{"op": "set", "path": ["title"], "value": "x"}]))
            .unwrap();
        let unset: Patch = serde_json::from_value(json!([{"op": "unset", "path": ["title"]}])).unwrap();
        PatchPair::new(set, unset)
    }

    fn create() -> PatchPair {
        PatchPair::new(Patch::replace(json!({"title": "x"})).unwrap(), Patch::delete())
    }

    fn delete() -> PatchPair {
        PatchPair::new(Patch::delete(), Patch::replace(json!({"title": "x"})).unwrap())
    }

    fn tx(index: i64, timestamp: u64, draft: Option<PatchPair>, published: Option<PatchPair>) -> Transaction {
        Transaction {
            index,
            id: format!("tx{index}"),
            timestamp,
            author: format!("author{}", index % 2),
            draft_effect: draft,
            published_effect: published,
        }
    }

    #[test]
    fn test_classify() {
        let cases = [
            (Some(delete()), Some(delete()), ChunkType::Delete),
            (None, Some(delete()), ChunkType::Unpublish),
            (Some(delete()), Some(create()), ChunkType::Publish),
            (Some(delete()), Some(edit()), ChunkType::Publish),
            (Some(delete()), None, ChunkType::DiscardDraft),
            (None, Some(create()), ChunkType::Create),
            (Some(edit()), Some(create()), ChunkType::Edit),
            (None, Some(edit()), ChunkType::Edit),
            (Some(create()), None, ChunkType::Create),
            (Some(edit()), None, ChunkType::EditDraft),
            (None, None, ChunkType::EditDraft),
        ];
        for (draft, published, expected) in cases {
            let t = tx(0, 0, draft.clone(), published.clone());
            assert_eq!(classify(&t), expected, "draft={draft:?} published={published:?}");
        }
    }

    #[test]
    fn test_chunk_from_transaction_states() {
        let policy = WindowedChunkPolicy::new(5 * MINUTE);
        let chunk = policy.chunk_from_transaction(&tx(3, 100, Some(delete()), Some(edit())));
        assert_eq!(chunk.kind, ChunkType::Publish);
        assert_eq!((chunk.start, chunk.end), (3, 4));
        assert_eq!(chunk.draft_state, ChunkState::Missing);
        assert_eq!(chunk.published_state, ChunkState::Present);
    }

    #[test]
    fn test_merge_within_window() {
        let policy = WindowedChunkPolicy::new(5 * MINUTE);
        let left = policy.chunk_from_transaction(&tx(0, 0, Some(edit()), None));
        let right = policy.chunk_from_transaction(&tx(1, MINUTE, Some(edit()), None));

        let Merge::Merged(merged) = policy.merge(&left, &right) else {
            panic!("expected merge");
        };
        assert_eq!((merged.start, merged.end), (0, 2));
        assert_eq!(merged.id, "tx1");
        assert_eq!(merged.author, "author1");
        assert_eq!(merged.authors.len(), 2);
        assert_eq!(merged.start_timestamp, 0);
        assert_eq!(merged.end_timestamp, MINUTE);
        assert!(!merged.same_as(&left));
        assert!(!merged.same_as(&right));
    }

    #[test]
    fn test_no_merge_outside_window_or_across_kinds() {
        let policy = WindowedChunkPolicy::new(5 * MINUTE);
        let left = policy.chunk_from_transaction(&tx(0, 0, Some(edit()), None));
        let late = policy.chunk_from_transaction(&tx(1, 6 * MINUTE, Some(edit()), None));
        assert!(matches!(policy.merge(&left, &late), Merge::Separate(..)));

        let live = policy.chunk_from_transaction(&tx(1, MINUTE, None, Some(edit())));
        let Merge::Separate(l, r) = policy.merge(&left, &live) else {
            panic!("expected separate");
        };
        assert!(l.same_as(&left));
        assert!(r.same_as(&live));
    }

    #[test]
    fn test_relabels() {
        let policy = WindowedChunkPolicy::new(5 * MINUTE);

        let deleted = policy.chunk_from_transaction(&tx(0, 0, Some(delete()), Some(delete())));
        let revived = policy.chunk_from_transaction(&tx(1, 1, Some(edit()), None));
        let Merge::Separate(_, r) = policy.merge(&deleted, &revived) else {
            panic!("expected separate");
        };
        assert_eq!(r.kind, ChunkType::Create);

        let published = policy.chunk_from_transaction(&tx(0, 0, None, Some(create())));
        let draft = policy.chunk_from_transaction(&tx(1, 1, Some(create()), None));
        let Merge::Separate(l, r) = policy.merge(&published, &draft) else {
            panic!("expected separate");
        };
        assert!(l.same_as(&published));
        assert_eq!(r.kind, ChunkType::EditDraft);
    }
}
