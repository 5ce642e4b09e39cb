//! The timeline: ingestion, chunking, and time references.
//!
//! A [`Timeline`] holds the transaction log of one draft/published document
//! pair and the chunks built over it. History arrives from both directions:
//!
//! - translog entries (older history, newest first) are prepended
//! - remote mutations (live edits) are appended, one version at a time
//!
//! Chunks are only rebuilt when [`Timeline::update_chunks`] is called, and any
//! [`Chunk`] handed out before that call must be resolved again afterwards.
//!
//! ```text
//! transactions  [-3][-2][-1][ 0][ 1]
//! chunks        [initial][editDraft ][publish]
//! ```

use std::collections::HashMap;
use std::ops::Range;

use serde_json::Value;

use palimpsest_types::{
    Chunk, ChunkType, MutationVersion, RemoteMutation, Transaction, TranslogEvent, INITIAL_CHUNK_ID,
};

use crate::chunker::{ChunkPolicy, WindowedChunkPolicy};
use crate::diff::{Annotation, AnnotationSource, Provenance};
use crate::reconstruction::Reconstruction;
use crate::trace::{TraceEvent, TraceSink};
use crate::two_ended::{Merge, TwoEndedArray};
use crate::version::{create_version, patch_version, DocumentVersion};
use crate::{Result, TimelineConfig, TimelineError};

/// Time reference that always points at the latest publish.
pub const LAST_PUBLISHED: &str = "@lastPublished";

/// Documents a timeline starts from.
#[derive(Debug, Clone, Default)]
pub struct TimelineOptions {
    pub published_id: String,
    /// Current draft, with `_rev`, or `None` if there is no draft.
    pub draft: Option<Value>,
    /// Current published version, with `_rev`, or `None` if unpublished.
    pub published: Option<Value>,
}

/// Outcome of resolving a time reference.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeRef {
    Chunk(Chunk),
    /// The reference may resolve once more history is loaded.
    Loading,
    /// The reference cannot resolve.
    Invalid,
}

/// History of one document, grouped into chunks.
pub struct Timeline {
    pub(crate) published_id: String,
    pub(crate) draft_id: String,
    pub(crate) transactions: TwoEndedArray<Transaction>,
    pub(crate) chunks: TwoEndedArray<Chunk>,
    pub(crate) draft_version: Option<DocumentVersion>,
    pub(crate) published_version: Option<DocumentVersion>,
    /// Remote transactions still waiting for their other version's mutation.
    pending: HashMap<String, i64>,
    /// Lowest transaction index whose chunks must be rebuilt.
    recreate_from: Option<i64>,
    reached_earliest: bool,
    policy: Box<dyn ChunkPolicy>,
    trace: Option<Box<dyn TraceSink>>,
    pub(crate) reconstruction: Option<Reconstruction>,
    config: TimelineConfig,
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline")
            .field("published_id", &self.published_id)
            .field("transactions", &self.transactions.len())
            .field("chunks", &self.chunks.len())
            .field("pending", &self.pending.len())
            .field("reached_earliest", &self.reached_earliest)
            .finish()
    }
}

impl Timeline {
    /// Create a timeline for the given documents.
    ///
    /// Fails if a document is not an object or has no `_rev`.
    pub fn new(options: TimelineOptions, config: TimelineConfig) -> Result<Self> {
        let draft_id = config.draft_id(&options.published_id);
        Ok(Self {
            draft_version: create_version(options.draft.as_ref())?,
            published_version: create_version(options.published.as_ref())?,
            published_id: options.published_id,
            draft_id,
            transactions: TwoEndedArray::new(),
            chunks: TwoEndedArray::new(),
            pending: HashMap::new(),
            recreate_from: None,
            reached_earliest: false,
            policy: Box::new(WindowedChunkPolicy::new(config.merge_window_ms)),
            trace: None,
            reconstruction: None,
            config,
        })
    }

    /// Create a timeline that reports every input to `sink`.
    pub fn traced(
        options: TimelineOptions,
        config: TimelineConfig,
        sink: impl TraceSink + 'static,
    ) -> Result<Self> {
        let initial = TraceEvent::Initial {
            published_id: options.published_id.clone(),
            draft: options.draft.clone(),
            published: options.published.clone(),
        };
        let mut timeline = Self::new(options, config)?;
        let mut sink: Box<dyn TraceSink> = Box::new(sink);
        sink.record(initial);
        timeline.trace = Some(sink);
        Ok(timeline)
    }

    /// Replace the chunk policy. Only meaningful before chunks are built.
    pub fn with_policy(mut self, policy: impl ChunkPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    fn record(&mut self, event: impl FnOnce() -> TraceEvent) {
        if let Some(sink) = self.trace.as_mut() {
            sink.record(event());
        }
    }

    pub fn published_id(&self) -> &str {
        &self.published_id
    }

    pub fn draft_id(&self) -> &str {
        &self.draft_id
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn draft_version(&self) -> Option<&DocumentVersion> {
        self.draft_version.as_ref()
    }

    pub fn published_version(&self) -> Option<&DocumentVersion> {
        self.published_version.as_ref()
    }

    pub fn reached_earliest_entry(&self) -> bool {
        self.reached_earliest
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Add a live mutation.
    ///
    /// Mutations must arrive in order per version, but draft and published
    /// may interleave freely: `[D1, D2, P1]` is fine when D1 and P1 share a
    /// transaction, `[P1, D2, D1]` is not.
    ///
    /// A mutation that does not apply to the live version is rejected
    /// without being recorded or added to the log.
    pub fn add_remote_mutation(&mut self, entry: &RemoteMutation) -> Result<()> {
        let live = match entry.version {
            MutationVersion::Draft => &mut self.draft_version,
            MutationVersion::Published => &mut self.published_version,
        };
        *live = patch_version(live.as_ref(), &entry.transaction_id, &entry.effects.apply)?;
        self.record(|| TraceEvent::AddRemoteMutation { event: entry.clone() });

        match self.pending.remove(&entry.transaction_id) {
            Some(idx) => {
                let transaction = self
                    .transactions
                    .get_mut(idx)
                    .ok_or(TimelineError::MissingTransaction(idx))?;
                transaction.set_effect(entry.version, entry.effects.clone());
                tracing::debug!(
                    transaction = %entry.transaction_id,
                    version = %entry.version,
                    idx,
                    "completed pending transaction"
                );
                self.invalidate_from(idx);
            }
            None => {
                let idx = self.transactions.add_to_end(Transaction::from_remote(entry));
                self.pending.insert(entry.transaction_id.clone(), idx);
                tracing::debug!(
                    transaction = %entry.transaction_id,
                    version = %entry.version,
                    idx,
                    "added remote mutation"
                );
            }
        }
        Ok(())
    }

    /// Prepend an older transaction from the translog.
    pub fn add_translog_entry(&mut self, event: &TranslogEvent) -> Result<()> {
        if self.reached_earliest {
            tracing::warn!(transaction = %event.id, "translog entry after the earliest entry");
            return Err(TimelineError::EntryAfterEarliest { id: event.id.clone() });
        }
        self.record(|| TraceEvent::AddTranslogEntry { event: event.clone() });

        let transaction = Transaction::from_translog(event, &self.draft_id, &self.published_id);
        let idx = self.transactions.add_to_beginning(transaction);
        tracing::debug!(transaction = %event.id, idx, "added translog entry");
        Ok(())
    }

    /// Mark that no older history exists.
    pub fn did_reach_earliest_entry(&mut self) {
        self.record(|| TraceEvent::DidReachEarliestEntry);
        self.reached_earliest = true;
    }

    pub(crate) fn invalidate_from(&mut self, idx: i64) {
        let from = self.recreate_from.map_or(idx, |current| current.min(idx));
        self.recreate_from = Some(from);
    }

    // ========================================================================
    // Chunking
    // ========================================================================

    /// Bring the chunks in line with the transaction log.
    ///
    /// Every chunk obtained before this call may be stale afterwards.
    pub fn update_chunks(&mut self) -> Result<()> {
        self.record(|| TraceEvent::UpdateChunks);

        self.remove_invalidated_chunks();
        self.add_chunks_from_transactions()?;
        self.create_initial_chunk()?;

        tracing::trace!(
            chunks = self.chunks.len(),
            first = self.chunks.first_idx(),
            transactions = self.transactions.len(),
            "updated chunks"
        );
        Ok(())
    }

    fn remove_invalidated_chunks(&mut self) {
        let Some(from) = self.recreate_from.take() else {
            return;
        };
        let mut removed = 0usize;
        while self.chunks.last().is_some_and(|chunk| from < chunk.end) {
            self.chunks.remove_from_end();
            removed += 1;
        }
        tracing::debug!(from, removed, "invalidated chunks");
    }

    fn add_chunks_from_transactions(&mut self) -> Result<()> {
        let first_tx = self.transactions.first_idx();
        let last_tx = self.transactions.last_idx();
        let policy = self.policy.as_ref();

        let next = self.chunks.last().map_or(first_tx, |chunk| chunk.end);
        for idx in next..=last_tx {
            let transaction = self.transactions.get(idx).ok_or(TimelineError::MissingTransaction(idx))?;
            self.chunks.merge_at_end(policy.chunk_from_transaction(transaction), |left, right| {
                policy.merge(left, right)
            });
        }

        let Some(first_chunked) = self.chunks.first().map(|chunk| chunk.start) else {
            return Ok(());
        };
        for idx in (first_tx..first_chunked).rev() {
            let transaction = self.transactions.get(idx).ok_or(TimelineError::MissingTransaction(idx))?;
            self.chunks.merge_at_beginning(policy.chunk_from_transaction(transaction), |left, right| {
                policy.merge(left, right)
            });
        }
        Ok(())
    }

    /// Once the oldest entry is known, split it off into an `initial` chunk
    /// and re-chunk the rest of the old first chunk behind it.
    fn create_initial_chunk(&mut self) -> Result<()> {
        if !self.reached_earliest {
            return Ok(());
        }
        if self.chunks.first().is_some_and(|chunk| chunk.kind == ChunkType::Initial) {
            return Ok(());
        }
        let Some(first_tx) = self.transactions.first() else {
            return Ok(());
        };

        let policy = self.policy.as_ref();
        let mut initial = policy.chunk_from_transaction(first_tx);
        initial.kind = ChunkType::Initial;
        initial.id = INITIAL_CHUNK_ID.to_string();

        if let Some(old) = self.chunks.remove_from_beginning() {
            let mut rest: Vec<Chunk> = Vec::new();
            for idx in (old.start + 1)..old.end {
                let transaction = self.transactions.get(idx).ok_or(TimelineError::MissingTransaction(idx))?;
                let chunk = policy.chunk_from_transaction(transaction);
                match rest.pop() {
                    None => rest.push(chunk),
                    Some(last) => match policy.merge(&last, &chunk) {
                        Merge::Merged(one) => rest.push(one),
                        Merge::Separate(left, right) => {
                            rest.push(left);
                            rest.push(right);
                        }
                    },
                }
            }
            for chunk in rest.into_iter().rev() {
                self.chunks.add_to_beginning(chunk);
            }
        }
        self.chunks.add_to_beginning(initial);
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Map over the chunks from newest to oldest.
    pub fn map_chunks<T>(&self, mut mapper: impl FnMut(&Chunk, i64) -> T) -> Vec<T> {
        self.chunks.iter().rev().map(|chunk| mapper(chunk, chunk.index)).collect()
    }

    /// Chunks from newest to oldest.
    pub fn chunks_newest_first(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().rev()
    }

    pub fn chunk(&self, idx: i64) -> Option<&Chunk> {
        self.chunks.get(idx)
    }

    pub fn first_chunk(&self) -> Option<&Chunk> {
        self.chunks.first()
    }

    pub fn last_chunk(&self) -> Option<&Chunk> {
        self.chunks.last()
    }

    /// Whether `chunk` is the newest chunk, by identity.
    pub fn is_latest_chunk(&self, chunk: &Chunk) -> bool {
        self.chunks.last().is_some_and(|last| last.same_as(chunk))
    }

    pub fn transaction_by_index(&self, idx: i64) -> Option<&Transaction> {
        self.transactions.get(idx)
    }

    /// Indices of every transaction in the log.
    pub fn transaction_indices(&self) -> Range<i64> {
        self.transactions.first_idx()..self.transactions.last_idx() + 1
    }

    /// Time id of a chunk: `"<end timestamp>/<chunk id>"`.
    pub fn create_time_id(&self, chunk: &Chunk) -> String {
        format!("{}/{}", chunk.end_timestamp, chunk.id)
    }

    /// Resolve a time reference.
    ///
    /// The chunk returned is only valid until the next
    /// [`update_chunks`](Self::update_chunks).
    pub fn parse_time_id(&self, id: &str) -> TimeRef {
        let exhausted = || if self.reached_earliest { TimeRef::Invalid } else { TimeRef::Loading };

        let (Some(first), Some(last)) = (self.chunks.first(), self.chunks.last()) else {
            return exhausted();
        };

        if id == LAST_PUBLISHED {
            if let Some(chunk) = self.find_maybe_last_published_before(last.index) {
                return TimeRef::Chunk(chunk.clone());
            }
            return if self.reached_earliest { TimeRef::Chunk(first.clone()) } else { TimeRef::Loading };
        }

        let Some((timestamp, chunk_id)) = id.split_once('/') else {
            return TimeRef::Invalid;
        };
        let Ok(timestamp) = timestamp.parse::<u64>() else {
            return TimeRef::Invalid;
        };

        for chunk in self.chunks.iter().rev() {
            if chunk.id == chunk_id {
                return TimeRef::Chunk(chunk.clone());
            }
            // Everything older ended before the requested time. The slack
            // covers transactions arriving out of timestamp order.
            if chunk.end_timestamp.saturating_add(self.config.resolve_slack_ms) < timestamp {
                return TimeRef::Invalid;
            }
        }

        exhausted()
    }

    /// Latest `publish` or `initial` chunk at or before `chunk_idx`, falling
    /// back to the first chunk.
    pub fn find_last_published_before(&self, chunk_idx: i64) -> Option<&Chunk> {
        self.find_maybe_last_published_before(chunk_idx).or_else(|| self.chunks.first())
    }

    /// Latest `publish` or `initial` chunk at or before `chunk_idx`.
    pub fn find_maybe_last_published_before(&self, chunk_idx: i64) -> Option<&Chunk> {
        let last = chunk_idx.min(self.chunks.last_idx());
        (self.chunks.first_idx()..=last)
            .rev()
            .filter_map(|idx| self.chunks.get(idx))
            .find(|chunk| chunk.kind.is_publish_boundary())
    }

    /// Chunk containing transaction `idx`, walking from chunk `hint`.
    ///
    /// The walk moves in one direction only; needing to turn around means
    /// the transaction falls in a gap.
    pub fn chunk_by_transaction_index(&self, idx: i64, hint: i64) -> Result<&Chunk> {
        let mut chunk_idx = hint;
        let mut step = 0i64;
        loop {
            let chunk = self.chunks.get(chunk_idx).ok_or(TimelineError::NoChunkForTransaction(idx))?;
            let direction = if idx >= chunk.end {
                1
            } else if idx < chunk.start {
                -1
            } else {
                return Ok(chunk);
            };
            if step != 0 && step != direction {
                return Err(TimelineError::NoChunkForTransaction(idx));
            }
            step = direction;
            chunk_idx += direction;
        }
    }
}

impl AnnotationSource for Timeline {
    fn annotation(&self, provenance: &Provenance) -> Annotation {
        let transaction = self.transactions.get(provenance.transaction_index);
        Annotation {
            chunk_id: provenance.chunk.id.clone(),
            chunk_index: provenance.chunk_index,
            transaction_index: provenance.transaction_index,
            author: transaction.map_or_else(|| provenance.chunk.author.clone(), |t| t.author.clone()),
            timestamp: transaction.map_or(provenance.chunk.end_timestamp, |t| t.timestamp),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
