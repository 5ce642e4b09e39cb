//! Reconstructing the document over a range of history.
//!
//! A timeline keeps one reconstruction: a range `(start, end]` of chunks and
//! whatever has been computed for it so far. Snapshots come from replaying
//! `revert` patches backward from the live versions; the diff comes from
//! replaying `apply` patches forward from the start snapshot over annotated
//! values.
//!
//! ```text
//!   live versions ──revert──▶ end snapshot ──revert──▶ start snapshot
//!   start snapshot ──apply (annotated)──▶ final value ──▶ DocumentDiff
//! ```

use std::sync::Arc;

use serde_json::Value;

use palimpsest_patch::{apply_patch, incremental, rebase_value, wrap, Annotated};
use palimpsest_types::{Chunk, Transaction};

use crate::diff::{diff_value, DocumentDiff, Provenance};
use crate::timeline::Timeline;
use crate::two_ended::TwoEndedArray;
use crate::{Result, TimelineError};

/// Draft and published attributes at one point in history.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CombinedDocument {
    pub draft: Option<Value>,
    pub published: Option<Value>,
}

impl CombinedDocument {
    /// What an editor sees: the draft if there is one, else the published
    /// version.
    pub fn attributes(&self) -> Option<&Value> {
        self.draft.as_ref().or(self.published.as_ref())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Reconstruction {
    start: Option<Chunk>,
    end: Chunk,
    start_document: Option<CombinedDocument>,
    end_document: Option<CombinedDocument>,
    diff: Option<Arc<DocumentDiff>>,
}

impl Reconstruction {
    fn new(start: Option<Chunk>, end: Chunk) -> Self {
        Self { start, end, start_document: None, end_document: None, diff: None }
    }
}

/// Revert transactions `last` down to `first` (inclusive) on `doc`.
fn replay_backwards(
    transactions: &TwoEndedArray<Transaction>,
    first: i64,
    last: i64,
    doc: CombinedDocument,
) -> Result<CombinedDocument> {
    let CombinedDocument { mut draft, mut published } = doc;
    for idx in (first..=last).rev() {
        let transaction = transactions.get(idx).ok_or(TimelineError::MissingTransaction(idx))?;
        if let Some(effect) = &transaction.draft_effect {
            draft = apply_patch(draft.as_ref(), &effect.revert)?;
        }
        if let Some(effect) = &transaction.published_effect {
            published = apply_patch(published.as_ref(), &effect.revert)?;
        }
    }
    Ok(CombinedDocument { draft, published })
}

fn effective<'a>(
    draft: &'a Annotated<Provenance>,
    published: &'a Annotated<Provenance>,
) -> &'a Annotated<Provenance> {
    if draft.is_null() { published } else { draft }
}

impl Timeline {
    /// Select the range to reconstruct.
    ///
    /// Cheap to call repeatedly: cached results survive as long as the
    /// boundary chunks keep their identity.
    pub fn set_range(&mut self, start: Option<&Chunk>, end: &Chunk) {
        if self.reconstruction.is_none() {
            self.reconstruction = Some(Reconstruction::new(start.cloned(), end.clone()));
            return;
        }
        let Some(current) = self.reconstruction.as_mut() else {
            return;
        };

        let same_start = match (&current.start, start) {
            (None, None) => true,
            (Some(a), Some(b)) => a.same_as(b),
            _ => false,
        };
        if !same_start {
            current.start = start.cloned();
            current.start_document = None;
            current.diff = None;
        }

        if !current.end.same_as(end) {
            current.end = end.clone();
            current.end_document = None;
            current.diff = None;
        }
    }

    fn current(&self) -> Result<&Reconstruction> {
        self.reconstruction.as_ref().ok_or(TimelineError::RangeRequired)
    }

    fn current_mut(&mut self) -> Result<&mut Reconstruction> {
        self.reconstruction.as_mut().ok_or(TimelineError::RangeRequired)
    }

    /// Attributes as of the end of the range.
    pub fn end_attributes(&mut self) -> Result<Option<Value>> {
        let current = self.current()?;
        self.ensure_live(&current.end)?;
        self.ensure_end_document()?;
        Ok(self.current()?.end_document.as_ref().and_then(|d| d.attributes().cloned()))
    }

    /// Attributes as of the end of the start chunk.
    pub fn start_attributes(&mut self) -> Result<Option<Value>> {
        let current = self.current()?;
        let start = current.start.as_ref().ok_or(TimelineError::StartRequired)?;
        self.ensure_live(start)?;
        self.ensure_live(&current.end)?;
        self.ensure_start_document()?;
        Ok(self.current()?.start_document.as_ref().and_then(|d| d.attributes().cloned()))
    }

    fn ensure_end_document(&mut self) -> Result<()> {
        let current = self.current()?;
        if current.end_document.is_some() {
            return Ok(());
        }

        let live = CombinedDocument {
            draft: self.draft_version.as_ref().map(|v| v.attributes.clone()),
            published: self.published_version.as_ref().map(|v| v.attributes.clone()),
        };
        let document =
            replay_backwards(&self.transactions, current.end.end, self.transactions.last_idx(), live)?;
        self.current_mut()?.end_document = Some(document);
        Ok(())
    }

    fn ensure_start_document(&mut self) -> Result<()> {
        let current = self.current()?;
        let start = current.start.as_ref().ok_or(TimelineError::StartRequired)?;
        if current.start_document.is_some() {
            return Ok(());
        }
        if start.end > current.end.end {
            return Err(TimelineError::InvertedRange { start: start.index, end: current.end.index });
        }
        let (first, last) = (start.end, current.end.end - 1);

        self.ensure_end_document()?;
        let current = self.current()?;
        let end_document = current.end_document.clone().unwrap_or_default();
        let document = replay_backwards(&self.transactions, first, last, end_document)?;
        self.current_mut()?.start_document = Some(document);
        Ok(())
    }

    /// Fails if `chunk` is no longer the chunk at its index.
    fn ensure_live(&self, chunk: &Chunk) -> Result<()> {
        match self.chunks.get(chunk.index) {
            Some(live) if live.same_as(chunk) => Ok(()),
            _ => Err(TimelineError::StaleChunk { id: chunk.id.clone(), index: chunk.index }),
        }
    }

    /// Diff between the start and the end of the range, or `None` without a
    /// range or start. Computed once per range.
    pub fn current_diff(&mut self) -> Result<Option<Arc<DocumentDiff>>> {
        let Some(current) = self.reconstruction.as_ref() else {
            return Ok(None);
        };
        let Some(start) = current.start.clone() else {
            return Ok(None);
        };
        let end = current.end.clone();
        self.ensure_live(&start)?;
        self.ensure_live(&end)?;
        if let Some(diff) = &current.diff {
            return Ok(Some(Arc::clone(diff)));
        }

        let initial_attributes = self.start_attributes()?;
        let final_attributes = self.end_attributes()?;
        let start_document = self.current()?.start_document.clone().unwrap_or_default();

        let (initial, last) = self.replay_forward(&start, &end, &start_document)?;
        let diff = Arc::new(DocumentDiff {
            initial_attributes,
            final_attributes,
            root: diff_value(&*self, &initial, &last),
        });
        tracing::trace!(start = start.index, end = end.index, "computed diff");

        self.current_mut()?.diff = Some(Arc::clone(&diff));
        Ok(Some(diff))
    }

    /// Apply every transaction of chunks `(start, end]` to the start snapshot,
    /// returning the effective value before and after.
    fn replay_forward(
        &self,
        start: &Chunk,
        end: &Chunk,
        document: &CombinedDocument,
    ) -> Result<(Annotated<Provenance>, Annotated<Provenance>)> {
        let mut draft = wrap(document.draft.as_ref(), None);
        let mut published = wrap(document.published.as_ref(), None);
        let initial = effective(&draft, &published).clone();

        for chunk_idx in (start.index + 1)..=end.index {
            let chunk = Arc::new(self.chunks.get(chunk_idx).ok_or(TimelineError::MissingChunk(chunk_idx))?.clone());

            for tx_idx in chunk.start..chunk.end {
                let transaction =
                    self.transactions.get(tx_idx).ok_or(TimelineError::MissingTransaction(tx_idx))?;
                let meta = Provenance {
                    chunk: Arc::clone(&chunk),
                    chunk_index: chunk_idx,
                    transaction_index: tx_idx,
                };

                let pre_draft = draft.clone();
                let pre_published = published.clone();
                if let Some(effect) = &transaction.draft_effect {
                    draft = incremental::apply_patch(&draft, &effect.apply, &meta)?;
                }
                if let Some(effect) = &transaction.published_effect {
                    published = incremental::apply_patch(&published, &effect.apply, &meta)?;
                }

                // A publish moves the draft's content (and its history) over.
                if !published.is_null() && draft.is_null() {
                    published = rebase_value(&pre_draft, published);
                }
                // A new draft starts from the published content.
                if !draft.is_null() && pre_draft.is_null() {
                    draft = rebase_value(&pre_published, draft);
                }
            }
        }

        let last = effective(&draft, &published).clone();
        Ok((initial, last))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TimelineConfig, TimelineOptions};
    use palimpsest_patch::patch_pair;
    use palimpsest_types::TranslogEvent;
    use serde_json::json;

    fn timeline_with_titles(titles: &[&str]) -> Timeline {
        let last = titles.last().copied();
        let options = TimelineOptions {
            published_id: "doc".into(),
            draft: last.map(|t| json!({"_rev": "r", "title": t})),
            published: None,
        };
        let mut tl = Timeline::new(options, TimelineConfig::default().with_merge_window_ms(0)).unwrap();

        // Newest first, one hour apart so nothing merges.
        let mut prev: Vec<Option<Value>> = vec![None];
        prev.extend(titles.iter().map(|t| Some(json!({"title": t}))));
        for i in (0..titles.len()).rev() {
            let pair = patch_pair(prev[i].as_ref(), prev[i + 1].as_ref()).unwrap();
            let event = TranslogEvent {
                id: format!("t{i}"),
                author: "alice".into(),
                timestamp: i as u64 * 3_600_000,
                effects: [("drafts.doc".to_string(), pair)].into_iter().collect(),
            };
            tl.add_translog_entry(&event).unwrap();
        }
        tl.did_reach_earliest_entry();
        tl.update_chunks().unwrap();
        tl
    }

    #[test]
    fn test_range_required() {
        let mut tl = timeline_with_titles(&["a"]);
        assert_eq!(tl.end_attributes().unwrap_err(), TimelineError::RangeRequired);
        assert_eq!(tl.current_diff().unwrap(), None);
    }

    #[test]
    fn test_start_required() {
        let mut tl = timeline_with_titles(&["a", "b"]);
        let end = tl.last_chunk().cloned().unwrap();
        tl.set_range(None, &end);
        assert_eq!(tl.start_attributes().unwrap_err(), TimelineError::StartRequired);
        assert_eq!(tl.current_diff().unwrap(), None);
        assert_eq!(tl.end_attributes().unwrap(), Some(json!({"title": "b"})));
    }

    #[test]
    fn test_snapshots_at_each_chunk() {
        let mut tl = timeline_with_titles(&["a", "b", "c"]);
        let chunks: Vec<Chunk> = tl.map_chunks(|c, _| c.clone());
        assert_eq!(chunks.len(), 3);

        // Newest first: t2, t1, initial (t0).
        for (chunk, title) in chunks.iter().zip(["c", "b", "a"]) {
            tl.set_range(None, chunk);
            assert_eq!(tl.end_attributes().unwrap(), Some(json!({"title": title})));
        }
    }

    #[test]
    fn test_snapshots_reject_rebuilt_boundaries() {
        let mut tl = timeline_with_titles(&["a", "b"]);
        let first = tl.first_chunk().cloned().unwrap();
        let last = tl.last_chunk().cloned().unwrap();
        tl.set_range(Some(&first), &last);
        assert_eq!(tl.end_attributes().unwrap(), Some(json!({"title": "b"})));

        // Rebuild every chunk behind the cached range.
        let first_tx = tl.transactions.first_idx();
        tl.invalidate_from(first_tx);
        tl.update_chunks().unwrap();
        assert!(!tl.last_chunk().unwrap().same_as(&last));

        assert!(matches!(tl.end_attributes(), Err(TimelineError::StaleChunk { .. })));
        assert!(matches!(tl.start_attributes(), Err(TimelineError::StaleChunk { .. })));
    }

    #[test]
    fn test_inverted_range() {
        let mut tl = timeline_with_titles(&["a", "b"]);
        let first = tl.first_chunk().cloned().unwrap();
        let last = tl.last_chunk().cloned().unwrap();
        tl.set_range(Some(&last), &first);
        assert!(matches!(tl.start_attributes(), Err(TimelineError::InvertedRange { .. })));
    }

    #[test]
    fn test_diff_over_range() {
        let mut tl = timeline_with_titles(&["a", "b", "c"]);
        let first = tl.first_chunk().cloned().unwrap();
        let last = tl.last_chunk().cloned().unwrap();
        tl.set_range(Some(&first), &last);

        let diff = tl.current_diff().unwrap().unwrap();
        assert_eq!(diff.initial_attributes, Some(json!({"title": "a"})));
        assert_eq!(diff.final_attributes, Some(json!({"title": "c"})));
        let title = diff.root.field("title").unwrap();
        let annotation = title.annotation().unwrap();
        assert_eq!(annotation.chunk_id, "t2");
        assert_eq!(annotation.author, "alice");
    }

    #[test]
    fn test_combined_attributes_prefer_draft() {
        let doc = CombinedDocument { draft: None, published: Some(json!({"a": 1})) };
        assert_eq!(doc.attributes(), Some(&json!({"a": 1})));
        let doc = CombinedDocument { draft: Some(json!({"b": 2})), ..doc };
        assert_eq!(doc.attributes(), Some(&json!({"b": 2})));
    }
}
