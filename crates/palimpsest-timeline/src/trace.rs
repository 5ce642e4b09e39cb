//! Recording and replaying timeline input.
//!
//! A timeline built with a [`TraceSink`] reports every call that feeds it
//! history. The resulting [`TraceEvent`] list is plain JSON, and [`replay`]
//! rebuilds an identical timeline from it, which is how odd histories get
//! reproduced outside the app that saw them.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use palimpsest_types::{RemoteMutation, TranslogEvent};

use crate::timeline::{Timeline, TimelineOptions};
use crate::{Result, TimelineConfig, TimelineError};

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TraceEvent {
    #[serde(rename_all = "camelCase")]
    Initial {
        published_id: String,
        draft: Option<Value>,
        published: Option<Value>,
    },
    AddRemoteMutation {
        event: RemoteMutation,
    },
    AddTranslogEntry {
        event: TranslogEvent,
    },
    DidReachEarliestEntry,
    UpdateChunks,
}

/// Receives trace events from a timeline.
pub trait TraceSink: Send {
    fn record(&mut self, event: TraceEvent);
}

/// Shared, cloneable trace buffer.
///
/// Hand one clone to [`Timeline::traced`] and keep another to read the
/// events back.
#[derive(Debug, Clone, Default)]
pub struct TraceRecorder {
    events: Arc<Mutex<Vec<TraceEvent>>>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&*self.events.lock())
    }
}

impl TraceSink for TraceRecorder {
    fn record(&mut self, event: TraceEvent) {
        self.events.lock().push(event);
    }
}

/// Rebuild a timeline from a recorded trace.
///
/// The first event must be `initial`; it may not appear again.
pub fn replay(events: &[TraceEvent], config: TimelineConfig) -> Result<Timeline> {
    let Some((TraceEvent::Initial { published_id, draft, published }, rest)) = events.split_first()
    else {
        return Err(TimelineError::InvalidTrace("trace must start with an initial event".into()));
    };

    let options = TimelineOptions {
        published_id: published_id.clone(),
        draft: draft.clone(),
        published: published.clone(),
    };
    let mut timeline = Timeline::new(options, config)?;

    for (position, event) in rest.iter().enumerate() {
        match event {
            TraceEvent::Initial { .. } => {
                return Err(TimelineError::InvalidTrace(format!(
                    "unexpected initial event at position {}",
                    position + 1
                )));
            }
            TraceEvent::AddRemoteMutation { event } => timeline.add_remote_mutation(event)?,
            TraceEvent::AddTranslogEntry { event } => timeline.add_translog_entry(event)?,
            TraceEvent::DidReachEarliestEntry => timeline.did_reach_earliest_entry(),
            TraceEvent::UpdateChunks => timeline.update_chunks()?,
        }
    }

    tracing::debug!(events = events.len(), chunks = timeline.chunk_count(), "replayed trace");
    Ok(timeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let event = TraceEvent::Initial {
            published_id: "doc".into(),
            draft: None,
            published: Some(json!({"_rev": "r1"})),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "initial", "publishedId": "doc", "draft": null, "published": {"_rev": "r1"}})
        );
        assert_eq!(
            serde_json::to_value(TraceEvent::DidReachEarliestEntry).unwrap(),
            json!({"type": "didReachEarliestEntry"})
        );
    }

    #[test]
    fn test_recorder_clones_share_events() {
        let recorder = TraceRecorder::new();
        let mut sink = recorder.clone();
        sink.record(TraceEvent::UpdateChunks);
        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.events(), vec![TraceEvent::UpdateChunks]);
    }

    #[test]
    fn test_replay_requires_initial() {
        let err = replay(&[TraceEvent::UpdateChunks], TimelineConfig::default()).unwrap_err();
        assert!(matches!(err, TimelineError::InvalidTrace(_)));
        assert!(replay(&[], TimelineConfig::default()).is_err());
    }
}
