//! Transactions: one entry of the history log.

use serde::{Deserialize, Serialize};

use crate::event::{MutationVersion, RemoteMutation, TranslogEvent};
use crate::patch::PatchPair;

/// One transaction's effects on the draft and published versions.
///
/// `index` is the transaction's address in the log and is assigned when it is
/// added there; `id` is its identity from the history service. A transaction
/// assembled from remote mutations may carry only one effect until the other
/// version's mutation arrives.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub index: i64,
    pub id: String,
    /// Unix millis.
    pub timestamp: u64,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft_effect: Option<PatchPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_effect: Option<PatchPair>,
}

impl Transaction {
    /// Build a transaction from a translog entry, picking the effects that
    /// belong to the given draft and published document ids.
    pub fn from_translog(event: &TranslogEvent, draft_id: &str, published_id: &str) -> Self {
        Self {
            index: 0,
            id: event.id.clone(),
            timestamp: event.timestamp,
            author: event.author.clone(),
            draft_effect: event.effects.get(draft_id).cloned(),
            published_effect: event.effects.get(published_id).cloned(),
        }
    }

    /// Start a transaction from the first remote mutation seen for it.
    pub fn from_remote(entry: &RemoteMutation) -> Self {
        let mut transaction = Self {
            index: 0,
            id: entry.transaction_id.clone(),
            timestamp: entry.timestamp,
            author: entry.author.clone(),
            draft_effect: None,
            published_effect: None,
        };
        transaction.set_effect(entry.version, entry.effects.clone());
        transaction
    }

    /// The effect on one version, if known.
    pub fn effect(&self, version: MutationVersion) -> Option<&PatchPair> {
        match version {
            MutationVersion::Draft => self.draft_effect.as_ref(),
            MutationVersion::Published => self.published_effect.as_ref(),
        }
    }

    /// Record the effect on one version, replacing whatever was there.
    pub fn set_effect(&mut self, version: MutationVersion, effect: PatchPair) {
        match version {
            MutationVersion::Draft => self.draft_effect = Some(effect),
            MutationVersion::Published => self.published_effect = Some(effect),
        }
    }
}
