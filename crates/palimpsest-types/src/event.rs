//! Events delivered by the document-history service.
//!
//! Two shapes arrive: finalized translog entries covering every document a
//! transaction touched, and live remote mutations carrying one version's
//! effect at a time. Both are plain serde types; their patches are validated
//! while deserializing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::patch::PatchPair;

/// Which of the two document versions a mutation touched.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase", ascii_case_insensitive)]
pub enum MutationVersion {
    Draft,
    Published,
}

/// A historical, finalized transaction from the translog.
///
/// `effects` is keyed by document id; the timeline picks out the draft and
/// published ids it tracks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslogEvent {
    pub id: String,
    pub author: String,
    /// Unix millis.
    pub timestamp: u64,
    #[serde(default)]
    pub effects: BTreeMap<String, PatchPair>,
}

/// A live mutation of one version within a transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteMutation {
    pub transaction_id: String,
    pub version: MutationVersion,
    pub author: String,
    /// Unix millis.
    pub timestamp: u64,
    pub effects: PatchPair,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_translog_event() {
        let event: TranslogEvent = serde_json::from_value(json!({
            "id": "tx1",
            "author": "alice",
            "timestamp": 1700000000000u64,
            "effects": {
                "drafts.doc": {
                    "apply": [{"op": "set", "path": ["title"], "value": "Hi"}],
                    "revert": [{"op": "unset", "path": ["title"]}]
                }
            }
        }))
        .unwrap();

        assert_eq!(event.id, "tx1");
        assert!(event.effects.contains_key("drafts.doc"));
    }

    #[test]
    fn test_parse_remote_mutation() {
        let entry: RemoteMutation = serde_json::from_value(json!({
            "transactionId": "tx2",
            "version": "published",
            "author": "bob",
            "timestamp": 12,
            "effects": {"apply": [{"op": "delete"}], "revert": [{"op": "replace", "value": {"a": 1}}]}
        }))
        .unwrap();

        assert_eq!(entry.version, MutationVersion::Published);
        assert!(entry.effects.deletes());
    }

    #[test]
    fn test_invalid_patch_rejects_event() {
        let result = serde_json::from_value::<RemoteMutation>(json!({
            "transactionId": "tx3",
            "version": "draft",
            "author": "bob",
            "timestamp": 12,
            "effects": {"apply": [{"op": "delete"}, {"op": "delete"}], "revert": []}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_version_strings() {
        assert_eq!(MutationVersion::Draft.to_string(), "draft");
        assert_eq!("Published".parse::<MutationVersion>().unwrap(), MutationVersion::Published);
    }
}
