//! Patch envelopes: one node of the DAG, generic over the codec body type.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::patch_id::PatchId;

/// Store sequencing hints attached by a transport, carried opaquely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeqInfo {
    pub seq: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub prev_seq: Option<u64>,
}

/// One patch: identity, ancestry, and the codec-specific delta payload.
/// `body` is absent on pure snapshot nodes. Immutable once inserted into a
/// graph, except that snapshot data arriving later on the same id is
/// attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch<B> {
    pub id: PatchId,
    /// Advisory wall-clock milliseconds.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub wall: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub body: Option<B>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub parents: Vec<PatchId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_id: Option<u32>,
    /// Monotone per appender, for display only.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub version: Option<u64>,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_snapshot: bool,
    /// Full serialized document, present iff `is_snapshot`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub snapshot_text: Option<String>,
    /// Whether this patch originated from a file load.
    #[serde(skip_serializing_if = "is_false", default)]
    pub file: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub meta: Option<serde_json::Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub seq_info: Option<SeqInfo>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl<B> Patch<B> {
    /// A bare patch with a body and parents; everything else defaulted.
    pub fn new(id: PatchId, body: B, parents: Vec<PatchId>) -> Self {
        Self {
            id,
            wall: None,
            body: Some(body),
            parents,
            user_id: None,
            version: None,
            is_snapshot: false,
            snapshot_text: None,
            file: false,
            meta: None,
            source: None,
            seq_info: None,
        }
    }

    /// A pure snapshot node carrying the full serialized document.
    pub fn snapshot(id: PatchId, snapshot_text: String, parents: Vec<PatchId>) -> Self {
        Self {
            id,
            wall: None,
            body: None,
            parents,
            user_id: None,
            version: None,
            is_snapshot: true,
            snapshot_text: Some(snapshot_text),
            file: false,
            meta: None,
            source: None,
            seq_info: None,
        }
    }
}

/// Marker bound for body types that can travel on the wire.
pub trait WireBody: Clone + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned {}
impl<T: Clone + PartialEq + std::fmt::Debug + Serialize + DeserializeOwned> WireBody for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_fields_are_omitted_on_the_wire() {
        let id = PatchId::encode(1000, "client").unwrap();
        let p: Patch<Vec<u8>> = Patch::new(id, vec![1, 2], vec![]);
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v, json!({"id": "000000000rs_client", "body": [1, 2]}));
    }

    #[test]
    fn snapshot_fields_round_trip() {
        let id = PatchId::encode(2000, "c").unwrap();
        let parent = PatchId::encode(1000, "c").unwrap();
        let mut p: Patch<Vec<u8>> = Patch::snapshot(id, "full text".into(), vec![parent]);
        p.user_id = Some(7);
        p.version = Some(3);
        p.wall = Some(1234);
        p.seq_info = Some(SeqInfo {
            seq: 9,
            prev_seq: Some(8),
        });
        let json = serde_json::to_string(&p).unwrap();
        let back: Patch<Vec<u8>> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
        assert!(back.is_snapshot);
        assert_eq!(back.snapshot_text.as_deref(), Some("full text"));
    }
}
