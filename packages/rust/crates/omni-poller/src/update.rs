use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single incoming bot update.
///
/// Only `update_id` is understood by the polling core; it doubles as the fetch
/// cursor. Every other field is carried through untouched in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Monotonically increasing identifier assigned by the remote API.
    #[serde(rename = "update_id")]
    pub id: i64,
    /// Remaining update fields (`message`, `callback_query`, ...).
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Update {
    /// Create an update with an empty payload.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            payload: Map::new(),
        }
    }

    /// Create an update carrying the given payload fields.
    pub fn with_payload(id: i64, payload: Map<String, Value>) -> Self {
        Self { id, payload }
    }

    /// Whether the payload has a top-level field named `kind`.
    pub fn has_field(&self, kind: &str) -> bool {
        self.payload.contains_key(kind)
    }
}
