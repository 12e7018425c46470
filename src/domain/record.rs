use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{Result, SyncError};

/// A document observed from the live store.
///
/// The store owns its lifecycle; the client never mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveRecord {
    pub id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl LiveRecord {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Decode into a typed record. The document id is injected as `id`
    /// unless the payload carries its own.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        let mut map = self.data.clone();
        map.entry("id".to_string())
            .or_insert_with(|| Value::String(self.id.clone()));
        serde_json::from_value(Value::Object(map)).map_err(|e| SyncError::Decode {
            id: self.id.clone(),
            reason: e.to_string(),
        })
    }
}

/// Full result set of a live query at one point in time.
pub type Snapshot = Arc<Vec<LiveRecord>>;
