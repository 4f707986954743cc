//! The auth-state store (C3) and its Signal-protocol adapter (C4).

pub mod auth_state;
pub mod signal_store;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub use auth_state::AuthStateStore;
pub use signal_store::SignalProtocolStore;

/// `StoreType` — spec.md §9 design note, replacing the dynamic value type
/// the original code keyed the cache with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreType {
    PreKey,
    Session,
    SenderKey,
    Identity,
    AppStateSyncKey,
    AppStateSyncVersion,
}

impl StoreType {
    /// Critical types flush synchronously (spec.md §4.3); all others are
    /// debounced.
    pub fn is_critical(self) -> bool {
        matches!(self, StoreType::Session | StoreType::Identity)
    }
}

/// The tagged variant replacing the original dynamic store value (spec.md
/// §9). `get`/`set` on [`AuthStateStore`] are polymorphic over this.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreValue {
    PreKey(crate::creds::PreKey),
    Session(SessionRecord),
    SenderKey(Vec<u8>),
    Identity(IdentityRecord),
    AppStateKey(Vec<u8>),
    AppStateVersion(AppStateVersion),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Always 33B, 0x05-prefixed (spec.md §3).
    pub identity_key: Vec<u8>,
    pub trust_level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStateVersion {
    pub version: u64,
    pub hash: Vec<u8>,
}

/// Session records (and, generically, anything the original store round
/// trips through JSON) are carried in one of three envelope shapes on
/// write, and accepted in a fourth legacy shape on read (spec.md §3
/// invariant 7, §9 design note).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionRecord {
    Bytes(Vec<u8>),
    Str(String),
    Object(Value),
}

impl Serialize for SessionRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            SessionRecord::Bytes(b) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("__type", "bytes")?;
                map.serialize_entry("base64", &BASE64.encode(b))?;
                map.end()
            }
            SessionRecord::Str(s) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("__type", "string")?;
                map.serialize_entry("utf8", s)?;
                map.end()
            }
            SessionRecord::Object(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SessionRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_json(value).map_err(serde::de::Error::custom)?)
    }
}

impl SessionRecord {
    fn from_json(value: Value) -> Result<Self, String> {
        if let Value::Object(ref map) = value {
            match map.get("__type").and_then(Value::as_str) {
                Some("bytes") => {
                    let b64 = map
                        .get("base64")
                        .and_then(Value::as_str)
                        .ok_or("bytes envelope missing base64 field")?;
                    let bytes = BASE64.decode(b64).map_err(|e| e.to_string())?;
                    return Ok(SessionRecord::Bytes(bytes));
                }
                Some("string") => {
                    let s = map
                        .get("utf8")
                        .and_then(Value::as_str)
                        .ok_or("string envelope missing utf8 field")?;
                    return Ok(SessionRecord::Str(s.to_string()));
                }
                _ => {}
            }
            // Legacy `{type:"Buffer", data:[...]}` form.
            if map.get("type").and_then(Value::as_str) == Some("Buffer") {
                let data = map
                    .get("data")
                    .and_then(Value::as_array)
                    .ok_or("legacy Buffer envelope missing data field")?;
                let bytes = data
                    .iter()
                    .map(|n| n.as_u64().map(|v| v as u8).ok_or_else(|| "non-byte in Buffer data".to_string()))
                    .collect::<Result<Vec<u8>, String>>()?;
                return Ok(SessionRecord::Bytes(bytes));
            }
        }
        Ok(SessionRecord::Object(value))
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SessionRecord::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// `get(type, ids?) → map<id, value>` batch shape (spec.md §4.3).
pub type GetBatch = HashMap<String, StoreValue>;

/// `set(batch: map<type, map<id, value | null>>)` shape; `None` means
/// delete.
pub type SetBatch = HashMap<StoreType, HashMap<String, Option<StoreValue>>>;
