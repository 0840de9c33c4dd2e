//! Transport abstraction layer for WearSync
//!
//! Defines the two primitives the peer channel offers (fire-and-forget
//! messages and replace-whole-document data items) and the events watchers
//! receive.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::mpsc;

/// Field key every sender stamps so identical repeated puts still propagate.
pub const KEY_TIMESTAMP: &str = "timestamp";

/// Reference to a binary asset stored by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetRef {
    pub digest: String,
}

/// A typed value inside a data item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataValue {
    String(String),
    Int(i32),
    Long(i64),
    Bool(bool),
    IntList(Vec<i32>),
    Asset(AssetRef),
}

impl DataValue {
    fn type_name(&self) -> &'static str {
        match self {
            DataValue::String(_) => "string",
            DataValue::Int(_) => "int",
            DataValue::Long(_) => "long",
            DataValue::Bool(_) => "bool",
            DataValue::IntList(_) => "int-list",
            DataValue::Asset(_) => "asset",
        }
    }
}

/// Ordered mapping of field name to typed value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataMap {
    fields: BTreeMap<String, DataValue>,
}

/// A field was absent or held a value of the wrong type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("missing field `{0}`")]
    Missing(String),
    #[error("field `{key}` holds {found}, expected {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
}

macro_rules! typed_getter {
    ($name:ident, $variant:ident, $ret:ty, $expected:literal, |$v:ident| $conv:expr) => {
        pub fn $name(&self, key: &str) -> Result<$ret, FieldError> {
            match self.fields.get(key) {
                Some(DataValue::$variant($v)) => Ok($conv),
                Some(other) => Err(FieldError::WrongType {
                    key: key.to_string(),
                    expected: $expected,
                    found: other.type_name(),
                }),
                None => Err(FieldError::Missing(key.to_string())),
            }
        }
    };
}

impl DataMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_string(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.fields
            .insert(key.to_string(), DataValue::String(value.into()));
        self
    }

    pub fn put_int(&mut self, key: &str, value: i32) -> &mut Self {
        self.fields.insert(key.to_string(), DataValue::Int(value));
        self
    }

    pub fn put_long(&mut self, key: &str, value: i64) -> &mut Self {
        self.fields.insert(key.to_string(), DataValue::Long(value));
        self
    }

    pub fn put_bool(&mut self, key: &str, value: bool) -> &mut Self {
        self.fields.insert(key.to_string(), DataValue::Bool(value));
        self
    }

    pub fn put_int_list(&mut self, key: &str, value: Vec<i32>) -> &mut Self {
        self.fields.insert(key.to_string(), DataValue::IntList(value));
        self
    }

    pub fn put_asset(&mut self, key: &str, asset: AssetRef) -> &mut Self {
        self.fields.insert(key.to_string(), DataValue::Asset(asset));
        self
    }

    /// Stamp the current wall-clock time in epoch millis.
    pub fn stamp(&mut self) -> &mut Self {
        self.put_long(KEY_TIMESTAMP, now_millis())
    }

    typed_getter!(string, String, &str, "string", |v| v.as_str());
    typed_getter!(int, Int, i32, "int", |v| *v);
    typed_getter!(long, Long, i64, "long", |v| *v);
    typed_getter!(bool, Bool, bool, "bool", |v| *v);
    typed_getter!(int_list, IntList, &[i32], "int-list", |v| v.as_slice());
    typed_getter!(asset, Asset, &AssetRef, "asset", |v| v);

    /// Like [`DataMap::bool`] but absent fields read as `false`.
    pub fn bool_or_false(&self, key: &str) -> Result<bool, FieldError> {
        match self.bool(key) {
            Err(FieldError::Missing(_)) => Ok(false),
            other => other,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// A replicated key-value document addressed by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataItem {
    pub path: String,
    pub map: DataMap,
    /// Time the item was written, epoch millis.
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataEventKind {
    Changed,
    Deleted,
}

/// Change notification for one data item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataEvent {
    pub kind: DataEventKind,
    pub path: String,
    /// Full snapshot after the change; `None` for deletes.
    pub item: Option<DataItem>,
}

impl DataEvent {
    pub fn changed(item: DataItem) -> Self {
        Self {
            kind: DataEventKind::Changed,
            path: item.path.clone(),
            item: Some(item),
        }
    }

    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            kind: DataEventKind::Deleted,
            path: path.into(),
            item: None,
        }
    }
}

/// An ephemeral message: a path and an optional small payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub path: String,
    pub payload: Vec<u8>,
}

/// Events from the transport to the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportEvent {
    /// A batch of data item changes, in delivery order.
    DataChanged(Vec<DataEvent>),
    /// A single message.
    Message(MessageEvent),
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportEvent::DataChanged(events) => {
                write!(f, "DataChanged {{ events: {} }}", events.len())
            }
            TransportEvent::Message(message) => write!(
                f,
                "Message {{ path: {}, payload_len: {} }}",
                message.path,
                message.payload.len()
            ),
        }
    }
}

pub type EventStream = mpsc::UnboundedReceiver<TransportEvent>;

/// Local failures of the transport. Nothing here says whether the peer
/// received or processed anything.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportError {
    #[error("Channel not connected")]
    NotConnected,

    #[error("Send rejected: {0}")]
    Rejected(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Event stream already taken")]
    AlreadyWatched,

    #[error("Timeout: {0}")]
    Timeout(String),
}

/// The peer channel.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish the channel. Callers bound this with a timeout.
    async fn connect(&self) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;

    /// Best-effort message send. `Ok` only means the local side accepted it.
    async fn send_message(&self, path: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Replace the document at `path` in full.
    async fn put_data_item(&self, path: &str, map: DataMap) -> Result<DataItem, TransportError>;

    async fn delete_data_item(&self, path: &str) -> Result<(), TransportError>;

    /// Store binary content and get a reference that can travel in a data item.
    async fn put_asset(&self, bytes: Vec<u8>) -> Result<AssetRef, TransportError>;

    /// Fetch referenced binary content. Callers bound this with a timeout.
    async fn fetch_asset(&self, asset: &AssetRef) -> Result<Vec<u8>, TransportError>;

    /// Take the inbound event stream. Only one watcher per transport handle.
    fn watch(&self) -> Result<EventStream, TransportError>;
}

/// Current time as epoch millis.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let mut map = DataMap::new();
        map.put_string("message", "hello")
            .put_int("vote_direction", -1)
            .put_bool("is_direct_message", true)
            .put_int_list("action_order", vec![2, 3]);

        assert_eq!(map.string("message").unwrap(), "hello");
        assert_eq!(map.int("vote_direction").unwrap(), -1);
        assert!(map.bool("is_direct_message").unwrap());
        assert_eq!(map.int_list("action_order").unwrap(), &[2, 3]);
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_missing_and_wrong_type() {
        let mut map = DataMap::new();
        map.put_string("vote_direction", "up");

        assert_eq!(
            map.int("fullname"),
            Err(FieldError::Missing("fullname".to_string()))
        );
        assert!(matches!(
            map.int("vote_direction"),
            Err(FieldError::WrongType {
                expected: "int",
                found: "string",
                ..
            })
        ));
    }

    #[test]
    fn test_bool_or_false() {
        let mut map = DataMap::new();
        assert_eq!(map.bool_or_false("is_direct_message"), Ok(false));
        map.put_string("is_direct_message", "yes");
        assert!(map.bool_or_false("is_direct_message").is_err());
    }

    #[test]
    fn test_stamp_sets_timestamp() {
        let mut map = DataMap::new();
        map.stamp();
        assert!(map.long(KEY_TIMESTAMP).unwrap() > 0);
    }

    #[test]
    fn test_event_display() {
        let event = TransportEvent::Message(MessageEvent {
            path: "/vote_result_success".to_string(),
            payload: vec![],
        });
        assert_eq!(
            event.to_string(),
            "Message { path: /vote_result_success, payload_len: 0 }"
        );
    }
}
