//! In-memory paired transport.
//!
//! Two handles share one document store and one asset store, the way both
//! devices see the same replicated data layer. Each handle delivers to the
//! other's event stream.

use super::abstraction::{
    now_millis, AssetRef, DataEvent, DataItem, DataMap, EventStream, MessageEvent, Transport,
    TransportError, TransportEvent,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

#[derive(Default)]
struct SharedStore {
    items: Mutex<HashMap<String, DataItem>>,
    assets: RwLock<HashMap<String, Vec<u8>>>,
    link_up: RwLock<bool>,
}

struct Endpoint {
    tx: mpsc::UnboundedSender<TransportEvent>,
    rx: Mutex<Option<EventStream>>,
}

impl Endpoint {
    fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }
}

/// One side of an in-memory device pair.
#[derive(Clone)]
pub struct LoopbackTransport {
    name: Arc<str>,
    store: Arc<SharedStore>,
    local: Arc<Endpoint>,
    peer: Arc<Endpoint>,
    connected: Arc<RwLock<bool>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl LoopbackTransport {
    /// Create two connected-on-demand handles, e.g. handheld and wearable.
    pub fn pair(a: &str, b: &str) -> (LoopbackTransport, LoopbackTransport) {
        let store = Arc::new(SharedStore::default());
        *store.link_up.write() = true;

        let a_end = Endpoint::new();
        let b_end = Endpoint::new();

        let first = LoopbackTransport {
            name: Arc::from(a),
            store: store.clone(),
            local: a_end.clone(),
            peer: b_end.clone(),
            connected: Arc::new(RwLock::new(false)),
            sent: Arc::new(Mutex::new(Vec::new())),
        };
        let second = LoopbackTransport {
            name: Arc::from(b),
            store,
            local: b_end,
            peer: a_end,
            connected: Arc::new(RwLock::new(false)),
            sent: Arc::new(Mutex::new(Vec::new())),
        };
        (first, second)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drop the local connection; subsequent sends fail locally.
    pub fn disconnect(&self) {
        *self.connected.write() = false;
    }

    /// When the link is down, sends are accepted locally but never arrive.
    pub fn set_link_up(&self, up: bool) {
        *self.store.link_up.write() = up;
    }

    /// Deliver an event to this handle's own watcher as if it came from the peer.
    pub fn inject(&self, event: TransportEvent) {
        let _ = self.local.tx.send(event);
    }

    /// Paths this handle has sent messages or data items on, in order.
    pub fn sent_paths(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Current document at `path`, if any.
    pub fn data_item(&self, path: &str) -> Option<DataItem> {
        self.store.items.lock().get(path).cloned()
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if *self.connected.read() {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }

    fn deliver(&self, event: TransportEvent) {
        if !*self.store.link_up.read() {
            debug!("[{}] link down, dropping {}", self.name, event);
            return;
        }
        // The peer may have stopped watching; that is indistinguishable from a drop.
        if self.peer.tx.send(event).is_err() {
            trace!("[{}] peer receiver gone", self.name);
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        *self.connected.write() = true;
        debug!("[{}] connected", self.name);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.connected.read()
    }

    async fn send_message(&self, path: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.sent.lock().push(path.to_string());
        self.deliver(TransportEvent::Message(MessageEvent {
            path: path.to_string(),
            payload: payload.to_vec(),
        }));
        Ok(())
    }

    async fn put_data_item(&self, path: &str, map: DataMap) -> Result<DataItem, TransportError> {
        self.ensure_connected()?;
        self.sent.lock().push(path.to_string());

        let item = {
            let mut items = self.store.items.lock();
            if let Some(existing) = items.get(path) {
                if existing.map == map {
                    debug!("[{}] unchanged put on {}, no event", self.name, path);
                    return Ok(existing.clone());
                }
            }
            let item = DataItem {
                path: path.to_string(),
                map,
                timestamp_ms: now_millis(),
            };
            items.insert(path.to_string(), item.clone());
            item
        };

        self.deliver(TransportEvent::DataChanged(vec![DataEvent::changed(
            item.clone(),
        )]));
        Ok(item)
    }

    async fn delete_data_item(&self, path: &str) -> Result<(), TransportError> {
        self.ensure_connected()?;
        let removed = self.store.items.lock().remove(path).is_some();
        if removed {
            self.deliver(TransportEvent::DataChanged(vec![DataEvent::deleted(path)]));
        }
        Ok(())
    }

    async fn put_asset(&self, bytes: Vec<u8>) -> Result<AssetRef, TransportError> {
        self.ensure_connected()?;
        let digest = uuid::Uuid::new_v4().to_string();
        self.store.assets.write().insert(digest.clone(), bytes);
        Ok(AssetRef { digest })
    }

    async fn fetch_asset(&self, asset: &AssetRef) -> Result<Vec<u8>, TransportError> {
        self.ensure_connected()?;
        self.store
            .assets
            .read()
            .get(&asset.digest)
            .cloned()
            .ok_or_else(|| TransportError::AssetNotFound(asset.digest.clone()))
    }

    fn watch(&self) -> Result<EventStream, TransportError> {
        self.local
            .rx
            .lock()
            .take()
            .ok_or(TransportError::AlreadyWatched)
    }
}
