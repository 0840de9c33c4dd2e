// Transport module: peer channel adapter and the in-memory pair

pub mod abstraction;
pub mod loopback;

pub use abstraction::{
    now_millis, AssetRef, DataEvent, DataEventKind, DataItem, DataMap, DataValue, EventStream,
    FieldError, MessageEvent, Transport, TransportError, TransportEvent, KEY_TIMESTAMP,
};
pub use loopback::LoopbackTransport;

use std::time::Duration;

/// Connect, giving up after `timeout`.
pub async fn connect_with_timeout(
    transport: &dyn Transport,
    timeout: Duration,
) -> Result<(), TransportError> {
    if transport.is_connected() {
        return Ok(());
    }
    tokio::time::timeout(timeout, transport.connect())
        .await
        .map_err(|_| TransportError::Timeout(format!("connect after {:?}", timeout)))?
}

/// Fetch an asset, giving up after `timeout`.
pub async fn fetch_asset_with_timeout(
    transport: &dyn Transport,
    asset: &AssetRef,
    timeout: Duration,
) -> Result<Vec<u8>, TransportError> {
    tokio::time::timeout(timeout, transport.fetch_asset(asset))
        .await
        .map_err(|_| TransportError::Timeout(format!("asset {} after {:?}", asset.digest, timeout)))?
}
