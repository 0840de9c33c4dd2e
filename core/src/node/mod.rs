// Peer roles: the handheld executes requests, the wearable issues them.

pub mod handheld;
pub mod wearable;

pub use handheld::HandheldNode;
pub use wearable::{reply_toast, WearableNode};

use crate::router::{PathRouter, RouteErrorSink};
use crate::transport::{connect_with_timeout, Transport};
use crate::SyncError;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Connect (bounded), take the event stream and spawn the listener loop.
pub(crate) async fn start_listener(
    transport: &Arc<dyn Transport>,
    router: &Arc<PathRouter>,
    sink: Option<Arc<dyn RouteErrorSink>>,
    connect_timeout: Duration,
) -> Result<JoinHandle<()>, SyncError> {
    connect_with_timeout(transport.as_ref(), connect_timeout).await?;
    let events = transport.watch()?;
    info!("Listener connected");
    Ok(tokio::spawn(router.clone().run(events, sink)))
}
