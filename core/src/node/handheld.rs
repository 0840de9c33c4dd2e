//! Handheld peer
//!
//! Listens on every request path and on `/logging`, runs requests through
//! the [`ActionDispatcher`] and keeps the wearable's remote log. Decode
//! failures found while running requests stay on the handheld, see
//! [`HandheldNode::diagnostics`].

use super::start_listener;
use crate::api::{ContentService, RemoteApi, TokenStore};
use crate::dispatcher::{ActionDispatcher, DiagnosticLog, DispatchStats, Launcher};
use crate::protocol::{keys, Path, RequestPath};
use crate::router::{PathHandler, PathRouter, RouteError};
use crate::settings::SyncSettings;
use crate::transport::{DataItem, Transport};
use crate::SyncError;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Keeps the most recent lines the wearable logged to `/logging`.
#[derive(Default)]
pub struct RemoteLogReceiver {
    log: DiagnosticLog,
}

impl RemoteLogReceiver {
    pub fn lines(&self) -> Vec<String> {
        self.log.lines()
    }
}

impl PathHandler for RemoteLogReceiver {
    fn on_data_changed(&self, path: Path, item: &DataItem) -> Result<(), RouteError> {
        let line = item
            .map
            .string(keys::MESSAGE)
            .map_err(|e| RouteError::malformed(path, e))?;
        info!("[wearable] {}", line);
        self.log.record(line);
        Ok(())
    }
}

pub struct HandheldNode {
    transport: Arc<dyn Transport>,
    router: Arc<PathRouter>,
    dispatcher: Arc<ActionDispatcher>,
    remote_log: Arc<RemoteLogReceiver>,
    settings: SyncSettings,
}

impl HandheldNode {
    pub fn new(
        transport: Arc<dyn Transport>,
        api: Arc<dyn RemoteApi>,
        tokens: Arc<dyn TokenStore>,
        launcher: Arc<dyn Launcher>,
        settings: SyncSettings,
    ) -> Self {
        let dispatcher = Arc::new(ActionDispatcher::new(
            transport.clone(),
            ContentService::new(api, tokens),
            launcher,
            settings.clone(),
        ));
        let remote_log = Arc::new(RemoteLogReceiver::default());

        let router = Arc::new(PathRouter::new("handheld"));
        for path in RequestPath::ALL {
            router.register(path, dispatcher.clone());
        }
        router.register(Path::Logging, remote_log.clone());

        Self {
            transport,
            router,
            dispatcher,
            remote_log,
            settings,
        }
    }

    /// Connect and start listening. The returned task ends when the transport closes the stream.
    pub async fn start(&self) -> Result<JoinHandle<()>, SyncError> {
        start_listener(
            &self.transport,
            &self.router,
            None,
            self.settings.connect_timeout(),
        )
        .await
    }

    pub fn router(&self) -> &Arc<PathRouter> {
        &self.router
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    pub fn remote_log(&self) -> Vec<String> {
        self.remote_log.lines()
    }

    /// Decode failures the dispatcher hit, newest last.
    pub fn diagnostics(&self) -> Vec<String> {
        self.dispatcher.diagnostics()
    }
}
