// WearSync Core: handheld/wearable sync protocol
//
// Two devices, one weak channel: fire-and-forget messages and
// replace-whole-document data items. Requests go out on a path, results come
// back on `<path>_result_success` or `<path>_result_failed`.

pub mod api;
pub mod correlator;
pub mod dispatcher;
pub mod node;
pub mod notification;
pub mod protocol;
pub mod resolver;
pub mod router;
pub mod settings;
pub mod transport;

use thiserror::Error;

pub use api::{ApiError, ApiRequest, ContentService, FixtureApi, MemoryTokenStore, RemoteApi, TokenStore};
pub use correlator::{Correlation, CorrelationError, ReplyCorrelator};
pub use dispatcher::{ActionDispatcher, ActionError, DiagnosticLog, DispatchStats, LaunchError, Launcher};
pub use node::{HandheldNode, WearableNode};
pub use notification::{
    ActionKind, ActionModel, CacheError, NotificationError, NotificationId, NotificationSink,
    RenderedNotification, Selection,
};
pub use protocol::{ActionRequest, Outcome, Path, RequestPath};
pub use resolver::{resolve, DecodeError, ResponseShape, TypeTag};
pub use router::{PathHandler, PathRouter, RouteError};
pub use settings::{SettingsError, SyncSettings};
pub use transport::{DataMap, LoopbackTransport, Transport, TransportError};

// ============================================================================
// ERROR TYPES
// ============================================================================

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Routing error: {0}")]
    Route(#[from] RouteError),
    #[error("Action error: {0}")]
    Action(#[from] ActionError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("Correlation error: {0}")]
    Correlation(#[from] CorrelationError),
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
