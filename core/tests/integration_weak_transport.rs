// Integration test: behaviour when the channel does not cooperate
//
// Dropped links, late and duplicate replies, local send failures and a
// transport that never connects.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wearsync_core::api::{ApiRoute, Comment, FixtureApi, MemoryTokenStore};
use wearsync_core::dispatcher::{LaunchError, Launcher};
use wearsync_core::node::wearable::NO_RESPONSE_TOAST;
use wearsync_core::notification::{
    ActionKind, NotificationId, NotificationSink, NotificationState, RenderedNotification,
};
use wearsync_core::protocol::RequestPath;
use wearsync_core::transport::{
    AssetRef, DataItem, DataMap, EventStream, LoopbackTransport, MessageEvent, Transport,
    TransportError, TransportEvent,
};
use wearsync_core::{HandheldNode, SyncError, SyncSettings, WearableNode};

const TOKEN: &str = r#"{"access_token":"tok","token_type":"bearer","expires_in":3600}"#;
const LATEST: &str = r#"{"kind":"Listing","data":{"children":[
    {"kind":"t3","data":{"id":"abc","name":"t3_abc","title":"Only post","permalink":"/r/rust/comments/abc/"}}
]}}"#;
const EMPTY: &str = r#"{"kind":"Listing","data":{"children":[]}}"#;

#[derive(Default)]
struct ToastSink {
    shown: Mutex<Vec<NotificationId>>,
    toasts: Mutex<Vec<String>>,
}

impl NotificationSink for ToastSink {
    fn show(&self, notification: &RenderedNotification) {
        self.shown.lock().push(notification.id);
    }

    fn cancel(&self, _id: NotificationId) {}

    fn toast(&self, message: &str) {
        self.toasts.lock().push(message.to_string());
    }

    fn show_comments(&self, _comments: &[Comment]) {}
}

struct NoopLauncher;

impl Launcher for NoopLauncher {
    fn open_url(&self, _url: &str) -> Result<(), LaunchError> {
        Ok(())
    }

    fn save_to_service(&self, _url: &str) -> Result<(), LaunchError> {
        Ok(())
    }
}

struct Pair {
    handheld: HandheldNode,
    wearable: WearableNode,
    sink: Arc<ToastSink>,
    handheld_transport: LoopbackTransport,
    wearable_transport: LoopbackTransport,
    _cache: TempDir,
}

fn settings(cache: &TempDir) -> SyncSettings {
    SyncSettings {
        image_cache_dir: cache.path().to_path_buf(),
        reply_timeout_secs: 1,
        include_direct_messages: false,
        ..SyncSettings::default()
    }
}

async fn start_pair() -> Pair {
    let cache = TempDir::new().unwrap();
    let settings = settings(&cache);

    let api = FixtureApi::new();
    api.respond(ApiRoute::AccessToken, TOKEN)
        .respond(ApiRoute::LatestPosts, LATEST);

    let (handheld_transport, wearable_transport) = LoopbackTransport::pair("handheld", "wearable");
    let sink = Arc::new(ToastSink::default());
    let handheld = HandheldNode::new(
        Arc::new(handheld_transport.clone()),
        Arc::new(api),
        Arc::new(MemoryTokenStore::new()),
        Arc::new(NoopLauncher),
        settings.clone(),
    );
    let wearable = WearableNode::new(Arc::new(wearable_transport.clone()), sink.clone(), settings);
    handheld.start().await.unwrap();
    wearable.start().await.unwrap();

    wearable.refresh().await.unwrap();
    let delivered = tokio::time::timeout(Duration::from_secs(5), async {
        while sink.shown.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(delivered.is_ok(), "posts never arrived");

    Pair {
        handheld,
        wearable,
        sink,
        handheld_transport,
        wearable_transport,
        _cache: cache,
    }
}

fn reply(path: &str) -> TransportEvent {
    TransportEvent::Message(MessageEvent {
        path: path.to_string(),
        payload: vec![],
    })
}

#[tokio::test]
async fn test_link_down_times_out_and_ignores_late_reply() {
    let pair = start_pair().await;
    let id = pair.sink.shown.lock()[0];

    pair.wearable_transport.set_link_up(false);
    let waiting = pair
        .wearable
        .select(id, ActionKind::Upvote, None)
        .await
        .unwrap();
    assert!(matches!(
        waiting,
        wearsync_core::notification::Selection::Request { .. }
    ));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(*pair.sink.toasts.lock(), vec!["Vote", NO_RESPONSE_TOAST]);
    assert_eq!(
        pair.wearable.model().state(id),
        Some(NotificationState::Failed(ActionKind::Upvote))
    );
    assert!(!pair.wearable.correlator().is_pending(RequestPath::Vote));

    // The phone answers after all; nothing more is shown.
    pair.wearable_transport.set_link_up(true);
    pair.wearable_transport.inject(reply("/vote_result_success"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(pair.sink.toasts.lock().len(), 2);
}

#[tokio::test]
async fn test_duplicate_replies_show_one_toast() {
    let pair = start_pair().await;
    let id = pair.sink.shown.lock()[0];

    pair.wearable
        .select(id, ActionKind::Downvote, None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(*pair.sink.toasts.lock(), vec!["Vote", "Vote succeeded"]);

    pair.wearable_transport.inject(reply("/vote_result_success"));
    pair.wearable_transport.inject(reply("/vote_result_failed"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(pair.sink.toasts.lock().len(), 2);
    assert_eq!(
        pair.wearable.model().state(id),
        Some(NotificationState::Succeeded(ActionKind::Downvote))
    );
}

#[tokio::test]
async fn test_reply_lost_when_handheld_disconnects() {
    let pair = start_pair().await;
    let id = pair.sink.shown.lock()[0];

    pair.handheld_transport.disconnect();
    pair.wearable
        .select(id, ActionKind::Upvote, None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let stats = pair.handheld.dispatch_stats();
    assert_eq!(stats.unsent_replies, 1);
    assert!(pair.sink.toasts.lock().contains(&NO_RESPONSE_TOAST.to_string()));
}

#[tokio::test]
async fn test_no_new_posts_toast() {
    let cache = TempDir::new().unwrap();
    let api = FixtureApi::new();
    api.respond(ApiRoute::AccessToken, TOKEN)
        .respond(ApiRoute::LatestPosts, EMPTY);

    let (handheld_transport, wearable_transport) = LoopbackTransport::pair("handheld", "wearable");
    let sink = Arc::new(ToastSink::default());
    let handheld = HandheldNode::new(
        Arc::new(handheld_transport),
        Arc::new(api),
        Arc::new(MemoryTokenStore::new()),
        Arc::new(NoopLauncher),
        settings(&cache),
    );
    let wearable = WearableNode::new(Arc::new(wearable_transport), sink.clone(), settings(&cache));
    handheld.start().await.unwrap();
    wearable.start().await.unwrap();

    wearable.refresh().await.unwrap().await.unwrap();
    assert_eq!(*sink.toasts.lock(), vec!["No new posts"]);
}

#[tokio::test]
async fn test_send_before_connect_fails_locally() {
    let cache = TempDir::new().unwrap();
    let (_handheld, wearable_transport) = LoopbackTransport::pair("handheld", "wearable");
    let wearable = WearableNode::new(
        Arc::new(wearable_transport),
        Arc::new(ToastSink::default()),
        settings(&cache),
    );

    let result = wearable.refresh().await;
    assert!(matches!(
        result,
        Err(SyncError::Transport(TransportError::NotConnected))
    ));
    assert!(!wearable.correlator().is_pending(RequestPath::Refresh));
}

#[tokio::test]
async fn test_unsent_selection_releases_notification() {
    let pair = start_pair().await;
    let id = pair.sink.shown.lock()[0];

    pair.wearable_transport.disconnect();
    let result = pair.wearable.select(id, ActionKind::Upvote, None).await;
    assert!(matches!(
        result,
        Err(SyncError::Transport(TransportError::NotConnected))
    ));
    assert_eq!(
        pair.wearable.model().state(id),
        Some(NotificationState::Failed(ActionKind::Upvote))
    );
    assert!(!pair.wearable.correlator().is_pending(RequestPath::Vote));
    assert!(pair.sink.toasts.lock().is_empty());

    // Once the channel is back the same notification can act again.
    pair.wearable_transport.connect().await.unwrap();
    pair.wearable
        .select(id, ActionKind::Upvote, None)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        pair.wearable.model().state(id),
        Some(NotificationState::Succeeded(ActionKind::Upvote))
    );
    assert_eq!(*pair.sink.toasts.lock(), vec!["Vote", "Vote succeeded"]);
}

/// A channel that never finishes connecting.
struct StalledTransport;

#[async_trait]
impl Transport for StalledTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        futures::future::pending::<()>().await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        false
    }

    async fn send_message(&self, _path: &str, _payload: &[u8]) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }

    async fn put_data_item(&self, _path: &str, _map: DataMap) -> Result<DataItem, TransportError> {
        Err(TransportError::NotConnected)
    }

    async fn delete_data_item(&self, _path: &str) -> Result<(), TransportError> {
        Err(TransportError::NotConnected)
    }

    async fn put_asset(&self, _bytes: Vec<u8>) -> Result<AssetRef, TransportError> {
        Err(TransportError::NotConnected)
    }

    async fn fetch_asset(&self, _asset: &AssetRef) -> Result<Vec<u8>, TransportError> {
        Err(TransportError::NotConnected)
    }

    fn watch(&self) -> Result<EventStream, TransportError> {
        Err(TransportError::NotConnected)
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_bounded() {
    let cache = TempDir::new().unwrap();
    let wearable = WearableNode::new(
        Arc::new(StalledTransport),
        Arc::new(ToastSink::default()),
        SyncSettings {
            connect_timeout_secs: 30,
            ..settings(&cache)
        },
    );

    let result = wearable.start().await;
    assert!(matches!(
        result,
        Err(SyncError::Transport(TransportError::Timeout(_)))
    ));
}
