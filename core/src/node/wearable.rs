//! Wearable peer
//!
//! Shows delivered posts as notifications, sends the user's selections to
//! the handheld and turns the replies into toasts. Everything that goes
//! wrong here is also forwarded to the handheld as a `/logging` item.

use super::start_listener;
use crate::api::Post;
use crate::correlator::{CorrelationError, Correlation, ReplyCorrelator};
use crate::notification::{
    decode_action_order, ActionKind, ActionModel, ImageCache, NotificationContent,
    NotificationId, NotificationSink, Selection,
};
use crate::protocol::paths::LOGGING;
use crate::protocol::{keys, ActionRequest, ContentPath, Outcome, Path, RequestPath};
use crate::resolver::{resolve, ResponseShape, TypeTag};
use crate::router::{PathHandler, PathRouter, RouteError, RouteErrorSink, RouteFailure};
use crate::settings::SyncSettings;
use crate::transport::{fetch_asset_with_timeout, AssetRef, DataItem, DataMap, MessageEvent, Transport};
use crate::SyncError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const NO_NEW_POSTS_TOAST: &str = "No new posts";
pub const NO_RESPONSE_TOAST: &str = "Phone did not respond";

/// Toast text for a reply, if that reply is worth telling the user about.
pub fn reply_toast(path: RequestPath, outcome: Outcome) -> Option<&'static str> {
    match (path, outcome) {
        (RequestPath::Reply, Outcome::Success) => Some("Reply sent"),
        (RequestPath::Reply, Outcome::Failed) => Some("Reply failed :("),
        (RequestPath::Vote, Outcome::Success) => Some("Vote succeeded"),
        (RequestPath::Vote, Outcome::Failed) => Some("Voting failed"),
        (RequestPath::Comments, Outcome::Failed) => Some("Retrieving comments failed"),
        (RequestPath::SaveToService, Outcome::Success) => Some("Saved to Pocket"),
        (RequestPath::SaveToService, Outcome::Failed) => Some("Saving to Pocket failed :("),
        (RequestPath::OpenOnPhone, Outcome::Failed) => Some("Opening on phone failed"),
        (RequestPath::Refresh, Outcome::Failed) => Some("Refreshing failed"),
        _ => None,
    }
}

/// Sends wearable-side failures to the handheld's `/logging` path.
#[derive(Clone)]
pub struct RemoteLog {
    transport: Arc<dyn Transport>,
}

impl RemoteLog {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn send(&self, line: &str) {
        let mut map = DataMap::new();
        map.put_string(keys::MESSAGE, line);
        map.stamp();
        if let Err(e) = self.transport.put_data_item(LOGGING, map).await {
            debug!("Remote log dropped: {}", e);
        }
    }
}

impl RouteErrorSink for RemoteLog {
    fn report(&self, failure: &RouteFailure) {
        let log = self.clone();
        let line = format!("{}: {}", failure.path, failure.error);
        tokio::spawn(async move { log.send(&line).await });
    }
}

struct Shared {
    transport: Arc<dyn Transport>,
    model: ActionModel,
    correlator: ReplyCorrelator,
    sink: Arc<dyn NotificationSink>,
    cache: ImageCache,
    remote_log: RemoteLog,
    settings: SyncSettings,
}

impl Shared {
    async fn present(self: Arc<Self>, batch: PostBatch) {
        info!("Presenting {} posts", batch.posts.len());
        for post in batch.posts {
            let id = self.model.next_id();
            let image = match batch.assets.get(&post.id) {
                Some(asset) => self.cache_image(id, &post, asset).await,
                None => None,
            };
            let content = NotificationContent {
                id,
                post,
                image,
                dismiss_after_action: batch.dismiss_after_action,
            };
            let rendered = self.model.deliver(content, &batch.order);
            self.sink.show(&rendered);
        }
    }

    async fn cache_image(
        &self,
        id: NotificationId,
        post: &Post,
        asset: &AssetRef,
    ) -> Option<std::path::PathBuf> {
        let bytes = match fetch_asset_with_timeout(
            self.transport.as_ref(),
            asset,
            self.settings.asset_timeout(),
        )
        .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Image for {} unavailable: {}", post.id, e);
                return None;
            }
        };
        match self.cache.store(id, &bytes).await {
            Ok(path) => Some(path),
            Err(e) => {
                self.remote_log
                    .send(&format!("Error writing local cache: {}", e))
                    .await;
                None
            }
        }
    }

    fn on_reply(&self, path: RequestPath, outcome: Outcome) {
        match self.correlator.complete(path, outcome) {
            Correlation::Delivered { elapsed } => {
                debug!("{} answered in {:?}", path, elapsed);
                self.model.complete(path, outcome);
                if let Some(text) = reply_toast(path, outcome) {
                    self.sink.toast(text);
                }
            }
            Correlation::Unmatched => {}
        }
    }
}

struct PostBatch {
    posts: Vec<Post>,
    order: Vec<ActionKind>,
    dismiss_after_action: bool,
    assets: HashMap<String, AssetRef>,
}

struct ContentHandler(Arc<Shared>);

impl ContentHandler {
    fn decode_posts(&self, path: Path, map: &DataMap) -> Result<PostBatch, RouteError> {
        let raw = map
            .string(keys::CONTENT)
            .map_err(|e| RouteError::malformed(path, e))?;
        let posts = resolve(raw.as_bytes(), ResponseShape::SequenceOf(TypeTag::Post))
            .and_then(|resolved| resolved.into_posts())
            .map_err(|e| RouteError::malformed(path, e))?;
        let order = match map.int_list(keys::ACTION_ORDER) {
            Ok(raw) => decode_action_order(raw),
            Err(_) => self.0.settings.action_order.clone(),
        };
        let dismiss_after_action = map
            .bool_or_false(keys::DISMISS_AFTER_ACTION)
            .map_err(|e| RouteError::malformed(path, e))?;
        let assets = posts
            .iter()
            .filter_map(|post| {
                map.asset(&post.id)
                    .ok()
                    .map(|asset| (post.id.clone(), asset.clone()))
            })
            .collect();

        Ok(PostBatch {
            posts,
            order,
            dismiss_after_action,
            assets,
        })
    }
}

impl PathHandler for ContentHandler {
    fn on_data_changed(&self, path: Path, item: &DataItem) -> Result<(), RouteError> {
        match path {
            Path::Content(ContentPath::Posts) => {
                let batch = self.decode_posts(path, &item.map)?;
                // Asset fetches block, so presentation runs off the listener.
                tokio::spawn(self.0.clone().present(batch));
                Ok(())
            }
            Path::Content(ContentPath::Comments) => {
                let raw = item
                    .map
                    .string(keys::CONTENT)
                    .map_err(|e| RouteError::malformed(path, e))?;
                if raw.is_empty() {
                    return Ok(());
                }
                let comments = resolve(raw.as_bytes(), ResponseShape::SequenceOf(TypeTag::Comment))
                    .and_then(|resolved| resolved.into_comments())
                    .map_err(|e| RouteError::malformed(path, e))?;
                info!("Comments received: {}", comments.len());
                self.0.sink.show_comments(&comments);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

struct ReplyHandler(Arc<Shared>);

impl PathHandler for ReplyHandler {
    fn on_message(&self, path: Path, _message: &MessageEvent) -> Result<(), RouteError> {
        match path {
            Path::Result(request, outcome) => self.0.on_reply(request, outcome),
            Path::NoNewContent => self.0.sink.toast(NO_NEW_POSTS_TOAST),
            _ => {}
        }
        Ok(())
    }
}

pub struct WearableNode {
    shared: Arc<Shared>,
    router: Arc<PathRouter>,
}

impl WearableNode {
    pub fn new(
        transport: Arc<dyn Transport>,
        sink: Arc<dyn NotificationSink>,
        settings: SyncSettings,
    ) -> Self {
        let shared = Arc::new(Shared {
            remote_log: RemoteLog::new(transport.clone()),
            cache: ImageCache::new(settings.image_cache_dir.clone()),
            transport,
            model: ActionModel::new(),
            correlator: ReplyCorrelator::new(),
            sink,
            settings,
        });

        let router = Arc::new(PathRouter::new("wearable"));
        let content = Arc::new(ContentHandler(shared.clone()));
        router.register(ContentPath::Posts, content.clone());
        router.register(ContentPath::Comments, content);

        let replies = Arc::new(ReplyHandler(shared.clone()));
        for path in Path::all().into_iter().filter(Path::is_reply) {
            router.register(path, replies.clone());
        }
        router.register(Path::NoNewContent, replies);

        Self { shared, router }
    }

    /// Connect and start listening. Routing failures go to the handheld's log.
    pub async fn start(&self) -> Result<JoinHandle<()>, SyncError> {
        let sink: Arc<dyn RouteErrorSink> = Arc::new(self.shared.remote_log.clone());
        start_listener(
            &self.shared.transport,
            &self.router,
            Some(sink),
            self.shared.settings.connect_timeout(),
        )
        .await
    }

    pub fn router(&self) -> &Arc<PathRouter> {
        &self.router
    }

    pub fn model(&self) -> &ActionModel {
        &self.shared.model
    }

    pub fn correlator(&self) -> &ReplyCorrelator {
        &self.shared.correlator
    }

    /// Ask the handheld for new posts.
    pub async fn refresh(&self) -> Result<JoinHandle<()>, SyncError> {
        self.issue(ActionRequest::Refresh).await
    }

    /// Act on the user's choice for a notification.
    pub async fn select(
        &self,
        id: NotificationId,
        kind: ActionKind,
        reply_text: Option<&str>,
    ) -> Result<Selection, SyncError> {
        let selection = self.shared.model.select(id, kind, reply_text)?;
        if let Selection::Request {
            request,
            confirmation,
            dismiss,
        } = &selection
        {
            if let Err(e) = self.issue(request.clone()).await {
                // Nothing will answer; release the path so the next selection starts clean.
                warn!("{} not sent: {}", request.kind(), e);
                self.shared.model.complete(request.path(), Outcome::Failed);
                return Err(e);
            }
            self.shared.sink.toast(confirmation);
            if *dismiss {
                self.dismiss(id).await;
            }
        }
        Ok(selection)
    }

    /// Remove a notification and its cached image. Replies still pending
    /// for it are no longer shown; the requests themselves keep running.
    pub async fn dismiss(&self, id: NotificationId) {
        let Some(dismissal) = self.shared.model.dismiss(id) else {
            return;
        };
        for path in &dismissal.abandoned {
            self.shared.correlator.dismiss(*path);
        }
        self.shared.sink.cancel(id);
        if dismissal.content.image.is_some() {
            if let Err(e) = self.shared.cache.release(id).await {
                self.shared
                    .remote_log
                    .send(&format!("Failed to delete cached image: {}", e))
                    .await;
            }
        }
    }

    /// Send `request` and start its bounded wait. The returned task finishes
    /// when the reply arrives or the wait expires.
    async fn issue(&self, request: ActionRequest) -> Result<JoinHandle<()>, SyncError> {
        let path = request.path();
        let waiter = self.shared.correlator.begin(path);

        let sent = if request.is_message() {
            self.shared
                .transport
                .send_message(path.as_str(), &[])
                .await
        } else {
            self.shared
                .transport
                .put_data_item(path.as_str(), request.to_data_map())
                .await
                .map(|_| ())
        };
        if let Err(e) = sent {
            self.shared.correlator.dismiss(path);
            return Err(e.into());
        }
        debug!("{} sent", request.kind());

        let shared = self.shared.clone();
        let timeout = shared.settings.reply_timeout();
        Ok(tokio::spawn(async move {
            match shared.correlator.wait(waiter, timeout).await {
                Ok(_) | Err(CorrelationError::Superseded) => {}
                Err(CorrelationError::TimedOut(_)) => {
                    shared.model.complete(path, Outcome::Failed);
                    shared.sink.toast(NO_RESPONSE_TOAST);
                }
            }
        }))
    }
}
