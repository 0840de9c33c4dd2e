//! Action dispatcher
//!
//! Runs on the handheld. Each decoded request becomes one remote call and
//! then exactly one reply on `P_result_success` or `P_result_failed`.
//!
//! Requests are queued per request path: one lane worker per path, so
//! requests on the same path complete in arrival order while a slow call on
//! one path never holds up another. The router thread only enqueues.

use crate::api::{ApiError, ContentService, Post, ServiceError};
use crate::notification::encode_action_order;
use crate::protocol::paths::{COMMENTS_CONTENT, NO_NEW_CONTENT, POSTS_CONTENT};
use crate::protocol::{keys, ActionRequest, Path, RequestError, RequestPath, ResultEnvelope};
use crate::resolver::{DecodeError, ResponseShape};
use crate::router::{PathHandler, RouteError};
use crate::settings::SyncSettings;
use crate::transport::{DataItem, DataMap, MessageEvent, Transport, TransportError};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct LaunchError(pub String);

/// Opens things on the handheld.
pub trait Launcher: Send + Sync {
    fn open_url(&self, url: &str) -> Result<(), LaunchError>;
    fn save_to_service(&self, url: &str) -> Result<(), LaunchError>;
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("decode failed for {shape}: {source}")]
    Decode {
        shape: ResponseShape,
        #[source]
        source: DecodeError,
    },

    #[error("remote rejected request: {0}")]
    Remote(String),

    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    #[error("launch failed: {0}")]
    Launch(#[from] LaunchError),

    #[error("content encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("action aborted: {0}")]
    Aborted(String),
}

impl From<ServiceError> for ActionError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Api(e) => ActionError::Api(e),
            ServiceError::Decode { shape, source } => ActionError::Decode { shape, source },
            ServiceError::Remote(summary) => ActionError::Remote(summary),
        }
    }
}

/// Reply counts. An outcome is counted once its reply has been handed to the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub succeeded: u64,
    pub failed: u64,
    /// Replies the transport refused locally, whatever their outcome.
    pub unsent_replies: u64,
}

/// The most recent diagnostic lines; the oldest is dropped once full.
#[derive(Default)]
pub struct DiagnosticLog {
    lines: Mutex<VecDeque<String>>,
}

impl DiagnosticLog {
    pub const CAPACITY: usize = 256;

    pub fn record(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock();
        if lines.len() == Self::CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }
}

enum Job {
    Run(ActionRequest),
    Reject(RequestPath, String),
}

struct Inner {
    transport: Arc<dyn Transport>,
    service: ContentService,
    launcher: Arc<dyn Launcher>,
    settings: SyncSettings,
    stats: Mutex<DispatchStats>,
    diagnostics: DiagnosticLog,
}

pub struct ActionDispatcher {
    inner: Arc<Inner>,
    lanes: Mutex<HashMap<RequestPath, mpsc::UnboundedSender<Job>>>,
}

impl ActionDispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        service: ContentService,
        launcher: Arc<dyn Launcher>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                service,
                launcher,
                settings,
                stats: Mutex::new(DispatchStats::default()),
                diagnostics: DiagnosticLog::default(),
            }),
            lanes: Mutex::new(HashMap::new()),
        }
    }

    /// Queue `request` on its path's lane. Never blocks; must be called inside a runtime.
    pub fn submit(&self, request: ActionRequest) {
        debug!("Queueing {} on {}", request.kind(), request.path());
        self.enqueue(request.path(), Job::Run(request));
    }

    /// Answer a request that could not be decoded with a failure reply.
    pub fn reject(&self, path: RequestPath, reason: impl Into<String>) {
        self.enqueue(path, Job::Reject(path, reason.into()));
    }

    pub fn stats(&self) -> DispatchStats {
        self.inner.stats.lock().clone()
    }

    /// Decode failures seen while running requests.
    pub fn diagnostics(&self) -> Vec<String> {
        self.inner.diagnostics.lines()
    }

    fn enqueue(&self, path: RequestPath, job: Job) {
        let mut lanes = self.lanes.lock();
        let lane = lanes
            .entry(path)
            .or_insert_with(|| Self::spawn_lane(self.inner.clone(), path));
        if let Err(mpsc::error::SendError(job)) = lane.send(job) {
            // Worker gone (runtime shutting down or it panicked); start a fresh one.
            let fresh = Self::spawn_lane(self.inner.clone(), path);
            let _ = fresh.send(job);
            *lane = fresh;
        }
    }

    fn spawn_lane(inner: Arc<Inner>, path: RequestPath) -> mpsc::UnboundedSender<Job> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            debug!("Lane {} started", path);
            while let Some(job) = rx.recv().await {
                let envelope = match job {
                    Job::Run(request) => inner.clone().execute(request).await,
                    Job::Reject(path, reason) => ResultEnvelope::failure(path, reason),
                };
                inner.reply(&envelope).await;
            }
            debug!("Lane {} stopped", path);
        });
        tx
    }
}

impl Inner {
    /// Run one request to completion. Panics in the call are contained here.
    async fn execute(self: Arc<Self>, request: ActionRequest) -> ResultEnvelope {
        let path = request.path();
        let kind = request.kind();
        let worker = self.clone();
        let result = match tokio::spawn(async move { worker.perform(&request).await }).await {
            Ok(result) => result,
            Err(join) => Err(ActionError::Aborted(join.to_string())),
        };

        match result {
            Ok(()) => {
                info!("{} succeeded", kind);
                ResultEnvelope::success(path)
            }
            Err(e) => {
                warn!("{} failed: {}", kind, e);
                if let ActionError::Decode { shape, source } = &e {
                    self.log_diagnostic(format!("{} decode failure ({}): {}", kind, shape, source));
                }
                ResultEnvelope::failure(path, e.to_string())
            }
        }
    }

    async fn perform(&self, request: &ActionRequest) -> Result<(), ActionError> {
        request.validate()?;
        match request {
            ActionRequest::Refresh => self.refresh().await,
            ActionRequest::Vote {
                fullname,
                direction,
            } => {
                self.service.vote(fullname, *direction).await?;
                Ok(())
            }
            ActionRequest::ReplyToPost { fullname, text } => {
                self.service.comment_on_post(text, fullname).await?;
                Ok(())
            }
            ActionRequest::ReplyToDirectMessage {
                to_user,
                subject,
                text,
            } => {
                self.service
                    .reply_to_direct_message(subject, text, to_user)
                    .await?;
                Ok(())
            }
            ActionRequest::FetchComments { permalink } => {
                let comments = self
                    .service
                    .comments(permalink, &self.settings.comment_sort)
                    .await?;
                debug!("Forwarding {} comments", comments.len());
                let mut map = DataMap::new();
                map.put_string(keys::CONTENT, serde_json::to_string(&comments)?);
                map.stamp();
                self.transport.put_data_item(COMMENTS_CONTENT, map).await?;
                Ok(())
            }
            ActionRequest::OpenOnPhone { permalink } => {
                self.launcher.open_url(&self.settings.web_url(permalink))?;
                Ok(())
            }
            ActionRequest::SaveToService { permalink } => {
                self.launcher
                    .save_to_service(&self.settings.web_url(permalink))?;
                Ok(())
            }
        }
    }

    async fn refresh(&self) -> Result<(), ActionError> {
        let settings = &self.settings;
        self.service.ensure_token().await?;

        let mut posts = Vec::new();
        let mut unread = 0;
        if settings.include_direct_messages {
            let messages = self.service.unread_messages().await?;
            unread = messages.len();
            posts.extend(messages);
        }
        posts.extend(
            self.service
                .latest_posts(
                    settings.subreddits.clone(),
                    &settings.listing_sort,
                    settings.post_limit,
                )
                .await?,
        );

        if posts.is_empty() {
            info!("No new posts");
            self.transport.send_message(NO_NEW_CONTENT, &[]).await?;
            return Ok(());
        }

        let mut map = DataMap::new();
        map.put_string(keys::CONTENT, serde_json::to_string(&posts)?)
            .put_int_list(keys::ACTION_ORDER, encode_action_order(&settings.action_order))
            .put_bool(keys::DISMISS_AFTER_ACTION, settings.dismiss_after_action);
        self.attach_images(&posts, &mut map).await?;
        map.stamp();

        info!("Sending {} posts", posts.len());
        self.transport.put_data_item(POSTS_CONTENT, map).await?;

        // Messages stay unread until the wearable has them.
        if unread > 0 {
            if let Err(e) = self.service.mark_all_read().await {
                warn!("{} messages delivered but not marked read: {}", unread, e);
            }
        }
        Ok(())
    }

    /// One asset per post that has image bytes, keyed by post id. A missing image is not an error.
    async fn attach_images(&self, posts: &[Post], map: &mut DataMap) -> Result<(), ActionError> {
        for post in posts {
            let Some(url) = post.image_url.as_deref() else {
                continue;
            };
            match self.service.image(url).await {
                Ok(bytes) if !bytes.is_empty() => {
                    let asset = self.transport.put_asset(bytes).await?;
                    map.put_asset(&post.id, asset);
                }
                Ok(_) => debug!("Empty image for {}", post.id),
                Err(e) => debug!("No image for {}: {}", post.id, e),
            }
        }
        Ok(())
    }

    /// Emit the single reply for a request.
    async fn reply(&self, envelope: &ResultEnvelope) {
        let reply_path = envelope.reply_path();
        match self.transport.send_message(reply_path.as_str(), &[]).await {
            Ok(()) => {
                let mut stats = self.stats.lock();
                if envelope.outcome.is_success() {
                    stats.succeeded += 1;
                } else {
                    stats.failed += 1;
                }
            }
            Err(e) => {
                error!("Reply {} not sent: {}", reply_path, e);
                self.stats.lock().unsent_replies += 1;
            }
        }
    }

    fn log_diagnostic(&self, line: String) {
        error!("{}", line);
        self.diagnostics.record(line);
    }
}

impl PathHandler for ActionDispatcher {
    fn on_data_changed(&self, path: Path, item: &DataItem) -> Result<(), RouteError> {
        let Path::Request(request_path) = path else {
            return Ok(());
        };
        match ActionRequest::from_data_map(request_path, &item.map) {
            Ok(request) => {
                self.submit(request);
                Ok(())
            }
            Err(e) => {
                self.reject(request_path, e.to_string());
                Err(RouteError::malformed(path, e))
            }
        }
    }

    fn on_message(&self, path: Path, _message: &MessageEvent) -> Result<(), RouteError> {
        match path {
            Path::Request(RequestPath::Refresh) => {
                self.submit(ActionRequest::Refresh);
                Ok(())
            }
            other => {
                debug!("Message on {} ignored, requests arrive as data items", other);
                Ok(())
            }
        }
    }
}
