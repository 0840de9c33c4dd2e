//! Notification action model
//!
//! Turns delivered posts into notifications with an ordered, capability-gated
//! action set, and turns a user's selection into exactly one request. The
//! model never waits for the outcome: replies arrive later on their reply
//! path and are fed back through [`ActionModel::complete`].
//!
//! Per-notification lifecycle:
//!
//! ```text
//! Delivered -> Dispatching -> Succeeded | Failed
//!      \            \               \
//!       +------------+---------------+--> Dismissed
//! ```

pub mod image_cache;

pub use image_cache::{CacheError, ImageCache};

use crate::api::{Comment, Post};
use crate::protocol::{ActionRequest, Outcome, RequestPath};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use thiserror::Error;
use tracing::{debug, info};

/// Distance between consecutive notification ids.
pub const NOTIFICATION_ID_STEP: i32 = 10;

/// User-facing action kinds, with their wire integers in `action_order`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum ActionKind {
    ViewComments = 0,
    Reply = 1,
    Upvote = 2,
    Downvote = 3,
    SaveToService = 4,
    OpenOnPhone = 5,
    ViewImage = 6,
}

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::ViewComments,
        ActionKind::Reply,
        ActionKind::Upvote,
        ActionKind::Downvote,
        ActionKind::SaveToService,
        ActionKind::OpenOnPhone,
        ActionKind::ViewImage,
    ];

    pub fn from_wire(value: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire() == value)
    }

    pub fn wire(self) -> i32 {
        self as i32
    }

    /// Button label for `post`.
    pub fn label(self, post: &Post) -> String {
        match self {
            ActionKind::ViewComments => "View comments".to_string(),
            ActionKind::Reply => format!("Reply to {}", post.short_title()),
            ActionKind::Upvote => format!("Upvote {}", post.short_title()),
            ActionKind::Downvote => format!("Downvote {}", post.short_title()),
            ActionKind::SaveToService => "Save to Pocket".to_string(),
            ActionKind::OpenOnPhone => "Open on phone".to_string(),
            ActionKind::ViewImage => "View image".to_string(),
        }
    }

    /// Confirmation shown when the request is handed to the transport.
    pub fn confirmation(self) -> &'static str {
        match self {
            ActionKind::ViewComments => "Getting comments",
            ActionKind::Reply => "Sending reply",
            ActionKind::Upvote | ActionKind::Downvote => "Vote",
            ActionKind::SaveToService => "Save to Pocket",
            ActionKind::OpenOnPhone => "Open on phone",
            ActionKind::ViewImage => "View image",
        }
    }
}

impl TryFrom<i32> for ActionKind {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        ActionKind::from_wire(value).ok_or_else(|| format!("unknown action kind {}", value))
    }
}

impl From<ActionKind> for i32 {
    fn from(kind: ActionKind) -> i32 {
        kind.wire()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Decode an `action_order` list, skipping integers this build does not know.
pub fn decode_action_order(raw: &[i32]) -> Vec<ActionKind> {
    raw.iter()
        .filter_map(|value| {
            let kind = ActionKind::from_wire(*value);
            if kind.is_none() {
                debug!("Skipping unknown action kind {}", value);
            }
            kind
        })
        .collect()
}

pub fn encode_action_order(order: &[ActionKind]) -> Vec<i32> {
    order.iter().map(|kind| kind.wire()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NotificationId(pub i32);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-scoped id allocator. Ids restart with the process and are not
/// unique across restarts.
#[derive(Debug)]
pub struct NotificationIds {
    next: AtomicI32,
}

impl NotificationIds {
    pub fn starting_at(first: i32) -> Self {
        Self {
            next: AtomicI32::new(first),
        }
    }

    pub fn allocate(&self) -> NotificationId {
        NotificationId(self.next.fetch_add(NOTIFICATION_ID_STEP, Ordering::Relaxed))
    }
}

impl Default for NotificationIds {
    fn default() -> Self {
        Self::starting_at(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationState {
    Delivered,
    Dispatching(ActionKind),
    Succeeded(ActionKind),
    Failed(ActionKind),
    Dismissed,
}

/// A delivered content item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationContent {
    pub id: NotificationId,
    pub post: Post,
    /// Cached full-size image, if one was stored for this notification.
    pub image: Option<PathBuf>,
    pub dismiss_after_action: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedAction {
    pub kind: ActionKind,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedNotification {
    pub id: NotificationId,
    pub title: String,
    pub body: String,
    pub image: Option<PathBuf>,
    /// Text-only notifications are stacked together.
    pub grouped: bool,
    pub actions: Vec<RenderedAction>,
}

/// The configured order intersected with what `content` supports.
pub fn render_actions(order: &[ActionKind], content: &NotificationContent) -> Vec<RenderedAction> {
    let mut seen = Vec::with_capacity(order.len());
    order
        .iter()
        .copied()
        .filter(|kind| match kind {
            ActionKind::ViewImage => content.image.is_some(),
            _ => true,
        })
        .filter(|kind| {
            if seen.contains(kind) {
                false
            } else {
                seen.push(*kind);
                true
            }
        })
        .map(|kind| RenderedAction {
            kind,
            label: kind.label(&content.post),
        })
        .collect()
}

/// What a selected action turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Send `request` to the handheld; dismiss the notification afterwards if `dismiss`.
    Request {
        request: ActionRequest,
        confirmation: &'static str,
        dismiss: bool,
    },
    /// Handled on the wearable: show the cached image.
    ViewImage(PathBuf),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("no notification with id {0}")]
    Unknown(NotificationId),
    #[error("{kind} is not offered on notification {id}")]
    NotOffered { id: NotificationId, kind: ActionKind },
    #[error("reply text is empty")]
    EmptyReply,
}

/// Local rendering surface on the wearable.
pub trait NotificationSink: Send + Sync {
    fn show(&self, notification: &RenderedNotification);
    fn cancel(&self, id: NotificationId);
    fn toast(&self, message: &str);
    fn show_comments(&self, comments: &[Comment]);
}

struct Entry {
    content: NotificationContent,
    actions: Vec<ActionKind>,
    state: NotificationState,
}

/// Returned by [`ActionModel::dismiss`] so the caller can release resources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dismissal {
    pub content: NotificationContent,
    /// Request paths this notification was still waiting on.
    pub abandoned: Vec<RequestPath>,
}

#[derive(Default)]
pub struct ActionModel {
    ids: NotificationIds,
    entries: RwLock<HashMap<NotificationId, Entry>>,
    in_flight: Mutex<HashMap<RequestPath, NotificationId>>,
}

impl ActionModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_first_id(first: i32) -> Self {
        Self {
            ids: NotificationIds::starting_at(first),
            ..Self::default()
        }
    }

    pub fn next_id(&self) -> NotificationId {
        self.ids.allocate()
    }

    /// Register a delivered item and render it.
    pub fn deliver(&self, content: NotificationContent, order: &[ActionKind]) -> RenderedNotification {
        let actions = render_actions(order, &content);
        let rendered = RenderedNotification {
            id: content.id,
            title: content.post.title.clone(),
            body: content.post.post_contents.clone(),
            image: content.image.clone(),
            grouped: content.image.is_none(),
            actions: actions.clone(),
        };
        debug!(
            "Notification {} delivered with {} actions",
            content.id,
            actions.len()
        );
        self.entries.write().insert(
            content.id,
            Entry {
                content,
                actions: actions.iter().map(|a| a.kind).collect(),
                state: NotificationState::Delivered,
            },
        );
        rendered
    }

    /// Turn a user's choice into a request. `reply_text` is only read for [`ActionKind::Reply`].
    pub fn select(
        &self,
        id: NotificationId,
        kind: ActionKind,
        reply_text: Option<&str>,
    ) -> Result<Selection, NotificationError> {
        let mut entries = self.entries.write();
        let entry = entries.get_mut(&id).ok_or(NotificationError::Unknown(id))?;
        if !entry.actions.contains(&kind) {
            return Err(NotificationError::NotOffered { id, kind });
        }

        let post = &entry.content.post;
        let request = match kind {
            ActionKind::ViewImage => {
                return entry
                    .content
                    .image
                    .clone()
                    .map(Selection::ViewImage)
                    .ok_or(NotificationError::NotOffered { id, kind });
            }
            ActionKind::ViewComments => ActionRequest::FetchComments {
                permalink: post.permalink.clone(),
            },
            ActionKind::Reply => {
                let text = reply_text.map(str::trim).unwrap_or_default();
                if text.is_empty() {
                    return Err(NotificationError::EmptyReply);
                }
                if post.is_direct_message {
                    ActionRequest::ReplyToDirectMessage {
                        to_user: post.author.clone(),
                        subject: post.post_contents.clone(),
                        text: text.to_string(),
                    }
                } else {
                    ActionRequest::ReplyToPost {
                        fullname: post.fullname.clone(),
                        text: text.to_string(),
                    }
                }
            }
            ActionKind::Upvote | ActionKind::Downvote => ActionRequest::Vote {
                fullname: post.fullname.clone(),
                direction: if kind == ActionKind::Upvote { 1 } else { -1 },
            },
            ActionKind::SaveToService => ActionRequest::SaveToService {
                permalink: post.permalink.clone(),
            },
            ActionKind::OpenOnPhone => ActionRequest::OpenOnPhone {
                permalink: post.permalink.clone(),
            },
        };

        let dismiss = kind == ActionKind::OpenOnPhone && entry.content.dismiss_after_action;
        entry.state = NotificationState::Dispatching(kind);
        self.in_flight.lock().insert(request.path(), id);
        info!("Notification {} selected {}", id, request.kind());

        Ok(Selection::Request {
            request,
            confirmation: kind.confirmation(),
            dismiss,
        })
    }

    /// Record the outcome of the request last issued on `path`.
    pub fn complete(&self, path: RequestPath, outcome: Outcome) -> Option<NotificationId> {
        let id = self.in_flight.lock().remove(&path)?;
        let mut entries = self.entries.write();
        let entry = entries.get_mut(&id)?;
        if let NotificationState::Dispatching(kind) = entry.state {
            entry.state = match outcome {
                Outcome::Success => NotificationState::Succeeded(kind),
                Outcome::Failed => NotificationState::Failed(kind),
            };
        }
        Some(id)
    }

    /// Terminal: forget the notification. Returns `None` if it was already gone.
    pub fn dismiss(&self, id: NotificationId) -> Option<Dismissal> {
        let mut entry = self.entries.write().remove(&id)?;
        entry.state = NotificationState::Dismissed;

        let mut in_flight = self.in_flight.lock();
        let abandoned: Vec<RequestPath> = in_flight
            .iter()
            .filter(|(_, owner)| **owner == id)
            .map(|(path, _)| *path)
            .collect();
        for path in &abandoned {
            in_flight.remove(path);
        }
        debug!("Notification {} dismissed", id);

        Some(Dismissal {
            content: entry.content,
            abandoned,
        })
    }

    /// Current state; dismissed notifications are forgotten and read as `None`.
    pub fn state(&self, id: NotificationId) -> Option<NotificationState> {
        self.entries.read().get(&id).map(|e| e.state)
    }

    pub fn content(&self, id: NotificationId) -> Option<NotificationContent> {
        self.entries.read().get(&id).map(|e| e.content.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(is_direct_message: bool) -> Post {
        Post {
            id: "abc".to_string(),
            fullname: "t3_abc".to_string(),
            title: "A rather long post title".to_string(),
            post_contents: "body".to_string(),
            subreddit: "rust".to_string(),
            author: "someone".to_string(),
            permalink: "/r/rust/comments/abc/".to_string(),
            url: None,
            image_url: None,
            score: 1,
            created_utc: 0,
            is_direct_message,
        }
    }

    fn content(model: &ActionModel, image: Option<PathBuf>) -> NotificationContent {
        NotificationContent {
            id: model.next_id(),
            post: post(false),
            image,
            dismiss_after_action: true,
        }
    }

    #[test]
    fn test_ids_step_by_ten() {
        let ids = NotificationIds::starting_at(1);
        assert_eq!(ids.allocate(), NotificationId(1));
        assert_eq!(ids.allocate(), NotificationId(11));
        assert_eq!(ids.allocate(), NotificationId(21));
    }

    #[test]
    fn test_action_order_skips_unknown() {
        assert_eq!(
            decode_action_order(&[5, 42, 2, -1]),
            vec![ActionKind::OpenOnPhone, ActionKind::Upvote]
        );
        assert_eq!(encode_action_order(&[ActionKind::ViewImage]), vec![6]);
    }

    #[test]
    fn test_action_kind_serde_as_int() {
        let json = serde_json::to_string(&vec![ActionKind::Reply, ActionKind::Downvote]).unwrap();
        assert_eq!(json, "[1,3]");
        assert!(serde_json::from_str::<ActionKind>("9").is_err());
    }

    #[test]
    fn test_view_image_requires_cached_image() {
        let model = ActionModel::new();
        let order = ActionKind::ALL.to_vec();

        let without = model.deliver(content(&model, None), &order);
        assert!(!without.actions.iter().any(|a| a.kind == ActionKind::ViewImage));
        assert!(without.grouped);

        let with = model.deliver(content(&model, Some(PathBuf::from("/tmp/10.png"))), &order);
        assert_eq!(with.actions.last().unwrap().kind, ActionKind::ViewImage);
        assert!(!with.grouped);
    }

    #[test]
    fn test_render_keeps_configured_order() {
        let model = ActionModel::new();
        let order = [ActionKind::OpenOnPhone, ActionKind::Upvote, ActionKind::OpenOnPhone];
        let rendered = model.deliver(content(&model, None), &order);
        let kinds: Vec<_> = rendered.actions.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::OpenOnPhone, ActionKind::Upvote]);
        assert_eq!(rendered.actions[1].label, "Upvote A rather long p...");
    }

    #[test]
    fn test_select_emits_one_request() {
        let model = ActionModel::new();
        let id = model.deliver(content(&model, None), &ActionKind::ALL).id;

        let selection = model.select(id, ActionKind::Downvote, None).unwrap();
        assert_eq!(
            selection,
            Selection::Request {
                request: ActionRequest::Vote {
                    fullname: "t3_abc".to_string(),
                    direction: -1
                },
                confirmation: "Vote",
                dismiss: false,
            }
        );
        assert_eq!(
            model.state(id),
            Some(NotificationState::Dispatching(ActionKind::Downvote))
        );
    }

    #[test]
    fn test_open_on_phone_carries_dismiss_flag() {
        let model = ActionModel::new();
        let id = model.deliver(content(&model, None), &ActionKind::ALL).id;
        match model.select(id, ActionKind::OpenOnPhone, None).unwrap() {
            Selection::Request { dismiss, .. } => assert!(dismiss),
            other => panic!("unexpected selection {:?}", other),
        }
    }

    #[test]
    fn test_reply_to_direct_message() {
        let model = ActionModel::new();
        let mut item = content(&model, None);
        item.post = post(true);
        let id = model.deliver(item, &ActionKind::ALL).id;

        assert_eq!(
            model.select(id, ActionKind::Reply, Some("  ")),
            Err(NotificationError::EmptyReply)
        );
        match model.select(id, ActionKind::Reply, Some("thanks")).unwrap() {
            Selection::Request { request, .. } => assert_eq!(
                request,
                ActionRequest::ReplyToDirectMessage {
                    to_user: "someone".to_string(),
                    subject: "body".to_string(),
                    text: "thanks".to_string(),
                }
            ),
            other => panic!("unexpected selection {:?}", other),
        }
    }

    #[test]
    fn test_not_offered_action_rejected() {
        let model = ActionModel::new();
        let id = model.deliver(content(&model, None), &[ActionKind::Upvote]).id;
        assert_eq!(
            model.select(id, ActionKind::ViewImage, None),
            Err(NotificationError::NotOffered {
                id,
                kind: ActionKind::ViewImage
            })
        );
        assert_eq!(
            model.select(NotificationId(999), ActionKind::Upvote, None),
            Err(NotificationError::Unknown(NotificationId(999)))
        );
    }

    #[test]
    fn test_lifecycle_to_dismissed() {
        let model = ActionModel::new();
        let id = model
            .deliver(content(&model, Some(PathBuf::from("/tmp/0.png"))), &ActionKind::ALL)
            .id;

        model.select(id, ActionKind::Upvote, None).unwrap();
        assert_eq!(model.complete(RequestPath::Vote, Outcome::Success), Some(id));
        assert_eq!(
            model.state(id),
            Some(NotificationState::Succeeded(ActionKind::Upvote))
        );
        assert_eq!(model.complete(RequestPath::Vote, Outcome::Failed), None);

        model.select(id, ActionKind::ViewComments, None).unwrap();
        let dismissal = model.dismiss(id).unwrap();
        assert_eq!(dismissal.abandoned, vec![RequestPath::Comments]);
        assert_eq!(dismissal.content.image, Some(PathBuf::from("/tmp/0.png")));
        assert_eq!(model.state(id), None);
        assert!(model.dismiss(id).is_none());
    }
}
