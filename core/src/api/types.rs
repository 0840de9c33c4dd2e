//! Domain objects produced by the remote content API.

use serde::{Deserialize, Serialize};

const SHORT_TITLE_LEN: usize = 15;

/// A unit of remote content shown on the wearable: a link post or a direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    /// Type-prefixed identifier, e.g. `t3_abc`.
    pub fullname: String,
    pub title: String,
    #[serde(default)]
    pub post_contents: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub url: Option<String>,
    /// Preview image location, when the listing offered one.
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub created_utc: i64,
    #[serde(default)]
    pub is_direct_message: bool,
}

impl Post {
    /// Title cut to fit an action label.
    pub fn short_title(&self) -> String {
        if self.title.chars().count() <= SHORT_TITLE_LEN {
            self.title.clone()
        } else {
            let cut: String = self.title.chars().take(SHORT_TITLE_LEN).collect();
            format!("{}...", cut.trim_end())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i64,
    /// Nesting depth, 0 for top-level comments.
    #[serde(default)]
    pub level: u32,
    #[serde(default)]
    pub created_utc: i64,
}

/// OAuth access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Acknowledgement of a mark-all-read call; the body carries nothing useful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarkAllRead;

/// The user's subscription list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubscriptionResponse {
    pub subreddits: Vec<String>,
    pub after: Option<String>,
}

/// Generic action response. A 200 can still carry errors.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub json: ApiResponseBody,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApiResponseBody {
    /// Each entry is `[code, message, field]`.
    #[serde(default)]
    pub errors: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn has_errors(&self) -> bool {
        !self.json.errors.is_empty()
    }

    /// Error entries flattened to `CODE: message` strings.
    pub fn error_summary(&self) -> String {
        self.json
            .errors
            .iter()
            .map(|entry| {
                let code = entry.first().and_then(|v| v.as_str()).unwrap_or("UNKNOWN");
                let message = entry.get(1).and_then(|v| v.as_str()).unwrap_or("");
                format!("{}: {}", code, message)
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}
