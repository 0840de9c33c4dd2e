//! Sync settings
//!
//! Everything both peers are configured with, serialized to/from JSON.
//! The handheld ships `action_order` and `dismiss_after_action` to the
//! wearable with every batch of posts.

use crate::notification::ActionKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const MAX_POST_LIMIT: u32 = 100;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Order of notification actions, as wire integers.
    pub action_order: Vec<ActionKind>,

    /// Dismiss a notification once "open on phone" was sent
    pub dismiss_after_action: bool,

    /// How long the wearable waits for a `_result_*` reply
    pub reply_timeout_secs: u64,

    pub connect_timeout_secs: u64,

    pub asset_timeout_secs: u64,

    /// Where the wearable keeps full-size notification images
    pub image_cache_dir: PathBuf,

    /// Prefix for permalinks opened or saved on the phone
    pub web_base_url: String,

    pub listing_sort: String,

    pub comment_sort: String,

    /// Empty means the front page
    pub subreddits: Vec<String>,

    pub post_limit: u32,

    /// Fold unread direct messages into each refresh
    pub include_direct_messages: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            action_order: vec![
                ActionKind::Reply,
                ActionKind::Upvote,
                ActionKind::Downvote,
                ActionKind::ViewComments,
                ActionKind::ViewImage,
                ActionKind::OpenOnPhone,
                ActionKind::SaveToService,
            ],
            dismiss_after_action: true,
            reply_timeout_secs: 30,
            connect_timeout_secs: 30,
            asset_timeout_secs: 30,
            image_cache_dir: std::env::temp_dir().join("wearsync-images"),
            web_base_url: "https://www.reddit.com".to_string(),
            listing_sort: "new".to_string(),
            comment_sort: "best".to_string(),
            subreddits: Vec::new(),
            post_limit: 5,
            include_direct_messages: true,
        }
    }
}

impl SyncSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        for (name, secs) in [
            ("reply_timeout_secs", self.reply_timeout_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("asset_timeout_secs", self.asset_timeout_secs),
        ] {
            if secs == 0 {
                return Err(SettingsError::ConfigError(format!("{} must be at least 1", name)));
            }
        }

        if self.post_limit == 0 || self.post_limit > MAX_POST_LIMIT {
            return Err(SettingsError::ConfigError(format!(
                "post_limit must be between 1 and {}",
                MAX_POST_LIMIT
            )));
        }

        if !(self.web_base_url.starts_with("http://") || self.web_base_url.starts_with("https://")) {
            return Err(SettingsError::ConfigError(
                "web_base_url must be an http(s) URL".to_string(),
            ));
        }

        for (i, kind) in self.action_order.iter().enumerate() {
            if self.action_order[..i].contains(kind) {
                return Err(SettingsError::ConfigError(format!(
                    "{} appears twice in action_order",
                    kind
                )));
            }
        }

        Ok(())
    }

    /// Replace the action order after checking it.
    pub fn set_action_order(&mut self, order: Vec<ActionKind>) -> Result<(), SettingsError> {
        let previous = std::mem::replace(&mut self.action_order, order);
        if let Err(e) = self.validate() {
            self.action_order = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn asset_timeout(&self) -> Duration {
        Duration::from_secs(self.asset_timeout_secs)
    }

    /// Full web URL for a permalink.
    pub fn web_url(&self, permalink: &str) -> String {
        format!("{}{}", self.web_base_url.trim_end_matches('/'), permalink)
    }

    /// Load settings from JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_string(&content)
    }

    /// Save settings to JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SettingsError> {
        let json = self.to_json_string()?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String, SettingsError> {
        self.validate()?;
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_string(json: &str) -> Result<Self, SettingsError> {
        let settings: SyncSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }
}
