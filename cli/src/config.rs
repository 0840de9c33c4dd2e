// Configuration management for the WearSync CLI
//
// Settings are stored as JSON in:
// - macOS: ~/Library/Application Support/wearsync/settings.json
// - Linux: ~/.config/wearsync/settings.json
// - Windows: %APPDATA%\wearsync\settings.json

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use wearsync_core::{ActionKind, SyncSettings};

const SETTINGS_FILE: &str = "settings.json";

/// Where the CLI keeps its [`SyncSettings`].
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// The per-user settings file (cross-platform)
    pub fn user() -> Result<Self> {
        let dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("wearsync");
        Ok(Self::at(dir.join(SETTINGS_FILE)))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load settings, falling back to defaults when no file exists yet.
    pub fn load(&self) -> Result<SyncSettings> {
        if !self.exists() {
            return Ok(SyncSettings::default());
        }
        SyncSettings::load(&self.path)
            .with_context(|| format!("Failed to load {}", self.path.display()))
    }

    pub fn save(&self, settings: &SyncSettings) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).context("Failed to create config directory")?;
        }
        settings
            .save(&self.path)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }

    /// Write default settings. Returns false if a file was already there and
    /// `force` is not set.
    pub fn init(&self, force: bool) -> Result<bool> {
        if self.exists() && !force {
            return Ok(false);
        }
        self.save(&SyncSettings::default())?;
        Ok(true)
    }

    pub fn set_action_order(&self, names: &[String]) -> Result<SyncSettings> {
        let order = names
            .iter()
            .map(|name| parse_action(name))
            .collect::<Result<Vec<_>>>()?;

        let mut settings = self.load()?;
        settings
            .set_action_order(order)
            .context("Rejected action order")?;
        self.save(&settings)?;
        Ok(settings)
    }
}

/// Accepts the short names shown by `config show` as well as the variant names.
pub fn parse_action(name: &str) -> Result<ActionKind> {
    let kind = match name.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
        "comments" | "viewcomments" => ActionKind::ViewComments,
        "reply" => ActionKind::Reply,
        "upvote" | "up" => ActionKind::Upvote,
        "downvote" | "down" => ActionKind::Downvote,
        "save" | "savetoservice" | "pocket" => ActionKind::SaveToService,
        "open" | "openonphone" => ActionKind::OpenOnPhone,
        "image" | "viewimage" => ActionKind::ViewImage,
        _ => anyhow::bail!("Unknown action: {}", name),
    };
    Ok(kind)
}

pub fn action_name(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::ViewComments => "comments",
        ActionKind::Reply => "reply",
        ActionKind::Upvote => "upvote",
        ActionKind::Downvote => "downvote",
        ActionKind::SaveToService => "save",
        ActionKind::OpenOnPhone => "open",
        ActionKind::ViewImage => "image",
    }
}

/// Key/value view used by `config show`.
pub fn list(settings: &SyncSettings) -> Vec<(String, String)> {
    let order = settings
        .action_order
        .iter()
        .map(|kind| action_name(*kind))
        .collect::<Vec<_>>()
        .join(", ");
    let subreddits = if settings.subreddits.is_empty() {
        "(front page)".to_string()
    } else {
        settings.subreddits.join(", ")
    };

    vec![
        ("action_order".to_string(), order),
        ("dismiss_after_action".to_string(), settings.dismiss_after_action.to_string()),
        ("reply_timeout".to_string(), format!("{}s", settings.reply_timeout_secs)),
        ("connect_timeout".to_string(), format!("{}s", settings.connect_timeout_secs)),
        ("asset_timeout".to_string(), format!("{}s", settings.asset_timeout_secs)),
        ("image_cache_dir".to_string(), settings.image_cache_dir.display().to_string()),
        ("web_base_url".to_string(), settings.web_base_url.clone()),
        ("listing_sort".to_string(), settings.listing_sort.clone()),
        ("comment_sort".to_string(), settings.comment_sort.clone()),
        ("subreddits".to_string(), subreddits),
        ("post_limit".to_string(), settings.post_limit.to_string()),
        (
            "include_direct_messages".to_string(),
            settings.include_direct_messages.to_string(),
        ),
    ]
}
