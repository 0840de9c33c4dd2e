//! Remote content API boundary.
//!
//! The HTTP client and its JSON handling live outside this crate; it only
//! sees [`RemoteApi`], which turns an [`ApiRequest`] into response bytes.
//! [`ContentService`] puts typed call sites on top, each with its declared
//! response shape.

pub mod fixture;
pub mod service;
pub mod types;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub use fixture::FixtureApi;
pub use service::{ContentService, MemoryTokenStore, ServiceError, TokenStore};
pub use types::{ApiResponse, Comment, MarkAllRead, Post, SubscriptionResponse, Token};

/// A single remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiRequest {
    AccessToken {
        refresh_token: Option<String>,
    },
    LatestPosts {
        subreddits: Vec<String>,
        sort: String,
        limit: u32,
    },
    UnreadMessages,
    MarkAllRead,
    Subscriptions,
    Vote {
        fullname: String,
        direction: i32,
    },
    Comment {
        parent_fullname: String,
        text: String,
    },
    Compose {
        to_user: String,
        subject: String,
        text: String,
    },
    Comments {
        permalink: String,
        sort: String,
    },
    Image {
        url: String,
    },
}

/// Endpoint family of a request, without its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiRoute {
    AccessToken,
    LatestPosts,
    UnreadMessages,
    MarkAllRead,
    Subscriptions,
    Vote,
    Comment,
    Compose,
    Comments,
    Image,
}

impl ApiRequest {
    pub fn route(&self) -> ApiRoute {
        match self {
            ApiRequest::AccessToken { .. } => ApiRoute::AccessToken,
            ApiRequest::LatestPosts { .. } => ApiRoute::LatestPosts,
            ApiRequest::UnreadMessages => ApiRoute::UnreadMessages,
            ApiRequest::MarkAllRead => ApiRoute::MarkAllRead,
            ApiRequest::Subscriptions => ApiRoute::Subscriptions,
            ApiRequest::Vote { .. } => ApiRoute::Vote,
            ApiRequest::Comment { .. } => ApiRoute::Comment,
            ApiRequest::Compose { .. } => ApiRoute::Compose,
            ApiRequest::Comments { .. } => ApiRoute::Comments,
            ApiRequest::Image { .. } => ApiRoute::Image,
        }
    }
}

impl fmt::Display for ApiRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Not authorized")]
    Unauthorized,
}

/// The remote API client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn execute(&self, request: &ApiRequest) -> Result<Vec<u8>, ApiError>;
}
