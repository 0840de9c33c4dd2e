// Content service: typed call sites over RemoteApi.
//
// Every method names its ResponseShape at the call site; the resolver never
// guesses from the payload.

use super::types::{ApiResponse, Comment, MarkAllRead, Post, SubscriptionResponse, Token};
use super::{ApiError, ApiRequest, RemoteApi};
use crate::resolver::{resolve, DecodeError, ResponseShape, TypeTag};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
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
}

/// Holds the access token between refreshes.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<Token>;
    fn set(&self, token: Token);
    fn clear(&self);
}

#[derive(Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<Token>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<Token> {
        self.token.read().clone()
    }

    fn set(&self, token: Token) {
        *self.token.write() = Some(token);
    }

    fn clear(&self) {
        *self.token.write() = None;
    }
}

/// Typed access to the remote content API.
#[derive(Clone)]
pub struct ContentService {
    api: Arc<dyn RemoteApi>,
    tokens: Arc<dyn TokenStore>,
}

impl ContentService {
    pub fn new(api: Arc<dyn RemoteApi>, tokens: Arc<dyn TokenStore>) -> Self {
        Self { api, tokens }
    }

    async fn call(&self, request: ApiRequest) -> Result<Vec<u8>, ServiceError> {
        match self.api.execute(&request).await {
            Ok(bytes) => Ok(bytes),
            Err(ApiError::Unauthorized) => {
                warn!("{} unauthorized, dropping cached token", request.route());
                self.tokens.clear();
                Err(ApiError::Unauthorized.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch(
        &self,
        request: ApiRequest,
        shape: ResponseShape,
    ) -> Result<crate::resolver::Resolved, ServiceError> {
        let route = request.route();
        let bytes = self.call(request).await?;
        debug!("{} returned {} bytes, resolving as {}", route, bytes.len(), shape);
        resolve(&bytes, shape).map_err(|source| ServiceError::Decode { shape, source })
    }

    /// Decode an action response and turn embedded errors into failures.
    async fn act(&self, request: ApiRequest) -> Result<ApiResponse, ServiceError> {
        let shape = ResponseShape::Object(TypeTag::ApiResponse);
        let response: ApiResponse = self
            .fetch(request, shape)
            .await?
            .into_typed()
            .map_err(|source| ServiceError::Decode { shape, source })?;
        if response.has_errors() {
            return Err(ServiceError::Remote(response.error_summary()));
        }
        Ok(response)
    }

    pub async fn access_token(&self, refresh_token: Option<String>) -> Result<Token, ServiceError> {
        let shape = ResponseShape::Object(TypeTag::Token);
        self.fetch(ApiRequest::AccessToken { refresh_token }, shape)
            .await?
            .into_token()
            .map_err(|source| ServiceError::Decode { shape, source })
    }

    /// Return the cached token, fetching one first if there is none.
    pub async fn ensure_token(&self) -> Result<Token, ServiceError> {
        if let Some(token) = self.tokens.get() {
            return Ok(token);
        }
        let token = self.access_token(None).await?;
        self.tokens.set(token.clone());
        Ok(token)
    }

    pub async fn latest_posts(
        &self,
        subreddits: Vec<String>,
        sort: &str,
        limit: u32,
    ) -> Result<Vec<Post>, ServiceError> {
        let shape = ResponseShape::SequenceOf(TypeTag::Post);
        let request = ApiRequest::LatestPosts {
            subreddits,
            sort: sort.to_string(),
            limit,
        };
        self.fetch(request, shape)
            .await?
            .into_posts()
            .map_err(|source| ServiceError::Decode { shape, source })
    }

    pub async fn unread_messages(&self) -> Result<Vec<Post>, ServiceError> {
        let shape = ResponseShape::SequenceOf(TypeTag::Post);
        self.fetch(ApiRequest::UnreadMessages, shape)
            .await?
            .into_posts()
            .map_err(|source| ServiceError::Decode { shape, source })
    }

    pub async fn mark_all_read(&self) -> Result<MarkAllRead, ServiceError> {
        let shape = ResponseShape::Object(TypeTag::MarkAllRead);
        self.fetch(ApiRequest::MarkAllRead, shape)
            .await?
            .into_mark_all_read()
            .map_err(|source| ServiceError::Decode { shape, source })
    }

    pub async fn subscriptions(&self) -> Result<SubscriptionResponse, ServiceError> {
        let shape = ResponseShape::Object(TypeTag::SubscriptionResponse);
        self.fetch(ApiRequest::Subscriptions, shape)
            .await?
            .into_subscriptions()
            .map_err(|source| ServiceError::Decode { shape, source })
    }

    pub async fn vote(&self, fullname: &str, direction: i32) -> Result<ApiResponse, ServiceError> {
        self.act(ApiRequest::Vote {
            fullname: fullname.to_string(),
            direction,
        })
        .await
    }

    pub async fn comment_on_post(&self, text: &str, fullname: &str) -> Result<ApiResponse, ServiceError> {
        self.act(ApiRequest::Comment {
            parent_fullname: fullname.to_string(),
            text: text.to_string(),
        })
        .await
    }

    pub async fn reply_to_direct_message(
        &self,
        subject: &str,
        text: &str,
        to_user: &str,
    ) -> Result<ApiResponse, ServiceError> {
        self.act(ApiRequest::Compose {
            to_user: to_user.to_string(),
            subject: subject.to_string(),
            text: text.to_string(),
        })
        .await
    }

    pub async fn comments(&self, permalink: &str, sort: &str) -> Result<Vec<Comment>, ServiceError> {
        let shape = ResponseShape::SequenceOf(TypeTag::Comment);
        let request = ApiRequest::Comments {
            permalink: permalink.to_string(),
            sort: sort.to_string(),
        };
        self.fetch(request, shape)
            .await?
            .into_comments()
            .map_err(|source| ServiceError::Decode { shape, source })
    }

    /// Raw image bytes; binary bodies skip the resolver.
    pub async fn image(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        self.call(ApiRequest::Image {
            url: url.to_string(),
        })
        .await
    }
}
