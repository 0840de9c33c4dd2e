//! Response type resolver
//!
//! The remote API returns bodies whose concrete type cannot be told from the
//! bytes alone: a front page, an inbox and a comment thread all arrive in the
//! same listing envelope. Each call site therefore declares a
//! [`ResponseShape`] up front and [`resolve`] picks the decoder from that
//! declaration.
//!
//! Matching order is fixed: exact object types first, then sequences by
//! declared element type, then the generic JSON decoder for everything else.
//! `resolve` is a pure function of its inputs and safe to call from any number
//! of in-flight requests at once.

pub mod listing;

use crate::api::types::{Comment, MarkAllRead, Post, SubscriptionResponse, Token};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub use listing::{decode_comments, decode_posts, decode_subscriptions};

/// Name of a type a call site expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Token,
    MarkAllRead,
    SubscriptionResponse,
    Post,
    Comment,
    ApiResponse,
    /// Anything else, named for diagnostics.
    Named(&'static str),
}

/// What a call site expects back: one object or a sequence of elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseShape {
    Object(TypeTag),
    SequenceOf(TypeTag),
}

impl fmt::Display for ResponseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseShape::Object(tag) => write!(f, "{:?}", tag),
            ResponseShape::SequenceOf(tag) => write!(f, "Vec<{:?}>", tag),
        }
    }
}

/// A decoded body, tagged with the decoder that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Token(Token),
    MarkAllRead(MarkAllRead),
    Subscriptions(SubscriptionResponse),
    Posts(Vec<Post>),
    Comments(Vec<Comment>),
    /// Output of the generic decoder.
    Raw(Value),
}

impl Resolved {
    fn name(&self) -> &'static str {
        match self {
            Resolved::Token(_) => "Token",
            Resolved::MarkAllRead(_) => "MarkAllRead",
            Resolved::Subscriptions(_) => "SubscriptionResponse",
            Resolved::Posts(_) => "Vec<Post>",
            Resolved::Comments(_) => "Vec<Comment>",
            Resolved::Raw(_) => "Raw",
        }
    }

    fn mismatch(self, expected: &'static str) -> DecodeError {
        DecodeError::ShapeMismatch {
            expected,
            found: self.name(),
        }
    }

    pub fn into_token(self) -> Result<Token, DecodeError> {
        match self {
            Resolved::Token(token) => Ok(token),
            other => Err(other.mismatch("Token")),
        }
    }

    pub fn into_mark_all_read(self) -> Result<MarkAllRead, DecodeError> {
        match self {
            Resolved::MarkAllRead(ack) => Ok(ack),
            other => Err(other.mismatch("MarkAllRead")),
        }
    }

    pub fn into_subscriptions(self) -> Result<SubscriptionResponse, DecodeError> {
        match self {
            Resolved::Subscriptions(subs) => Ok(subs),
            other => Err(other.mismatch("SubscriptionResponse")),
        }
    }

    pub fn into_posts(self) -> Result<Vec<Post>, DecodeError> {
        match self {
            Resolved::Posts(posts) => Ok(posts),
            other => Err(other.mismatch("Vec<Post>")),
        }
    }

    pub fn into_comments(self) -> Result<Vec<Comment>, DecodeError> {
        match self {
            Resolved::Comments(comments) => Ok(comments),
            other => Err(other.mismatch("Vec<Comment>")),
        }
    }

    /// Finish generic decoding into a concrete serde type.
    pub fn into_typed<T: serde::de::DeserializeOwned>(self) -> Result<T, DecodeError> {
        match self {
            Resolved::Raw(value) => Ok(serde_json::from_value(value)?),
            other => Err(other.mismatch("Raw")),
        }
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected {expected}, decoder produced {found}")]
    ShapeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

/// Decode `bytes` according to the caller's declared shape.
pub fn resolve(bytes: &[u8], shape: ResponseShape) -> Result<Resolved, DecodeError> {
    match shape {
        ResponseShape::Object(TypeTag::Token) => Ok(Resolved::Token(serde_json::from_slice(bytes)?)),
        ResponseShape::Object(TypeTag::MarkAllRead) => Ok(Resolved::MarkAllRead(MarkAllRead)),
        ResponseShape::Object(TypeTag::SubscriptionResponse) => {
            Ok(Resolved::Subscriptions(decode_subscriptions(bytes)?))
        }
        ResponseShape::SequenceOf(TypeTag::Post) => Ok(Resolved::Posts(decode_posts(bytes)?)),
        ResponseShape::SequenceOf(TypeTag::Comment) => {
            Ok(Resolved::Comments(decode_comments(bytes)?))
        }
        _ => decode_default(bytes),
    }
}

/// Generic decoder: any JSON document, with an empty body read as `null`.
fn decode_default(bytes: &[u8]) -> Result<Resolved, DecodeError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Resolved::Raw(Value::Null));
    }
    Ok(Resolved::Raw(serde_json::from_slice(bytes)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::ApiResponse;

    const TOKEN: &str = r#"{"access_token":"abc123","token_type":"bearer","expires_in":3600,"scope":"read vote"}"#;

    const LISTING: &str = r#"{"kind":"Listing","data":{"after":null,"children":[
        {"kind":"t3","data":{"id":"abc","name":"t3_abc","title":"First","selftext":"body","subreddit":"rust",
            "author":"ferris","permalink":"/r/rust/comments/abc/first/","thumbnail":"https://i.example/abc.jpg",
            "score":42,"created_utc":1700000000.0}},
        {"kind":"t3","data":{"id":"def","name":"t3_def","title":"Second","thumbnail":"self"}},
        {"kind":"t1","data":{"id":"c1","body":"a comment"}}
    ]}}"#;

    #[test]
    fn test_token_shape_yields_token() {
        let resolved = resolve(TOKEN.as_bytes(), ResponseShape::Object(TypeTag::Token)).unwrap();
        let token = resolved.into_token().unwrap();
        assert_eq!(token.access_token, "abc123");
        assert_eq!(token.expires_in, 3600);
    }

    #[test]
    fn test_same_bytes_split_by_declared_element_type() {
        let posts = resolve(LISTING.as_bytes(), ResponseShape::SequenceOf(TypeTag::Post))
            .unwrap()
            .into_posts()
            .unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].fullname, "t3_abc");
        assert_eq!(posts[0].image_url.as_deref(), Some("https://i.example/abc.jpg"));
        assert_eq!(posts[1].image_url, None);

        let comments = resolve(LISTING.as_bytes(), ResponseShape::SequenceOf(TypeTag::Comment))
            .unwrap()
            .into_comments()
            .unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].body, "a comment");
    }

    #[test]
    fn test_mark_all_read_accepts_empty_body() {
        let resolved = resolve(b"", ResponseShape::Object(TypeTag::MarkAllRead)).unwrap();
        assert_eq!(resolved, Resolved::MarkAllRead(MarkAllRead));
    }

    #[test]
    fn test_unmatched_shape_falls_through_to_default() {
        let body = br#"{"more_children":{"things":[]}}"#;
        let resolved = resolve(body, ResponseShape::Object(TypeTag::Named("MoreChildren"))).unwrap();
        assert!(matches!(resolved, Resolved::Raw(Value::Object(_))));

        // A sequence of an element type with no dedicated decoder also falls through.
        let resolved = resolve(body, ResponseShape::SequenceOf(TypeTag::Token)).unwrap();
        assert!(matches!(resolved, Resolved::Raw(_)));

        // As does a single object of a type only known in sequence form.
        let resolved = resolve(LISTING.as_bytes(), ResponseShape::Object(TypeTag::Post)).unwrap();
        assert!(matches!(resolved, Resolved::Raw(_)));
    }

    #[test]
    fn test_default_decoder_empty_body_is_null() {
        let resolved = resolve(b"  ", ResponseShape::Object(TypeTag::ApiResponse)).unwrap();
        assert_eq!(resolved, Resolved::Raw(Value::Null));
    }

    #[test]
    fn test_action_response_through_default_decoder() {
        let body = br#"{"json":{"errors":[["BAD_ID","no such thing","id"]]}}"#;
        let response: ApiResponse = resolve(body, ResponseShape::Object(TypeTag::ApiResponse))
            .unwrap()
            .into_typed()
            .unwrap();
        assert!(response.has_errors());
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let result = resolve(b"<html>", ResponseShape::SequenceOf(TypeTag::Post));
        assert!(matches!(result, Err(DecodeError::Json(_))));
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let resolved = Resolved::Posts(vec![]);
        assert!(matches!(
            resolved.into_comments(),
            Err(DecodeError::ShapeMismatch {
                expected: "Vec<Comment>",
                found: "Vec<Post>"
            })
        ));
    }

    #[test]
    fn test_shape_display() {
        assert_eq!(ResponseShape::SequenceOf(TypeTag::Post).to_string(), "Vec<Post>");
        assert_eq!(ResponseShape::Object(TypeTag::Token).to_string(), "Token");
    }
}
