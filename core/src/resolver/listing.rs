// Listing decoders: the remote API wraps every collection in the same
// `{"kind":"Listing","data":{"children":[...]}}` envelope, so the element type
// has to come from the caller.

use super::DecodeError;
use crate::api::types::{Comment, Post, SubscriptionResponse};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

const KIND_LISTING: &str = "Listing";
const KIND_COMMENT: &str = "t1";
const KIND_LINK: &str = "t3";
const KIND_MESSAGE: &str = "t4";
const KIND_SUBREDDIT: &str = "t5";

#[derive(Debug, Deserialize)]
struct Listing {
    kind: String,
    data: ListingData,
}

#[derive(Debug, Default, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
    #[serde(default)]
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    kind: String,
    data: Value,
}

/// The shapes a collection body can take on the wire.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    /// Already-converted domain objects, as carried on content paths.
    Items(Vec<T>),
    /// A single listing (front page, inbox, subscriptions).
    Listing(Listing),
    /// Several listings (the comments endpoint returns the post and its comments).
    Listings(Vec<Listing>),
}

#[derive(Debug, Deserialize)]
struct LinkData {
    id: String,
    name: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    subreddit: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    created_utc: f64,
}

#[derive(Debug, Deserialize)]
struct MessageData {
    id: String,
    name: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    context: Option<String>,
    #[serde(default)]
    created_utc: f64,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    id: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    created_utc: f64,
    /// Either a nested listing or an empty string.
    #[serde(default)]
    replies: Value,
}

#[derive(Debug, Deserialize)]
struct SubredditData {
    display_name: String,
}

fn parse_envelope<T: DeserializeOwned>(bytes: &[u8]) -> Result<Envelope<T>, DecodeError> {
    Ok(serde_json::from_slice(bytes)?)
}

fn things(envelope_listings: Vec<Listing>) -> impl Iterator<Item = Thing> {
    envelope_listings
        .into_iter()
        .filter(|listing| listing.kind == KIND_LISTING)
        .flat_map(|listing| listing.data.children.into_iter())
}

/// Only http(s) thumbnails are real images; the API uses "self", "nsfw" etc. as markers.
fn image_url(thumbnail: Option<String>) -> Option<String> {
    thumbnail.filter(|t| t.starts_with("http://") || t.starts_with("https://"))
}

fn link_to_post(data: Value) -> Result<Post, DecodeError> {
    let link: LinkData = serde_json::from_value(data)?;
    Ok(Post {
        id: link.id,
        fullname: link.name,
        title: link.title,
        post_contents: link.selftext,
        subreddit: link.subreddit,
        author: link.author,
        permalink: link.permalink,
        url: link.url,
        image_url: image_url(link.thumbnail),
        score: link.score,
        created_utc: link.created_utc as i64,
        is_direct_message: false,
    })
}

fn message_to_post(data: Value) -> Result<Post, DecodeError> {
    let message: MessageData = serde_json::from_value(data)?;
    let permalink = message
        .context
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| format!("/message/messages/{}", message.id));
    Ok(Post {
        id: message.id,
        fullname: message.name,
        title: message.subject,
        post_contents: message.body,
        subreddit: String::new(),
        author: message.author,
        permalink,
        url: None,
        image_url: None,
        score: 0,
        created_utc: message.created_utc as i64,
        is_direct_message: true,
    })
}

/// Decode posts and direct messages, in listing order.
pub fn decode_posts(bytes: &[u8]) -> Result<Vec<Post>, DecodeError> {
    let listings = match parse_envelope::<Post>(bytes)? {
        Envelope::Items(posts) => return Ok(posts),
        Envelope::Listing(listing) => vec![listing],
        Envelope::Listings(listings) => listings,
    };

    let mut posts = Vec::new();
    for thing in things(listings) {
        match thing.kind.as_str() {
            KIND_LINK => posts.push(link_to_post(thing.data)?),
            KIND_MESSAGE => posts.push(message_to_post(thing.data)?),
            _ => {}
        }
    }
    Ok(posts)
}

fn flatten_comment(data: Value, level: u32, out: &mut Vec<Comment>) -> Result<(), DecodeError> {
    let comment: CommentData = serde_json::from_value(data)?;
    out.push(Comment {
        id: comment.id,
        author: comment.author,
        body: comment.body,
        score: comment.score,
        level,
        created_utc: comment.created_utc as i64,
    });

    if comment.replies.is_object() {
        let replies: Listing = serde_json::from_value(comment.replies)?;
        for child in replies.data.children {
            if child.kind == KIND_COMMENT {
                flatten_comment(child.data, level + 1, out)?;
            }
        }
    }
    Ok(())
}

/// Decode a comment tree into depth-first order with nesting levels.
/// Link entries and "load more" stubs are skipped.
pub fn decode_comments(bytes: &[u8]) -> Result<Vec<Comment>, DecodeError> {
    let listings = match parse_envelope::<Comment>(bytes)? {
        Envelope::Items(comments) => return Ok(comments),
        Envelope::Listing(listing) => vec![listing],
        Envelope::Listings(listings) => listings,
    };

    let mut comments = Vec::new();
    for thing in things(listings) {
        if thing.kind == KIND_COMMENT {
            flatten_comment(thing.data, 0, &mut comments)?;
        }
    }
    Ok(comments)
}

pub fn decode_subscriptions(bytes: &[u8]) -> Result<SubscriptionResponse, DecodeError> {
    let listing: Listing = serde_json::from_slice(bytes)?;
    let after = listing.data.after.clone();
    let mut subreddits = Vec::new();
    for thing in listing.data.children {
        if thing.kind == KIND_SUBREDDIT {
            let data: SubredditData = serde_json::from_value(thing.data)?;
            subreddits.push(data.display_name);
        }
    }
    Ok(SubscriptionResponse { subreddits, after })
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMMENTS_BODY: &str = r#"[
        {"kind":"Listing","data":{"children":[{"kind":"t3","data":{"id":"abc","name":"t3_abc","title":"Post"}}]}},
        {"kind":"Listing","data":{"children":[
            {"kind":"t1","data":{"id":"c1","author":"a","body":"top","score":3,"created_utc":10.0,
                "replies":{"kind":"Listing","data":{"children":[
                    {"kind":"t1","data":{"id":"c2","author":"b","body":"nested","score":1,"replies":""}},
                    {"kind":"more","data":{"count":4}}
                ]}}}},
            {"kind":"t1","data":{"id":"c3","author":"c","body":"second","replies":""}}
        ]}}
    ]"#;

    #[test]
    fn test_comment_tree_flattens_depth_first() {
        let comments = decode_comments(COMMENTS_BODY.as_bytes()).unwrap();
        let ids: Vec<_> = comments.iter().map(|c| (c.id.as_str(), c.level)).collect();
        assert_eq!(ids, vec![("c1", 0), ("c2", 1), ("c3", 0)]);
        assert_eq!(comments[0].created_utc, 10);
    }

    #[test]
    fn test_inbox_messages_become_direct_message_posts() {
        let body = r#"{"kind":"Listing","data":{"children":[
            {"kind":"t4","data":{"id":"m1","name":"t4_m1","subject":"hello","body":"hi there","author":"friend"}}
        ]}}"#;
        let posts = decode_posts(body.as_bytes()).unwrap();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].is_direct_message);
        assert_eq!(posts[0].title, "hello");
        assert_eq!(posts[0].permalink, "/message/messages/m1");
    }

    #[test]
    fn test_marker_thumbnails_are_not_images() {
        assert_eq!(image_url(Some("self".to_string())), None);
        assert_eq!(image_url(Some("nsfw".to_string())), None);
        assert_eq!(
            image_url(Some("https://i.example/a.jpg".to_string())).as_deref(),
            Some("https://i.example/a.jpg")
        );
    }

    #[test]
    fn test_subscriptions() {
        let body = r#"{"kind":"Listing","data":{"after":"t5_next","children":[
            {"kind":"t5","data":{"display_name":"rust"}},
            {"kind":"t5","data":{"display_name":"todayilearned"}}
        ]}}"#;
        let subs = decode_subscriptions(body.as_bytes()).unwrap();
        assert_eq!(subs.subreddits, vec!["rust", "todayilearned"]);
        assert_eq!(subs.after.as_deref(), Some("t5_next"));
    }
}
