// Canned remote responses for `wearsync simulate`

use wearsync_core::api::{ApiError, ApiRoute, FixtureApi};

const TOKEN: &str = r#"{"access_token":"simulated","token_type":"bearer","expires_in":3600}"#;

const LATEST: &str = r#"{"kind":"Listing","data":{"children":[
    {"kind":"t3","data":{"id":"w1","name":"t3_w1","title":"Ferris spotted on a smartwatch","subreddit":"rust",
        "author":"crab","permalink":"/r/rust/comments/w1/ferris_watch/","url":"https://i.example/ferris.png",
        "thumbnail":"https://i.example/ferris_thumb.png","score":128,"created_utc":1700000000.0}},
    {"kind":"t3","data":{"id":"w2","name":"t3_w2","title":"Async closures are stable","selftext":"Finally.",
        "subreddit":"rust","author":"someone","permalink":"/r/rust/comments/w2/async_closures/",
        "thumbnail":"self","score":64,"created_utc":1700000100.0}}
]}}"#;

const UNREAD: &str = r#"{"kind":"Listing","data":{"children":[
    {"kind":"t4","data":{"id":"m1","name":"t4_m1","subject":"lunch?","body":"free at noon?",
        "author":"friend","created_utc":1700000200.0}}
]}}"#;

const COMMENTS: &str = r#"[
    {"kind":"Listing","data":{"children":[{"kind":"t3","data":{"id":"w1","name":"t3_w1","title":"Ferris"}}]}},
    {"kind":"Listing","data":{"children":[
        {"kind":"t1","data":{"id":"c1","author":"alice","body":"Tiny crab, big heart","score":12,"replies":{
            "kind":"Listing","data":{"children":[
                {"kind":"t1","data":{"id":"c2","author":"bob","body":"Agreed","score":3,"replies":""}}
            ]}}}},
        {"kind":"t1","data":{"id":"c3","author":"carol","body":"Where can I get one?","score":5,"replies":""}}
    ]}}
]"#;

const THUMBNAIL: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// A fixture API with a front page, one unread message and a comment tree.
/// Calls on `failing` answer with a server error.
pub fn remote(failing: Option<ApiRoute>) -> FixtureApi {
    let api = FixtureApi::new();
    api.respond(ApiRoute::AccessToken, TOKEN)
        .respond(ApiRoute::LatestPosts, LATEST)
        .respond(ApiRoute::UnreadMessages, UNREAD)
        .respond(ApiRoute::Comments, COMMENTS)
        .image("https://i.example/ferris_thumb.png", THUMBNAIL.to_vec());

    if let Some(route) = failing {
        api.fail(
            route,
            ApiError::Http {
                status: 503,
                message: "simulated outage".to_string(),
            },
        );
    }
    api
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wearsync_core::api::{ContentService, MemoryTokenStore};

    fn service(failing: Option<ApiRoute>) -> ContentService {
        ContentService::new(Arc::new(remote(failing)), Arc::new(MemoryTokenStore::new()))
    }

    #[tokio::test]
    async fn test_fixtures_decode() {
        let service = service(None);
        service.ensure_token().await.unwrap();

        let posts = service.latest_posts(Vec::new(), "new", 5).await.unwrap();
        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].fullname, "t3_w1");

        let unread = service.unread_messages().await.unwrap();
        assert_eq!(unread.len(), 1);
        assert!(unread[0].is_direct_message);

        let comments = service.comments("/r/rust/comments/w1/ferris_watch/", "best").await.unwrap();
        assert_eq!(comments.len(), 3);
    }

    #[tokio::test]
    async fn test_failing_route() {
        let service = service(Some(ApiRoute::Vote));
        assert!(service.vote("t3_w1", 1).await.is_err());
    }
}
