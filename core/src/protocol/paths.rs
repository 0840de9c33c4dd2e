//! Path vocabulary shared by both peers.
//!
//! Every channel in the protocol is named by a path string. Internally the
//! set is closed: [`Path`] enumerates every string either peer may emit, and
//! [`Path::parse`] is the only way back from the wire.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const REFRESH: &str = "/refresh";
pub const REPLY: &str = "/reply";
pub const VOTE: &str = "/vote";
pub const COMMENTS: &str = "/comments";
pub const OPEN_ON_PHONE: &str = "/open_on_phone";
pub const SAVE_TO_SERVICE: &str = "/save_to_pocket";

pub const LOGGING: &str = "/logging";
pub const NO_NEW_CONTENT: &str = "/no_new_posts";

pub const POSTS_CONTENT: &str = "/posts";
pub const COMMENTS_CONTENT: &str = "/comments_content";

pub const RESULT_SUCCESS_SUFFIX: &str = "_result_success";
pub const RESULT_FAILED_SUFFIX: &str = "_result_failed";

/// Paths on which one peer asks the other to do something.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestPath {
    Refresh,
    Reply,
    Vote,
    Comments,
    OpenOnPhone,
    SaveToService,
}

impl RequestPath {
    pub const ALL: [RequestPath; 6] = [
        RequestPath::Refresh,
        RequestPath::Reply,
        RequestPath::Vote,
        RequestPath::Comments,
        RequestPath::OpenOnPhone,
        RequestPath::SaveToService,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestPath::Refresh => REFRESH,
            RequestPath::Reply => REPLY,
            RequestPath::Vote => VOTE,
            RequestPath::Comments => COMMENTS,
            RequestPath::OpenOnPhone => OPEN_ON_PHONE,
            RequestPath::SaveToService => SAVE_TO_SERVICE,
        }
    }

    /// Reply path for the given outcome of a request issued on this path.
    pub fn reply_path(&self, outcome: Outcome) -> Path {
        Path::Result(*self, outcome)
    }
}

impl fmt::Display for RequestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a remote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failed,
}

impl Outcome {
    pub fn suffix(&self) -> &'static str {
        match self {
            Outcome::Success => RESULT_SUCCESS_SUFFIX,
            Outcome::Failed => RESULT_FAILED_SUFFIX,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failed => write!(f, "failed"),
        }
    }
}

/// Paths that carry content rather than commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentPath {
    /// Content items delivered to the wearable for notification.
    Posts,
    /// Comments fetched on behalf of a `/comments` request.
    Comments,
}

impl ContentPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentPath::Posts => POSTS_CONTENT,
            ContentPath::Comments => COMMENTS_CONTENT,
        }
    }
}

/// Every path either peer may send or watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Path {
    Request(RequestPath),
    Result(RequestPath, Outcome),
    Content(ContentPath),
    Logging,
    NoNewContent,
}

impl Path {
    /// The complete vocabulary, in a stable order.
    pub fn all() -> Vec<Path> {
        let mut paths = Vec::with_capacity(RequestPath::ALL.len() * 3 + 4);
        for request in RequestPath::ALL {
            paths.push(Path::Request(request));
            paths.push(Path::Result(request, Outcome::Success));
            paths.push(Path::Result(request, Outcome::Failed));
        }
        paths.push(Path::Content(ContentPath::Posts));
        paths.push(Path::Content(ContentPath::Comments));
        paths.push(Path::Logging);
        paths.push(Path::NoNewContent);
        paths
    }

    /// Wire string for this path.
    pub fn as_str(&self) -> &'static str {
        use Outcome::{Failed, Success};
        use RequestPath::*;

        match self {
            Path::Request(request) => request.as_str(),
            Path::Result(Refresh, Success) => "/refresh_result_success",
            Path::Result(Refresh, Failed) => "/refresh_result_failed",
            Path::Result(Reply, Success) => "/reply_result_success",
            Path::Result(Reply, Failed) => "/reply_result_failed",
            Path::Result(Vote, Success) => "/vote_result_success",
            Path::Result(Vote, Failed) => "/vote_result_failed",
            Path::Result(Comments, Success) => "/comments_result_success",
            Path::Result(Comments, Failed) => "/comments_result_failed",
            Path::Result(OpenOnPhone, Success) => "/open_on_phone_result_success",
            Path::Result(OpenOnPhone, Failed) => "/open_on_phone_result_failed",
            Path::Result(SaveToService, Success) => "/save_to_pocket_result_success",
            Path::Result(SaveToService, Failed) => "/save_to_pocket_result_failed",
            Path::Content(content) => content.as_str(),
            Path::Logging => LOGGING,
            Path::NoNewContent => NO_NEW_CONTENT,
        }
    }

    /// Exact-match lookup of a wire string. No prefix or wildcard matching.
    pub fn parse(raw: &str) -> Option<Path> {
        if let Some(request) = RequestPath::ALL.iter().find(|r| r.as_str() == raw) {
            return Some(Path::Request(*request));
        }

        for outcome in [Outcome::Success, Outcome::Failed] {
            if let Some(base) = raw.strip_suffix(outcome.suffix()) {
                return RequestPath::ALL
                    .iter()
                    .find(|r| r.as_str() == base)
                    .map(|r| Path::Result(*r, outcome));
            }
        }

        match raw {
            POSTS_CONTENT => Some(Path::Content(ContentPath::Posts)),
            COMMENTS_CONTENT => Some(Path::Content(ContentPath::Comments)),
            LOGGING => Some(Path::Logging),
            NO_NEW_CONTENT => Some(Path::NoNewContent),
            _ => None,
        }
    }

    pub fn is_reply(&self) -> bool {
        matches!(self, Path::Result(..))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<RequestPath> for Path {
    fn from(request: RequestPath) -> Self {
        Path::Request(request)
    }
}

impl From<ContentPath> for Path {
    fn from(content: ContentPath) -> Self {
        Path::Content(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_reply_paths_follow_suffix_convention() {
        for request in RequestPath::ALL {
            let success = request.reply_path(Outcome::Success);
            let failed = request.reply_path(Outcome::Failed);
            assert_eq!(
                success.as_str(),
                format!("{}{}", request.as_str(), RESULT_SUCCESS_SUFFIX)
            );
            assert_eq!(
                failed.as_str(),
                format!("{}{}", request.as_str(), RESULT_FAILED_SUFFIX)
            );
        }
    }

    #[test]
    fn test_vocabulary_is_injective() {
        let all = Path::all();
        let strings: HashSet<&str> = all.iter().map(|p| p.as_str()).collect();
        assert_eq!(strings.len(), all.len());
    }

    #[test]
    fn test_parse_inverts_as_str() {
        for path in Path::all() {
            assert_eq!(Path::parse(path.as_str()), Some(path), "{}", path);
        }
    }

    #[test]
    fn test_parse_is_exact_match_only() {
        assert_eq!(Path::parse("/vote/"), None);
        assert_eq!(Path::parse("vote"), None);
        assert_eq!(Path::parse("/vote_result"), None);
        assert_eq!(Path::parse("/votes_result_success"), None);
        assert_eq!(Path::parse(""), None);
    }

    #[test]
    fn test_is_reply() {
        assert!(Path::Result(RequestPath::Vote, Outcome::Failed).is_reply());
        assert!(!Path::Request(RequestPath::Vote).is_reply());
        assert!(!Path::Logging.is_reply());
    }
}
