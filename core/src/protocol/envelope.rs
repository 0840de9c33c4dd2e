// Request and result envelopes carried inside data items and messages.

use super::paths::{Outcome, Path, RequestPath};
use crate::transport::{DataMap, FieldError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Data item field keys.
pub mod keys {
    pub const MESSAGE: &str = "message";
    pub const SUBJECT: &str = "subject";
    pub const TO_USER: &str = "to_user";
    pub const IS_DIRECT_MESSAGE: &str = "is_direct_message";
    pub const FULLNAME: &str = "fullname";
    pub const PERMALINK: &str = "permalink";
    pub const VOTE_DIRECTION: &str = "vote_direction";
    pub const DISMISS_AFTER_ACTION: &str = "dismiss_after_action";
    pub const ACTION_ORDER: &str = "action_order";
    /// Serialized content list (posts on `/posts`, comments on `/comments_content`).
    pub const CONTENT: &str = "posts";
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Field(#[from] FieldError),
    #[error("invalid request: {0}")]
    Invalid(String),
}

/// A remote operation one peer asks the other to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionRequest {
    Refresh,
    Vote {
        fullname: String,
        direction: i32,
    },
    ReplyToPost {
        fullname: String,
        text: String,
    },
    ReplyToDirectMessage {
        to_user: String,
        subject: String,
        text: String,
    },
    FetchComments {
        permalink: String,
    },
    OpenOnPhone {
        permalink: String,
    },
    SaveToService {
        permalink: String,
    },
}

impl ActionRequest {
    pub fn path(&self) -> RequestPath {
        match self {
            ActionRequest::Refresh => RequestPath::Refresh,
            ActionRequest::Vote { .. } => RequestPath::Vote,
            ActionRequest::ReplyToPost { .. } | ActionRequest::ReplyToDirectMessage { .. } => {
                RequestPath::Reply
            }
            ActionRequest::FetchComments { .. } => RequestPath::Comments,
            ActionRequest::OpenOnPhone { .. } => RequestPath::OpenOnPhone,
            ActionRequest::SaveToService { .. } => RequestPath::SaveToService,
        }
    }

    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionRequest::Refresh => "refresh",
            ActionRequest::Vote { direction, .. } if *direction > 0 => "vote_up",
            ActionRequest::Vote { .. } => "vote_down",
            ActionRequest::ReplyToPost { .. } => "reply_to_post",
            ActionRequest::ReplyToDirectMessage { .. } => "send_dm",
            ActionRequest::FetchComments { .. } => "get_comments",
            ActionRequest::OpenOnPhone { .. } => "open_on_phone",
            ActionRequest::SaveToService { .. } => "save_to_pocket",
        }
    }

    /// Whether this request travels as a message rather than a data item.
    pub fn is_message(&self) -> bool {
        matches!(self, ActionRequest::Refresh)
    }

    /// Encode as a data item body, stamped so repeats still propagate.
    pub fn to_data_map(&self) -> DataMap {
        let mut map = DataMap::new();
        match self {
            ActionRequest::Refresh => {}
            ActionRequest::Vote {
                fullname,
                direction,
            } => {
                map.put_string(keys::FULLNAME, fullname.as_str())
                    .put_int(keys::VOTE_DIRECTION, *direction);
            }
            ActionRequest::ReplyToPost { fullname, text } => {
                map.put_string(keys::FULLNAME, fullname.as_str())
                    .put_string(keys::MESSAGE, text.as_str())
                    .put_bool(keys::IS_DIRECT_MESSAGE, false);
            }
            ActionRequest::ReplyToDirectMessage {
                to_user,
                subject,
                text,
            } => {
                map.put_string(keys::TO_USER, to_user.as_str())
                    .put_string(keys::SUBJECT, subject.as_str())
                    .put_string(keys::MESSAGE, text.as_str())
                    .put_bool(keys::IS_DIRECT_MESSAGE, true);
            }
            ActionRequest::FetchComments { permalink }
            | ActionRequest::OpenOnPhone { permalink }
            | ActionRequest::SaveToService { permalink } => {
                map.put_string(keys::PERMALINK, permalink.as_str());
            }
        }
        map.stamp();
        map
    }

    /// Decode the request a data item at `path` carries.
    pub fn from_data_map(path: RequestPath, map: &DataMap) -> Result<Self, RequestError> {
        let request = match path {
            RequestPath::Refresh => ActionRequest::Refresh,
            RequestPath::Vote => ActionRequest::Vote {
                fullname: map.string(keys::FULLNAME)?.to_string(),
                direction: map.int(keys::VOTE_DIRECTION)?,
            },
            RequestPath::Reply => {
                let text = map.string(keys::MESSAGE)?.to_string();
                if map.bool_or_false(keys::IS_DIRECT_MESSAGE)? {
                    ActionRequest::ReplyToDirectMessage {
                        to_user: map.string(keys::TO_USER)?.to_string(),
                        subject: map.string(keys::SUBJECT)?.to_string(),
                        text,
                    }
                } else {
                    ActionRequest::ReplyToPost {
                        fullname: map.string(keys::FULLNAME)?.to_string(),
                        text,
                    }
                }
            }
            RequestPath::Comments => ActionRequest::FetchComments {
                permalink: map.string(keys::PERMALINK)?.to_string(),
            },
            RequestPath::OpenOnPhone => ActionRequest::OpenOnPhone {
                permalink: map.string(keys::PERMALINK)?.to_string(),
            },
            RequestPath::SaveToService => ActionRequest::SaveToService {
                permalink: map.string(keys::PERMALINK)?.to_string(),
            },
        };
        Ok(request)
    }

    /// Reject requests whose target or parameters cannot succeed remotely.
    pub fn validate(&self) -> Result<(), RequestError> {
        fn non_empty(field: &str, value: &str) -> Result<(), RequestError> {
            if value.trim().is_empty() {
                Err(RequestError::Invalid(format!("{} is empty", field)))
            } else {
                Ok(())
            }
        }

        match self {
            ActionRequest::Refresh => Ok(()),
            ActionRequest::Vote {
                fullname,
                direction,
            } => {
                non_empty(keys::FULLNAME, fullname)?;
                if !(-1..=1).contains(direction) {
                    return Err(RequestError::Invalid(format!(
                        "vote direction {} not in -1..=1",
                        direction
                    )));
                }
                Ok(())
            }
            ActionRequest::ReplyToPost { fullname, text } => {
                non_empty(keys::FULLNAME, fullname)?;
                non_empty(keys::MESSAGE, text)
            }
            ActionRequest::ReplyToDirectMessage {
                to_user,
                subject,
                text,
            } => {
                non_empty(keys::TO_USER, to_user)?;
                non_empty(keys::SUBJECT, subject)?;
                non_empty(keys::MESSAGE, text)
            }
            ActionRequest::FetchComments { permalink }
            | ActionRequest::OpenOnPhone { permalink }
            | ActionRequest::SaveToService { permalink } => non_empty(keys::PERMALINK, permalink),
        }
    }
}

/// The single completion value of a dispatched request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultEnvelope {
    pub request: RequestPath,
    pub outcome: Outcome,
    /// Kept local: failure replies go out without payload.
    pub error: Option<String>,
}

impl ResultEnvelope {
    pub fn success(request: RequestPath) -> Self {
        Self {
            request,
            outcome: Outcome::Success,
            error: None,
        }
    }

    pub fn failure(request: RequestPath, error: impl Into<String>) -> Self {
        Self {
            request,
            outcome: Outcome::Failed,
            error: Some(error.into()),
        }
    }

    pub fn reply_path(&self) -> Path {
        self.request.reply_path(self.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_roundtrip_through_data_map() {
        let request = ActionRequest::Vote {
            fullname: "t3_abc".to_string(),
            direction: 1,
        };
        let map = request.to_data_map();
        assert!(map.contains_key(crate::transport::KEY_TIMESTAMP));
        assert_eq!(
            ActionRequest::from_data_map(RequestPath::Vote, &map).unwrap(),
            request
        );
    }

    #[test]
    fn test_reply_flag_selects_direct_message() {
        let mut map = DataMap::new();
        map.put_string(keys::MESSAGE, "thanks")
            .put_string(keys::SUBJECT, "re: hello")
            .put_string(keys::TO_USER, "someone")
            .put_string(keys::FULLNAME, "t4_x")
            .put_bool(keys::IS_DIRECT_MESSAGE, true);

        assert_eq!(
            ActionRequest::from_data_map(RequestPath::Reply, &map).unwrap(),
            ActionRequest::ReplyToDirectMessage {
                to_user: "someone".to_string(),
                subject: "re: hello".to_string(),
                text: "thanks".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let mut map = DataMap::new();
        map.put_string(keys::FULLNAME, "t3_abc");
        let err = ActionRequest::from_data_map(RequestPath::Vote, &map).unwrap_err();
        assert_eq!(
            err,
            RequestError::Field(FieldError::Missing(keys::VOTE_DIRECTION.to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_empty_target() {
        let request = ActionRequest::ReplyToPost {
            fullname: String::new(),
            text: "nice".to_string(),
        };
        assert!(matches!(request.validate(), Err(RequestError::Invalid(_))));
    }

    #[test]
    fn test_validate_vote_direction() {
        for direction in [-1, 0, 1] {
            let request = ActionRequest::Vote {
                fullname: "t3_abc".to_string(),
                direction,
            };
            assert!(request.validate().is_ok());
        }
        let request = ActionRequest::Vote {
            fullname: "t3_abc".to_string(),
            direction: 2,
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_result_envelope_reply_path() {
        let ok = ResultEnvelope::success(RequestPath::Vote);
        assert_eq!(ok.reply_path().as_str(), "/vote_result_success");
        let failed = ResultEnvelope::failure(RequestPath::Reply, "boom");
        assert_eq!(failed.reply_path().as_str(), "/reply_result_failed");
    }
}
