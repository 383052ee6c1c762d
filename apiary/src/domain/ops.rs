//! Typed operation records parsed at dispatch time.
//!
//! On-chain operation bodies arrive as loosely typed JSON maps; each indexer
//! parses its operation class into one of these records and fails soft (log
//! and skip) on shape mismatches instead of propagating untyped maps.

use serde::Deserialize;
use serde_json::Value;

use crate::domain::error::OpError;

/// `comment_operation` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CommentOp {
    pub author: String,
    pub permlink: String,
    #[serde(default)]
    pub parent_author: String,
    #[serde(default)]
    pub parent_permlink: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub json_metadata: String,
}

impl CommentOp {
    /// A root post leaves both parent fields empty.
    pub fn is_root(&self) -> bool {
        self.parent_author.is_empty() && self.parent_permlink.is_empty()
    }
}

/// `delete_comment_operation` body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeleteCommentOp {
    pub author: String,
    pub permlink: String,
}

/// `vote_operation` body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VoteOp {
    pub voter: String,
    pub author: String,
    pub permlink: String,
    #[serde(default)]
    pub weight: i32,
}

/// `transfer_operation` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransferOp {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub memo: String,
}

/// `custom_json_operation` body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CustomJsonBody {
    pub id: String,
    #[serde(default)]
    pub required_auths: Vec<String>,
    #[serde(default)]
    pub required_posting_auths: Vec<String>,
    #[serde(default)]
    pub json: String,
}

impl CustomJsonBody {
    /// The acting account: exactly one posting auth, anything else drops the
    /// operation.
    pub fn actor(&self) -> Option<&str> {
        match self.required_posting_auths.as_slice() {
            [single] if !single.is_empty() => Some(single),
            _ => None,
        }
    }
}

/// Extract the account name created by an account-creating operation, if the
/// operation kind is one.
pub fn created_account_name(kind: &str, body: &Value) -> Option<String> {
    let name = match kind {
        "pow_operation" => body.get("worker_account")?.as_str()?,
        "pow2_operation" => body
            .get("work")?
            .get("value")?
            .get("input")?
            .get("worker_account")?
            .as_str()?,
        "account_create_operation"
        | "account_create_with_delegation_operation"
        | "create_claimed_account_operation" => body.get("new_account_name")?.as_str()?,
        _ => return None,
    };
    (!name.is_empty()).then(|| name.to_owned())
}

/// Inner `follow`-id payload: a follow state change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FollowOp {
    #[serde(default)]
    pub follower: String,
    #[serde(default)]
    pub following: String,
    #[serde(default)]
    pub what: Vec<String>,
}

/// Inner `follow`-id payload: a reblog or un-reblog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReblogOp {
    #[serde(default)]
    pub account: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub permlink: String,
    #[serde(default)]
    pub delete: Option<String>,
}

impl ReblogOp {
    /// The delete variant is spelled `"delete": "delete"` on chain.
    pub fn is_delete(&self) -> bool {
        self.delete.as_deref() == Some("delete")
    }
}

/// The three wire shapes carried under the `follow` custom-json id.
///
/// Discrimination order: legacy `["reblog", {...}]` tuple, legacy
/// `["follow", {...}]` tuple, object with `author` + `permlink` (reblog),
/// anything else parses as a follow object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowDialect {
    Follow(FollowOp),
    Reblog(ReblogOp),
}

impl FollowDialect {
    /// Parse the raw inner JSON string of a `follow`-id operation.
    pub fn parse(raw: &str) -> Result<Self, OpError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| OpError::payload(format!("follow op is not JSON: {err}")))?;

        if let Value::Array(items) = &value {
            let [tag, payload] = items.as_slice() else {
                return Err(OpError::payload("follow tuple must have two elements"));
            };
            return match tag.as_str() {
                Some("reblog") => Ok(Self::Reblog(parse_payload(payload, "reblog")?)),
                Some("follow") => Ok(Self::Follow(parse_payload(payload, "follow")?)),
                other => Err(OpError::payload(format!(
                    "unknown follow tuple tag: {other:?}"
                ))),
            };
        }

        let looks_like_reblog = value.get("author").is_some() && value.get("permlink").is_some();
        if looks_like_reblog {
            Ok(Self::Reblog(parse_payload(&value, "reblog")?))
        } else {
            Ok(Self::Follow(parse_payload(&value, "follow")?))
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(value: &Value, what: &str) -> Result<T, OpError> {
    serde_json::from_value(value.clone())
        .map_err(|err| OpError::payload(format!("bad {what} payload: {err}")))
}

/// Inner `notify`-id payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum NotifyOp {
    /// Advance the account's notification read watermark.
    #[serde(rename = "setLastRead")]
    SetLastRead { date: String },
}

impl NotifyOp {
    pub fn parse(raw: &str) -> Result<Self, OpError> {
        serde_json::from_str(raw)
            .map_err(|err| OpError::payload(format!("bad notify payload: {err}")))
    }
}

/// Inner `community`-id payloads, dispatched on their `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum CommunityAction {
    #[serde(rename = "subscribe")]
    Subscribe { community: String },
    #[serde(rename = "unsubscribe")]
    Unsubscribe { community: String },
    #[serde(rename = "setRole")]
    SetRole {
        community: String,
        account: String,
        role: String,
    },
    #[serde(rename = "setUserTitle")]
    SetUserTitle {
        community: String,
        account: String,
        #[serde(default)]
        title: String,
    },
    #[serde(rename = "updateProps")]
    UpdateProps {
        community: String,
        props: serde_json::Map<String, Value>,
    },
    #[serde(rename = "mutePost")]
    MutePost {
        community: String,
        account: String,
        permlink: String,
        #[serde(default)]
        notes: Option<String>,
    },
    #[serde(rename = "unmutePost")]
    UnmutePost {
        community: String,
        account: String,
        permlink: String,
        #[serde(default)]
        notes: Option<String>,
    },
    #[serde(rename = "pinPost")]
    PinPost {
        community: String,
        account: String,
        permlink: String,
        #[serde(default)]
        notes: Option<String>,
    },
    #[serde(rename = "unpinPost")]
    UnpinPost {
        community: String,
        account: String,
        permlink: String,
        #[serde(default)]
        notes: Option<String>,
    },
    #[serde(rename = "flagPost")]
    FlagPost {
        community: String,
        account: String,
        permlink: String,
        #[serde(default)]
        notes: Option<String>,
    },
}

impl CommunityAction {
    pub fn parse(raw: &str) -> Result<Self, OpError> {
        serde_json::from_str(raw)
            .map_err(|err| OpError::payload(format!("bad community payload: {err}")))
    }

    /// The community the action targets.
    pub fn community(&self) -> &str {
        match self {
            Self::Subscribe { community }
            | Self::Unsubscribe { community }
            | Self::SetRole { community, .. }
            | Self::SetUserTitle { community, .. }
            | Self::UpdateProps { community, .. }
            | Self::MutePost { community, .. }
            | Self::UnmutePost { community, .. }
            | Self::PinPost { community, .. }
            | Self::UnpinPost { community, .. }
            | Self::FlagPost { community, .. } => community,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn legacy_reblog_tuple_routes_to_reblog() {
        let raw = r#"["reblog",{"account":"bob","author":"alice","permlink":"p1"}]"#;
        let dialect = FollowDialect::parse(raw).expect("parses");
        assert!(matches!(
            dialect,
            FollowDialect::Reblog(ReblogOp { ref author, .. }) if author == "alice"
        ));
    }

    #[test]
    fn legacy_follow_tuple_routes_to_follow() {
        let raw = r#"["follow",{"follower":"alice","following":"bob","what":["blog"]}]"#;
        let dialect = FollowDialect::parse(raw).expect("parses");
        assert!(matches!(
            dialect,
            FollowDialect::Follow(FollowOp { ref following, .. }) if following == "bob"
        ));
    }

    #[test]
    fn object_with_author_and_permlink_is_reblog() {
        let raw = r#"{"account":"bob","author":"alice","permlink":"p1","delete":"delete"}"#;
        match FollowDialect::parse(raw).expect("parses") {
            FollowDialect::Reblog(op) => assert!(op.is_delete()),
            other => panic!("expected reblog, got {other:?}"),
        }
    }

    #[test]
    fn plain_object_is_follow() {
        let raw = r#"{"follower":"alice","following":"bob","what":[]}"#;
        assert!(matches!(
            FollowDialect::parse(raw),
            Ok(FollowDialect::Follow(_))
        ));
    }

    #[rstest]
    #[case("not json")]
    #[case(r#"["reblog"]"#)]
    #[case(r#"["mystery",{}]"#)]
    fn malformed_follow_payloads_error(#[case] raw: &str) {
        assert!(FollowDialect::parse(raw).is_err());
    }

    #[test]
    fn custom_json_actor_requires_exactly_one_posting_auth() {
        let mut body = CustomJsonBody {
            required_posting_auths: vec!["alice".into()],
            ..CustomJsonBody::default()
        };
        assert_eq!(body.actor(), Some("alice"));

        body.required_posting_auths.push("bob".into());
        assert_eq!(body.actor(), None);

        body.required_posting_auths.clear();
        assert_eq!(body.actor(), None);
    }

    #[rstest]
    #[case("pow_operation", r#"{"worker_account":"miner"}"#, Some("miner"))]
    #[case(
        "pow2_operation",
        r#"{"work":{"value":{"input":{"worker_account":"miner2"}}}}"#,
        Some("miner2")
    )]
    #[case("account_create_operation", r#"{"new_account_name":"fresh"}"#, Some("fresh"))]
    #[case("create_claimed_account_operation", r#"{"new_account_name":"c"}"#, Some("c"))]
    #[case("account_create_operation", r#"{}"#, None)]
    #[case("vote_operation", r#"{"new_account_name":"x"}"#, None)]
    fn account_creating_ops(
        #[case] kind: &str,
        #[case] body: &str,
        #[case] expected: Option<&str>,
    ) {
        let body: Value = serde_json::from_str(body).expect("valid test body");
        assert_eq!(
            created_account_name(kind, &body).as_deref(),
            expected
        );
    }

    #[test]
    fn community_action_dispatches_on_type() {
        let action = CommunityAction::parse(
            r#"{"type":"setRole","community":"hive-112233","account":"bob","role":"mod"}"#,
        )
        .expect("parses");
        assert!(matches!(
            &action,
            CommunityAction::SetRole { role, .. } if role == "mod"
        ));
        assert_eq!(action.community(), "hive-112233");
    }

    #[test]
    fn unknown_community_action_is_an_error() {
        assert!(CommunityAction::parse(r#"{"type":"explode","community":"hive-112233"}"#).is_err());
    }

    #[test]
    fn notify_set_last_read_parses() {
        let op = NotifyOp::parse(r#"{"type":"setLastRead","date":"2020-01-01T00:00:00"}"#)
            .expect("parses");
        let NotifyOp::SetLastRead { date } = op;
        assert_eq!(date, "2020-01-01T00:00:00");
    }
}
