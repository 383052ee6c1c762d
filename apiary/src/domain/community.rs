//! Communities, roles, and subscriptions.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Block number at which community operations begin to be interpreted.
pub const COMMUNITY_START_BLOCK: i64 = 37_500_000;

static COMMUNITY_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^hive-1\d{4,6}$").expect("valid regex"));

/// True iff `name` designates a community account.
pub fn is_community_name(name: &str) -> bool {
    COMMUNITY_NAME.is_match(name)
}

/// Extract the community type id encoded in the digit after `hive-`.
///
/// Returns `None` when the name is not a community name.
pub fn community_type_id(name: &str) -> Option<i16> {
    if !is_community_name(name) {
        return None;
    }
    name.as_bytes()
        .get(5)
        .map(|digit| i16::from(digit - b'0'))
}

/// A community: a specially named account carrying moderation state.
///
/// The row shares its id with the backing account.
#[derive(Debug, Clone, PartialEq)]
pub struct Community {
    pub id: i64,
    pub name: String,
    pub type_id: i16,
    pub lang: String,
    pub title: String,
    pub about: String,
    pub description: String,
    pub flag_text: String,
    pub is_nsfw: bool,
    pub subscribers: i64,
    pub rank: i64,
    pub category: String,
    /// Opaque settings JSON, stored as given.
    pub settings: String,
    pub created_at: DateTime<Utc>,
}

impl Community {
    /// Fresh community row for a just-registered account.
    pub fn registered(id: i64, name: String, type_id: i16, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            type_id,
            lang: "en".to_owned(),
            title: String::new(),
            about: String::new(),
            description: String::new(),
            flag_text: String::new(),
            is_nsfw: false,
            subscribers: 0,
            rank: 0,
            category: String::new(),
            settings: "{}".to_owned(),
            created_at,
        }
    }
}

/// Community membership role, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i16)]
pub enum CommunityRole {
    Muted = -2,
    Guest = 0,
    Member = 2,
    Mod = 4,
    Admin = 6,
    Owner = 8,
}

impl CommunityRole {
    /// Map an on-chain role name; unknown names fall back to guest.
    pub fn from_name(name: &str) -> Self {
        match name {
            "muted" => Self::Muted,
            "member" => Self::Member,
            "mod" => Self::Mod,
            "admin" => Self::Admin,
            "owner" => Self::Owner,
            _ => Self::Guest,
        }
    }

    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn as_name(self) -> &'static str {
        match self {
            Self::Muted => "muted",
            Self::Guest => "guest",
            Self::Member => "member",
            Self::Mod => "mod",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }

    pub fn from_i16(value: i16) -> Self {
        match value {
            -2 => Self::Muted,
            2 => Self::Member,
            4 => Self::Mod,
            6 => Self::Admin,
            8 => Self::Owner,
            _ => Self::Guest,
        }
    }
}

/// Partial community update extracted from an `updateProps` payload.
///
/// Only the allow-listed columns may change; unknown keys are ignored rather
/// than rejected so junk props cannot poison the operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommunityProps {
    pub title: Option<String>,
    pub about: Option<String>,
    pub lang: Option<String>,
    pub description: Option<String>,
    pub flag_text: Option<String>,
    pub is_nsfw: Option<bool>,
    pub settings: Option<String>,
}

impl CommunityProps {
    /// Pick the supported keys out of a raw props map.
    pub fn from_map(props: &serde_json::Map<String, serde_json::Value>) -> Self {
        let text = |key: &str| {
            props
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        };
        Self {
            title: text("title"),
            about: text("about"),
            lang: text("lang"),
            description: text("description"),
            flag_text: text("flag_text"),
            is_nsfw: props.get("is_nsfw").and_then(serde_json::Value::as_bool),
            settings: props
                .get("settings")
                .filter(|value| value.is_object())
                .map(ToString::to_string),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A role grant within a community.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub community_id: i64,
    pub account_id: i64,
    pub role: CommunityRole,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A community subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub community_id: i64,
    pub account_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Insertable subscription row.
pub type NewSubscription = Subscription;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("hive-112233", true)]
    #[case("hive-1234567", true)]
    #[case("hive-11111", false)] // too few trailing digits
    #[case("hive-212233", false)] // type digit must be 1
    #[case("hive-12345678", false)] // too many digits
    #[case("alice", false)]
    #[case("hive-", false)]
    fn community_name_law(#[case] name: &str, #[case] is_community: bool) {
        assert_eq!(is_community_name(name), is_community);
        assert_eq!(community_type_id(name).is_some(), is_community);
    }

    #[test]
    fn type_id_is_digit_after_prefix() {
        assert_eq!(community_type_id("hive-123456"), Some(1));
    }

    #[rstest]
    #[case("owner", CommunityRole::Owner)]
    #[case("mod", CommunityRole::Mod)]
    #[case("muted", CommunityRole::Muted)]
    #[case("stranger", CommunityRole::Guest)]
    fn role_names(#[case] name: &str, #[case] expected: CommunityRole) {
        assert_eq!(CommunityRole::from_name(name), expected);
    }

    #[test]
    fn role_ordering_reflects_privilege() {
        assert!(CommunityRole::Owner > CommunityRole::Admin);
        assert!(CommunityRole::Muted < CommunityRole::Guest);
    }

    #[test]
    fn props_pick_only_allowlisted_keys() {
        let raw = serde_json::json!({
            "title": "Photography",
            "is_nsfw": true,
            "settings": { "theme": "dark" },
            "subscribers": 9999,
            "rank": 1,
        });
        let props = CommunityProps::from_map(raw.as_object().expect("object"));
        assert_eq!(props.title.as_deref(), Some("Photography"));
        assert_eq!(props.is_nsfw, Some(true));
        assert!(props.settings.as_deref().expect("settings").contains("dark"));
        // Counter columns are not settable through props.
        assert_eq!(
            CommunityProps::from_map(
                serde_json::json!({ "subscribers": 5 }).as_object().expect("object")
            ),
            CommunityProps::default()
        );
    }
}
