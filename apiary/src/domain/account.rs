//! Account identity and sanitized profile metadata.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Maximum length of an on-chain account name.
pub const ACCOUNT_NAME_MAX: usize = 16;

/// Default reputation assigned at registration; recomputation from vote
/// rshares is deferred.
pub const DEFAULT_REPUTATION: f64 = 25.0;

/// A chain account as projected into the relational store.
///
/// Accounts are created exactly once, on first appearance in an
/// account-creating operation, and never deleted. Follower/following counts
/// are maintained by delta at block-flush time and reconcilable by a full
/// recount.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub reputation: f64,
    pub followers: i64,
    pub following: i64,
    /// Notification watermark; notifications created after this instant
    /// count as unread.
    pub lastread_at: DateTime<Utc>,
    /// Last time the dirty-set flusher refreshed this row from the chain.
    pub cached_at: DateTime<Utc>,
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub profile_image: Option<String>,
    pub cover_image: Option<String>,
}

/// Insertable account row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAccount {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub reputation: f64,
}

impl NewAccount {
    /// Registration row with the default reputation.
    pub fn registered(name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            created_at,
            reputation: DEFAULT_REPUTATION,
        }
    }
}

/// Sanitized profile fields extracted from raw chain account metadata.
///
/// The chain does not validate profile JSON; this type is the only path
/// through which profile strings reach the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountProfile {
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub location: Option<String>,
    pub website: Option<String>,
    pub profile_image: Option<String>,
    pub cover_image: Option<String>,
}

static URL_SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new("^https?://").expect("valid regex"));

impl AccountProfile {
    /// Extract a sanitized profile from a raw `get_accounts` entry.
    ///
    /// Parsing is fail-soft: malformed or missing `json_metadata.profile`
    /// yields an empty profile rather than an error, matching how canonical
    /// nodes tolerate junk metadata.
    pub fn from_raw_account(raw: &serde_json::Value) -> Self {
        let profile = raw
            .get("json_metadata")
            .and_then(serde_json::Value::as_str)
            .and_then(|meta| serde_json::from_str::<serde_json::Value>(meta).ok())
            .and_then(|meta| meta.get("profile").cloned())
            .filter(serde_json::Value::is_object)
            .unwrap_or_default();

        let field = |key: &str| {
            profile
                .get(key)
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned)
        };

        let display_name = clean_text(field("name"), 20)
            // An @-prefixed display name impersonates a mention.
            .filter(|name| !name.starts_with('@'));
        let about = clean_text(field("about"), 160);
        let location = clean_text(field("location"), 30);
        let website = field("website")
            .filter(|url| !url.is_empty() && url.len() <= 100)
            .map(|url| {
                if URL_SCHEME.is_match(&url) {
                    url
                } else {
                    format!("http://{url}")
                }
            });
        let profile_image = clean_image_url(field("profile_image"));
        let cover_image = clean_image_url(field("cover_image"));

        Self {
            display_name,
            about,
            location,
            website,
            profile_image,
            cover_image,
        }
    }
}

/// Reject NUL-bearing strings (Postgres forbids them) and clamp length on a
/// char boundary.
fn clean_text(value: Option<String>, max: usize) -> Option<String> {
    let value = value?;
    if value.is_empty() || value.contains('\u{0}') {
        return None;
    }
    Some(value.chars().take(max).collect())
}

fn clean_image_url(value: Option<String>) -> Option<String> {
    value.filter(|url| url.len() <= 1024 && URL_SCHEME.is_match(url))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn raw_with_profile(profile: serde_json::Value) -> serde_json::Value {
        json!({
            "name": "alice",
            "json_metadata": json!({ "profile": profile }).to_string(),
        })
    }

    #[test]
    fn extracts_all_fields_from_valid_profile() {
        let raw = raw_with_profile(json!({
            "name": "Alice",
            "about": "writes things",
            "location": "earth",
            "website": "alice.example",
            "profile_image": "https://img.example/a.png",
            "cover_image": "https://img.example/c.png",
        }));
        let profile = AccountProfile::from_raw_account(&raw);
        assert_eq!(profile.display_name.as_deref(), Some("Alice"));
        assert_eq!(profile.website.as_deref(), Some("http://alice.example"));
        assert_eq!(
            profile.profile_image.as_deref(),
            Some("https://img.example/a.png")
        );
    }

    #[test]
    fn malformed_metadata_yields_empty_profile() {
        let raw = json!({ "name": "alice", "json_metadata": "{not json" });
        assert_eq!(AccountProfile::from_raw_account(&raw), AccountProfile::default());
    }

    #[rstest]
    #[case(json!({ "name": "@impostor" }))]
    #[case(json!({ "name": "nul\u{0}byte" }))]
    fn rejected_display_names(#[case] profile: serde_json::Value) {
        let raw = raw_with_profile(profile);
        assert!(AccountProfile::from_raw_account(&raw).display_name.is_none());
    }

    #[test]
    fn non_http_image_urls_are_dropped() {
        let raw = raw_with_profile(json!({ "profile_image": "ftp://bad.example/x.png" }));
        assert!(AccountProfile::from_raw_account(&raw).profile_image.is_none());
    }

    #[test]
    fn overlong_about_is_clamped() {
        let raw = raw_with_profile(json!({ "about": "x".repeat(500) }));
        let profile = AccountProfile::from_raw_account(&raw);
        assert_eq!(profile.about.map(|s| s.len()), Some(160));
    }
}
