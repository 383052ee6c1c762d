//! Posts, comments, and category normalization.

use chrono::{DateTime, Utc};

/// Maximum stored category length.
pub const CATEGORY_MAX: usize = 32;

/// A post or comment keyed by `(author, permlink)`.
///
/// Depth 0 is a root post; a comment inherits category, community, and the
/// valid/muted moderation flags from its parent at creation time. Deletion is
/// logical so a later `comment_operation` can resurrect the row.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub author: String,
    pub permlink: String,
    pub category: String,
    pub community_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub depth: i16,
    pub is_deleted: bool,
    pub is_pinned: bool,
    pub is_muted: bool,
    pub is_valid: bool,
    /// Cumulative promotion spend routed through burn transfers.
    pub promoted: f64,
}

impl Post {
    /// True for depth-0 posts, the only kind that appears in feeds and may
    /// be reblogged.
    pub fn is_root(&self) -> bool {
        self.depth == 0
    }
}

/// Insertable post row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    pub parent_id: Option<i64>,
    pub author: String,
    pub permlink: String,
    pub category: String,
    pub community_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub depth: i16,
    pub is_muted: bool,
    pub is_valid: bool,
}

/// Derive a root post's category from its raw `json_metadata` string.
///
/// The first entry of `tags` wins: modern metadata carries an array, legacy
/// metadata a whitespace-separated string. The result is lowercased, stripped
/// of a leading `#`, trimmed, and clamped to [`CATEGORY_MAX`] characters.
/// Anything unparseable yields the empty category.
pub fn normalize_category(json_metadata: &str) -> String {
    let first_tag = serde_json::from_str::<serde_json::Value>(json_metadata)
        .ok()
        .and_then(|meta| match meta.get("tags") {
            Some(serde_json::Value::Array(tags)) => tags
                .first()
                .and_then(serde_json::Value::as_str)
                .map(str::to_owned),
            Some(serde_json::Value::String(tags)) => {
                tags.split_whitespace().next().map(str::to_owned)
            }
            _ => None,
        });

    match first_tag {
        None => String::new(),
        Some(tag) => tag
            .trim()
            .trim_start_matches('#')
            .trim()
            .to_lowercase()
            .chars()
            .take(CATEGORY_MAX)
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(r#"{"tags":["Steem","other"]}"#, "steem")]
    #[case(r##"{"tags":["#Introduceyourself"]}"##, "introduceyourself")]
    #[case(r#"{"tags":"  photo life travel"}"#, "photo")]
    #[case(r#"{"tags":[]}"#, "")]
    #[case(r#"{"tags":[42]}"#, "")]
    #[case(r#"{}"#, "")]
    #[case("not json", "")]
    #[case("", "")]
    fn category_extraction(#[case] metadata: &str, #[case] expected: &str) {
        assert_eq!(normalize_category(metadata), expected);
    }

    #[test]
    fn category_is_clamped_to_thirty_two_chars() {
        let metadata = format!(r#"{{"tags":["{}"]}}"#, "a".repeat(100));
        assert_eq!(normalize_category(&metadata).len(), CATEGORY_MAX);
    }

    #[test]
    fn normalized_category_has_no_hash_or_upper() {
        let category = normalize_category(r#"{"tags":["  #MixedCase  "]}"#);
        assert_eq!(category, "mixedcase");
        assert!(!category.contains('#'));
        assert_eq!(category, category.to_lowercase());
    }
}
