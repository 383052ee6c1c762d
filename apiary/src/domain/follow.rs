//! Follow relationships and their state bitmask.

use chrono::{DateTime, Utc};

/// Follow state bitmask: bit 1 = blog, bit 2 = ignore.
///
/// The on-chain `what` list maps onto bits; an empty list clears the
/// relationship. State 3 (both bits) is representable and preserved as the
/// chain recorded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FollowState(pub i16);

impl FollowState {
    pub const NONE: Self = Self(0);
    pub const BLOG: Self = Self(1);
    pub const IGNORE: Self = Self(2);

    /// Compute the state from the operation's `what` entries. Unknown
    /// entries are ignored; absence of a known entry clears its bit.
    pub fn from_what<S: AsRef<str>>(what: &[S]) -> Self {
        let mut state = 0i16;
        for entry in what {
            match entry.as_ref() {
                "blog" => state |= Self::BLOG.0,
                "ignore" => state |= Self::IGNORE.0,
                _ => {}
            }
        }
        Self(state)
    }

    pub fn follows_blog(self) -> bool {
        self.0 & Self::BLOG.0 != 0
    }

    pub fn ignores(self) -> bool {
        self.0 & Self::IGNORE.0 != 0
    }
}

/// A follow edge between two accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Follow {
    pub follower_id: i64,
    pub following_id: i64,
    pub state: FollowState,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(&[], 0)]
    #[case(&["blog"], 1)]
    #[case(&["ignore"], 2)]
    #[case(&["blog", "ignore"], 3)]
    #[case(&["posts"], 0)]
    #[case(&["blog", "blog"], 1)]
    fn what_maps_to_state(#[case] what: &[&str], #[case] expected: i16) {
        assert_eq!(FollowState::from_what(what).0, expected);
    }

    #[test]
    fn transitions_preserve_only_final_value() {
        // Round-trip through every state; only the last application matters.
        let sequence: &[&[&str]] = &[&["blog"], &["blog", "ignore"], &[], &["ignore"]];
        let final_state = sequence
            .iter()
            .fold(FollowState::NONE, |_, what| FollowState::from_what(what));
        assert_eq!(final_state, FollowState::IGNORE);
    }
}
