//! Notification records and kinds.

use chrono::{DateTime, Utc};

/// Score assigned when an operation supplies no override.
pub const DEFAULT_NOTIFY_SCORE: i16 = 35;

/// Notification kind discriminant, persisted as a small integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum NotifyKind {
    NewCommunity = 1,
    SetRole = 2,
    SetProps = 3,
    SetLabel = 4,
    MutePost = 5,
    UnmutePost = 6,
    PinPost = 7,
    UnpinPost = 8,
    FlagPost = 9,
    Error = 10,
    Subscribe = 11,
    Reply = 12,
    ReplyComment = 13,
    Reblog = 14,
    Follow = 15,
    Mention = 16,
    Vote = 17,
}

impl NotifyKind {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i16(value: i16) -> Option<Self> {
        Some(match value {
            1 => Self::NewCommunity,
            2 => Self::SetRole,
            3 => Self::SetProps,
            4 => Self::SetLabel,
            5 => Self::MutePost,
            6 => Self::UnmutePost,
            7 => Self::PinPost,
            8 => Self::UnpinPost,
            9 => Self::FlagPost,
            10 => Self::Error,
            11 => Self::Subscribe,
            12 => Self::Reply,
            13 => Self::ReplyComment,
            14 => Self::Reblog,
            15 => Self::Follow,
            16 => Self::Mention,
            17 => Self::Vote,
            _ => return None,
        })
    }

    /// Wire/display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewCommunity => "new_community",
            Self::SetRole => "set_role",
            Self::SetProps => "set_props",
            Self::SetLabel => "set_label",
            Self::MutePost => "mute_post",
            Self::UnmutePost => "unmute_post",
            Self::PinPost => "pin_post",
            Self::UnpinPost => "unpin_post",
            Self::FlagPost => "flag_post",
            Self::Error => "error",
            Self::Subscribe => "subscribe",
            Self::Reply => "reply",
            Self::ReplyComment => "reply_comment",
            Self::Reblog => "reblog",
            Self::Follow => "follow",
            Self::Mention => "mention",
            Self::Vote => "vote",
        }
    }

    /// Kinds produced in bulk during normal operation; these skip info-level
    /// logging in the writer.
    pub fn is_high_volume(self) -> bool {
        matches!(
            self,
            Self::Reply | Self::ReplyComment | Self::Reblog | Self::Follow | Self::Mention | Self::Vote
        )
    }
}

/// A stored notification.
///
/// At least one of the four references is set; `src_id == dst_id` never
/// occurs (a user does not notify themselves).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: i64,
    pub kind: NotifyKind,
    pub score: i16,
    pub created_at: DateTime<Utc>,
    pub src_id: Option<i64>,
    pub dst_id: Option<i64>,
    pub community_id: Option<i64>,
    pub post_id: Option<i64>,
    pub payload: Option<String>,
}

/// Insertable notification row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub kind: NotifyKind,
    pub score: i16,
    pub created_at: DateTime<Utc>,
    pub src_id: Option<i64>,
    pub dst_id: Option<i64>,
    pub community_id: Option<i64>,
    pub post_id: Option<i64>,
    pub payload: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_i16() {
        for value in 1..=17 {
            let kind = NotifyKind::from_i16(value).expect("valid kind");
            assert_eq!(kind.as_i16(), value);
        }
        assert_eq!(NotifyKind::from_i16(0), None);
        assert_eq!(NotifyKind::from_i16(18), None);
    }

    #[test]
    fn high_volume_kinds_match_writer_policy() {
        assert!(NotifyKind::Vote.is_high_volume());
        assert!(NotifyKind::Reblog.is_high_volume());
        assert!(!NotifyKind::NewCommunity.is_high_volume());
        assert!(!NotifyKind::Subscribe.is_high_volume());
    }
}
