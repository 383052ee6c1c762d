//! Materialized per-post projection with ranking scores.

use chrono::{DateTime, Utc};

/// Timescale divisor for the trending score.
pub const TREND_TIMESCALE: f64 = 480_000.0;
/// Timescale divisor for the hot score.
pub const HOT_TIMESCALE: f64 = 10_000.0;

/// Ranking score combining vote weight with recency.
///
/// Mirrors the chain's tags-plugin calculation: the rshares magnitude
/// contributes its order of magnitude (after a 1e7 damping divisor), signed,
/// plus the creation timestamp scaled by the sort's timescale.
pub fn ranking_score(rshares: i64, created_at: DateTime<Utc>, timescale: f64) -> f64 {
    let mod_score = rshares as f64 / 10_000_000.0;
    let order = mod_score.abs().max(1.0).log10();
    let sign = if mod_score > 0.0 { 1.0 } else { -1.0 };
    sign * order + created_at.timestamp() as f64 / timescale
}

/// Sort orders served by the discussion cursors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankedSort {
    Trending,
    Hot,
    Created,
    Promoted,
    Payout,
    PayoutComments,
    Muted,
}

impl RankedSort {
    pub fn from_method_suffix(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "trending" => Self::Trending,
            "hot" => Self::Hot,
            "created" => Self::Created,
            "promoted" => Self::Promoted,
            "payout" => Self::Payout,
            "payout_comments" => Self::PayoutComments,
            "muted" => Self::Muted,
            _ => return None,
        })
    }
}

/// Cached presentation and ranking fields for one post.
#[derive(Debug, Clone, PartialEq)]
pub struct PostCacheEntry {
    pub post_id: i64,
    pub author: String,
    pub permlink: String,
    pub category: String,
    pub depth: i16,
    pub title: String,
    pub preview: String,
    pub body: String,
    pub img_url: String,
    pub json_metadata: String,
    pub payout: f64,
    pub promoted: f64,
    pub rshares: i64,
    /// CSV-serialized `voter,rshares,percent,reputation` rows.
    pub votes: String,
    pub children: i32,
    pub sc_trend: f64,
    pub sc_hot: f64,
    pub is_paidout: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).single().expect("valid timestamp")
    }

    #[test]
    fn zero_rshares_scores_pure_recency() {
        let score = ranking_score(0, at(480_000), TREND_TIMESCALE);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn more_rshares_outranks_at_equal_age() {
        let when = at(1_500_000_000);
        let low = ranking_score(50_000_000, when, TREND_TIMESCALE);
        let high = ranking_score(5_000_000_000, when, TREND_TIMESCALE);
        assert!(high > low);
    }

    #[test]
    fn newer_post_outranks_at_equal_votes() {
        let older = ranking_score(1_000_000_000, at(1_500_000_000), TREND_TIMESCALE);
        let newer = ranking_score(1_000_000_000, at(1_500_480_000), TREND_TIMESCALE);
        assert!(newer > older);
    }

    #[test]
    fn negative_rshares_penalize() {
        let when = at(1_500_000_000);
        let neutral = ranking_score(0, when, HOT_TIMESCALE);
        let flagged = ranking_score(-5_000_000_000, when, HOT_TIMESCALE);
        assert!(flagged < neutral);
    }

    #[test]
    fn sub_threshold_rshares_do_not_contribute() {
        let when = at(1_500_000_000);
        // |rshares / 1e7| < 1 collapses to log10(1) = 0.
        assert_eq!(
            ranking_score(5_000_000, when, TREND_TIMESCALE),
            ranking_score(0, when, TREND_TIMESCALE)
        );
    }
}
