//! Promotion payments routed through burn transfers.

use chrono::{DateTime, Utc};

/// Token denomination accepted on promotion transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentToken {
    Sbd,
    Steem,
}

impl PaymentToken {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sbd => "SBD",
            Self::Steem => "STEEM",
        }
    }

    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "SBD" => Some(Self::Sbd),
            "STEEM" => Some(Self::Steem),
            _ => None,
        }
    }
}

/// A recorded transfer to the burn account.
#[derive(Debug, Clone, PartialEq)]
pub struct Payment {
    pub id: i64,
    pub block_num: i64,
    pub tx_idx: i16,
    pub from_account: String,
    pub to_account: String,
    pub amount: f64,
    pub token: PaymentToken,
    pub memo: String,
    pub post_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Insertable payment row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPayment {
    pub block_num: i64,
    pub tx_idx: i16,
    pub from_account: String,
    pub to_account: String,
    pub amount: f64,
    pub token: PaymentToken,
    pub memo: String,
    pub post_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Parse an asset string of the form `"5.000 SBD"`.
///
/// Returns `None` for malformed numbers or tokens outside {SBD, STEEM}.
pub fn parse_amount(raw: &str) -> Option<(f64, PaymentToken)> {
    let mut parts = raw.split_whitespace();
    let amount: f64 = parts.next()?.parse().ok()?;
    let token = PaymentToken::from_symbol(parts.next()?)?;
    if parts.next().is_some() || !amount.is_finite() {
        return None;
    }
    Some((amount, token))
}

/// Parse a promotion memo of the form `@author/permlink`.
pub fn parse_post_memo(memo: &str) -> Option<(&str, &str)> {
    let rest = memo.strip_prefix('@')?;
    let (author, permlink) = rest.split_once('/')?;
    if author.is_empty() || permlink.is_empty() {
        return None;
    }
    Some((author, permlink))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("5.000 SBD", Some((5.0, PaymentToken::Sbd)))]
    #[case("0.001 STEEM", Some((0.001, PaymentToken::Steem)))]
    #[case("5.000 VESTS", None)]
    #[case("abc SBD", None)]
    #[case("5.000", None)]
    #[case("", None)]
    #[case("5.000 SBD extra", None)]
    fn amount_parsing(#[case] raw: &str, #[case] expected: Option<(f64, PaymentToken)>) {
        assert_eq!(parse_amount(raw), expected);
    }

    #[rstest]
    #[case("@alice/p1", Some(("alice", "p1")))]
    #[case("@alice/deep/slug", Some(("alice", "deep/slug")))]
    #[case("alice/p1", None)]
    #[case("@/p1", None)]
    #[case("@alice/", None)]
    #[case("thanks!", None)]
    fn memo_parsing(#[case] memo: &str, #[case] expected: Option<(&str, &str)>) {
        assert_eq!(parse_post_memo(memo), expected);
    }
}
