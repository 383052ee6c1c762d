//! Shared builders for block payloads used across integration suites.
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{json, Value};

use apiary::domain::ports::BlockPayload;

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 6, 1, 12, 0, 0)
        .single()
        .expect("valid base time")
}

pub fn block_time(num: i64) -> DateTime<Utc> {
    base_time() + Duration::seconds(num * 3)
}

pub fn hex_id(num: i64) -> String {
    format!("{num:08x}{}", "a".repeat(32))
}

/// Build a block whose transactions each carry one operation.
pub fn block(num: i64, ops: Vec<Value>) -> BlockPayload {
    let timestamp = block_time(num).format("%Y-%m-%dT%H:%M:%S").to_string();
    let transactions: Vec<Value> = ops
        .into_iter()
        .map(|op| json!({ "operations": [op] }))
        .collect();
    let transaction_ids: Vec<String> = (0..transactions.len())
        .map(|idx| format!("{num:08x}{idx:032x}"))
        .collect();
    serde_json::from_value(json!({
        "block_num": num,
        "block_id": hex_id(num),
        "previous": if num > 1 { hex_id(num - 1) } else { String::new() },
        "timestamp": timestamp,
        "transactions": transactions,
        "transaction_ids": transaction_ids,
    }))
    .expect("valid block payload")
}

pub fn account_create(name: &str) -> Value {
    json!(["account_create_operation", { "new_account_name": name }])
}

pub fn comment(
    author: &str,
    permlink: &str,
    parent: Option<(&str, &str)>,
    metadata: &str,
) -> Value {
    let (parent_author, parent_permlink) = parent.unwrap_or(("", ""));
    json!(["comment_operation", {
        "author": author,
        "permlink": permlink,
        "parent_author": parent_author,
        "parent_permlink": parent_permlink,
        "title": "title",
        "body": "body",
        "json_metadata": metadata,
    }])
}

pub fn custom_json(id: &str, actor: &str, inner: &str) -> Value {
    json!(["custom_json_operation", {
        "id": id,
        "required_auths": [],
        "required_posting_auths": [actor],
        "json": inner,
    }])
}
