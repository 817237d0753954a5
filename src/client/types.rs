//! Typed REST responses.
//!
//! The exchange is inconsistent about field names across endpoints and API
//! versions. Where a logical value has several known spellings it is read
//! through an explicit, ordered fallback list rather than serde aliases, so
//! the accepted shapes are visible in one place.

use super::ClientError;
use crate::builder::Side;
use crate::orderbook::{parse_decimal, parse_timestamp};
use alloy::primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Known spellings, in lookup order.
const ORDER_ID_FIELDS: &[&str] = &["id", "orderID", "order_id"];
const TOKEN_ID_FIELDS: &[&str] = &["asset_id", "token_id", "tokenId", "assetId"];
const MARKET_FIELDS: &[&str] = &["market", "condition_id", "conditionId"];
const ORIGINAL_SIZE_FIELDS: &[&str] = &["original_size", "originalSize", "size"];
const SIZE_MATCHED_FIELDS: &[&str] = &["size_matched", "sizeMatched"];
const CREATED_AT_FIELDS: &[&str] = &["created_at", "createdAt"];
const LIST_FIELDS: &[&str] = &["data", "orders"];

/// First present, non-null value among `names`.
pub(crate) fn field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| value.get(*name))
        .find(|v| !v.is_null())
}

pub(crate) fn string_field(value: &Value, names: &[&str]) -> Option<String> {
    match field(value, names)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `POST /order` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, rename = "orderID")]
    pub order_id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, rename = "errorMsg")]
    pub error_msg: String,
    #[serde(default)]
    pub error: String,
    #[serde(default, rename = "transactionsHashes")]
    pub transaction_hashes: Vec<String>,
}

impl OrderResponse {
    /// Server-supplied rejection text: `errorMsg`, then `error`.
    pub fn reason(&self) -> Option<&str> {
        [self.error_msg.as_str(), self.error.as_str()]
            .into_iter()
            .find(|s| !s.is_empty())
    }

    /// Turn a `success: false` payload into [`ClientError::Rejected`].
    pub fn into_result(self) -> Result<OrderResponse, ClientError> {
        if self.success {
            Ok(self)
        } else {
            Err(ClientError::Rejected {
                reason: self.reason().unwrap_or("no reason given").to_string(),
            })
        }
    }
}

/// `GET /auth/derive-api-key` response. Holds the secret, so no `Debug`.
#[derive(Deserialize)]
pub(crate) struct ApiKeyResponse {
    #[serde(rename = "apiKey")]
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

/// `DELETE /cancel-all` response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelAllResponse {
    #[serde(default)]
    pub canceled: Vec<String>,
    #[serde(default)]
    pub not_canceled: Value,
}

/// One entry from `GET /data/orders`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOrder {
    pub id: String,
    pub token_id: String,
    pub market: Option<String>,
    pub side: Option<Side>,
    pub price: Decimal,
    pub original_size: Decimal,
    pub size_matched: Decimal,
    pub status: String,
    pub created_at: Option<i64>,
}

impl OpenOrder {
    /// Entries without an identifier are unusable for reconciliation and
    /// yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let id = string_field(value, ORDER_ID_FIELDS)?;
        let decimal = |names: &[&str]| {
            field(value, names)
                .and_then(parse_decimal)
                .unwrap_or(Decimal::ZERO)
        };
        let side = match string_field(value, &["side"]) {
            Some(s) if s.eq_ignore_ascii_case("buy") => Some(Side::Buy),
            Some(s) if s.eq_ignore_ascii_case("sell") => Some(Side::Sell),
            _ => None,
        };
        Some(Self {
            id,
            token_id: string_field(value, TOKEN_ID_FIELDS).unwrap_or_default(),
            market: string_field(value, MARKET_FIELDS),
            side,
            price: decimal(&["price"]),
            original_size: decimal(ORIGINAL_SIZE_FIELDS),
            size_matched: decimal(SIZE_MATCHED_FIELDS),
            status: string_field(value, &["status"]).unwrap_or_default(),
            created_at: field(value, CREATED_AT_FIELDS).and_then(parse_timestamp),
        })
    }

    pub fn remaining_size(&self) -> Decimal {
        (self.original_size - self.size_matched).max(Decimal::ZERO)
    }
}

/// Accepts a bare array, `{data: [...]}` or `{orders: [...]}`.
pub(crate) fn parse_open_orders(body: &Value) -> Option<Vec<OpenOrder>> {
    let list = match body {
        Value::Array(items) => items,
        other => field(other, LIST_FIELDS)?.as_array()?,
    };
    Some(list.iter().filter_map(OpenOrder::from_value).collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetType {
    Collateral,
    Conditional,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Collateral => "COLLATERAL",
            AssetType::Conditional => "CONDITIONAL",
        }
    }
}

/// `GET /balance-allowance` response, in 6-decimal base units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceAllowance {
    pub balance: U256,
    /// Single `allowance`, or the largest entry of a per-spender
    /// `allowances` map.
    pub allowance: Option<U256>,
}

fn parse_u256(value: &Value) -> Option<U256> {
    match value {
        Value::String(s) => U256::from_str_radix(s.trim(), 10).ok(),
        Value::Number(n) => n.as_u64().map(U256::from),
        _ => None,
    }
}

impl BalanceAllowance {
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        let balance = parse_u256(value.get("balance")?)?;
        let allowance = match value.get("allowance").and_then(parse_u256) {
            Some(a) => Some(a),
            None => value
                .get("allowances")
                .and_then(Value::as_object)
                .and_then(|m| m.values().filter_map(parse_u256).max()),
        };
        Some(Self { balance, allowance })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_order_response_reason_fallback() {
        let r: OrderResponse =
            serde_json::from_value(json!({"success": false, "error": "bad tick"})).unwrap();
        assert_eq!(r.reason(), Some("bad tick"));
        match r.into_result() {
            Err(ClientError::Rejected { reason }) => assert_eq!(reason, "bad tick"),
            other => panic!("expected rejection, got {:?}", other),
        }

        let r: OrderResponse = serde_json::from_value(
            json!({"success": false, "errorMsg": "not enough balance", "error": "x"}),
        )
        .unwrap();
        assert_eq!(r.reason(), Some("not enough balance"));

        let ok: OrderResponse =
            serde_json::from_value(json!({"success": true, "orderID": "0xabc", "status": "live"}))
                .unwrap();
        assert_eq!(ok.into_result().unwrap().order_id, "0xabc");
    }

    #[test]
    fn test_open_orders_shapes() {
        let wrapped = json!({"data": [
            {"id": "a", "asset_id": "1", "side": "BUY", "price": "0.5",
             "original_size": "10", "size_matched": "4", "created_at": 1700000000},
            {"orderID": "b", "tokenId": "2", "side": "sell", "price": 0.25, "size": "3"},
            {"asset_id": "3"}
        ]});
        let orders = parse_open_orders(&wrapped).unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].id, "a");
        assert_eq!(orders[0].side, Some(Side::Buy));
        assert_eq!(orders[0].remaining_size(), Decimal::from(6));
        assert_eq!(orders[0].created_at, Some(1_700_000_000));
        assert_eq!(orders[1].id, "b");
        assert_eq!(orders[1].token_id, "2");
        assert_eq!(orders[1].side, Some(Side::Sell));
        assert_eq!(orders[1].original_size, Decimal::from(3));

        let legacy = json!({"orders": [{"order_id": "c"}]});
        assert_eq!(parse_open_orders(&legacy).unwrap()[0].id, "c");
        let bare = json!([{"id": "d"}]);
        assert_eq!(parse_open_orders(&bare).unwrap()[0].id, "d");
        assert!(parse_open_orders(&json!({"error": "nope"})).is_none());
    }

    #[test]
    fn test_balance_allowance() {
        let single = json!({"balance": "2500000", "allowance": "115792089237316195423570985008687907853269984665640564039457584007913129639935"});
        let parsed = BalanceAllowance::from_value(&single).unwrap();
        assert_eq!(parsed.balance, U256::from(2_500_000u64));
        assert_eq!(parsed.allowance, Some(U256::MAX));

        let map = json!({"balance": "0", "allowances": {"0x1": "5", "0x2": "9"}});
        let parsed = BalanceAllowance::from_value(&map).unwrap();
        assert_eq!(parsed.allowance, Some(U256::from(9u64)));

        assert!(BalanceAllowance::from_value(&json!({})).is_none());
    }
}
