use serde::{Deserialize, Serialize};
use strum::Display;

use super::VenueName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Balance,
    Positions,
    PendingOrders,
    Order,
    Instruments,
    RegisteredAccounts,
}

/// Synchronous query from the query channel. `reply_to` names the list the
/// requester is blocked on for the answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMessage {
    pub query_type: QueryType,
    #[serde(default)]
    pub strategy_id: Option<String>,
    #[serde(default)]
    pub venue: Option<VenueName>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub exchange_order_id: Option<String>,
    #[serde(default)]
    pub client_order_id: Option<String>,
    pub reply_to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryReply {
    pub code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_type: Option<QueryType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryReply {
    pub fn ok(query_type: QueryType, data: serde_json::Value) -> Self {
        Self {
            code: 0,
            query_type: Some(query_type),
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            code: -1,
            query_type: None,
            data: None,
            error: Some(error.into()),
        }
    }
}
