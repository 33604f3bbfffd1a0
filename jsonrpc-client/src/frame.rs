//! Wire frames
//!
//! Requests go out as `{"jsonrpc":"2.0","method","params","id"}`. Incoming
//! objects are either replies (numeric `id` plus `result` or `error`) or
//! pushed notifications (`method` without `id`).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(crate) struct Request<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: &'a Value,
    id: u64,
}

impl<'a> Request<'a> {
    pub(crate) fn new(id: u64, method: &'a str, params: &'a Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
            id,
        }
    }
}

/// JSON-RPC error object carried by a failed reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Reply {
        id: u64,
        outcome: Result<Value, RemoteError>,
    },
    Notification {
        method: String,
        params: Value,
    },
    /// Anything else the peer sends, including requests addressed to us
    Unrecognized(Value),
}

impl Frame {
    pub fn classify(value: Value) -> Frame {
        let Value::Object(mut object) = value else {
            return Frame::Unrecognized(value);
        };

        match object.get("id").and_then(Value::as_u64) {
            Some(id) if object.contains_key("error") => {
                let error = object.remove("error").unwrap_or_default();
                let outcome = serde_json::from_value(error.clone()).unwrap_or(RemoteError {
                    code: 0,
                    message: error.to_string(),
                });
                Frame::Reply {
                    id,
                    outcome: Err(outcome),
                }
            }
            Some(id) if object.contains_key("result") => Frame::Reply {
                id,
                outcome: Ok(object.remove("result").unwrap_or_default()),
            },
            None if !object.contains_key("id") => match object.remove("method") {
                Some(Value::String(method)) => Frame::Notification {
                    method,
                    params: object.remove("params").unwrap_or_default(),
                },
                Some(other) => {
                    object.insert("method".to_string(), other);
                    Frame::Unrecognized(Value::Object(object))
                }
                None => Frame::Unrecognized(Value::Object(object)),
            },
            _ => Frame::Unrecognized(Value::Object(object)),
        }
    }
}
