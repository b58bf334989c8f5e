// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! JSON-RPC 2.0 envelope types and the protocol error code table.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

pub const TRAIL_NOT_FOUND: i64 = -32001;
pub const SCENT_NOT_FOUND: i64 = -32002;
pub const PAYLOAD_VALIDATION_FAILED: i64 = -32003;
pub const RATE_LIMITED: i64 = -32004;
pub const UNAUTHORIZED: i64 = -32005;
pub const INVALID_CONDITION: i64 = -32006;

/// Request id: string or number per JSON-RPC 2.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcId {
    Number(i64),
    String(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<JsonRpcId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn result(id: JsonRpcId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<JsonRpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// A validated request envelope.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub id: JsonRpcId,
    pub method: String,
    pub params: Value,
}

/// Validate a parsed body as a JSON-RPC 2.0 request. Returns
/// `INVALID_REQUEST` for anything that is not a well-formed envelope;
/// absent params default to an empty object.
pub fn parse_envelope(body: &Value) -> Result<Envelope, JsonRpcError> {
    let obj = body
        .as_object()
        .ok_or_else(|| JsonRpcError::new(INVALID_REQUEST, "request must be a JSON object"))?;

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some("2.0") => {}
        _ => {
            return Err(JsonRpcError::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""));
        }
    }

    let id = match obj.get("id") {
        Some(Value::String(s)) => JsonRpcId::String(s.clone()),
        Some(Value::Number(n)) if n.is_i64() => JsonRpcId::Number(n.as_i64().unwrap_or_default()),
        _ => {
            return Err(JsonRpcError::new(
                INVALID_REQUEST,
                "id must be a string or an integer",
            ));
        }
    };

    let method = match obj.get("method").and_then(Value::as_str) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => {
            return Err(JsonRpcError::new(
                INVALID_REQUEST,
                "method must be a non-empty string",
            ));
        }
    };

    let params = match obj.get("params") {
        None | Some(Value::Null) => Value::Object(serde_json::Map::new()),
        Some(p @ Value::Object(_)) => p.clone(),
        Some(_) => {
            return Err(JsonRpcError::invalid_params("params must be an object"));
        }
    };

    Ok(Envelope { id, method, params })
}

/// The server-to-client notification wrapping a trigger payload.
pub fn trigger_notification(params: &impl Serialize) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": "sbp/trigger",
        "params": params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_valid_envelope() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": "req-1",
            "method": "sbp/emit",
            "params": {"trail": "t"}
        });
        let env = parse_envelope(&body).unwrap();
        assert_eq!(env.id, JsonRpcId::String("req-1".into()));
        assert_eq!(env.method, "sbp/emit");
        assert_eq!(env.params["trail"], json!("t"));
    }

    #[test]
    fn numeric_ids_are_accepted() {
        let body = json!({"jsonrpc": "2.0", "id": 7, "method": "sbp/sniff"});
        let env = parse_envelope(&body).unwrap();
        assert_eq!(env.id, JsonRpcId::Number(7));
        assert_eq!(env.params, json!({}));
    }

    #[test]
    fn rejects_bad_envelopes() {
        for body in [
            json!({"id": 1, "method": "sbp/sniff"}),
            json!({"jsonrpc": "1.0", "id": 1, "method": "sbp/sniff"}),
            json!({"jsonrpc": "2.0", "method": "sbp/sniff"}),
            json!({"jsonrpc": "2.0", "id": {"nested": true}, "method": "sbp/sniff"}),
            json!({"jsonrpc": "2.0", "id": 1, "method": ""}),
            json!(["not", "an", "object"]),
        ] {
            let err = parse_envelope(&body).unwrap_err();
            assert_eq!(err.code, INVALID_REQUEST, "body: {body}");
        }
    }

    #[test]
    fn non_object_params_are_invalid_params() {
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "sbp/sniff", "params": [1, 2]});
        let err = parse_envelope(&body).unwrap_err();
        assert_eq!(err.code, INVALID_PARAMS);
    }

    #[test]
    fn response_serialization_omits_empty_fields() {
        let response = JsonRpcResponse::result(JsonRpcId::Number(1), json!({"ok": true}));
        let text = serde_json::to_string(&response).unwrap();
        assert!(!text.contains("error"));

        let response = JsonRpcResponse::error(None, JsonRpcError::new(PARSE_ERROR, "parse error"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], json!(PARSE_ERROR));
    }

    #[test]
    fn trigger_notification_shape() {
        let value = trigger_notification(&json!({"scent_id": "q"}));
        assert_eq!(value["jsonrpc"], json!("2.0"));
        assert_eq!(value["method"], json!("sbp/trigger"));
        assert_eq!(value["params"]["scent_id"], json!("q"));
        assert!(value.get("id").is_none());
    }
}
