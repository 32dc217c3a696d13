//! Conversions between raw payload bytes and the message model.

use serde::Serialize;
use serde_json::Value;

use super::types::{ErrorCode, JsonRpcError, JsonRpcRequest, JsonRpcResponse};

/// Fallback body used if a response cannot be serialized at all.
const ENCODE_FAILURE: &[u8] =
    br#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error","data":null}}"#;

/// Parses any JSON payload into a generic tree.
pub fn decode(payload: &[u8]) -> Result<Value, JsonRpcError> {
    serde_json::from_slice(payload).map_err(|err| {
        tracing::debug!("failed to parse JSON-RPC payload: {err}");
        JsonRpcError::parse_error(err.to_string())
    })
}

/// Serializes a response, a batch of responses or a request.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_else(|err| {
        tracing::warn!("failed to serialize JSON-RPC message: {err}");
        ENCODE_FAILURE.to_vec()
    })
}

/// Builds a request, or a notification when `id` is absent.
pub fn build_request(id: Option<String>, method: &str, params: Value) -> JsonRpcRequest {
    JsonRpcRequest::new(id, method, params)
}

pub fn build_error(id: Option<String>, code: ErrorCode) -> JsonRpcResponse {
    JsonRpcResponse::error(id, JsonRpcError::from_code(code))
}

pub fn build_custom_error(id: Option<String>, message: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse::error(id, JsonRpcError::custom(message))
}

pub fn build_success(id: Option<String>, result: Value) -> JsonRpcResponse {
    JsonRpcResponse::success(id, result)
}
