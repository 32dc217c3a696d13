use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Literal protocol version carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Closed set of protocol error codes understood by both roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    WithoutError,
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// Reserved; the dispatch pipeline never emits it.
    ProcedureMissingId,
    CustomError,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        match self {
            ErrorCode::WithoutError => 0,
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ProcedureMissingId => -32604,
            ErrorCode::CustomError => -32000,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::WithoutError => "Request ok",
            ErrorCode::ParseError => "Parse error",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::MethodNotFound => "Method not found",
            ErrorCode::InvalidParams => "Invalid params",
            ErrorCode::InternalError => "Internal error",
            ErrorCode::ProcedureMissingId => "Procedure missing id",
            ErrorCode::CustomError => "Server error",
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        let found = match code {
            0 => ErrorCode::WithoutError,
            -32700 => ErrorCode::ParseError,
            -32600 => ErrorCode::InvalidRequest,
            -32601 => ErrorCode::MethodNotFound,
            -32602 => ErrorCode::InvalidParams,
            -32603 => ErrorCode::InternalError,
            -32604 => ErrorCode::ProcedureMissingId,
            -32000 => ErrorCode::CustomError,
            _ => return None,
        };
        Some(found)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

/// JSON-RPC 2.0 request. A missing `id` makes it a notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: Option<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Reads a request out of one generic message, ignoring unknown fields.
    ///
    /// On failure the returned id is whatever could be recovered from the
    /// message, so the error response can still be correlated.
    pub fn from_value(message: Value) -> Result<Self, (Option<String>, JsonRpcError)> {
        let Value::Object(mut fields) = message else {
            return Err((
                None,
                JsonRpcError::invalid_request("request must be a JSON object"),
            ));
        };

        let id = match fields.remove("id") {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id),
            Some(Value::Number(id)) => Some(id.to_string()),
            Some(_) => {
                return Err((
                    None,
                    JsonRpcError::invalid_request("id must be a string or a number"),
                ))
            }
        };

        let jsonrpc = match fields.remove("jsonrpc") {
            Some(Value::String(version)) if version == JSONRPC_VERSION => version,
            _ => {
                return Err((
                    id,
                    JsonRpcError::invalid_request("jsonrpc field must be '2.0'"),
                ))
            }
        };

        let method = match fields.remove("method") {
            Some(Value::String(method)) if !method.trim().is_empty() => method,
            Some(Value::String(_)) => {
                return Err((id, JsonRpcError::invalid_request("method must not be empty")))
            }
            _ => {
                return Err((
                    id,
                    JsonRpcError::invalid_request("method must be a string"),
                ))
            }
        };

        let params = fields.remove("params").unwrap_or(Value::Null);

        Ok(Self {
            id,
            jsonrpc,
            method,
            params,
        })
    }
}

/// JSON-RPC 2.0 response. Without an `id` it takes the notify shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub jsonrpc: String,
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ResponsePayload {
    Result(Value),
    Error(JsonRpcError),
}

impl JsonRpcResponse {
    pub fn success(id: Option<String>, result: Value) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            payload: ResponsePayload::Result(result),
        }
    }

    pub fn error(id: Option<String>, error: JsonRpcError) -> Self {
        Self {
            id,
            jsonrpc: JSONRPC_VERSION.to_string(),
            payload: ResponsePayload::Error(error),
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result(value) => Some(value),
            ResponsePayload::Error(_) => None,
        }
    }

    pub fn error_payload(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            ResponsePayload::Result(_) => None,
            ResponsePayload::Error(error) => Some(error),
        }
    }

    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.payload {
            ResponsePayload::Result(value) => Ok(value),
            ResponsePayload::Error(error) => Err(error),
        }
    }
}

/// JSON-RPC 2.0 error payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    /// Canned error for one of the fixed codes.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code.code(), code.message(), Value::Null)
    }

    /// Free-text error; the message is carried verbatim.
    pub fn custom(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CustomError.code(), message, Value::Null)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn parse_error(details: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::ParseError).with_data(Value::String(details.into()))
    }

    pub fn invalid_request(details: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::InvalidRequest).with_data(Value::String(details.into()))
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::from_code(ErrorCode::MethodNotFound).with_data(Value::String(method.to_string()))
    }

    pub fn invalid_params(details: impl Into<String>) -> Self {
        Self::from_code(ErrorCode::InvalidParams).with_data(Value::String(details.into()))
    }

    /// Never carries the underlying failure; that stays in the server log.
    pub fn internal() -> Self {
        Self::from_code(ErrorCode::InternalError)
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for JsonRpcError {}
