use std::io;

use hyper::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::{framing::FramingError, protocol::JsonRpcError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect: {0}")]
    Connect(#[source] io::Error),
    #[error("http transport error: {0}")]
    Http(#[from] hyper::Error),
    #[error("failed to build http request: {0}")]
    Request(#[from] hyper::http::Error),
    #[error("server answered with http status {0}")]
    Status(StatusCode),
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("{message} ({code})")]
    Rpc {
        code: i32,
        message: String,
        data: Value,
    },
    #[error("failed to encode params: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode reply: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
    #[error("batch reply has no entry at index {0}")]
    MissingResponse(usize),
    #[error("batch failed before this call was answered: {0}")]
    BatchAborted(String),
}

impl From<JsonRpcError> for ClientError {
    fn from(value: JsonRpcError) -> Self {
        ClientError::Rpc {
            code: value.code,
            message: value.message,
            data: value.data,
        }
    }
}

impl ClientError {
    /// Protocol error code when the server answered with an error payload.
    pub fn rpc_code(&self) -> Option<i32> {
        match self {
            ClientError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}
