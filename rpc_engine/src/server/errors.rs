use std::io;

use thiserror::Error;

use crate::protocol::{ErrorCode, JsonRpcError, JsonRpcResponse};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("hyper server error: {0}")]
    Hyper(#[from] hyper::Error),
    #[error("failed to bind address: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("service {0} is already registered")]
    AlreadyRegistered(String),
    #[error("method {0} must look like service.method or service/method")]
    MalformedMethod(String),
    #[error("service {service} skipped non-conforming members: {}", .members.join(", "))]
    SkippedMembers {
        service: String,
        members: Vec<String>,
    },
}

impl RegistryError {
    /// Protocol classification when the failure reaches a caller on its own.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            RegistryError::MalformedMethod(_) => ErrorCode::InvalidRequest,
            RegistryError::AlreadyRegistered(_) | RegistryError::SkippedMembers { .. } => {
                ErrorCode::CustomError
            }
        }
    }
}

/// Stage failures of the per-message dispatch pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DispatchError {
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("rejected by hook: {0}")]
    Rejected(String),
    #[error("method invocation failed")]
    Internal,
}

/// Message sent back when the limiter refuses admission.
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests, please try again later";

impl From<DispatchError> for JsonRpcError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::RateLimited => JsonRpcError::custom(RATE_LIMITED_MESSAGE),
            DispatchError::MethodNotFound(method) => JsonRpcError::method_not_found(&method),
            DispatchError::InvalidParams(details) => JsonRpcError::invalid_params(details),
            DispatchError::Rejected(message) => JsonRpcError::custom(message),
            DispatchError::Internal => JsonRpcError::internal(),
        }
    }
}

impl DispatchError {
    pub fn to_response(&self, id: Option<String>) -> JsonRpcResponse {
        JsonRpcResponse::error(id, self.clone().into())
    }
}
