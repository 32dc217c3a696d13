pub mod codec;
pub mod types;

pub use codec::{
    build_custom_error, build_error, build_request, build_success, decode, encode,
};
pub use types::{
    ErrorCode, JsonRpcError, JsonRpcRequest, JsonRpcResponse, ResponsePayload, JSONRPC_VERSION,
};
