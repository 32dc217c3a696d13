//! JSON-RPC 2.0 engine with HTTP and TCP bindings for both roles.
//!
//! Servers expose plain Rust services through a [`ServiceRegistry`]; every
//! inbound payload runs through the [`Dispatcher`] pipeline. Clients send
//! single calls or positional batches through an [`Exchange`].

pub mod client;
pub mod framing;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{BatchSlot, Client, ClientError, Exchange, RpcClient};
pub use framing::{FramingError, FramingOptions};
pub use protocol::{ErrorCode, JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use server::{
    Dispatcher, RateLimitConfig, RegistryConfig, RegistryError, RpcServer, ServerError,
    ServiceBuilder, ServiceRegistry,
};
pub use transport::{Transport, UnknownTransport};
