pub mod connection;
pub mod dispatch;
pub mod errors;
pub mod http;
pub mod rate_limit;
pub mod registry;
pub mod server;
pub mod tcp;

pub use connection::{
    ConnectionError, ConnectionGuard, ConnectionManager, ConnectionManagerConfig,
};
pub use dispatch::{AfterInvoke, BeforeInvoke, Dispatcher, Hooks, Reply};
pub use errors::{DispatchError, RegistryError, ServerError, RATE_LIMITED_MESSAGE};
pub use http::HttpServer;
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use registry::{
    resolve_method_name, to_pascal_case, BoundCall, Method, MethodHandler, RegistryConfig,
    Service, ServiceBuilder, ServiceRegistry,
};
pub use server::RpcServer;
pub use tcp::TcpServer;
