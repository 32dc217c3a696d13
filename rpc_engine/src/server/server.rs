use std::{future::Future, net::SocketAddr, sync::Arc};

use serde_json::Value;

use super::{
    connection::ConnectionManagerConfig,
    dispatch::Dispatcher,
    errors::{RegistryError, ServerError},
    http::HttpServer,
    rate_limit::RateLimitConfig,
    registry::{RegistryConfig, ServiceBuilder, ServiceRegistry},
    tcp::TcpServer,
};
use crate::{framing::FramingOptions, transport::Transport};

/// Transport-agnostic server front: configure, register services, start.
///
/// Hooks and limits are fixed once [`RpcServer::start`] is called; the
/// dispatcher is shared read-only by every worker from then on.
pub struct RpcServer {
    transport: Transport,
    addr: SocketAddr,
    dispatcher: Dispatcher,
    framing: FramingOptions,
    connections: ConnectionManagerConfig,
}

impl RpcServer {
    pub fn new(transport: Transport, addr: SocketAddr) -> Self {
        Self::with_registry(transport, addr, ServiceRegistry::new())
    }

    pub fn with_registry_config(
        transport: Transport,
        addr: SocketAddr,
        config: RegistryConfig,
    ) -> Self {
        Self::with_registry(transport, addr, ServiceRegistry::with_config(config))
    }

    fn with_registry(transport: Transport, addr: SocketAddr, registry: ServiceRegistry) -> Self {
        Self {
            transport,
            addr,
            dispatcher: Dispatcher::with_registry(registry),
            framing: FramingOptions::default(),
            connections: ConnectionManagerConfig::default(),
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn registry(&self) -> &ServiceRegistry {
        self.dispatcher.registry()
    }

    pub fn register<S>(&self, service: ServiceBuilder<S>) -> Result<(), RegistryError>
    where
        S: Send + Sync + 'static,
    {
        self.dispatcher.register(service)
    }

    pub fn set_before_invoke<F>(&mut self, hook: F)
    where
        F: Fn(Option<&str>, &str, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.dispatcher.set_before_invoke(hook);
    }

    pub fn set_after_invoke<F>(&mut self, hook: F)
    where
        F: Fn(Option<&str>, &str, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.dispatcher.set_after_invoke(hook);
    }

    pub fn set_rate_limit(&mut self, rate_per_sec: f64, burst: u32) {
        self.dispatcher
            .set_rate_limit(RateLimitConfig::new(rate_per_sec, burst));
    }

    /// TCP only; the HTTP binding has its own message boundaries.
    pub fn set_framing_options(&mut self, framing: FramingOptions) {
        self.framing = framing;
    }

    /// TCP only.
    pub fn set_connection_limits(&mut self, connections: ConnectionManagerConfig) {
        self.connections = connections;
    }

    /// Serves until the task is dropped.
    pub async fn start(self) -> Result<(), ServerError> {
        self.start_with_shutdown(std::future::pending::<()>()).await
    }

    pub async fn start_with_shutdown<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.addr;
        tracing::info!(transport = %self.transport, addr = %addr, "starting rpc server");
        match self.into_binding() {
            Binding::Http(server) => server.serve_with_shutdown(addr, shutdown).await,
            Binding::Tcp(server) => server.serve_with_shutdown(addr, shutdown).await,
        }
    }

    /// Serves on an already bound listener, ignoring the configured address.
    pub async fn start_on_listener<F>(
        self,
        listener: std::net::TcpListener,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(
            transport = %self.transport,
            addr = ?listener.local_addr().ok(),
            "starting rpc server"
        );
        match self.into_binding() {
            Binding::Http(server) => server.serve_on_listener(listener, shutdown).await,
            Binding::Tcp(server) => server.serve_on_listener(listener, shutdown).await,
        }
    }

    fn into_binding(self) -> Binding {
        let dispatcher = Arc::new(self.dispatcher);
        match self.transport {
            Transport::Http => Binding::Http(HttpServer::new(dispatcher)),
            Transport::Tcp => Binding::Tcp(TcpServer::with_options(
                dispatcher,
                self.framing,
                self.connections,
            )),
        }
    }
}

enum Binding {
    Http(HttpServer),
    Tcp(TcpServer),
}
