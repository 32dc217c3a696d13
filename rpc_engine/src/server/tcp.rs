//! JSON-RPC over raw TCP with terminator framing.
//!
//! One worker task per accepted connection. Each worker loops: read a frame,
//! dispatch it, write the reply frame. Connections are long lived and
//! requests on one connection are handled strictly in order.

use std::{future::Future, net::SocketAddr, sync::Arc};

use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinSet,
};

use super::{
    connection::{ConnectionGuard, ConnectionManager, ConnectionManagerConfig},
    dispatch::Dispatcher,
    errors::ServerError,
};
use crate::framing::{read_message, write_message, FramingError, FramingOptions};

#[derive(Clone)]
pub struct TcpServer {
    inner: Arc<TcpServerInner>,
}

struct TcpServerInner {
    dispatcher: Arc<Dispatcher>,
    framing: FramingOptions,
    connections: ConnectionManager,
}

impl TcpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self::with_options(
            dispatcher,
            FramingOptions::default(),
            ConnectionManagerConfig::default(),
        )
    }

    pub fn with_options(
        dispatcher: Arc<Dispatcher>,
        framing: FramingOptions,
        connections: ConnectionManagerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(TcpServerInner {
                dispatcher,
                framing,
                connections: ConnectionManager::new(connections),
            }),
        }
    }

    pub fn framing(&self) -> &FramingOptions {
        &self.inner.framing
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.inner.connections
    }

    pub async fn serve(&self, addr: SocketAddr) -> Result<(), ServerError> {
        self.serve_with_shutdown(addr, async { std::future::pending::<()>().await })
            .await
    }

    pub async fn serve_with_shutdown<F>(
        &self,
        addr: SocketAddr,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        self.serve_from_listener(listener, shutdown).await
    }

    pub async fn serve_on_listener<F>(
        &self,
        listener: std::net::TcpListener,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;
        self.serve_from_listener(listener, shutdown).await
    }

    /// Accepts until `shutdown` resolves, then aborts the connection workers
    /// still running and waits for them to finish.
    async fn serve_from_listener<F>(
        &self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(addr = ?listener.local_addr().ok(), "tcp transport listening");
        tokio::pin!(shutdown);
        let mut workers = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(finished) = workers.join_next(), if !workers.is_empty() => {
                    if let Err(err) = finished {
                        tracing::warn!("tcp connection worker failed: {err}");
                    }
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            tracing::warn!("failed to accept tcp connection: {err}");
                            continue;
                        }
                    };

                    let guard = match self.inner.connections.acquire(peer.ip()) {
                        Ok(guard) => guard,
                        Err(err) => {
                            tracing::warn!(peer = %peer, "refusing tcp connection: {err}");
                            drop(stream);
                            continue;
                        }
                    };

                    let server = self.clone();
                    workers.spawn(async move {
                        server.serve_connection(stream, peer, guard).await
                    });
                }
            }
        }

        let open = workers.len();
        workers.shutdown().await;
        tracing::info!(closed_connections = open, "tcp transport stopped");
        Ok(())
    }

    async fn serve_connection(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        _guard: ConnectionGuard,
    ) {
        tracing::debug!(peer = %peer, "tcp connection opened");
        let framing = &self.inner.framing;

        loop {
            let payload = match read_message(&mut stream, framing).await {
                Ok(payload) => payload,
                Err(FramingError::Closed) => break,
                Err(err) => {
                    tracing::warn!(peer = %peer, "dropping tcp connection: {err}");
                    break;
                }
            };

            let reply = self.inner.dispatcher.handle(&payload).await;
            if let Err(err) = write_message(&mut stream, &reply, &framing.terminator).await {
                tracing::warn!(peer = %peer, "failed to write tcp reply: {err}");
                break;
            }
        }

        tracing::debug!(peer = %peer, "tcp connection closed");
    }
}
