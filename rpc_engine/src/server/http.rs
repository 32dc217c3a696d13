use std::{convert::Infallible, future::Future, net::SocketAddr, sync::Arc};

use hyper::server::{conn::AddrIncoming, conn::AddrStream, Builder};
use hyper::{
    body,
    header::{HeaderValue, CONTENT_TYPE},
    http::StatusCode,
    service::{make_service_fn, service_fn},
    Body, Method, Request, Response,
};

use super::{dispatch::Dispatcher, errors::ServerError};
use crate::protocol::{codec, JsonRpcError, JsonRpcResponse};

/// Serves JSON-RPC over HTTP POST; every request body is one payload.
#[derive(Clone)]
pub struct HttpServer {
    dispatcher: Arc<Dispatcher>,
}

impl HttpServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
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
        let builder = hyper::Server::try_bind(&addr)?;
        self.serve_from_builder(builder, shutdown).await
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
        let builder = hyper::Server::from_tcp(listener)?;
        self.serve_from_builder(builder, shutdown).await
    }

    async fn serve_from_builder<F>(
        &self,
        builder: Builder<AddrIncoming>,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let server = self.clone();
        let make_service = make_service_fn(move |conn: &AddrStream| {
            let remote_addr = conn.remote_addr();
            let server = server.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let server = server.clone();
                    async move { server.handle_http_request(req, remote_addr).await }
                }))
            }
        });

        tracing::info!("http transport listening");
        builder
            .serve(make_service)
            .with_graceful_shutdown(shutdown)
            .await?;
        tracing::info!("http transport stopped");
        Ok(())
    }

    pub(crate) async fn handle_http_request(
        &self,
        req: Request<Body>,
        remote_addr: SocketAddr,
    ) -> Result<Response<Body>, Infallible> {
        if req.method() != Method::POST {
            tracing::debug!(
                peer = %remote_addr,
                method = %req.method(),
                "refusing non-POST request"
            );
            return Ok(empty_response(StatusCode::METHOD_NOT_ALLOWED));
        }

        let bytes = match body::to_bytes(req.into_body()).await {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(peer = %remote_addr, "failed to read request body: {err}");
                return Ok(empty_response(StatusCode::INTERNAL_SERVER_ERROR));
            }
        };

        if bytes.is_empty() {
            let reply = JsonRpcResponse::error(None, JsonRpcError::parse_error("empty body"));
            return Ok(json_response(codec::encode(&reply)));
        }

        let payload = self.dispatcher.handle(&bytes).await;
        Ok(json_response(payload))
    }
}

fn empty_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

fn json_response(payload: Vec<u8>) -> Response<Body> {
    let mut response = Response::new(Body::from(payload));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
