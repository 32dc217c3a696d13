use std::net::SocketAddr;

use async_trait::async_trait;
use hyper::{body, client::HttpConnector, header::CONTENT_TYPE, Body, Method, Request};

use super::{correlator::Exchange, errors::ClientError};

/// Posts each payload to the server root; no connection is held between calls.
pub struct HttpExchange {
    client: hyper::Client<HttpConnector>,
    uri: String,
}

impl HttpExchange {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            client: hyper::Client::new(),
            uri: format!("http://{addr}/"),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

#[async_trait]
impl Exchange for HttpExchange {
    async fn round_trip(&mut self, payload: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.uri.as_str())
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(payload))?;

        let response = self.client.request(request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status(status));
        }

        let bytes = body::to_bytes(response.into_body()).await?;
        Ok(bytes.to_vec())
    }
}
