pub mod correlator;
pub mod errors;
pub mod http;
pub mod tcp;

use std::net::SocketAddr;

pub use correlator::{BatchSlot, Client, Exchange};
pub use errors::ClientError;
pub use http::HttpExchange;
pub use tcp::TcpExchange;

use crate::transport::Transport;

/// Client whose transport is picked at runtime.
pub type RpcClient = Client<Box<dyn Exchange>>;

impl Client<Box<dyn Exchange>> {
    /// TCP dials immediately; HTTP is connectionless and never fails here.
    pub async fn connect(transport: Transport, addr: SocketAddr) -> Result<Self, ClientError> {
        let exchange: Box<dyn Exchange> = match transport {
            Transport::Http => Box::new(HttpExchange::new(addr)),
            Transport::Tcp => Box::new(TcpExchange::connect(addr).await?),
        };
        Ok(Client::new(exchange))
    }
}
