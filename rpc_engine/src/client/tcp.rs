use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::{correlator::Exchange, errors::ClientError};
use crate::framing::{read_message, write_message, FramingOptions};

/// Exchanges framed messages over one long-lived TCP connection.
pub struct TcpExchange {
    stream: TcpStream,
    framing: FramingOptions,
}

impl TcpExchange {
    /// Dials right away; a failed dial is reported here, not on first call.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(ClientError::Connect)?;
        tracing::debug!(addr = %addr, "tcp client connected");
        Ok(Self {
            stream,
            framing: FramingOptions::default(),
        })
    }

    pub fn framing(&self) -> &FramingOptions {
        &self.framing
    }
}

#[async_trait]
impl Exchange for TcpExchange {
    async fn round_trip(&mut self, payload: Vec<u8>) -> Result<Vec<u8>, ClientError> {
        write_message(&mut self.stream, &payload, &self.framing.terminator).await?;
        Ok(read_message(&mut self.stream, &self.framing).await?)
    }

    fn set_framing_options(&mut self, options: FramingOptions) {
        self.framing = options;
    }
}
