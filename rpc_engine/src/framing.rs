//! Terminator-delimited framing for byte-stream transports.
//!
//! Each logical message is followed by a fixed terminator (`\r\n` by default).
//! The reader accumulates bytes until the buffer *ends with* the terminator and
//! strips it. Client and server use the same discipline so they interoperate.
//!
//! `max_read_len` sizes each individual read attempt. It is not a cap on the
//! accumulated message; a peer that never sends the terminator keeps the buffer
//! growing unless `max_message_len` is set.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const DEFAULT_TERMINATOR: &[u8] = b"\r\n";
pub const DEFAULT_MAX_READ_LEN: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramingOptions {
    pub terminator: Vec<u8>,
    pub max_read_len: usize,
    /// Optional ceiling on the accumulated message. `None` keeps reading until
    /// the terminator shows up, however long that takes.
    pub max_message_len: Option<usize>,
}

impl Default for FramingOptions {
    fn default() -> Self {
        Self {
            terminator: DEFAULT_TERMINATOR.to_vec(),
            max_read_len: DEFAULT_MAX_READ_LEN,
            max_message_len: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("connection closed by peer before a terminator was seen")]
    Closed,
    #[error("framing terminator must not be empty")]
    EmptyTerminator,
    #[error("message exceeded {limit} bytes without a terminator")]
    TooLarge { limit: usize },
    #[error("stream i/o failed: {0}")]
    Io(#[from] io::Error),
}

/// Reads one framed message and returns it without the terminator.
pub async fn read_message<R>(
    reader: &mut R,
    options: &FramingOptions,
) -> Result<Vec<u8>, FramingError>
where
    R: AsyncRead + Unpin,
{
    let terminator = options.terminator.as_slice();
    if terminator.is_empty() {
        return Err(FramingError::EmptyTerminator);
    }

    let mut chunk = vec![0u8; options.max_read_len.max(1)];
    let mut data = Vec::new();
    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(0) => return Err(FramingError::Closed),
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {
                tracing::debug!("interrupted while reading frame, retrying: {err}");
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        data.extend_from_slice(&chunk[..read]);
        if data.ends_with(terminator) {
            data.truncate(data.len() - terminator.len());
            return Ok(data);
        }

        if let Some(limit) = options.max_message_len {
            if data.len() > limit {
                return Err(FramingError::TooLarge { limit });
            }
        }
    }
}

/// Appends the terminator and writes the frame in a single write.
pub async fn write_message<W>(
    writer: &mut W,
    payload: &[u8],
    terminator: &[u8],
) -> Result<(), FramingError>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = Vec::with_capacity(payload.len() + terminator.len());
    frame.extend_from_slice(payload);
    frame.extend_from_slice(terminator);
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]

    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn framing__single_message_then_eof__then_strips_terminator() {
        let mut stream: &[u8] = b"{\"a\":1}\r\n";
        let message = read_message(&mut stream, &FramingOptions::default())
            .await
            .expect("complete frame");

        assert_eq!(message, b"{\"a\":1}");
    }

    #[tokio::test]
    async fn framing__message_split_over_reads__then_accumulates() {
        let options = FramingOptions {
            max_read_len: 4,
            ..FramingOptions::default()
        };
        let mut stream: &[u8] = b"{\"method\":\"a.b\"}\r\n";

        let message = read_message(&mut stream, &options)
            .await
            .expect("complete frame");

        assert_eq!(message, b"{\"method\":\"a.b\"}");
    }

    #[tokio::test]
    async fn framing__terminator_split_across_writes__then_waits_for_rest() {
        let (mut client, mut server) = duplex(64);
        let writer = tokio::spawn(async move {
            client.write_all(b"[1,2]\r").await.expect("first half");
            tokio::task::yield_now().await;
            client.write_all(b"\n").await.expect("second half");
            client
        });

        let message = read_message(&mut server, &FramingOptions::default())
            .await
            .expect("complete frame");
        assert_eq!(message, b"[1,2]");
        drop(writer.await.expect("writer task"));
    }

    #[tokio::test]
    async fn framing__peer_closes_without_terminator__then_closed_error() {
        let mut stream: &[u8] = b"{\"a\":1}";
        let err = read_message(&mut stream, &FramingOptions::default())
            .await
            .expect_err("expected closed error");

        assert!(matches!(err, FramingError::Closed));
    }

    #[tokio::test]
    async fn framing__empty_terminator__then_rejected() {
        let options = FramingOptions {
            terminator: Vec::new(),
            ..FramingOptions::default()
        };
        let mut stream: &[u8] = b"abc";

        let err = read_message(&mut stream, &options)
            .await
            .expect_err("expected configuration error");
        assert!(matches!(err, FramingError::EmptyTerminator));
    }

    #[tokio::test]
    async fn framing__message_ceiling_exceeded__then_too_large() {
        let options = FramingOptions {
            max_read_len: 2,
            max_message_len: Some(4),
            ..FramingOptions::default()
        };
        let mut stream: &[u8] = b"0123456789\r\n";

        let err = read_message(&mut stream, &options)
            .await
            .expect_err("expected size error");
        assert!(matches!(err, FramingError::TooLarge { limit: 4 }));
    }

    #[tokio::test]
    async fn framing__custom_terminator__then_round_trips() {
        let (mut client, mut server) = duplex(1024);
        let options = FramingOptions {
            terminator: b"<<END>>".to_vec(),
            ..FramingOptions::default()
        };

        write_message(&mut client, b"{\"id\":\"1\"}", &options.terminator)
            .await
            .expect("write frame");
        let message = read_message(&mut server, &options)
            .await
            .expect("read frame");

        assert_eq!(message, b"{\"id\":\"1\"}");
    }
}
