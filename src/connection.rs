// Per-connection frame accumulation and the one-request exchange

use crate::config::{ServerConfig, CHUNK_SIZE};
use crate::dispatch;
use crate::protocol::{
    self, ProtocolError, Request, RequestHeader, Response, REQUEST_HEADER_LEN,
};
use crate::response;
use crate::store::{MessageStore, StoreError};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Parse progress for one connection's inbound bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    AwaitingHeader,
    AwaitingPayload(RequestHeader),
}

/// Accumulates inbound bytes and yields a complete request frame.
///
/// Bytes arrive in whatever chunks the socket produces; the decoder carries
/// its state across feeds, so a frame split at any byte boundary decodes
/// identically to one that arrives whole.
pub struct FrameDecoder {
    state: ParseState,
    buf: Vec<u8>,
    max_payload: u32,
}

impl FrameDecoder {
    pub fn new(max_payload: u32) -> Self {
        Self {
            state: ParseState::AwaitingHeader,
            buf: Vec::new(),
            max_payload,
        }
    }

    /// Feed one chunk of inbound bytes.
    ///
    /// Returns `Ok(Some(request))` once a full frame is buffered, `Ok(None)`
    /// while more bytes are needed. Header and payload failures are final:
    /// the connection answers with a generic error and closes.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Option<Request>, ProtocolError> {
        self.buf.extend_from_slice(bytes);

        if self.state == ParseState::AwaitingHeader && self.buf.len() >= REQUEST_HEADER_LEN {
            let header = protocol::decode_header(&self.buf, self.max_payload)?;
            self.buf.drain(..REQUEST_HEADER_LEN);
            self.state = ParseState::AwaitingPayload(header);
        }

        if let ParseState::AwaitingPayload(header) = self.state {
            let expected = header.payload_size as usize;
            if self.buf.len() > expected {
                return Err(ProtocolError::MalformedPayload("bytes after frame end"));
            }
            if self.buf.len() == expected {
                let body = protocol::decode_payload(header.code, &self.buf)?;
                self.buf.clear();
                return Ok(Some(Request { header, body }));
            }
        }

        Ok(None)
    }
}

/// Serve one accepted connection: read a frame, dispatch it, flush the
/// response, close. Errors are contained here; nothing propagates past the
/// connection task.
pub async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    store: Arc<MessageStore>,
    config: Arc<ServerConfig>,
) {
    let idle_timeout = config.idle_timeout;
    match tokio::time::timeout(idle_timeout, exchange(stream, peer, store, config)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!("connection from {} failed: {:#}", peer, e),
        Err(_) => tracing::info!("connection from {} timed out", peer),
    }
}

async fn exchange(
    mut stream: TcpStream,
    peer: SocketAddr,
    store: Arc<MessageStore>,
    config: Arc<ServerConfig>,
) -> Result<()> {
    let mut decoder = FrameDecoder::new(config.max_payload);
    let mut chunk = [0u8; CHUNK_SIZE];

    let request = loop {
        let n = stream
            .read(&mut chunk)
            .await
            .context("socket read failed")?;
        if n == 0 {
            tracing::debug!("connection from {} closed by peer", peer);
            return Ok(());
        }

        match decoder.feed(&chunk[..n]) {
            Ok(Some(request)) => break request,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!("rejecting request from {}: {}", peer, e);
                return flush_and_close(&mut stream, &Response::error()).await;
            }
        }
    };

    tracing::info!(
        "request from {}: client_id {}, code {}, payload size {}",
        peer,
        hex::encode(request.header.client_id),
        request.header.code.as_u16(),
        request.header.payload_size
    );

    let result = dispatch::dispatch(&store, &request);
    match &result {
        Err(StoreError::Backend(e)) => {
            tracing::error!("store failure handling request from {}: {}", peer, e)
        }
        Err(e) => tracing::info!("request from {} rejected: {}", peer, e),
        Ok(_) => {}
    }

    flush_and_close(&mut stream, &response::build(result)).await
}

/// Write the encoded response, then close the write side so the peer sees a
/// clean end of stream.
async fn flush_and_close(stream: &mut TcpStream, response: &Response) -> Result<()> {
    let bytes = protocol::encode(response);
    stream
        .write_all(&bytes)
        .await
        .context("socket write failed")?;
    stream.shutdown().await.context("socket shutdown failed")?;
    Ok(())
}
