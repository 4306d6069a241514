//! Framed transports to the simulation host.
//!
//! Two wire flavors exist: a raw TCP stream carrying 4-byte little-endian
//! length-prefixed frames, and a websocket stream (HTTP handshake upgrade
//! at a fixed path) carrying binary frames. Neither reconnects on its own;
//! reconnect policy lives in the channel pump.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{trace, warn};

use crate::error::{ClientError, Result};

/// Fixed delay between connect attempts.
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Total budget for establishing a TCP transport.
pub const CONNECT_BUDGET: Duration = Duration::from_secs(30);
/// Path of the websocket upgrade endpoint on the host.
pub const WS_PATH: &str = "/ws";

/// Length-prefixed message framing over one TCP connection.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    /// Connect with the default retry budget.
    pub async fn connect(addr: &str) -> Result<Self> {
        Self::connect_with(addr, CONNECT_RETRY_DELAY, CONNECT_BUDGET).await
    }

    /// Connect, retrying with a fixed backoff until `budget` is exhausted.
    pub async fn connect_with(
        addr: &str,
        retry_delay: Duration,
        budget: Duration,
    ) -> Result<Self> {
        let start = tokio::time::Instant::now();
        loop {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    if let Err(err) = stream.set_nodelay(true) {
                        warn!("Failed to set TCP_NODELAY: {}", err);
                    }
                    return Ok(Self { stream });
                }
                Err(err) => {
                    let elapsed = start.elapsed();
                    if elapsed + retry_delay >= budget {
                        return Err(ClientError::Connection(format!("{}: {}", addr, err)));
                    }
                    warn!(
                        "connect to {} failed, retrying (budget left {:?})",
                        addr,
                        budget - elapsed
                    );
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }

    /// Write exactly one framed message.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        let len = payload.len() as u32;
        let mut buffer = Vec::with_capacity(4 + payload.len());
        buffer.extend_from_slice(&len.to_le_bytes());
        buffer.extend_from_slice(payload);
        self.stream.write_all(&buffer).await?;
        Ok(())
    }

    /// Read exactly one framed message, accumulating partial reads until
    /// the declared length is satisfied.
    pub async fn receive(&mut self) -> Result<Vec<u8>> {
        let mut len_buf = [0u8; 4];
        self.stream.read_exact(&mut len_buf).await?;
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        self.stream.read_exact(&mut payload).await?;
        Ok(payload)
    }

    pub async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Binary websocket framing over one upgraded HTTP connection.
pub struct WsTransport {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    /// Single connect attempt; the channel pump owns retry policy.
    pub async fn connect(url: &str) -> Result<Self> {
        let (ws, _) = connect_async(url).await?;
        trace!("websocket connected to {}", url);
        Ok(Self { ws })
    }

    pub async fn send(&mut self, payload: Vec<u8>) -> Result<()> {
        self.ws.send(Message::Binary(payload)).await?;
        Ok(())
    }

    /// Receive the next binary frame, skipping control frames.
    pub async fn receive(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.ws.next().await {
                None => return Err(ClientError::Closed),
                Some(Err(err)) => return Err(err.into()),
                Some(Ok(Message::Binary(data))) => return Ok(data),
                Some(Ok(Message::Close(_))) => return Err(ClientError::Closed),
                Some(Ok(_)) => {}
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        // A close error at teardown is not actionable.
        let _ = self.ws.close(None).await;
        Ok(())
    }
}

/// Either transport flavor behind one seam for the channel pump.
pub enum Transport {
    Tcp(TcpTransport),
    Ws(WsTransport),
}

impl Transport {
    pub async fn send(&mut self, payload: Vec<u8>) -> Result<()> {
        match self {
            Transport::Tcp(t) => t.send(&payload).await,
            Transport::Ws(t) => t.send(payload).await,
        }
    }

    pub async fn receive(&mut self) -> Result<Vec<u8>> {
        match self {
            Transport::Tcp(t) => t.receive().await,
            Transport::Ws(t) => t.receive().await,
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        match self {
            Transport::Tcp(t) => t.close().await,
            Transport::Ws(t) => t.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn tcp_framing_round_trips() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut transport = TcpTransport { stream };
            let payload = transport.receive().await.unwrap();
            transport.send(&payload).await.unwrap();
        });

        let mut client = TcpTransport::connect_with(
            &addr.to_string(),
            Duration::from_millis(10),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        client.send(b"remote-control").await.unwrap();
        assert_eq!(client.receive().await.unwrap(), b"remote-control");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn tcp_receive_handles_split_writes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let payload = b"partial delivery".to_vec();
            let len = (payload.len() as u32).to_le_bytes();
            stream.write_all(&len).await.unwrap();
            stream.write_all(&payload[..4]).await.unwrap();
            stream.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            stream.write_all(&payload[4..]).await.unwrap();
        });

        let mut client = TcpTransport::connect(&addr.to_string()).await.unwrap();
        assert_eq!(client.receive().await.unwrap(), b"partial delivery");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn tcp_connect_fails_once_budget_is_spent() {
        // Port 1 on loopback refuses promptly on test hosts.
        let err = TcpTransport::connect_with(
            "127.0.0.1:1",
            Duration::from_millis(10),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::Connection(_)));
    }
}
