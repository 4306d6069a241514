//! One logical request/response stream over a framed transport.
//!
//! A channel runs a background pump: it waits for the first outbound
//! message, connects (bounded attempts, fixed delay), sends it, then
//! strictly alternates between receiving one inbound frame — delivered as
//! the response to the last `send_message` call — and sending the next
//! outbound message. There is no pipelining inside one channel; callers
//! needing overlap open a second channel.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::{ClientError, Result};
use crate::transport::{Transport, WsTransport};

/// Connect attempts made by the pump before giving up.
pub const CONNECT_TRIES: u32 = 15;
/// Fixed delay between pump connect attempts.
pub const CONNECT_DELAY: Duration = Duration::from_secs(1);

enum Outbound {
    Message(Vec<u8>, oneshot::Sender<Result<Vec<u8>>>),
    Close,
}

/// Cheap cloneable sender half of a channel, used by background loops.
#[derive(Clone)]
pub struct ChannelHandle {
    tx: mpsc::Sender<Outbound>,
}

impl ChannelHandle {
    /// Send one framed message and await exactly one response.
    pub async fn send_message(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Outbound::Message(payload, reply_tx))
            .await
            .map_err(|_| ClientError::Closed)?;
        reply_rx.await.map_err(|_| ClientError::Closed)?
    }
}

/// Owning side of one request/response stream.
pub struct SocketChannel {
    tx: mpsc::Sender<Outbound>,
    pump: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SocketChannel {
    /// Open a channel over a websocket endpoint. The connection itself is
    /// established lazily by the pump once the first message is submitted.
    pub fn open(url: String) -> Self {
        let (tx, rx) = mpsc::channel(16);
        let pump = tokio::spawn(pump_loop(url, rx));
        Self {
            tx,
            pump: std::sync::Mutex::new(Some(pump)),
        }
    }

    pub fn handle(&self) -> ChannelHandle {
        ChannelHandle {
            tx: self.tx.clone(),
        }
    }

    pub async fn send_message(&self, payload: Vec<u8>) -> Result<Vec<u8>> {
        self.handle().send_message(payload).await
    }

    /// Send the close sentinel and wait for the pump to exit.
    pub async fn close(&self) {
        let _ = self.tx.send(Outbound::Close).await;
        let pump = self.pump.lock().expect("pump handle mutex poisoned").take();
        if let Some(pump) = pump {
            let _ = pump.await;
        }
    }
}

async fn connect_with_retries(url: &str) -> Result<Transport> {
    let mut last = ClientError::Closed;
    for attempt in 1..=CONNECT_TRIES {
        match WsTransport::connect(url).await {
            Ok(ws) => return Ok(Transport::Ws(ws)),
            Err(err) => {
                debug!("connect failed (try {}/{}): {}", attempt, CONNECT_TRIES, err);
                last = err;
                if attempt < CONNECT_TRIES {
                    tokio::time::sleep(CONNECT_DELAY).await;
                }
            }
        }
    }
    Err(last)
}

async fn pump_loop(url: String, mut rx: mpsc::Receiver<Outbound>) {
    // Wait for the first outbound message before touching the network.
    let first = match rx.recv().await {
        Some(Outbound::Message(payload, reply)) => (payload, reply),
        Some(Outbound::Close) | None => return,
    };

    let mut transport = match connect_with_retries(&url).await {
        Ok(transport) => transport,
        Err(err) => {
            error!("channel connect to {} failed: {}", url, err);
            let _ = first.1.send(Err(err));
            drain(&mut rx).await;
            return;
        }
    };

    let mut next = Some(first);
    // A message that arrived while a response was still outstanding.
    let mut queued: Option<(Vec<u8>, oneshot::Sender<Result<Vec<u8>>>)> = None;
    while let Some((payload, reply)) = next.take() {
        if let Err(err) = transport.send(payload).await {
            error!("channel send failed: {}", err);
            let _ = reply.send(Err(err));
            break;
        }
        // Wait for the response, but keep watching the queue so a close
        // request can interrupt a long-held server-side poll.
        let received = {
            let receive = transport.receive();
            tokio::pin!(receive);
            loop {
                tokio::select! {
                    received = &mut receive => break Some(received),
                    outbound = rx.recv(), if queued.is_none() => match outbound {
                        Some(Outbound::Message(payload, reply)) => {
                            queued = Some((payload, reply));
                        }
                        Some(Outbound::Close) | None => break None,
                    },
                }
            }
        };
        match received {
            Some(Ok(frame)) => {
                let _ = reply.send(Ok(frame));
            }
            Some(Err(err)) => {
                error!("channel receive failed: {}", err);
                let _ = reply.send(Err(err));
                break;
            }
            None => {
                let _ = reply.send(Err(ClientError::Closed));
                let _ = transport.close().await;
                break;
            }
        }
        next = match queued.take() {
            Some(message) => Some(message),
            None => match rx.recv().await {
                Some(Outbound::Message(payload, reply)) => Some((payload, reply)),
                Some(Outbound::Close) | None => {
                    let _ = transport.close().await;
                    break;
                }
            },
        };
    }
    if let Some((_, reply)) = queued.take() {
        let _ = reply.send(Err(ClientError::Closed));
    }
    drain(&mut rx).await;
}

/// Resolve any queued or late senders so their callers observe `Closed`.
async fn drain(rx: &mut mpsc::Receiver<Outbound>) {
    rx.close();
    while let Some(outbound) = rx.recv().await {
        if let Outbound::Message(_, reply) = outbound {
            let _ = reply.send(Err(ClientError::Closed));
        }
    }
}
