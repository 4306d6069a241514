//! Dual-channel client: one channel submits commands, the other long-polls
//! for their results, and a correlation store pairs each result with the
//! caller that submitted the matching request id.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use sim_wire::{
    Ack, ClientRequest, CommandResult, Envelope, EnvelopeKind, PollArgs, PollBatch, ResponseCode,
    WireResponse,
};

use crate::channel::{ChannelHandle, SocketChannel};
use crate::error::{ClientError, Result};
use crate::store::ResultStore;
use crate::transport::WS_PATH;

/// Default time the server holds a poll open.
pub const LONG_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Location of the simulation host's websocket endpoint.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}:{}{}", self.host, self.port, WS_PATH)
    }
}

pub struct DualClient {
    command: SocketChannel,
    poll: SocketChannel,
    results: Arc<ResultStore<CommandResult>>,
    queue_tx: watch::Sender<Option<u64>>,
    stop_tx: watch::Sender<bool>,
    poll_task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl DualClient {
    /// Open both channels and start the poll loop. Connections are made
    /// lazily on first use; the poll loop stays parked until the first
    /// command ack reveals this session's queue id.
    pub fn connect(endpoint: &Endpoint) -> Self {
        let command = SocketChannel::open(endpoint.url());
        let poll = SocketChannel::open(endpoint.url());
        let results = Arc::new(ResultStore::new());
        let (queue_tx, queue_rx) = watch::channel(None);
        let (stop_tx, stop_rx) = watch::channel(false);
        let poll_task = tokio::spawn(poll_loop(
            poll.handle(),
            results.clone(),
            queue_rx,
            stop_rx,
            LONG_POLL_TIMEOUT,
        ));
        Self {
            command,
            poll,
            results,
            queue_tx,
            stop_tx,
            poll_task: std::sync::Mutex::new(Some(poll_task)),
        }
    }

    /// Submit a command on the command channel and return its ack.
    pub async fn run_client_command(&self, request: &ClientRequest) -> Result<Ack> {
        let envelope = Envelope {
            kind: EnvelopeKind::ClientCommand,
            payload: sim_wire::encode(request)?,
        };
        let raw = self.command.send_message(sim_wire::encode(&envelope)?).await?;
        let response: WireResponse = sim_wire::decode(&raw)?;
        if response.code == ResponseCode::Error {
            return Err(ClientError::Server(
                response.error.unwrap_or_else(|| "unspecified".into()),
            ));
        }
        let ack: Ack = sim_wire::decode(&response.body)?;
        trace!(id = ack.id, queue_id = ack.queue_id, "command acked");
        Ok(ack)
    }

    /// Submit a command and block until its result is polled, or `timeout`
    /// elapses. The first ack fixes this client's queue id for its
    /// lifetime, releasing the poll loop.
    pub async fn exec_command(
        &self,
        request: &ClientRequest,
        timeout: Duration,
    ) -> Result<CommandResult> {
        let ack = self.run_client_command(request).await?;
        self.queue_tx.send_if_modified(|queue| {
            if queue.is_none() {
                *queue = Some(ack.queue_id);
                true
            } else {
                false
            }
        });
        self.results.get(ack.id, timeout, true).await
    }

    /// Signal the poll loop, await its exit, then close both channels.
    pub async fn stop(&self) {
        let _ = self.stop_tx.send(true);
        let task = self
            .poll_task
            .lock()
            .expect("poll task mutex poisoned")
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.command.close().await;
        self.poll.close().await;
    }
}

async fn poll_loop(
    channel: ChannelHandle,
    results: Arc<ResultStore<CommandResult>>,
    mut queue_rx: watch::Receiver<Option<u64>>,
    mut stop_rx: watch::Receiver<bool>,
    long_poll: Duration,
) {
    // No queue id exists until the first command is acked.
    let queue_id = tokio::select! {
        _ = stop_rx.wait_for(|stop| *stop) => return,
        changed = queue_rx.wait_for(|queue| queue.is_some()) => match changed {
            Ok(queue) => match *queue {
                Some(id) => id,
                None => return,
            },
            Err(_) => return,
        },
    };
    debug!(queue_id, "poll loop started");

    while !*stop_rx.borrow() {
        let args = PollArgs {
            queue_id,
            timeout_ms: long_poll.as_millis() as u64,
        };
        // Abandon an in-flight long poll on stop instead of riding it out.
        let batch = tokio::select! {
            _ = stop_rx.wait_for(|stop| *stop) => return,
            polled = poll_once(&channel, &args) => match polled {
                Ok(batch) => batch,
                Err(err) => {
                    error!("poll loop aborting: {}", err);
                    return;
                }
            },
        };
        if !batch.results.is_empty() {
            trace!(
                batch = %sim_wire::encode_json(&batch).unwrap_or_default(),
                "poll batch received"
            );
        }
        for result in batch.results {
            let id = result.command_id;
            if let Err(err) = results.put(id, result).await {
                error!("poll loop aborting: {}", err);
                return;
            }
            trace!(id, "result stored");
        }
    }
}

async fn poll_once(channel: &ChannelHandle, args: &PollArgs) -> Result<PollBatch> {
    let envelope = Envelope {
        kind: EnvelopeKind::PollBlocking,
        payload: sim_wire::encode(args)?,
    };
    let raw = channel.send_message(sim_wire::encode(&envelope)?).await?;
    let response: WireResponse = sim_wire::decode(&raw)?;
    if response.code == ResponseCode::Error {
        return Err(ClientError::Server(
            response.error.unwrap_or_else(|| "unspecified".into()),
        ));
    }
    Ok(sim_wire::decode(&response.body)?)
}
