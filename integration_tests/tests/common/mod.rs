//! In-process mock of the simulation host: a websocket server speaking the
//! command/poll envelope with server-held long polls and a mutable world
//! snapshot the tests drive directly.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use sim_control::Endpoint;
use sim_wire::{
    Ack, ClientReply, ClientRequest, CommandResult, Envelope, EnvelopeKind, PollArgs, PollBatch,
    ResponseCode, Snapshot, StaticMetadata, WireResponse,
};

const QUEUE_ID: u64 = 1;
/// Extra latency applied to commands whose message text is "slow".
const SLOW_COMMAND_DELAY: Duration = Duration::from_millis(300);

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .try_init();
    });
}

struct HostState {
    snapshot: Mutex<Snapshot>,
    metadata: Mutex<StaticMetadata>,
    queue: Mutex<VecDeque<CommandResult>>,
    queue_notify: Notify,
    next_id: AtomicU64,
}

impl HostState {
    fn new() -> Self {
        Self {
            snapshot: Mutex::new(Snapshot::default()),
            metadata: Mutex::new(StaticMetadata::default()),
            queue: Mutex::new(VecDeque::new()),
            queue_notify: Notify::new(),
            next_id: AtomicU64::new(0),
        }
    }

    async fn push_result(&self, result: CommandResult) {
        self.queue.lock().await.push_back(result);
        self.queue_notify.notify_waiters();
    }
}

pub struct MockHost {
    port: u16,
    state: Arc<HostState>,
}

impl MockHost {
    pub async fn spawn() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock host");
        let port = listener.local_addr().expect("local addr").port();
        let state = Arc::new(HostState::new());
        tokio::spawn(accept_loop(listener, state.clone()));
        Self { port, state }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new("127.0.0.1", self.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn set_snapshot(&self, snapshot: Snapshot) {
        *self.state.snapshot.lock().await = snapshot;
    }

    pub async fn set_metadata(&self, metadata: StaticMetadata) {
        *self.state.metadata.lock().await = metadata;
    }

    /// Advance the world by one frame and return the new frame number.
    pub async fn advance_frame(&self) -> u64 {
        let mut snapshot = self.state.snapshot.lock().await;
        snapshot.frame += 1;
        snapshot.frame
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<HostState>) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(session(stream, state.clone()));
    }
}

async fn session(stream: TcpStream, state: Arc<HostState>) {
    let Ok(mut ws) = accept_async(stream).await else {
        return;
    };
    while let Some(Ok(message)) = ws.next().await {
        let data = match message {
            Message::Binary(data) => data,
            Message::Close(_) => break,
            _ => continue,
        };
        let response = handle_frame(&state, &data).await;
        let bytes = sim_wire::encode(&response).expect("encode response");
        if ws.send(Message::Binary(bytes)).await.is_err() {
            break;
        }
    }
}

async fn handle_frame(state: &Arc<HostState>, data: &[u8]) -> WireResponse {
    let Ok(envelope) = sim_wire::decode::<Envelope>(data) else {
        return WireResponse::error("bad envelope");
    };
    match envelope.kind {
        EnvelopeKind::ClientCommand => handle_command(state, &envelope.payload).await,
        EnvelopeKind::PollBlocking => handle_poll(state, &envelope.payload).await,
    }
}

async fn handle_command(state: &Arc<HostState>, payload: &[u8]) -> WireResponse {
    let Ok(request) = sim_wire::decode::<ClientRequest>(payload) else {
        return WireResponse::error("bad request");
    };
    let id = state.next_id.fetch_add(1, Ordering::SeqCst) + 1;

    let (reply, delay) = evaluate(state, &request).await;
    let result = CommandResult {
        command_id: id,
        code: ResponseCode::Ok,
        error: None,
        body: sim_wire::encode(&reply).expect("encode reply"),
    };
    match delay {
        Some(delay) => {
            let state = state.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                state.push_result(result).await;
            });
        }
        None => state.push_result(result).await,
    }

    let ack = Ack {
        queue_id: QUEUE_ID,
        id,
    };
    WireResponse::ok(sim_wire::encode(&ack).expect("encode ack"))
}

async fn evaluate(
    state: &Arc<HostState>,
    request: &ClientRequest,
) -> (ClientReply, Option<Duration>) {
    match request {
        ClientRequest::GetState => {
            let snapshot = state.snapshot.lock().await.clone();
            (ClientReply::State(snapshot), None)
        }
        ClientRequest::GetInitials => {
            let metadata = state.metadata.lock().await.clone();
            (ClientReply::Initials(metadata), None)
        }
        ClientRequest::PlaceQuery { cells, .. } => {
            (ClientReply::PlaceLocations(cells.clone()), None)
        }
        ClientRequest::AddMessage { message, .. } if message == "slow" => {
            (ClientReply::Done, Some(SLOW_COMMAND_DELAY))
        }
        _ => (ClientReply::Done, None),
    }
}

async fn handle_poll(state: &Arc<HostState>, payload: &[u8]) -> WireResponse {
    let Ok(args) = sim_wire::decode::<PollArgs>(payload) else {
        return WireResponse::error("bad poll args");
    };
    if args.queue_id != QUEUE_ID {
        return WireResponse::error(format!("unknown queue {}", args.queue_id));
    }
    let deadline = tokio::time::Instant::now() + Duration::from_millis(args.timeout_ms);
    loop {
        let notified = state.queue_notify.notified();
        {
            let mut queue = state.queue.lock().await;
            if !queue.is_empty() {
                let results = queue.drain(..).collect();
                let batch = PollBatch { results };
                return WireResponse::ok(sim_wire::encode(&batch).expect("encode batch"));
            }
        }
        if tokio::time::timeout_at(deadline, notified).await.is_err() {
            // Held long enough; an empty batch lets the client re-poll.
            let batch = PollBatch::default();
            return WireResponse::ok(sim_wire::encode(&batch).expect("encode batch"));
        }
    }
}
