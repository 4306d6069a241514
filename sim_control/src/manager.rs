//! Session manager: owns the dual-channel client and the snapshot cache,
//! runs the poll loop, and exposes the typed surface application logic
//! programs against.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use sim_wire::{
    ClientReply, ClientRequest, PlayerState, ResponseCode, Snapshot, Stage, StaticMetadata,
};

use crate::client::{DualClient, Endpoint};
use crate::commands;
use crate::error::{ClientError, Result};
use crate::state::StateCache;

/// Poll loops slower than this stall pending-action sweeps.
pub const MIN_POLL_HZ: u32 = 1;
/// The host rejects noticeably faster polling anyway.
pub const MAX_POLL_HZ: u32 = 60;

const STATS_WINDOW: u64 = 30;

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub host: String,
    pub port: u16,
    /// Snapshot poll rate; clamped to [1, 60] Hz.
    pub poll_hz: u32,
    pub command_timeout: Duration,
}

impl ManagerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            poll_hz: 20,
            command_timeout: Duration::from_secs(5),
        }
    }

    pub fn poll_period(&self) -> Duration {
        let hz = self.poll_hz.clamp(MIN_POLL_HZ, MAX_POLL_HZ);
        Duration::from_secs_f64(1.0 / f64::from(hz))
    }
}

/// Callback run after each accepted snapshot. Failures are caught, logged,
/// and skipped for that cycle only; polling continues.
pub type StepFn = Box<
    dyn FnMut(&Arc<Snapshot>, &StateCache) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>
        + Send,
>;

pub struct Manager {
    config: ManagerConfig,
    client: Arc<DualClient>,
    cache: Arc<StateCache>,
    steps: Vec<StepFn>,
    stop_tx: watch::Sender<bool>,
    main_task: Option<JoinHandle<()>>,
}

impl Manager {
    /// Open the client connections. The poll loop starts with [`start`].
    ///
    /// [`start`]: Manager::start
    pub fn new(config: ManagerConfig) -> Self {
        let endpoint = Endpoint::new(config.host.clone(), config.port);
        let client = Arc::new(DualClient::connect(&endpoint));
        let (stop_tx, _) = watch::channel(false);
        Self {
            config,
            client,
            cache: Arc::new(StateCache::new()),
            steps: Vec::new(),
            stop_tx,
            main_task: None,
        }
    }

    pub fn cache(&self) -> Arc<StateCache> {
        self.cache.clone()
    }

    pub fn client(&self) -> Arc<DualClient> {
        self.client.clone()
    }

    /// Register a per-snapshot callback. Must be called before [`start`].
    ///
    /// [`start`]: Manager::start
    pub fn add_step(&mut self, step: StepFn) {
        self.steps.push(step);
    }

    /// Spawn the snapshot poll loop.
    pub fn start(&mut self) {
        let steps = std::mem::take(&mut self.steps);
        self.main_task = Some(tokio::spawn(main_loop(
            self.client.clone(),
            self.cache.clone(),
            self.stop_tx.subscribe(),
            steps,
            self.config.clone(),
        )));
    }

    /// Signal the poll loop, await its exit, then stop the client.
    pub async fn stop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(task) = self.main_task.take() {
            let _ = task.await;
        }
        self.client.stop().await;
    }

    /// Submit a typed request and decode its typed reply.
    pub async fn run(&self, request: ClientRequest) -> Result<ClientReply> {
        let result = self
            .client
            .exec_command(&request, self.config.command_timeout)
            .await?;
        if result.code == ResponseCode::Error {
            let message = result.error.unwrap_or_else(|| "unspecified".into());
            warn!("command failed: {}", message);
            return Err(ClientError::Server(message));
        }
        Ok(sim_wire::decode(&result.body)?)
    }

    pub async fn get_state(&self) -> Result<Snapshot> {
        match self.run(commands::get_state()).await? {
            ClientReply::State(snapshot) => Ok(snapshot),
            other => Err(reply_mismatch("State", &other)),
        }
    }

    /// Block until `predicate` holds for the cached snapshot.
    pub async fn wait_state<F>(&self, predicate: F, timeout: Duration) -> Result<Arc<Snapshot>>
    where
        F: FnMut(&Snapshot) -> bool,
    {
        self.cache.wait_state(predicate, timeout).await
    }

    pub fn players(&self) -> Vec<PlayerState> {
        self.cache.players()
    }

    pub fn current_player(&self) -> Option<PlayerState> {
        self.cache.current_player()
    }
}

fn reply_mismatch(expected: &str, got: &ClientReply) -> ClientError {
    ClientError::Protocol(format!("expected {} reply, got {:?}", expected, got))
}

async fn fetch_state(client: &DualClient, timeout: Duration) -> Result<Snapshot> {
    let result = client
        .exec_command(&commands::get_state(), timeout)
        .await?;
    if result.code == ResponseCode::Error {
        return Err(ClientError::Server(
            result.error.unwrap_or_else(|| "unspecified".into()),
        ));
    }
    match sim_wire::decode::<ClientReply>(&result.body)? {
        ClientReply::State(snapshot) => Ok(snapshot),
        other => Err(reply_mismatch("State", &other)),
    }
}

async fn fetch_initials(client: &DualClient, timeout: Duration) -> Result<StaticMetadata> {
    let result = client
        .exec_command(&commands::get_initials(), timeout)
        .await?;
    if result.code == ResponseCode::Error {
        return Err(ClientError::Server(
            result.error.unwrap_or_else(|| "unspecified".into()),
        ));
    }
    match sim_wire::decode::<ClientReply>(&result.body)? {
        ClientReply::Initials(metadata) => Ok(metadata),
        other => Err(reply_mismatch("Initials", &other)),
    }
}

async fn main_loop(
    client: Arc<DualClient>,
    cache: Arc<StateCache>,
    mut stop_rx: watch::Receiver<bool>,
    mut steps: Vec<StepFn>,
    config: ManagerConfig,
) {
    let mut ticker = tokio::time::interval(config.poll_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stats = LoopStats::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop_rx.wait_for(|stop| *stop) => break,
        }

        let snapshot = match fetch_state(&client, config.command_timeout).await {
            Ok(snapshot) => snapshot,
            Err(err) if err.is_timeout() => {
                error!("could not fetch snapshot: {}", err);
                continue;
            }
            Err(err) => {
                error!("snapshot loop aborting: {}", err);
                break;
            }
        };

        if !cache.should_update(&snapshot) {
            continue;
        }

        // The catalog only exists once the simulation is in-game; a host
        // still loading may already advance frames.
        if snapshot.stage == Stage::Ingame && !cache.has_metadata() {
            match fetch_initials(&client, config.command_timeout).await {
                Ok(metadata) if !metadata.type_classes.is_empty() => {
                    cache.set_metadata(metadata);
                }
                Ok(_) => debug!("initials not yet populated"),
                Err(err) => warn!("initials fetch failed: {}", err),
            }
        }

        cache.set_state(snapshot);
        let current = cache.current();
        for step in steps.iter_mut() {
            if let Err(err) = step(&current, &cache) {
                error!("step failed, skipping this cycle: {}", err);
            }
        }
        stats.observe();
    }
    debug!("snapshot loop exited");
}

/// Periodic throughput log for the poll loop.
struct LoopStats {
    iters: u64,
    window_started: Instant,
}

impl LoopStats {
    fn new() -> Self {
        Self {
            iters: 0,
            window_started: Instant::now(),
        }
    }

    fn observe(&mut self) {
        self.iters += 1;
        if self.iters % STATS_WINDOW == 0 {
            let elapsed = self.window_started.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                debug!(
                    iters = self.iters,
                    avg_duration = elapsed / STATS_WINDOW as f64,
                    avg_fps = STATS_WINDOW as f64 / elapsed,
                    "poll loop stats"
                );
            }
            self.window_started = Instant::now();
        }
    }
}
