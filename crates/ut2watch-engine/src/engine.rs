//! The polling scheduler.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use ut2watch_query::{QueryClient, QueryOptions, QueryResult};
use ut2watch_state::{
    Registration, Registry, ServerDetails, ServerId, ServerState, StateStore, StateUpdate,
};

use crate::error::{EngineError, EngineResult, PollError};
use crate::pending::{PendingGuard, PendingSet};

// ── Configuration ──────────────────────────────────────────────────

/// Tuning knobs for [`QueryEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of queries in flight.
    pub concurrency: usize,
    /// Consecutive failures after which an ephemeral server is dropped.
    pub max_failures: u32,
    /// Tick period of the dispatch loop.
    pub resolution: Duration,
    /// Upper bound (exclusive) of the random delay added to each interval.
    pub jitter: Duration,
    /// Ticks between two passes that drop state of unregistered servers.
    pub prune_every: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 12,
            max_failures: 10,
            resolution: Duration::from_millis(10),
            jitter: Duration::from_millis(2000),
            prune_every: 100,
        }
    }
}

impl EngineConfig {
    /// Replace zero values that would stall the engine with defaults.
    /// A zero jitter is valid and disables jitter.
    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.concurrency == 0 {
            self.concurrency = defaults.concurrency;
        }
        if self.max_failures == 0 {
            self.max_failures = defaults.max_failures;
        }
        if self.resolution.is_zero() {
            self.resolution = defaults.resolution;
        }
        if self.prune_every == 0 {
            self.prune_every = defaults.prune_every;
        }
        self
    }
}

// ── Engine ─────────────────────────────────────────────────────────

/// Periodically queries every registered server and records the outcome.
pub struct QueryEngine {
    registry: Arc<Registry>,
    state: Arc<StateStore>,
    config: EngineConfig,
    pending: PendingSet,
    stop: CancellationToken,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl QueryEngine {
    /// Create an engine over shared registry and state with default tuning.
    pub fn new(registry: Arc<Registry>, state: Arc<StateStore>) -> Self {
        Self {
            registry,
            state,
            config: EngineConfig::default(),
            pending: PendingSet::new(),
            stop: CancellationToken::new(),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config.sanitized();
        self
    }

    /// Abort `run` with [`EngineError::Cancelled`] when `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Abort `run` with [`EngineError::DeadlineExceeded`] at `deadline`.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Ids with a query currently in flight.
    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }

    /// Ask a running (or future) `run` to return `Ok(())`. Idempotent.
    pub fn stop(&self) {
        if !self.stop.is_cancelled() {
            info!("query engine stop requested");
        }
        self.stop.cancel();
    }

    /// Retire a server: drop its registration and its state.
    ///
    /// A query already in flight for it finishes and is discarded.
    pub async fn remove_server(&self, id: ServerId) -> Option<Registration> {
        let removed = self.registry.unregister(id).await;
        self.state.remove(id).await;
        if let Some(ref registration) = removed {
            info!(%id, addr = %registration.address, "server removed");
        }
        removed
    }

    /// Build the query client with `connect` and poll until stopped.
    ///
    /// Returns `Ok(())` after [`stop`](Self::stop), and an error for
    /// cancellation, deadline or a failing `connect`.
    pub async fn run<C, F>(&self, connect: F) -> EngineResult<()>
    where
        C: QueryClient + 'static,
        F: FnOnce() -> QueryResult<C>,
    {
        let client = Arc::new(connect().map_err(EngineError::Init)?);
        let slots = Arc::new(Semaphore::new(self.config.concurrency));

        let mut ticker = tokio::time::interval(self.config.resolution);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        info!(
            concurrency = self.config.concurrency,
            max_failures = self.config.max_failures,
            "query engine started"
        );

        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => {
                    info!("query engine stopped");
                    return Ok(());
                }
                _ = self.cancel.cancelled() => {
                    info!("query engine cancelled");
                    return Err(EngineError::Cancelled);
                }
                _ = &mut deadline => {
                    info!("query engine deadline reached");
                    return Err(EngineError::DeadlineExceeded);
                }
                _ = ticker.tick() => {
                    self.dispatch_due(&client, &slots).await;
                    ticks = ticks.wrapping_add(1);
                    if ticks % self.config.prune_every == 0 {
                        self.prune().await;
                    }
                }
            }
        }
    }

    /// One tick: start a worker for every due server that has none running.
    async fn dispatch_due<C: QueryClient + 'static>(&self, client: &Arc<C>, slots: &Arc<Semaphore>) {
        let now = Instant::now();
        for registration in self.registry.registrations().await {
            let state = self.state.get_or_add(registration.id).await;
            if !self.is_due(&registration, &state, now) {
                continue;
            }
            let Some(guard) = self.pending.try_mark(registration.id) else {
                continue;
            };
            // No slot: leave it due and retry on a later tick.
            let Ok(permit) = Arc::clone(slots).try_acquire_owned() else {
                trace!(id = %registration.id, "no free query slot");
                continue;
            };

            let worker = Worker {
                registry: Arc::clone(&self.registry),
                state: Arc::clone(&self.state),
                client: Arc::clone(client),
                max_failures: self.config.max_failures,
            };
            tokio::spawn(worker.run(registration, permit, guard));
        }
    }

    fn is_due(&self, registration: &Registration, state: &ServerState, now: Instant) -> bool {
        match state.since_update(now) {
            None => true,
            Some(elapsed) => elapsed >= registration.interval + self.jitter(),
        }
    }

    /// Fresh random delay in `[0, jitter)`.
    fn jitter(&self) -> Duration {
        let max = self.config.jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max))
    }

    /// Drop state entries whose registration is gone.
    async fn prune(&self) {
        let live: HashSet<ServerId> = self
            .registry
            .registrations()
            .await
            .into_iter()
            .map(|r| r.id)
            .collect();
        let pruned = self.state.prune(&live).await;
        if pruned > 0 {
            debug!(pruned, "pruned state of unregistered servers");
        }
    }
}

// ── Worker ─────────────────────────────────────────────────────────

struct Worker<C> {
    registry: Arc<Registry>,
    state: Arc<StateStore>,
    client: Arc<C>,
    max_failures: u32,
}

impl<C: QueryClient> Worker<C> {
    /// Query one server and record the result. Slot and pending mark are
    /// released when this returns.
    async fn run(self, registration: Registration, _permit: OwnedSemaphorePermit, _guard: PendingGuard) {
        let id = registration.id;

        let update = match self.poll(&registration).await {
            Ok((addr, details)) => {
                debug!(
                    %id,
                    addr = %registration.address,
                    name = %details.info.server_name,
                    map = %details.info.map_name,
                    players = details.info.current_players,
                    "server online"
                );
                StateUpdate::online(details, addr)
            }
            Err((resolved, error)) => {
                warn!(%id, addr = %registration.address, %error, "query failed");
                StateUpdate::offline(resolved)
            }
        };

        let state = match self.state.update(id, update).await {
            Ok(state) => state,
            Err(error) => {
                debug!(%id, %error, "server removed during query, result discarded");
                return;
            }
        };

        if !state.online && registration.is_ephemeral() && state.failures >= self.max_failures {
            self.evict(&registration, state.failures).await;
        }
    }

    /// Resolve the game address, then query the port after it. The error
    /// side carries the address if resolution got that far.
    async fn poll(
        &self,
        registration: &Registration,
    ) -> Result<(SocketAddr, ServerDetails), (Option<SocketAddr>, PollError)> {
        let game = resolve(&registration.address).await.map_err(|e| (None, e))?;
        let details = self
            .query(game, registration.timeout)
            .await
            .map_err(|e| (Some(game), e))?;
        Ok((game, details))
    }

    async fn query(&self, game: SocketAddr, timeout: Duration) -> Result<ServerDetails, PollError> {
        let port = game
            .port()
            .checked_add(1)
            .ok_or(PollError::NoQueryPort(game.port()))?;
        let opts = QueryOptions::new()
            .with_rules()
            .with_players()
            .with_timeout(timeout);
        Ok(self.client.query(SocketAddr::new(game.ip(), port), opts).await?)
    }

    async fn evict(&self, registration: &Registration, failures: u32) {
        // Re-checks persistence under the registry lock: a concurrent
        // re-registration as persistent wins.
        if self.registry.unregister_ephemeral(registration.id).await.is_some() {
            self.state.remove(registration.id).await;
            info!(
                id = %registration.id,
                addr = %registration.address,
                failures,
                "evicted unresponsive ephemeral server"
            );
        }
    }
}

async fn resolve(address: &str) -> Result<SocketAddr, PollError> {
    tokio::net::lookup_host(address)
        .await
        .map_err(PollError::Resolve)?
        .next()
        .ok_or(PollError::NoAddress)
}
