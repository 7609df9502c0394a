//! Scheduler behaviour against stub query clients, on a paused clock.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use ut2watch_engine::{EngineConfig, EngineError, QueryEngine};
use ut2watch_query::{BoxFuture, QueryClient, QueryError, QueryOptions, QueryResult, UdpQueryClient};
use ut2watch_state::{
    Persistence, Registration, Registry, ServerDetails, ServerId, ServerInfo, StateStore,
};

// ── Helpers ────────────────────────────────────────────────────────

/// Counters shared between a stub client and the test body.
#[derive(Clone, Default)]
struct Probe {
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    last_addr: Arc<Mutex<Option<SocketAddr>>>,
}

impl Probe {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct StubClient {
    probe: Probe,
    delay: Duration,
    online: bool,
}

impl StubClient {
    fn failing(probe: &Probe) -> Self {
        Self {
            probe: probe.clone(),
            delay: Duration::ZERO,
            online: false,
        }
    }

    fn online(probe: &Probe) -> Self {
        Self {
            probe: probe.clone(),
            delay: Duration::ZERO,
            online: true,
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl QueryClient for StubClient {
    fn query(&self, addr: SocketAddr, opts: QueryOptions) -> BoxFuture<'_, QueryResult<ServerDetails>> {
        Box::pin(async move {
            self.probe.calls.fetch_add(1, Ordering::SeqCst);
            *self.probe.last_addr.lock().unwrap() = Some(addr);
            let now = self.probe.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.probe.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.probe.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.online {
                Ok(ServerDetails {
                    info: ServerInfo {
                        server_name: format!("stub {addr}"),
                        map_name: "DM-Antalus".to_string(),
                        current_players: 2,
                        max_players: 10,
                        ..Default::default()
                    },
                    ..Default::default()
                })
            } else {
                Err(QueryError::Timeout(opts.timeout))
            }
        })
    }
}

fn fixture() -> (Arc<Registry>, Arc<StateStore>) {
    (Arc::new(Registry::new()), Arc::new(StateStore::new()))
}

/// No jitter so query times are exact multiples of the interval.
fn exact(max_failures: u32) -> EngineConfig {
    EngineConfig {
        max_failures,
        jitter: Duration::ZERO,
        ..Default::default()
    }
}

fn engine_until(
    registry: &Arc<Registry>,
    state: &Arc<StateStore>,
    config: EngineConfig,
    after: Duration,
) -> QueryEngine {
    QueryEngine::new(Arc::clone(registry), Arc::clone(state))
        .with_config(config)
        .with_deadline(Instant::now() + after)
}

fn every_second(address: &str, persistence: Persistence) -> Registration {
    Registration::new(address, "test")
        .with_interval(Duration::from_secs(1))
        .with_persistence(persistence)
}

// ── Scenarios ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn persistent_failing_server_goes_offline_and_stays() {
    let (registry, state) = fixture();
    let id = registry
        .register(Registration::new("127.0.0.1:7777", "Chicago").with_interval(Duration::from_secs(30)))
        .await;
    let probe = Probe::default();

    let engine = engine_until(&registry, &state, EngineConfig::default(), Duration::from_secs(30));
    let result = engine.run(|| Ok(StubClient::failing(&probe))).await;
    assert!(matches!(result, Err(EngineError::DeadlineExceeded)));

    let server = state.get(id).await.unwrap();
    assert!(!server.online);
    assert_eq!(server.failures, 1);
    assert!(server.details.is_none());
    assert!(registry.get(id).await.is_some());
    assert_eq!(probe.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn ephemeral_server_evicted_after_max_failures() {
    let (registry, state) = fixture();
    let id = registry
        .register(every_second("127.0.0.1:7777", Persistence::Ephemeral))
        .await;
    let probe = Probe::default();

    // Failures at 0s, 1s and 2s.
    let engine = engine_until(&registry, &state, exact(3), Duration::from_millis(2500));
    let _ = engine.run(|| Ok(StubClient::failing(&probe))).await;

    assert_eq!(probe.calls(), 3);
    assert!(registry.get(id).await.is_none());
    assert!(state.get(id).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn ninth_failure_survives_tenth_evicts() {
    let (registry, state) = fixture();
    let id = registry
        .register(every_second("127.0.0.1:7777", Persistence::Ephemeral))
        .await;
    let probe = Probe::default();

    let first = engine_until(&registry, &state, exact(10), Duration::from_millis(8500));
    let _ = first.run(|| Ok(StubClient::failing(&probe))).await;
    assert_eq!(state.get(id).await.unwrap().failures, 9);
    assert!(registry.get(id).await.is_some());

    let second = engine_until(&registry, &state, exact(10), Duration::from_secs(1));
    let _ = second.run(|| Ok(StubClient::failing(&probe))).await;
    assert_eq!(probe.calls(), 10);
    assert!(registry.get(id).await.is_none());
    assert!(state.get(id).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn persistent_server_is_never_evicted() {
    let (registry, state) = fixture();
    let id = registry
        .register(every_second("127.0.0.1:7777", Persistence::Persistent))
        .await;
    let probe = Probe::default();

    let engine = engine_until(&registry, &state, exact(2), Duration::from_millis(5500));
    let _ = engine.run(|| Ok(StubClient::failing(&probe))).await;

    assert_eq!(state.get(id).await.unwrap().failures, 6);
    assert!(registry.get(id).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn reregistering_as_persistent_prevents_eviction() {
    let (registry, state) = fixture();
    let id = registry
        .register(every_second("127.0.0.1:7777", Persistence::Ephemeral))
        .await;
    let probe = Probe::default();

    let first = engine_until(&registry, &state, exact(2), Duration::from_millis(500));
    let _ = first.run(|| Ok(StubClient::failing(&probe))).await;
    assert_eq!(state.get(id).await.unwrap().failures, 1);

    let same = registry
        .register(every_second("127.0.0.1:7777", Persistence::Persistent))
        .await;
    assert_eq!(same, id);

    let second = engine_until(&registry, &state, exact(2), Duration::from_secs(3));
    let _ = second.run(|| Ok(StubClient::failing(&probe))).await;

    assert_eq!(state.get(id).await.unwrap().failures, 4);
    assert!(registry.get(id).await.is_some());
}

#[tokio::test(start_paused = true)]
async fn success_records_details_and_query_port() {
    let (registry, state) = fixture();
    let id = registry
        .register(Registration::new("127.0.0.1:7777", "test"))
        .await;
    let probe = Probe::default();

    let engine = engine_until(&registry, &state, exact(10), Duration::from_millis(50));
    let _ = engine.run(|| Ok(StubClient::online(&probe))).await;

    let server = state.get(id).await.unwrap();
    assert!(server.online);
    assert_eq!(server.failures, 0);
    assert_eq!(server.resolved_address, Some("127.0.0.1:7777".parse().unwrap()));
    assert_eq!(server.details.unwrap().info.map_name, "DM-Antalus");
    assert_eq!(
        *probe.last_addr.lock().unwrap(),
        Some("127.0.0.1:7778".parse().unwrap())
    );
}

#[tokio::test(start_paused = true)]
async fn game_port_without_query_port_counts_as_failure() {
    let (registry, state) = fixture();
    let id = registry
        .register(Registration::new("127.0.0.1:65535", "test"))
        .await;
    let probe = Probe::default();

    let engine = engine_until(&registry, &state, exact(10), Duration::from_millis(50));
    let _ = engine.run(|| Ok(StubClient::online(&probe))).await;

    let server = state.get(id).await.unwrap();
    assert!(!server.online);
    assert_eq!(server.failures, 1);
    assert_eq!(server.resolved_address, Some("127.0.0.1:65535".parse().unwrap()));
    assert_eq!(probe.calls(), 0);
}

// ── Concurrency ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn concurrency_ceiling_is_respected_and_nothing_is_dropped() {
    let (registry, state) = fixture();
    for port in 0..30u16 {
        registry
            .register(
                Registration::new(format!("127.0.0.1:{}", 7000 + port * 10), "bulk")
                    .with_interval(Duration::from_secs(60)),
            )
            .await;
    }
    let probe = Probe::default();
    let config = EngineConfig {
        concurrency: 4,
        ..exact(10)
    };

    // 30 servers in batches of 4, half a second each.
    let engine = engine_until(&registry, &state, config, Duration::from_secs(5));
    let _ = engine
        .run(|| Ok(StubClient::online(&probe).with_delay(Duration::from_millis(500))))
        .await;

    assert_eq!(probe.max_in_flight(), 4);
    assert_eq!(probe.calls(), 30);
    for (_, server) in state.servers().await {
        assert!(server.online);
    }
}

#[tokio::test(start_paused = true)]
async fn one_query_in_flight_per_server() {
    let (registry, state) = fixture();
    let id = registry
        .register(every_second("127.0.0.1:7777", Persistence::Persistent))
        .await;
    let probe = Probe::default();

    // Queries take three times the interval: 0..3s, 4..7s, 8s..
    let engine = engine_until(&registry, &state, exact(10), Duration::from_secs(10));
    let _ = engine
        .run(|| Ok(StubClient::online(&probe).with_delay(Duration::from_secs(3))))
        .await;

    assert_eq!(probe.max_in_flight(), 1);
    assert_eq!(probe.calls(), 3);
    assert!(engine.pending().contains(id));
}

#[tokio::test(start_paused = true)]
async fn removal_during_query_is_not_resurrected() {
    let (registry, state) = fixture();
    let id = registry
        .register(every_second("127.0.0.1:7777", Persistence::Persistent))
        .await;
    let probe = Probe::default();

    let engine = engine_until(&registry, &state, exact(10), Duration::from_secs(5));
    let remove = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        engine.remove_server(id).await
    };
    let (result, removed) = tokio::join!(
        engine.run(|| Ok(StubClient::online(&probe).with_delay(Duration::from_secs(2)))),
        remove
    );

    assert!(matches!(result, Err(EngineError::DeadlineExceeded)));
    assert_eq!(removed.unwrap().address, "127.0.0.1:7777");
    assert_eq!(probe.calls(), 1);
    assert!(registry.is_empty().await);
    assert!(state.get(id).await.is_none());
    assert!(engine.pending().is_empty());
}

#[tokio::test(start_paused = true)]
async fn orphaned_state_is_pruned() {
    let (registry, state) = fixture();
    state.get_or_add(ServerId(999)).await;
    let config = EngineConfig {
        prune_every: 1,
        ..exact(10)
    };

    let engine = engine_until(&registry, &state, config, Duration::from_millis(50));
    let _ = engine.run(|| Ok(StubClient::online(&Probe::default()))).await;

    assert!(state.get(ServerId(999)).await.is_none());
}

// ── Lifecycle ──────────────────────────────────────────────────────

#[tokio::test]
async fn connector_failure_is_fatal() {
    let (registry, state) = fixture();
    let engine = QueryEngine::new(registry, state);

    let err = engine
        .run(|| UdpQueryClient::new("not-an-ip"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Init(QueryError::InvalidBind(_))));
    assert!(!err.is_shutdown());
}

#[tokio::test(start_paused = true)]
async fn stop_twice_returns_ok() {
    let (registry, state) = fixture();
    registry
        .register(Registration::new("127.0.0.1:7777", "test"))
        .await;
    let engine = QueryEngine::new(registry, state);

    let stopper = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        engine.stop();
        engine.stop();
    };
    let (result, ()) = tokio::join!(engine.run(|| Ok(StubClient::online(&Probe::default()))), stopper);
    assert!(result.is_ok());

    // A stopped engine returns immediately.
    engine.stop();
    assert!(engine.run(|| Ok(StubClient::online(&Probe::default()))).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn external_cancellation_is_a_shutdown_error() {
    let (registry, state) = fixture();
    let token = CancellationToken::new();
    let engine = QueryEngine::new(registry, state).with_cancellation(token.clone());

    let cancel = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
    };
    let (result, ()) = tokio::join!(engine.run(|| Ok(StubClient::online(&Probe::default()))), cancel);

    let err = result.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert!(err.is_shutdown());
}

#[tokio::test(start_paused = true)]
async fn deadline_is_a_shutdown_error() {
    let (registry, state) = fixture();
    let engine = engine_until(&registry, &state, EngineConfig::default(), Duration::from_secs(1));

    let err = engine
        .run(|| Ok(StubClient::online(&Probe::default())))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::DeadlineExceeded));
    assert!(err.is_shutdown());
}
