//! Probes over real UDP sockets and the daemon loop.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};

use svarog::config::{AdaptiveConfig, LinkCostConfig, RoutingConfig};
use svarog::daemon::{DaemonChannels, RoutingDaemon};
use svarog::error::Result;
use svarog::linkcost::LinkCostManager;
use svarog::probe::{
    serve_probes, Face, ProbeName, ProbeOutcomeKind, ProbeRequest, ProbeResponder, Signer,
    TokioFace, UdpProbeTransport,
};
use svarog::routing::{
    Adjacency, CalculationSchedule, InMemoryAdjacencyTable, InMemoryTopologyDatabase,
    RoutingOrchestrator,
};
use svarog::types::Name;
use svarog::util::SystemClock;

struct NullSigner;

impl Signer for NullSigner {
    fn sign(&self, _name: &Name, _content: &[u8]) -> Result<Vec<u8>> {
        Ok(vec![0xAB; 8])
    }
}

/// Start a responder for `router` on an ephemeral loopback port.
async fn start_responder(router: &str) -> (SocketAddr, broadcast::Sender<()>) {
    let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let addr = socket.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let responder = ProbeResponder::new(&Name::from(router), Arc::new(NullSigner));
    tokio::spawn(serve_probes(socket, responder, shutdown_rx));
    (addr, shutdown_tx)
}

// ============================================================================
// Transport
// ============================================================================

#[tokio::test]
async fn test_udp_probe_answered() {
    let (addr, shutdown) = start_responder("/ndn/b").await;
    let transport = Arc::new(UdpProbeTransport::new());
    transport.add_route(Name::from("/ndn/b"), addr);
    let (face, mut outcomes) = TokioFace::new(transport);

    let probe = ProbeName::new(Name::from("/ndn/b"), 7);
    face.express(ProbeRequest::new(&probe, Duration::from_secs(2)))
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.seq, 7);
    assert_eq!(outcome.neighbor, Name::from("/ndn/b"));
    assert_eq!(outcome.kind, ProbeOutcomeKind::Data);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_foreign_prefix_nacked() {
    let (addr, shutdown) = start_responder("/ndn/b").await;
    let transport = Arc::new(UdpProbeTransport::new());
    // route /ndn/c to b's responder, which does not own that namespace
    transport.add_route(Name::from("/ndn/c"), addr);
    let (face, mut outcomes) = TokioFace::new(transport);

    let probe = ProbeName::new(Name::from("/ndn/c"), 1);
    face.express(ProbeRequest::new(&probe, Duration::from_secs(2)))
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), outcomes.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.kind, ProbeOutcomeKind::Nack);

    let _ = shutdown.send(());
}

#[tokio::test]
async fn test_missing_route_is_nack() {
    let (face, mut outcomes) = TokioFace::new(Arc::new(UdpProbeTransport::new()));
    let probe = ProbeName::new(Name::from("/ndn/nowhere"), 2);
    face.express(ProbeRequest::new(&probe, Duration::from_secs(1)))
        .unwrap();
    let outcome = outcomes.recv().await.unwrap();
    assert_eq!(outcome.kind, ProbeOutcomeKind::Nack);
}

// ============================================================================
// Daemon
// ============================================================================

#[tokio::test]
async fn test_daemon_probes_and_routes() {
    let (addr, responder_shutdown) = start_responder("/ndn/b").await;
    let transport = Arc::new(UdpProbeTransport::new());
    transport.add_route(Name::from("/ndn/b"), addr);
    let (face, outcomes) = TokioFace::new(transport);

    let clock = SystemClock::shared();
    let adjacencies = Arc::new(InMemoryAdjacencyTable::with_adjacencies([Adjacency::new(
        "/ndn/b", 10.0,
    )]));
    let lsdb = Arc::new(InMemoryTopologyDatabase::new());
    let routing = RoutingConfig {
        router_name: Name::from("/ndn/a"),
        calculation_interval: Duration::from_millis(20),
        ..RoutingConfig::default()
    };
    let schedule = CalculationSchedule::new(routing.calculation_interval);

    let config = LinkCostConfig {
        warm_up: Duration::from_millis(10),
        probe_interval: Duration::from_millis(20),
        probe_jitter: Duration::ZERO,
        probe_lifetime: Duration::from_millis(500),
        ..LinkCostConfig::default()
    };
    let mut manager = LinkCostManager::new(
        config,
        clock.clone(),
        adjacencies.clone(),
        lsdb.clone(),
        Arc::new(face),
        schedule.clone(),
    );
    manager.initialize();
    let manager = manager.into_shared();

    let orchestrator = RoutingOrchestrator::new(
        routing,
        AdaptiveConfig::default(),
        clock,
        adjacencies.clone(),
        lsdb.clone(),
        schedule,
    );
    let mut changes = orchestrator.subscribe();

    let (_events_tx, neighbor_events) = mpsc::unbounded_channel();
    let daemon = RoutingDaemon::new(
        manager.clone(),
        orchestrator,
        DaemonChannels {
            outcomes,
            neighbor_events,
            lsdb_updates: lsdb.subscribe(),
        },
    );
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(daemon.run(shutdown_rx));

    lsdb.install_adjacency(Name::from("/ndn/a"), vec![(Name::from("/ndn/b"), 10.0)]);
    lsdb.install_adjacency(Name::from("/ndn/b"), vec![(Name::from("/ndn/a"), 10.0)]);

    let snapshot = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let snapshot = changes.recv().await.unwrap();
            if !snapshot.is_empty() {
                return snapshot;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(
        snapshot.entry(&Name::from("/ndn/b")).unwrap().best().unwrap().neighbor,
        Name::from("/ndn/b")
    );

    tokio::time::timeout(Duration::from_secs(5), async {
        while manager.lock().stats().successful_measurements < 3 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    assert!(manager.lock().rtt_history(&Name::from("/ndn/b")).unwrap().len() >= 3);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
    assert!(!manager.lock().is_active());

    let _ = responder_shutdown.send(());
}
