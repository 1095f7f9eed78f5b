//! Live telemetry sessions against fake engines
//!
//! These tests verify that:
//! - Every running container gets exactly one subscription
//! - Host and stream failures become error events without ending the session
//! - No subscription outlives its session, whatever ends it
//! - An unanswered ping closes the session at the next heartbeat

use std::sync::Arc;
use std::time::Duration;

use fleet_monitoring::{
    gateway::{
        CONNECTION_ESTABLISHED, CloseReason, GatewayEvent, GatewaySession, GatewaySettings,
        Inbound, Outbound, SessionState, SessionSummary,
    },
    storage::StorageBackend,
};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::helpers::{FakeConnector, FakeEngine, container, context, empty_store, host};

const WAIT: Duration = Duration::from_secs(5);

struct Client {
    outbound: mpsc::Receiver<Outbound>,
    inbound: mpsc::Sender<Inbound>,
    session: JoinHandle<SessionSummary>,
}

fn settings(heartbeat: Duration) -> GatewaySettings {
    GatewaySettings {
        heartbeat_interval: heartbeat,
        outbound_capacity: 64,
    }
}

fn connect(ctx: fleet_monitoring::ServiceContext, settings: GatewaySettings) -> Client {
    let (out_tx, out_rx) = mpsc::channel(settings.outbound_capacity);
    let (in_tx, in_rx) = mpsc::channel(8);
    let session = tokio::spawn(GatewaySession::new(ctx, settings, out_tx, in_rx).run());
    Client {
        outbound: out_rx,
        inbound: in_tx,
        session,
    }
}

impl Client {
    /// Next event, answering pings on the way
    async fn next_event(&mut self) -> GatewayEvent {
        loop {
            let frame = tokio::time::timeout(WAIT, self.outbound.recv())
                .await
                .expect("no frame in time")
                .expect("session ended");
            match frame {
                Outbound::Event(event) => return event,
                Outbound::Ping => self.inbound.send(Inbound::Pong).await.unwrap(),
                Outbound::Close => panic!("unexpected close"),
            }
        }
    }

    async fn events(&mut self, count: usize) -> Vec<GatewayEvent> {
        let mut events = Vec::with_capacity(count);
        for _ in 0..count {
            events.push(self.next_event().await);
        }
        events
    }

    async fn finish(self) -> SessionSummary {
        tokio::time::timeout(WAIT, self.session)
            .await
            .expect("session did not end")
            .unwrap()
    }
}

fn stats_ids(events: &[GatewayEvent]) -> Vec<String> {
    let mut ids: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            GatewayEvent::Stats(stats) => Some(stats.id.clone()),
            _ => None,
        })
        .collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_session_streams_running_containers() {
    let (_dir, store) = empty_store().await;
    store.add_host(&host("alpha")).await.unwrap();
    store.add_host(&host("beta")).await.unwrap();

    let connector = FakeConnector::new();
    let alpha = FakeEngine::new(vec![
        container("a1", "web", "running"),
        container("a2", "db", "running"),
        container("a3", "old", "exited"),
    ]);
    let beta = FakeEngine::new(vec![container("b1", "cache", "running")]);
    beta.set_reachable(false);
    connector.insert("alpha", alpha.clone());
    connector.insert("beta", beta.clone());

    let mut client = connect(context(store, connector), settings(Duration::from_secs(30)));

    match client.next_event().await {
        GatewayEvent::Connection(event) => assert_eq!(event.message, CONNECTION_ESTABLISHED),
        other => panic!("expected greeting, got {other:?}"),
    }

    let events = client.events(3).await;
    assert_eq!(stats_ids(&events), vec!["a1".to_string(), "a2".to_string()]);

    let error = events
        .iter()
        .find_map(|e| match e {
            GatewayEvent::Error(error) => Some(error.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(error.host_id, "beta");
    assert_eq!(error.container_id, None);

    let stats = events
        .iter()
        .find_map(|e| match e {
            GatewayEvent::Stats(stats) if stats.id == "a1" => Some(stats.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(stats.host_id, "alpha");
    assert_eq!(stats.name, "web");
    assert!((stats.cpu_usage - 25.0).abs() < 1e-9);
    assert!((stats.memory_usage - 50.0).abs() < 1e-9);

    assert_eq!(alpha.live_streams(), 2);

    client.inbound.send(Inbound::Close).await.unwrap();
    let mut outbound = client.outbound;
    let summary = tokio::time::timeout(WAIT, client.session)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.reason, CloseReason::ClientClosed);
    assert_eq!(summary.state, SessionState::Closed);
    assert_eq!(summary.subscriptions_opened, 2);
    assert_eq!(summary.subscriptions_closed, 2);
    assert_eq!(summary.stats_sent, 2);
    assert_eq!(summary.errors_sent, 1);
    assert_eq!(alpha.live_streams(), 0);
    assert_eq!(outbound.recv().await, Some(Outbound::Close));
}

#[tokio::test]
async fn test_stream_failures_stay_scoped() {
    let (_dir, store) = empty_store().await;
    store.add_host(&host("alpha")).await.unwrap();

    let connector = FakeConnector::new();
    let alpha = FakeEngine::new(vec![
        container("a1", "web", "running"),
        container("a2", "db", "running"),
        container("a3", "job", "running"),
    ]);
    alpha.breaking_streams.lock().unwrap().insert("a2".to_string());
    alpha.refused_streams.lock().unwrap().insert("a3".to_string());
    alpha
        .extra_chunks
        .lock()
        .unwrap()
        .push("this is not json\n".to_string());
    connector.insert("alpha", alpha.clone());

    let mut client = connect(context(store, connector), settings(Duration::from_secs(30)));
    client.next_event().await;

    // a3 refused, a1 and a2 one frame each, a2 then breaks
    let events = client.events(4).await;
    assert_eq!(stats_ids(&events), vec!["a1".to_string(), "a2".to_string()]);

    let mut failed: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            GatewayEvent::Error(error) => error.container_id.clone(),
            _ => None,
        })
        .collect();
    failed.sort();
    assert_eq!(failed, vec!["a2".to_string(), "a3".to_string()]);

    // the broken stream is gone, the healthy one is still open
    tokio::time::timeout(WAIT, async {
        while alpha.live_streams() != 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    drop(client.inbound);
    let summary = tokio::time::timeout(WAIT, client.session)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.reason, CloseReason::ClientGone);
    assert_eq!(summary.subscriptions_opened, 2);
    assert_eq!(summary.subscriptions_closed, 1);
    assert_eq!(alpha.live_streams(), 0);
}

#[tokio::test]
async fn test_no_stream_leaks_across_sessions() {
    const SESSIONS: usize = 6;
    const CONTAINERS: usize = 4;

    let (_dir, store) = empty_store().await;
    store.add_host(&host("alpha")).await.unwrap();

    let connector = FakeConnector::new();
    let alpha = FakeEngine::new(
        (0..CONTAINERS)
            .map(|i| container(&format!("c{i}"), &format!("svc{i}"), "running"))
            .collect(),
    );
    connector.insert("alpha", alpha.clone());
    let ctx = context(store, connector);

    for round in 0..SESSIONS {
        let mut client = connect(ctx.clone(), settings(Duration::from_millis(50)));
        client.events(1 + CONTAINERS).await;
        assert_eq!(alpha.live_streams(), CONTAINERS);

        let summary = match round % 3 {
            0 => {
                client.inbound.send(Inbound::Close).await.unwrap();
                client.finish().await
            }
            1 => {
                drop(client.inbound);
                tokio::time::timeout(WAIT, client.session)
                    .await
                    .unwrap()
                    .unwrap()
            }
            _ => {
                // the next ping cannot be delivered
                drop(client.outbound);
                tokio::time::timeout(WAIT, client.session)
                    .await
                    .unwrap()
                    .unwrap()
            }
        };

        assert_eq!(summary.subscriptions_closed, CONTAINERS);
        assert_eq!(alpha.live_streams(), 0, "leak after round {round}");
    }

    assert_eq!(
        alpha.opened_streams.load(std::sync::atomic::Ordering::SeqCst),
        SESSIONS * CONTAINERS
    );
}

#[tokio::test]
async fn test_heartbeat_timeout_closes_session() {
    let (_dir, store) = empty_store().await;
    store.add_host(&host("alpha")).await.unwrap();

    let connector = FakeConnector::new();
    let alpha = FakeEngine::new(vec![container("a1", "web", "running")]);
    connector.insert("alpha", alpha.clone());

    let (out_tx, mut out_rx) = mpsc::channel(16);
    let (_in_tx, in_rx) = mpsc::channel(8);
    let session = tokio::spawn(
        GatewaySession::new(
            context(store, connector),
            settings(Duration::from_millis(40)),
            out_tx,
            in_rx,
        )
        .run(),
    );

    let summary = tokio::time::timeout(WAIT, session).await.unwrap().unwrap();
    assert_eq!(summary.reason, CloseReason::HeartbeatTimeout);
    assert_eq!(alpha.live_streams(), 0);

    let mut frames = Vec::new();
    while let Ok(frame) = out_rx.try_recv() {
        frames.push(frame);
    }
    assert_eq!(frames.iter().filter(|f| **f == Outbound::Ping).count(), 1);
    assert_eq!(frames.last(), Some(&Outbound::Close));
}

#[tokio::test]
async fn test_answered_heartbeats_keep_session_open() {
    let (_dir, store) = empty_store().await;
    let connector = FakeConnector::new();
    let mut client = connect(
        context(store, Arc::clone(&connector)),
        settings(Duration::from_millis(20)),
    );
    client.next_event().await;

    let mut pings = 0;
    while pings < 5 {
        let frame = tokio::time::timeout(WAIT, client.outbound.recv())
            .await
            .unwrap()
            .unwrap();
        if frame == Outbound::Ping {
            pings += 1;
            client.inbound.send(Inbound::Pong).await.unwrap();
        }
    }
    assert!(!client.session.is_finished());

    client.inbound.send(Inbound::Close).await.unwrap();
    assert_eq!(client.finish().await.reason, CloseReason::ClientClosed);
}

fn assert_send<T: Send>(_: &T) {}

#[tokio::test]
async fn test_session_runs_on_any_worker() {
    let (_dir, store) = empty_store().await;
    let (out_tx, _out_rx) = mpsc::channel(4);
    let (_in_tx, in_rx) = mpsc::channel(4);
    let session = GatewaySession::new(
        context(store, FakeConnector::new()),
        settings(Duration::from_secs(30)),
        out_tx,
        in_rx,
    );

    // the run future is moved onto the multi-threaded runtime by the websocket handler
    let run = session.run();
    assert_send(&run);
    drop(run);
}
