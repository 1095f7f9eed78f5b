//! Per-connection gateway session
//!
//! ## Lifecycle
//!
//! ```text
//! Connecting ──► Streaming ──► Closing ──► Closed
//!   greeting      host setup     close_all()
//!                 select! loop
//! ```
//!
//! The session owns its [`SubscriptionSet`]; every exit path goes through
//! `close`, so no engine connection outlives the session.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, instrument, trace, warn};

use super::subscription::{SubscriptionKey, SubscriptionSet};
use super::{GatewayEvent, GatewaySettings, Inbound, Outbound, line_to_event};
use crate::context::ServiceContext;
use crate::storage::Host;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Connecting,
    Streaming,
    Closing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CloseReason {
    /// Subscriber sent a close frame
    ClientClosed,

    /// Subscriber vanished without closing
    ClientGone,

    /// A ping was still unanswered at the next heartbeat
    HeartbeatTimeout,

    /// Frames can no longer be delivered
    OutboundClosed,

    /// Host registry could not be read
    StoreFailure(String),
}

/// What a finished session did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    pub reason: CloseReason,
    pub state: SessionState,
    pub subscriptions_opened: usize,
    pub subscriptions_closed: usize,
    pub stats_sent: usize,
    pub errors_sent: usize,
}

pub struct GatewaySession {
    ctx: ServiceContext,
    settings: GatewaySettings,
    state: SessionState,
    subscriptions: SubscriptionSet,
    outbound: mpsc::Sender<Outbound>,
    inbound: mpsc::Receiver<Inbound>,
    awaiting_pong: bool,
    subscriptions_opened: usize,
    stats_sent: usize,
    errors_sent: usize,
}

impl GatewaySession {
    pub fn new(
        ctx: ServiceContext,
        settings: GatewaySettings,
        outbound: mpsc::Sender<Outbound>,
        inbound: mpsc::Receiver<Inbound>,
    ) -> Self {
        Self {
            ctx,
            settings,
            state: SessionState::Connecting,
            subscriptions: SubscriptionSet::new(),
            outbound,
            inbound,
            awaiting_pong: false,
            subscriptions_opened: 0,
            stats_sent: 0,
            errors_sent: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the session until the subscriber leaves or the heartbeat fails
    #[instrument(skip(self))]
    pub async fn run(mut self) -> SessionSummary {
        if self.send(Outbound::Event(GatewayEvent::connected())).await.is_err() {
            return self.close(CloseReason::OutboundClosed);
        }

        let hosts = match self.ctx.store.get_hosts().await {
            Ok(hosts) => hosts,
            Err(e) => {
                warn!("failed to read host registry: {}", e);
                return self.close(CloseReason::StoreFailure(e.to_string()));
            }
        };

        self.state = SessionState::Streaming;
        debug!("streaming from {} hosts", hosts.len());

        for host in &hosts {
            if let Some(reason) = self.poll_inbound() {
                return self.close(reason);
            }
            if let Err(reason) = self.subscribe_host(host).await {
                return self.close(reason);
            }
        }

        info!(
            "session streaming {} containers from {} hosts",
            self.subscriptions.len(),
            hosts.len()
        );

        let reason = self.stream().await;
        self.close(reason)
    }

    /// Open one subscription per running container of a host
    async fn subscribe_host(&mut self, host: &Host) -> Result<(), CloseReason> {
        let engine = match self.ctx.engines.connect(host) {
            Ok(engine) => engine,
            Err(e) => return self.send_error(GatewayEvent::host_error(&host.name, e)).await,
        };

        if let Err(e) = engine.ping().await {
            warn!("host {} unreachable: {}", host.name, e);
            return self.send_error(GatewayEvent::host_error(&host.name, e)).await;
        }

        let containers = match engine.list_containers(false).await {
            Ok(containers) => containers,
            Err(e) => return self.send_error(GatewayEvent::host_error(&host.name, e)).await,
        };

        for container in containers {
            let key = SubscriptionKey::new(&host.name, &container.id);
            match engine.stream_container_stats(&container.id).await {
                Ok(body) => {
                    trace!("subscribed to {}", key);
                    self.subscriptions.insert(key, container, body);
                    self.subscriptions_opened += 1;
                }
                Err(e) => {
                    warn!("failed to subscribe to {}: {}", key, e);
                    self.send_error(GatewayEvent::stream_error(&key, e)).await?;
                }
            }
        }

        Ok(())
    }

    async fn stream(&mut self) -> CloseReason {
        let period = self.settings.heartbeat_interval.max(Duration::from_millis(1));
        let mut heartbeat = interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = self.inbound.recv() => match frame {
                    Some(Inbound::Pong) => self.awaiting_pong = false,
                    Some(Inbound::Text(text)) => trace!("ignoring client message: {}", text),
                    Some(Inbound::Close) => return CloseReason::ClientClosed,
                    None => return CloseReason::ClientGone,
                },

                _ = heartbeat.tick() => {
                    if self.awaiting_pong {
                        warn!("heartbeat timed out");
                        return CloseReason::HeartbeatTimeout;
                    }
                    if self.send(Outbound::Ping).await.is_err() {
                        return CloseReason::OutboundClosed;
                    }
                    self.awaiting_pong = true;
                }

                Some((key, line)) = self.subscriptions.next(), if !self.subscriptions.is_empty() => {
                    if let Err(reason) = self.handle_line(key, line).await {
                        return reason;
                    }
                }
            }
        }
    }

    async fn handle_line(
        &mut self,
        key: SubscriptionKey,
        line: Result<String, tokio_util::codec::LinesCodecError>,
    ) -> Result<(), CloseReason> {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("stats stream {} failed: {}", key, e);
                self.subscriptions.remove(&key);
                return self.send_error(GatewayEvent::stream_error(&key, e)).await;
            }
        };

        let Some(container) = self.subscriptions.container(&key) else {
            return Ok(());
        };

        match line_to_event(&key, container, &line) {
            Ok(Some(event)) => {
                self.send(Outbound::Event(GatewayEvent::Stats(event))).await?;
                self.stats_sent += 1;
            }
            Ok(None) => {}
            Err(e) => debug!("dropping malformed stats line from {}: {}", key, e),
        }
        Ok(())
    }

    /// Return a close reason if the subscriber already left
    fn poll_inbound(&mut self) -> Option<CloseReason> {
        loop {
            match self.inbound.try_recv() {
                Ok(Inbound::Pong) => self.awaiting_pong = false,
                Ok(Inbound::Text(_)) => {}
                Ok(Inbound::Close) => return Some(CloseReason::ClientClosed),
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Disconnected) => return Some(CloseReason::ClientGone),
            }
        }
    }

    async fn send(&mut self, frame: Outbound) -> Result<(), CloseReason> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| CloseReason::OutboundClosed)
    }

    async fn send_error(&mut self, event: GatewayEvent) -> Result<(), CloseReason> {
        self.send(Outbound::Event(event)).await?;
        self.errors_sent += 1;
        Ok(())
    }

    fn close(mut self, reason: CloseReason) -> SessionSummary {
        self.state = SessionState::Closing;
        let closed = self.subscriptions.close_all();
        if reason != CloseReason::OutboundClosed && reason != CloseReason::ClientGone {
            // best effort, the transport may already be gone
            let _ = self.outbound.try_send(Outbound::Close);
        }
        self.state = SessionState::Closed;

        info!("session closed ({:?}), {} subscriptions dropped", reason, closed);
        SessionSummary {
            reason,
            state: self.state,
            subscriptions_opened: self.subscriptions_opened,
            subscriptions_closed: closed,
            stats_sent: self.stats_sent,
            errors_sent: self.errors_sent,
        }
    }
}
