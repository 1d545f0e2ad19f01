//! The process runtime: consumes the connector event stream and feeds the
//! dispatch bus until shutdown.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{info, warn};

use ziggurat_core::{ConnectorEvent, PongRouter};
use ziggurat_framework::Bus;

/// Owns the bus and the inbound event stream.
///
/// Every inbound line is dispatched on its own task, so a slow handler
/// never delays the next line. Pong frames are routed to their waiters.
pub struct Runtime {
    bus: Bus,
    events: mpsc::Receiver<ConnectorEvent>,
    pongs: Arc<PongRouter>,
    started: Instant,
}

impl Runtime {
    pub fn new(
        bus: Bus,
        events: mpsc::Receiver<ConnectorEvent>,
        pongs: Arc<PongRouter>,
    ) -> Self {
        Self {
            bus,
            events,
            pongs,
            started: Instant::now(),
        }
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// When this runtime came up.
    pub fn started(&self) -> Instant {
        self.started
    }

    /// Joins the configured startup channels.
    pub async fn join_channels(&self, channels: &[String]) {
        for channel in channels {
            match self.bus.connector().join(channel).await {
                Ok(()) => info!(channel, "joined channel"),
                Err(e) => warn!(channel, error = %e, "failed to join channel"),
            }
        }
    }

    /// Runs until ctrl-c or the connector stream ends.
    pub async fn run(mut self) {
        info!(home = %self.bus.home_channel(), "runtime started");

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                signal = &mut shutdown => {
                    if let Err(e) = signal {
                        warn!(error = %e, "ctrl-c listener failed, shutting down");
                    } else {
                        info!("shutdown requested");
                    }
                    break;
                }
                event = self.events.recv() => match event {
                    None => {
                        info!("connector event stream closed");
                        break;
                    }
                    Some(ConnectorEvent::Line(line)) => {
                        let bus = self.bus.clone();
                        tokio::spawn(async move { bus.dispatch(line).await });
                    }
                    Some(ConnectorEvent::Pong(tag)) => {
                        self.pongs.resolve(&tag);
                    }
                },
            }
        }

        info!("runtime stopped");
    }
}
