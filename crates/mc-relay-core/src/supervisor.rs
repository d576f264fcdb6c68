//! Relay supervisor: builds the pipeline in order and owns its lifecycle.

use std::sync::Arc;
use std::time::Duration;

use mc_relay_host_api::MutationScheduler;
use mc_relay_transport::{ConnectError, ConnectionState, StatsSnapshot, Transport, TransportConfig};
use thiserror::Error;
use tracing::{info, warn};

use crate::dispatcher::{CommandDispatcher, DispatchSnapshot};
use crate::publisher::TelemetryPublisher;
use crate::roster::Roster;

/// How long `start` waits for the first handshake before returning.
const STARTUP_CONNECT_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Upstream `ws://` or `wss://` endpoint.
    pub url: String,
    pub transport: TransportConfig,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay needs a tokio runtime: {0}")]
    NoRuntime(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub transport: StatsSnapshot,
    pub dispatch: DispatchSnapshot,
}

pub struct Relay {
    url: String,
    transport: Transport,
    dispatcher: Arc<CommandDispatcher>,
    publisher: TelemetryPublisher,
}

impl Relay {
    /// Wire roster, dispatcher, transport and publisher, then connect.
    ///
    /// Connection failures are logged and retried in the background; they
    /// never fail startup.
    pub async fn start(
        config: RelayConfig,
        scheduler: Arc<dyn MutationScheduler>,
    ) -> Result<Self, RelayError> {
        tokio::runtime::Handle::try_current().map_err(|e| RelayError::NoRuntime(e.to_string()))?;

        let roster = Arc::new(Roster::new());
        let dispatcher = Arc::new(CommandDispatcher::new(roster.clone(), scheduler));

        let inbound = Arc::clone(&dispatcher);
        let transport = Transport::new(config.transport, move |frame| {
            inbound.on_frame(frame);
        });

        match tokio::time::timeout(STARTUP_CONNECT_WAIT, transport.connect(&config.url)).await {
            Ok(Ok(())) => {}
            Ok(Err(e @ ConnectError::Handshake(_))) => {
                warn!("Relay could not reach {}, retrying in background: {e}", config.url)
            }
            Ok(Err(e)) => warn!("Relay link to {} not started: {e}", config.url),
            Err(_) => warn!(
                "No handshake with {} after {STARTUP_CONNECT_WAIT:?}, continuing in background",
                config.url
            ),
        }

        let publisher = TelemetryPublisher::new(Arc::new(transport.handle()), roster);
        info!("Relay started for {}", config.url);

        Ok(Self {
            url: config.url,
            transport,
            dispatcher,
            publisher,
        })
    }

    /// Publisher for the host's tick thread.
    pub fn publisher(&self) -> TelemetryPublisher {
        self.publisher.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn stats(&self) -> RelayStats {
        RelayStats {
            transport: self.transport.stats(),
            dispatch: self.dispatcher.stats(),
        }
    }

    /// Close the link and cancel any pending reconnect.
    pub async fn shutdown(self) {
        info!("Relay for {} shutting down", self.url);
        self.transport.close().await;
        let stats = self.stats();
        info!(
            "Relay stopped: {} frames sent, {} dropped, {} commands dispatched",
            stats.transport.frames_sent, stats.transport.frames_dropped, stats.dispatch.dispatched
        );
    }
}
