mod config;
mod world;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use config::{resolve_endpoint, RelayFileConfig, ENDPOINT_KEY};
use mc_relay_core::{Relay, RelayConfig};
use mc_relay_host_api::mutation_channel;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn};
use world::{SimulatedWorld, TickLoop};

const CONFIG_PATH: &str = "relay.toml";

#[tokio::main]
async fn main() {
    let (config, load_error) = match RelayFileConfig::load(CONFIG_PATH) {
        Ok(c) => (c, None),
        Err(e) => (RelayFileConfig::default(), Some(e)),
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    if let Some(e) = load_error {
        warn!("{e}; using defaults");
    }

    info!("MC-Relay v{} starting", env!("CARGO_PKG_VERSION"));

    let from_env = std::env::var(ENDPOINT_KEY).ok();
    let (url, source) = resolve_endpoint(from_env.as_deref(), &config.relay.env_file);
    info!("Upstream endpoint: {url} ({source:?})");

    let (scheduler, queue) = mutation_channel();
    let relay_config = RelayConfig {
        url,
        transport: config.relay.transport_config(),
    };
    let relay = match Relay::start(relay_config, Arc::new(scheduler)).await {
        Ok(relay) => relay,
        Err(e) => {
            error!("Failed to start relay: {e}");
            std::process::exit(1);
        }
    };

    let world = SimulatedWorld::new(&config.host.players, StdRng::from_entropy());
    let tick_loop = TickLoop::new(world, queue, relay.publisher());
    let interval = config.host.tick_interval();
    let stop = Arc::new(AtomicBool::new(false));
    let tick_stop = Arc::clone(&stop);
    let tick_thread = match std::thread::Builder::new()
        .name("tick".into())
        .spawn(move || tick_loop.run(interval, tick_stop))
    {
        Ok(handle) => handle,
        Err(e) => {
            error!("Failed to spawn tick thread: {e}");
            relay.shutdown().await;
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {e}");
    }
    info!("Shutdown signal received");

    stop.store(true, Ordering::Release);
    match tokio::task::spawn_blocking(move || tick_thread.join()).await {
        Ok(Ok(())) => {}
        _ => warn!("Tick thread did not exit cleanly"),
    }

    relay.shutdown().await;
    info!("Relay shut down.");
}
