//! Ziggurat: a channel chat bot that watches for pyramids and
//! probabilistically ruins them.

mod components;
mod console;
mod store;
mod util;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;

use ziggurat_core::PongRouter;
use ziggurat_framework::{Bus, BusOptions};
use ziggurat_runtime::{init_from_config, ConfigLoader, Runtime};

use components::meta::MetaComponent;
use components::pyramid::{self, PyramidComponent};
use console::ConsoleConnector;
use store::MemoryStore;

#[derive(Parser)]
#[command(name = "ziggurat", version, about = "pyramid watching chat bot")]
struct Cli {
    /// Load this configuration file instead of searching the usual places
    #[arg(long)]
    config: Option<PathBuf>,

    /// Configuration profile to layer on top (also: ZIGGURAT_PROFILE)
    #[arg(long)]
    profile: Option<String>,

    /// Extra channels to join at startup
    #[arg(long = "channel")]
    channels: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(file) = cli.config {
        loader = loader.file(file);
    }
    if let Some(profile) = cli.profile {
        loader = loader.profile(profile);
    }
    let mut config = loader.load()?;
    config.channels.extend(cli.channels);

    init_from_config(&config.logging);
    info!(
        bot = %config.bot_name,
        prefix = %config.prefix,
        home = %config.home_channel(),
        dev = config.environment.is_dev(),
        "starting up"
    );

    let (events_tx, events_rx) = mpsc::channel(256);
    let connector = ConsoleConnector::new(config.bot_name.clone(), events_tx);
    connector.spawn_stdin_reader();

    let bus = Bus::new(
        connector.clone(),
        BusOptions {
            prefix: config.prefix.clone(),
            home_channel: config.home_channel().to_string(),
            operators: config.operators.clone(),
            dev: config.environment.is_dev(),
        },
    );

    let store = MemoryStore::new(pyramid::default_config(), pyramid::default_profiles());
    let pyramid =
        PyramidComponent::new(store.clone(), store.clone(), store.clone()).await;

    let pongs = Arc::new(PongRouter::new());
    let runtime = Runtime::new(bus.clone(), events_rx, pongs.clone());
    let meta = MetaComponent::new(
        runtime.started(),
        pongs,
        bus.home_channel().to_string(),
    );

    bus.mount(&pyramid);
    bus.mount(&meta);

    runtime.join_channels(&config.channels).await;
    runtime.run().await;
    Ok(())
}
