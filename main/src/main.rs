mod app;
mod args;
mod render;
mod simulate;

use anyhow::Context;
use clap::Parser;
use common::utils::config::get_config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{app::App, args::Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .ok();

    let cli = Cli::parse();

    // Get config
    let config = get_config().context("failed to load configuration")?;

    let app = App::new(config, cli.user).await?;
    app.run(cli.command).await
}
