//! Dropferry bot entry point.

mod app;
mod config;
mod messages;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,dropferry=debug")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting dropferry bot");

    let config = config::Config::load()?;
    let secrets = config::Secrets::from_env()?;
    tracing::info!(
        destination = %config.destination_root,
        chunk_size = config.chunk_size,
        "configuration loaded"
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(config, secrets))?;

    tracing::info!("bot shut down cleanly");
    Ok(())
}
