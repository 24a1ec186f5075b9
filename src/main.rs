use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use barrier_hub::{
    cli::Cli,
    display::{ConsoleDisplay, DisplayMode, FixedSwitch, StatusPanel},
    registry::Registry,
    server::Server,
    sweeper::Sweeper,
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let listener = TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;

    let registry = Arc::new(Registry::new());

    let sweeper = Sweeper::new(
        Arc::clone(&registry),
        Duration::from_millis(cli.sweep_interval_ms),
    );
    tokio::spawn(sweeper.run());

    let (panel_shutdown_tx, panel_shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let panel = StatusPanel::new(
        Arc::clone(&registry),
        Box::new(ConsoleDisplay),
        Box::new(FixedSwitch(DisplayMode::NodeStatus)),
        Duration::from_millis(cli.panel_interval_ms),
    );
    let panel_task = tokio::spawn(panel.run_until(async move {
        let _ = panel_shutdown_rx.await;
    }));

    let server = Server::new(listener, Arc::clone(&registry));
    info!("hub listening on {}", server.local_addr()?);
    server.run_until_ctrl_c().await?;

    // Orderly display shutdown after the accept loop stops.
    let _ = panel_shutdown_tx.send(());
    let _ = panel_task.await;

    Ok(())
}
