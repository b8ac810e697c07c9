use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};

use batchprint::branding::{BrandingLookup, BrandingTable};
use batchprint::cdp::CdpBrowser;
use batchprint::config::Cli;
use batchprint::logging;
use batchprint::server::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.level()?, cli.log_file.as_deref());
    let config = cli.into_config()?;

    let branding: Arc<dyn BrandingLookup> = match &config.branding_table {
        Some(path) => Arc::new(BrandingTable::load(path)?),
        None => {
            warn!("No branding table configured; headers use the default color only");
            Arc::new(BrandingTable::new())
        }
    };

    let viewport = config.viewport;
    let chrome_path = config.chrome_path.clone();
    let sandbox = config.sandbox;
    let browser = tokio::task::spawn_blocking(move || CdpBrowser::launch(viewport, chrome_path, sandbox))
        .await
        .context("browser launch task panicked")??;
    let browser = Arc::new(browser);

    let bind = config.bind;
    let state = AppState::new(Arc::clone(&browser), branding, config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("cannot bind {}", bind))?;
    info!("Restarted, listening on {}", bind);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    match Arc::try_unwrap(browser) {
        Ok(browser) => browser.close()?,
        Err(_) => warn!("Renders still in flight; Chrome exits when they finish"),
    }
    info!("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
