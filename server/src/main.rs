use clap::Parser;
use log::info;
use server::broker::BrokerService;
use server::config::{Cli, ServiceConfig, ServiceKind};
use server::dispatcher::{Dispatcher, Handler};
use server::persistence::PersistenceService;
use server::store::SqliteStore;
use std::sync::Arc;

/// Parses configuration, opens the record store and runs the selected service
/// until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = Cli::parse().into_config();
    let store = Arc::new(SqliteStore::open(&config.database)?);

    match config.kind {
        ServiceKind::Persistence => serve(PersistenceService::new(store), &config).await,
        ServiceKind::Broker => serve(BrokerService::new(store), &config).await,
    }
}

async fn serve<H: Handler>(
    handler: H,
    config: &ServiceConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    // Failing to bind (port already in use) is fatal
    let dispatcher = Dispatcher::bind(&config.address, handler, config.limits.clone()).await?;

    tokio::select! {
        result = dispatcher.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
