use anyhow::Result;
use std::time::Duration;
use tracing::{info, warn};

use clinic_api::{app, config, jobs, middleware};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = config::Config::load()?;

    middleware::logging::init_logging(&config.logging);
    middleware::init_metrics()?;

    info!("Starting ClinicCore analytics v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&config.database.to_pool_config()).await?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    let addr = config.socket_addr()?;
    let jobs_enabled = config.jobs.enabled;
    let state = app::AppState::new(config, pool)?;

    let scheduler = if jobs_enabled {
        let mut scheduler = jobs::build_scheduler(&state);
        scheduler.start();
        Some(scheduler)
    } else {
        info!("Background jobs disabled");
        None
    };

    let app = app::create_app(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(scheduler) = scheduler {
        scheduler.shutdown();
        scheduler.wait_for_shutdown(Duration::from_secs(30)).await;
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
