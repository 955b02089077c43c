//! Analysis job API server: /api/v1/analysis/submit, /api/v1/analysis/status/{task_id}.

use hpc_api::server::{self, AppState};
use hpc_scheduler::SchedulerConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SchedulerConfig::from_env()?;
    let scheduler = Arc::new(config.build_client()?);
    let app = server::router(Arc::new(AppState { scheduler }));
    let addr: SocketAddr = std::env::var("HPC_API_LISTEN")
        .unwrap_or_else(|_| "0.0.0.0:8001".to_string())
        .parse()?;
    tracing::info!("analysis API listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .await?;
    Ok(())
}
