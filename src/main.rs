use clap::Parser;
use std::time::Duration;
use syncd::sync::SyncQueue;
use syncd::{create_router, StorageEngine};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "syncd")]
#[command(about = "Offline-first sync engine for the marketplace backend", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8745, env = "SYNCD_PORT")]
    port: u16,

    /// Data directory path
    #[arg(long, default_value = "./data", env = "SYNCD_DATA_DIR")]
    data_dir: String,

    /// Time budget for a single sync scan, in milliseconds
    #[arg(long, default_value_t = 30_000, env = "SYNCD_SYNC_BUDGET_MS")]
    sync_budget_ms: u64,

    /// Retention window for completed queue items, in hours
    #[arg(long, default_value_t = 24, env = "SYNCD_QUEUE_RETENTION_HOURS")]
    queue_retention_hours: i64,

    /// Interval between queue cleanup passes, in minutes
    #[arg(long, default_value_t = 60, env = "SYNCD_CLEANUP_INTERVAL_MINUTES")]
    cleanup_interval_minutes: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "syncd=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let engine = StorageEngine::new(&args.data_dir)?;
    tracing::info!(data_dir = %args.data_dir, "storage engine initialized");

    // Periodic retention sweep over completed queue items; queue draining
    // itself is the external scheduler's job
    let cleanup_queue = SyncQueue::new(engine.clone());
    let retention = chrono::Duration::hours(args.queue_retention_hours);
    let mut interval =
        tokio::time::interval(Duration::from_secs(args.cleanup_interval_minutes * 60));
    tokio::spawn(async move {
        loop {
            interval.tick().await;
            match cleanup_queue.cleanup_completed(retention) {
                Ok(removed) if removed > 0 => {
                    tracing::info!(removed, "queue retention sweep finished");
                }
                Ok(_) => {}
                Err(e) => tracing::error!("queue retention sweep failed: {}", e),
            }
        }
    });

    let app = create_router(engine, Duration::from_millis(args.sync_budget_ms));

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
