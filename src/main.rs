use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber;

use tollgate::auth::JwtVerifier;
use tollgate::clock::SystemClock;
use tollgate::config::TollgateConfig;
use tollgate::edge::{EdgeOutcome, Orchestrator, ViewerRequestEvent};
use tollgate::limiter::LimiterRegistry;
use tollgate::store::{CounterStore, DynamoCounterStore, MemoryCounterStore};

/// Tollgate - edge authentication and rate limiting filter
#[derive(Parser, Debug)]
#[command(name = "tollgate")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<String>,

    /// Listen address for the viewer-request hook
    #[arg(short = 'a', long = "addr")]
    addr: Option<String>,

    /// Counter table name
    #[arg(short = 't', long = "table")]
    table: Option<String>,

    /// Use the in-memory counter store instead of DynamoDB
    #[arg(long = "memory-store", default_value = "false")]
    memory_store: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .init();

    info!("Starting Tollgate Edge Filter");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Load configuration with CLI overrides
    let mut config = match args.config {
        Some(ref path) => TollgateConfig::from_file(path)?,
        None => TollgateConfig::default(),
    };
    if let Some(addr) = args.addr {
        config.server.listen_addr = addr.parse()?;
    }
    if let Some(table) = args.table {
        config.rate_limiting.table_name = table;
    }

    let instance_id = uuid::Uuid::new_v4();
    info!(
        listen_addr = %config.server.listen_addr,
        instance_id = %instance_id,
        default_limiter = %config.rate_limiting.default_limiter,
        "Configuration loaded"
    );

    // Pick the counter store backing the limiters
    let store: Arc<dyn CounterStore> = if args.memory_store {
        info!("Using in-memory counter store");
        Arc::new(MemoryCounterStore::new())
    } else {
        let call_timeout = Duration::from_millis(config.rate_limiting.store_timeout_ms);
        info!(
            table = %config.rate_limiting.table_name,
            timeout_ms = config.rate_limiting.store_timeout_ms,
            "Using DynamoDB counter store"
        );
        Arc::new(DynamoCounterStore::new(call_timeout).await)
    };

    let registry = LimiterRegistry::standard(
        store,
        Arc::new(SystemClock),
        &config.rate_limiting.table_name,
        config.rate_limiting.default_limiter,
        config.rate_limiting.configurable_via_header,
    );
    let verifier = Arc::new(JwtVerifier::new(
        &config.auth.jwt_secret,
        &config.auth.user_pool_id,
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        verifier,
        registry,
        config.auth.scopes.clone(),
    ));

    let app = Router::new()
        .route("/", post(viewer_request))
        .with_state(orchestrator);

    let listener = TcpListener::bind(config.server.listen_addr).await?;
    info!(
        "Listening for viewer-request events on {}",
        config.server.listen_addr
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Tollgate Edge Filter stopped");
    Ok(())
}

/// The viewer-request hook: one event in, one outcome out.
async fn viewer_request(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(event): Json<ViewerRequestEvent>,
) -> Json<EdgeOutcome> {
    Json(orchestrator.handle(event).await)
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
