use anyhow::Result;
use clap::Parser;
use pushqueue::audit::HttpAuditClient;
use pushqueue::endpoints::EndpointRegistry;
use pushqueue::engine::{self, EngineDeps};
use pushqueue::transport::HttpPublisher;
use pushqueue::{config, db, http};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/pushqueue.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    // Serve our own audit view so peer nodes can reconcile against us.
    let listener = tokio::net::TcpListener::bind(&cfg.app.listen_addr).await?;
    info!(addr = %cfg.app.listen_addr, "serving audit status API");
    let router = http::build_router(http::AppState { pool: pool.clone() });
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            error!(?err, "audit status server exited");
        }
    });

    let registry = EndpointRegistry::from_config(&cfg.publishing);
    let request_timeout = Duration::from_millis(cfg.publishing.request_timeout_ms);
    let publisher = HttpPublisher::new(request_timeout)?;
    let audit_client = HttpAuditClient::new(request_timeout)?;
    let deps = EngineDeps {
        pool: &pool,
        registry: &registry,
        publisher: &publisher,
        audit_client: &audit_client,
        max_tries: cfg.publishing.max_tries,
    };

    // Single sequential loop: the next tick starts only after the previous
    // one finished, so the engine is never re-entered.
    info!("starting publish queue engine");
    let tick = Duration::from_millis(cfg.app.tick_interval_ms);
    loop {
        if let Err(err) = engine::run_tick(&deps).await {
            error!(?err, "tick failed");
        }
        tokio::time::sleep(tick).await;
    }
}
