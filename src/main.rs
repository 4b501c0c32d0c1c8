use clap::Parser;
use kbserver::{build_router, AppState, RelayConfig, SharedLogger};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "kbserver",
    about = "Serve the Anthropic Messages API on top of an OpenAI-compatible provider",
    version
)]
struct Cli {
    /// Path to config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides config and KBSERVER_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides config and KBSERVER_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Model used when a request does not name one (overrides DEFAULT_MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Log file path
    #[arg(long, default_value = "kbserver.log")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kbserver=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = RelayConfig::find_and_load(cli.config.as_deref())?;
    config.apply_env()?;

    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(model) = cli.model {
        config.default_model = model;
    }

    config.validate()?;

    let logger = SharedLogger::new(&cli.log_file)?;

    info!("============================================================");
    info!("  kbserver v{}", env!("CARGO_PKG_VERSION"));
    info!("============================================================");
    info!("  Server:        {}", config.endpoint());
    info!("  Provider API:  {}", config.base_url);
    info!("  Default model: {}", config.default_model);
    info!("  Timeout:       {}ms", config.timeout_ms);
    info!("  Log file:      {}", cli.log_file.display());

    logger.info(
        "startup",
        format!(
            "Starting kbserver base_url={} model={} listen={}",
            config.base_url,
            config.default_model,
            config.bind_addr()
        ),
    );

    let bind_addr = config.bind_addr();
    let state = Arc::new(AppState::new(config, logger.clone())?);
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Listening on http://{}", bind_addr);
    info!("");
    info!("  To use with Claude Code:");
    info!("    ANTHROPIC_BASE_URL=http://localhost:{} claude", listener.local_addr()?.port());
    info!("");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    logger.info("shutdown", "Server stopped");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM; in-flight requests are drained afterwards.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Shutting down server..."),
        () = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
