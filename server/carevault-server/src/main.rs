use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use carevault_server::{create_app, AppState, ServerConfig};

/// CareVault Engine HTTP Server
#[derive(Parser, Debug)]
#[command(name = "carevault-server")]
#[command(about = "Healthcare records platform HTTP API server")]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load .env before the config layer reads the environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::load(args.config.as_deref())
        .context("Failed to load server configuration")?;

    init_tracing(&config, args.verbose);

    info!("Starting CareVault Engine HTTP server");
    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        "Configuration loaded"
    );

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let state = AppState::new(config).await?;
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("CareVault Engine server running on http://{addr}");
    info!("Health check available at: http://{addr}/health");
    info!("API v1 available at: http://{addr}/api/v1");
    info!("API docs available at: http://{addr}/api/docs");

    axum::serve(listener, app)
        .await
        .context("HTTP server error")?;

    Ok(())
}

fn init_tracing(config: &ServerConfig, verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("carevault_server={level},tower_http=info,sqlx=warn,hyper=info").into()
    });

    if config.is_production() {
        // Structured JSON logging for production
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_ansi(false).json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}
