//! bookcheck-server - book catalogue and review HTTP service
//!
//! Settings come from command-line flags and environment variables, then an
//! optional TOML file, then built-in defaults. The token secret has no
//! default; startup fails without one.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bookcheck_common::config::{ConfigOverrides, TomlConfig};
use bookcheck_common::Config;
use bookcheck_server::db::init_database_pool;
use bookcheck_server::storage::AssetStore;
use bookcheck_server::{build_router, AppState};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for bookcheck-server
#[derive(Parser, Debug)]
#[command(name = "bookcheck-server")]
#[command(about = "Book catalogue and review service")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "BOOKCHECK_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// SQLite database file
    #[arg(short, long, env = "BOOKCHECK_DATABASE")]
    database: Option<PathBuf>,

    /// Directory for uploaded covers and PDFs
    #[arg(long, env = "BOOKCHECK_UPLOADS_DIR")]
    uploads_dir: Option<PathBuf>,

    /// Secret used to sign session tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    token_secret: Option<String>,

    /// File holding the token secret (used when no secret is given directly)
    #[arg(long, env = "BOOKCHECK_SECRET_FILE")]
    secret_file: Option<PathBuf>,

    /// Session token lifetime in seconds
    #[arg(long, env = "BOOKCHECK_TOKEN_TTL_SECS")]
    token_ttl_secs: Option<i64>,

    /// Environment label reported by the health endpoint
    #[arg(long = "env", env = "BOOKCHECK_ENV")]
    environment: Option<String>,

    /// Public base URL for asset links (otherwise derived from each request)
    #[arg(long, env = "BOOKCHECK_PUBLIC_URL")]
    public_base_url: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            database_path: self.database.clone(),
            uploads_dir: self.uploads_dir.clone(),
            token_secret: self.token_secret.clone(),
            secret_file: self.secret_file.clone(),
            token_ttl_secs: self.token_ttl_secs,
            environment: self.environment.clone(),
            public_base_url: self.public_base_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookcheck_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting bookcheck-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();

    let file = TomlConfig::load(args.config.as_deref()).context("Failed to read config file")?;
    let config = Config::resolve(args.overrides(), file).context("Invalid configuration")?;
    info!("Configuration: {:?}", config);

    let pool = match init_database_pool(&config.database_path).await {
        Ok(pool) => {
            info!("Database ready at {}", config.database_path.display());
            pool
        }
        Err(e) => {
            error!("Failed to open database: {}", e);
            return Err(e.into());
        }
    };

    AssetStore::new(config.uploads_dir.clone())
        .ensure_directory_exists()
        .context("Failed to create uploads directory")?;

    let addr = config.bind_addr();
    let app = build_router(AppState::new(pool, config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("bookcheck-server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
