// src/main.rs

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use vigil::config::VigilConfig;
use vigil::server;
use vigil::state::AppState;
use vigil::store::VigilStore;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Pull request risk analysis and autonomous test remediation")]
#[command(version)]
struct Cli {
    /// Bind host (overrides VIGIL_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides VIGIL_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database URL (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env loading happens inside from_env
    let mut config = VigilConfig::from_env()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(database_url) = cli.database_url {
        config.database_url = database_url;
    }

    init_tracing(&config.log_level)?;

    info!("Starting Vigil v{}", env!("CARGO_PKG_VERSION"));
    info!("Trigger mode: {}", config.trigger_mode.as_str());
    info!("Capability model: {}", config.capability_model);
    info!(
        "Chat notifications: {}",
        if config.chat_notifications_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );

    let store = VigilStore::connect(&config.database_url, config.sqlite_max_connections).await?;
    store.run_migrations().await?;
    info!("Database ready at {}", config.database_url);

    let bind_address = config.bind_address();
    let state = AppState::new(config, store)?;
    let app = server::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    info!("Vigil listening on http://{}", bind_address);
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
