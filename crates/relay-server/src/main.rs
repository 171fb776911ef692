use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use relay_crypto::{ACCOUNT_KEY_CONFIG, CredentialCipher, GUARDRAIL_KEY_CONFIG, TokenCodec};
use relay_dispatcher::{Dispatcher, DispatcherConfig};
use relay_guardrail::{DetectorRegistry, ReverseMap};
use relay_provider::AdapterRegistry;
use relay_router::{CooldownStore, RateLimiter, Router, TokenRefresher, spawn_refresh_loop};
use relay_state::{ConfigStore, SqliteConfigStore};
use secrecy::SecretString;
use tracing::info;

mod api;
mod config;
mod error;

use config::RelayConfig;

/// relay-server -- the multi-provider LLM proxy's HTTP entry point.
#[derive(Parser, Debug)]
#[command(name = "relay-server", about = "Multi-provider LLM proxy")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "relay.toml")]
    config: String,

    /// Override the bind host.
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config: RelayConfig = if Path::new(&cli.config).exists() {
        let contents = std::fs::read_to_string(&cli.config)?;
        toml::from_str(&contents)?
    } else {
        info!(path = %cli.config, "config file not found, using defaults");
        toml::from_str("")?
    };

    let data_dir = PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| ".".to_owned()));
    std::fs::create_dir_all(&data_dir)?;

    let account_key = ACCOUNT_KEY_CONFIG.resolve(&data_dir)?;
    let guardrail_key = GUARDRAIL_KEY_CONFIG.resolve(&data_dir)?;

    let store: Arc<dyn ConfigStore> = match config.state.backend.as_str() {
        "memory" => Arc::new(relay_state::InMemoryConfigStore::new()),
        _ => {
            let sqlite_path = Path::new(&config.state.sqlite_file);
            let sqlite_path = if sqlite_path.is_absolute() { sqlite_path.to_path_buf() } else { data_dir.join(sqlite_path) };
            let database_url = format!("sqlite://{}", sqlite_path.display());
            let cipher = CredentialCipher::new(account_key);
            Arc::new(SqliteConfigStore::connect(&database_url, cipher).await?)
        }
    };

    let rate_limiter = Arc::new(RateLimiter::new());
    let router = Arc::new(Router::new(Arc::clone(&store), Arc::clone(&rate_limiter)));
    let cooldowns = Arc::new(CooldownStore::new());

    let host_credential_path = std::env::var_os("HOST_CREDENTIAL_FILE").map(PathBuf::from);
    let http_client = reqwest::Client::builder().timeout(std::time::Duration::from_secs(120)).build()?;
    let refresher = Arc::new(TokenRefresher::new(Arc::clone(&store), http_client, host_credential_path));
    spawn_refresh_loop(Arc::clone(&refresher), Arc::clone(&store));

    let adapters = Arc::new(AdapterRegistry::new()?);
    let detectors = Arc::new(DetectorRegistry::with_defaults());
    let guardrail_codec = Arc::new(TokenCodec::new(guardrail_key));
    let reverse_map = Arc::new(ReverseMap::new());

    let proxy_api_key = std::env::var("PROXY_API_KEY").ok().map(SecretString::new);

    let dispatcher_config = DispatcherConfig {
        tenants_enabled: config.routing.tenants_enabled,
        guardrails_enabled_default: config.guardrails.enabled_default,
        request_logging_default: config.routing.request_logging_default,
        auto_switch_on_error: config.routing.auto_switch_on_error,
        auto_switch_on_rate_limit: config.routing.auto_switch_on_rate_limit,
    };

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&store),
        router,
        cooldowns,
        rate_limiter,
        refresher,
        adapters,
        detectors,
        guardrail_codec,
        reverse_map,
        proxy_api_key,
        dispatcher_config,
    ));

    let state = api::AppState { dispatcher, store };
    let app = api::router(state);

    let env_port = std::env::var("PROXY_PORT").ok().and_then(|p| p.parse().ok());
    let host = cli.host.unwrap_or(config.server.host);
    let port = cli.port.or(env_port).unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "relay-server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("relay-server shut down");
    Ok(())
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM, then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
