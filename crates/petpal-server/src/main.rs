//! petpal-server: standalone REST server for contract generation and signing.
//!
//! Configuration is read from the environment (and `.env` when present);
//! see `config` for the recognised variables.

use petpal_server::config::ServerConfig;
use petpal_server::router::build_router;
use petpal_server::state::AppState;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,petpal_server=debug,petpal_contracts=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let state = AppState::build(&config).await?;
    let app = build_router(state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(
        signing_base_url = %config.signing_base_url,
        "petpal-server listening on {}",
        config.bind_addr
    );

    axum::serve(listener, app).await?;
    Ok(())
}
