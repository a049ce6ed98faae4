//! Edge OIDC gateway server
//!
//! Serves `<base>/login` and `<base>/callback` for any base path. Client
//! credentials for a base path such as `/app/secure/` are read from the
//! environment as `PMUSER_APP_SECURE_CLIENTID`, `PMUSER_APP_SECURE_SECRET` and
//! `PMUSER_APP_SECURE_AKSECRET`.

mod settings;

use anyhow::{Context, Result};
use ras_identity_edge_oidc::{EdgeOidcState, EnvVariableSource, router};
use settings::Settings;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let state = EdgeOidcState::new(settings.edge_oidc_config(), Arc::new(EnvVariableSource))
        .context("Failed to initialize edge OIDC state")?;
    let app = router(state);

    let addr = settings.socket_addr();
    info!("Edge OIDC gateway listening on http://{}", addr);
    info!(
        "Token endpoint: {}, variable prefix: {}",
        settings.oidc.token_endpoint, settings.oidc.variable_prefix
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
