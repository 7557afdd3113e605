//! `adsctl serve`: expose the locally deployed stage over HTTP.

use std::net::SocketAddr;
use std::path::Path;

use ads_api::{GatewayState, build_router, published_deployment};
use anyhow::{Context, Result};
use tracing::{info, warn};

use super::provision::open_state;

pub async fn serve(config_path: &Path, state: &Path, listen: &str) -> Result<()> {
    let config = super::load_config(config_path)?;
    let store = open_state(state)?;

    let api_name = config.api_name();
    let stage = config.stage();
    match published_deployment(&store, api_name, stage)? {
        Some(deployment) => info!(
            deployment = %deployment.id,
            routes = deployment.routes.len(),
            "serving deployment"
        ),
        None => warn!(%stage, "stage is not deployed yet; run `adsctl provision` first"),
    }

    let addr: SocketAddr = listen
        .parse()
        .with_context(|| format!("invalid listen address {listen:?}"))?;
    let router = build_router(GatewayState::new(store, api_name, stage));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    println!("Serving stage {stage} at http://{addr}/{stage}");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
