//! bootstrap: runs one classifieds handler unit inside the function runtime.
//!
//! The unit is selected by the function's configured entry point (`_HANDLER`);
//! table names come from `LISTINGS_TABLE` / `COMMENTS_TABLE`.

mod runtime;

use std::sync::Arc;

use ads_aws::{DynamoItemStore, load_sdk_config};
use ads_core::HandlerKind;
use ads_core::config::DEFAULT_REGION;
use ads_handlers::{HandlerContext, TableLayout};
use anyhow::Result;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::runtime::RuntimeClient;

const HANDLER_ENV: &str = "_HANDLER";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_ansi(false)
        .without_time()
        .init();

    let client = RuntimeClient::from_env()?;

    let entry_point = std::env::var(HANDLER_ENV).unwrap_or_default();
    let Some(kind) = HandlerKind::from_name(&entry_point) else {
        let message = format!("unknown entry point {entry_point:?}");
        error!(%message, "initialization failed");
        client.init_error(&message).await?;
        anyhow::bail!(message);
    };

    let region = std::env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string());
    let sdk = load_sdk_config(&region, None).await;
    let ctx = HandlerContext::new(Arc::new(DynamoItemStore::from_sdk(&sdk)), TableLayout::from_env());

    runtime::run(client, kind, ctx).await
}
