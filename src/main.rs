use std::sync::Arc;

use anyhow::Context;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use sfu_server::config::Config;
use sfu_server::media::rtc::WebRtcEngine;
use sfu_server::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("failed to load configuration")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = server::run(config, Arc::new(WebRtcEngine::new())).await {
        error!(target: "sfu.server", error = %e, "Server failed");
        return Err(e);
    }

    Ok(())
}
