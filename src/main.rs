use std::sync::Arc;

use anyhow::Context;
use chat2double::config::ProxyConfig;
use chat2double::server::build_router;
use chat2double::util::{init_tracing, AppState};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ProxyConfig::from_env();
    let addr = config.bind_addr();
    tracing::info!(
        upstream = %config.upstream_base_url,
        outbound_proxy = config.proxy_url.is_some(),
        token_ttl = ?config.token_ttl,
        pacing = ?config.pacing_delay,
        "configuration loaded"
    );

    let app = build_router(Arc::new(AppState::new(config)));

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("chat2double listening on http://{}", addr);

    axum::serve(listener, app)
        .await
        .context("server terminated unexpectedly")?;
    Ok(())
}
