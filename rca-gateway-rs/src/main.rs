// rca-gateway-rs/src/main.rs
// RCA gateway: HTTP entry point for root-cause analysis requests.
// Port 8090 unless RCA_GATEWAY_SERVICE_PORT / _SERVICE_ADDR say otherwise.

use std::sync::Arc;

use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use rca_engine::{EngineConfig, RcaEngine};
use rca_gateway::{init_tracing, router, AppState, GatewayConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    config_rs::load_dotenv();

    let config = GatewayConfig::from_env();
    init_tracing(config.json_logs)?;

    if let Some(addr) = config.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "serving Prometheus metrics");
    }

    let engine_config = EngineConfig::from_env().context("invalid engine configuration")?;
    let collaborators =
        telemetry_backends::collaborators_from_env().context("failed to construct telemetry backends")?;
    let engine = RcaEngine::from_config(engine_config, collaborators).context("failed to start RCA engine")?;
    info!(
        max_loops = engine.config().max_loops,
        ambiguity_threshold = engine.config().ambiguity_threshold,
        "RCA engine ready"
    );

    let app = router(AppState::new(Arc::new(engine), config.service_name.clone()), config.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, service = %config.service_name, "RCA gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("RCA gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
