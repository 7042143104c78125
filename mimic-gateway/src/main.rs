//! Entry point for the `mimic-gateway` HTTP server.

use std::sync::Arc;

use clap::Parser;
use mimic_core::{ApiSpec, RouteTable};
use mimic_executor::{DescriptorResolver, ProcessBackend, SandboxBackend};
use mimic_gateway::{create_router, GatewayConfig, GatewayState};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = GatewayConfig::parse();
    init_tracing(&config.log_level);

    let spec = match ApiSpec::load(&config.spec) {
        Ok(spec) => spec,
        Err(e) => {
            tracing::error!(spec = %config.spec.display(), error = %e, "failed to load API document");
            std::process::exit(1);
        }
    };
    let routes = match RouteTable::from_spec(spec) {
        Ok(routes) => routes,
        Err(e) => {
            tracing::error!(error = %e, "failed to build route table");
            std::process::exit(1);
        }
    };
    for route in routes.routes() {
        info!(method = %route.method, path = %route.path, uri = %route.integration.uri, "route registered");
    }

    let backend = ProcessBackend::new(config.sandbox_config());
    if let Err(e) = backend.health_check().await {
        tracing::warn!(error = %e, "sandbox runtime unavailable; invocations will fail until it is installed");
    }
    let backend: Arc<dyn SandboxBackend> = Arc::new(backend);

    let state = GatewayState::new(
        routes,
        config.stage.clone(),
        config.stage_variable_map(),
        backend,
        Box::new(DescriptorResolver::new(config.functions_dir.clone())),
    )
    .with_env(config.env_map())
    .with_default_timeout(config.default_timeout());
    let app = create_router(Arc::new(state));

    let listener = match tokio::net::TcpListener::bind(config.listen).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %config.listen, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    info!(addr = %config.listen, stage = %config.stage, "mimic-gateway listening");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutting down");
    };
    if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise `level` applies to every target.
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
