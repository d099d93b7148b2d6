// SPDX-License-Identifier: AGPL-3.0-or-later

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use tenant_gate::api::gateway_router;
use tenant_gate::config::{GateConfig, LogFormat};
use tenant_gate::provision::StaticKeyStore;
use tenant_gate::registry::{RegistryHandle, RegistrySnapshot};
use tenant_gate::state::GatewayState;

fn init_tracing(config: &GateConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

/// Load the registry snapshot from disk, or start empty (every route will
/// terminate with ServiceUnknown until a reload supplies entries).
fn load_registry(config: &GateConfig) -> RegistrySnapshot {
    match &config.registry_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).expect("failed to read registry snapshot");
            serde_json::from_str(&raw).expect("failed to parse registry snapshot")
        }
        None => {
            tracing::warn!("no registry snapshot configured, starting with an empty registry");
            RegistrySnapshot::new()
        }
    }
}

fn load_resolver(config: &GateConfig) -> StaticKeyStore {
    match &config.provision_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).expect("failed to read provision table");
            serde_json::from_str(&raw).expect("failed to parse provision table")
        }
        None => {
            tracing::warn!("no provision table configured, all keys will be rejected");
            StaticKeyStore::new()
        }
    }
}

#[tokio::main]
async fn main() {
    let config = GateConfig::from_env();
    init_tracing(&config);

    let registry = RegistryHandle::new(load_registry(&config));
    let resolver = Arc::new(load_resolver(&config));

    let state = GatewayState::builder(config.environment.clone(), config.key_secret.clone())
        .registry(registry)
        .resolver(resolver)
        .build();
    let app = gateway_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("failed to parse bind address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind gateway address");

    tracing::info!(%addr, environment = %config.environment, "tenant gate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to listen for shutdown signal");
            tracing::info!("shutdown signal received");
        })
        .await
        .expect("gateway server failed");
}
