//! Kintree sync server binary
//!
//! Reads `KINTREE_CONFIG` (default `kintree.json`, optional) and the
//! `KINTREE_*` environment overrides, then serves until interrupted.

use std::sync::Arc;

use kintree_core::sync::{InMemoryAccountDirectory, InMemoryFamilyIndex};
use kintree_core::{SyncConfig, SyncHub};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_path =
        std::env::var("KINTREE_CONFIG").unwrap_or_else(|_| "kintree.json".to_string());
    tracing::info!("📂 Loading configuration from {}", config_path);
    let config = SyncConfig::load(&config_path).await?;

    let hub = Arc::new(SyncHub::new(
        Arc::new(InMemoryAccountDirectory::new()),
        Arc::new(InMemoryFamilyIndex::new()),
        config,
    ));

    kintree_server::start_server(hub).await
}
