//! meshgraph REST API Server
//!
//! Run with: cargo run --features server --bin meshgraph-server
//!
//! Configuration comes from `MESHGRAPH_CONFIG` (a TOML file, optional) and
//! the `MESHGRAPH_*` / `PORT` environment variables. Log verbosity follows
//! `RUST_LOG` (default `info`).

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use meshgraph::server::{router, AppState};
use meshgraph::{Config, LmdbStore, PermissionService};

/// Key of the root account created on first start.
const ROOT_ACCOUNT_KEY: &str = "root";

fn load_config() -> meshgraph::Result<Config> {
    let base = match std::env::var("MESHGRAPH_CONFIG") {
        Ok(path) => Config::from_file(path)?,
        Err(_) => Config::default(),
    };
    base.with_overrides(|k| std::env::var(k).ok())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    info!(db = %config.db_path, "opening graph store");
    let store = Arc::new(LmdbStore::open_with_map_size(&config.db_path, config.map_size)?);

    let bootstrap = PermissionService::with_store(Arc::clone(&store));
    if !bootstrap.is_bootstrapped(ROOT_ACCOUNT_KEY)? {
        let root = bootstrap.bootstrap(ROOT_ACCOUNT_KEY)?;
        info!(id = %root.id, "created root account");
    }
    if config.root_token.is_none() {
        info!("no root token configured, root elevation disabled");
    }

    let app = router(AppState::new(store, &config));

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "meshgraph server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
