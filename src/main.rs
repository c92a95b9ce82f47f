use anyhow::Context;
use book_swap::api::{self, AppState};
use book_swap::config::Config;
use book_swap::logging::init_logging;
use book_swap::store::SledStore;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_logging(&config.log)?;

    let store = Arc::new(SledStore::open(&config.db_path)?);
    let app = api::router(AppState::new(Arc::clone(&store)));

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, db = %config.db_path.display(), "book swap api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    store.flush()?;
    info!("shut down");
    Ok(())
}
