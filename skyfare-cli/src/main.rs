use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skyfare_store::{app_config::Config, LocalStore};
use skyfare_sync::{remote::HttpGateway, ConnectivityMonitor, SyncEngine};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skyfare_sync=debug,skyfare_store=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("Failed to load config");
    tracing::info!("Starting skyfare sync against {}", config.gateway.base_url);

    let store = Arc::new(LocalStore::new(config.store.path.clone()));
    let gateway = Arc::new(HttpGateway::new(&config.gateway));
    let monitor = Arc::new(ConnectivityMonitor::new(true));
    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        gateway,
        monitor.clone(),
        &config.sync,
    ));

    if let Ok(user) = std::env::var("SKYFARE_USER") {
        engine.set_session_user(Some(user)).await;
    }

    // One reconciliation pass, then report what the local cache holds.
    engine.sync_all().await;

    match store.flights().await {
        Ok(flights) => tracing::info!("local cache holds {} flights", flights.len()),
        Err(e) => tracing::error!("cannot read local cache: {e}"),
    }
    if let Some(count) = engine.remote_flight_count().await {
        tracing::info!("remote reports {count} flights");
    }
    match engine.approximate_store_size().await {
        Ok(bytes) => tracing::info!("approximate local store size: {bytes} bytes"),
        Err(e) => tracing::error!("cannot size local cache: {e}"),
    }

    let purged = engine.purge_expired_cache().await.unwrap_or(0);
    if purged > 0 {
        tracing::info!("purged {purged} expired search results");
    }

    if let Some(at) = *engine.last_synced().borrow() {
        tracing::info!("sync completed at {at}");
    }
}
