use std::sync::Arc;

use fetchit::config::AppConfig;
use fetchit::storage::FileStorage;
use fetchit::{AppStore, seed};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env().expect("invalid configuration");
    let storage = Arc::new(FileStorage::new(&config.data_dir));
    tracing::info!(data_dir = %config.data_dir.display(), key = %config.storage_key, "opening store");

    let mut store = AppStore::open(storage, &config.storage_key, config.persist).await;
    store.subscribe(|_, mutation| tracing::debug!(mutation = mutation.name(), "observer notified"));

    let storage_ok = store.persist_health().is_none_or(|health| health.is_healthy());
    if !storage_ok {
        tracing::warn!("stored state could not be read; skipping sample data");
    }
    if storage_ok && config.seed {
        match seed::seed_if_empty(&mut store) {
            Ok(true) => tracing::info!("first run: sample data loaded"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, code = e.error_code(), "seeding failed"),
        }
    }

    let state = store.state();
    if let Some(user) = &state.current_user {
        tracing::info!(user = %user.name, groups = state.groups.len(), lists = state.lists.len(), "session ready");
    }
    for list in &state.lists {
        let counts = list.item_counts();
        tracing::info!(
            list = %list.name,
            completed = counts.completed,
            total = counts.total,
            percent = counts.percent(),
            members = list.members.len(),
            "list summary"
        );
    }
    tracing::info!(open_items = state.shopping_queue().len(), "shopping queue");

    if let Some(health) = store.shutdown().await {
        if health.is_healthy() {
            tracing::info!(written = health.written, "state saved");
        } else {
            tracing::error!(failed = health.failed, error = ?health.last_error, "state not fully saved");
        }
    }
}
