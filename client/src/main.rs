//! Tandem demo - two controllers sharing an in-memory remote store.
//!
//! A continuously synced controller edits a todo list while another client
//! writes to the store directly; a one-shot controller then reads the result.

use std::sync::Arc;

use serde_json::json;
use tandem_client::{
    logging, ConfigError, MemoryStore, Mode, Options, RemoteStore, SyncConfig, SyncController,
};
use tandem_engine::Patch;

/// Location used when `TANDEM_URL` is unset.
const DEFAULT_URL: &str = "mem://localhost/demo/todos";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    dotenvy::dotenv().ok();
    logging::init();

    let config = match SyncConfig::from_env() {
        Ok(config) => config,
        Err(ConfigError::MissingUrl) => SyncConfig::new(DEFAULT_URL)?,
        Err(e) => return Err(e.into()),
    };

    tracing::info!(location = %config.location, "Starting tandem demo");

    let store = MemoryStore::new_shared();
    let live = SyncController::open(store.clone(), config.clone().with_mode(Mode::Continuous)).await?;
    let mut events = live.events();

    live.create(Some(json!({"title": "Buy milk", ".priority": 2})), Options::default())
        .await?;
    live.add(
        vec![json!({"id": "chores", "title": "Do chores", ".priority": 1})],
        Options::default(),
    )
    .await?;
    live.update("chores", Options::default(), |record| {
        record.set("done", json!(true));
    })
    .await?;

    // Another client edits the same location.
    edit_elsewhere(&store, &config).await?;
    live.flush().await?;

    while let Ok(event) = events.try_recv() {
        tracing::info!(event = %serde_json::to_string(&event)?, "Local notification");
    }

    let snapshot = SyncController::open(store.clone(), config.with_mode(Mode::OneShot)).await?;

    let live_records: Vec<_> = live.records().iter().map(|r| r.to_json()).collect();
    let read_records: Vec<_> = snapshot.records().iter().map(|r| r.to_json()).collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "live": live_records,
            "one_shot": read_records,
            "writes": store.writes(),
        }))?
    );

    live.close().await?;
    snapshot.close().await?;

    Ok(())
}

async fn edit_elsewhere(
    store: &Arc<MemoryStore>,
    config: &SyncConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut patch = Patch::new();
    patch.set("title", json!("Do all the chores"));
    store
        .write_partial(&config.location.child("chores"), patch)
        .await?;
    store
        .write_whole(
            &config.location.child("call-mom"),
            json!({"title": "Call mom"}),
        )
        .await?;
    Ok(())
}
