//! Two contexts sharing a theme toggle and a todo list
//!
//! Run with:
//! ```bash
//! cargo run --example two_tabs
//! ```

use serde_json::json;
use std::time::Duration;
use syncsignal_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use syncsignal_core::{Origin, ScalarOptions, StructureOptions, SyncResult};
use tracing::info;

#[tokio::main]
async fn main() -> SyncResult<()> {
    let config = LogConfig::new(LogLevel::Debug).with_target(false);
    init_logging_with_config(config).expect("Failed to initialize logging");

    let origin = Origin::in_memory();
    let (left, right) = (origin.context(), origin.context());

    let theme_options = || ScalarOptions::new("theme").auto_sync(true);
    let left_theme = left.create_synced_scalar("light", Some(theme_options()))?;
    let right_theme = right.create_synced_scalar("light", Some(theme_options()))?;

    let _watch = right_theme.subscribe(|value| info!(theme = %value.to_plain_json(), "Right tab saw theme"));
    left_theme.set("dark");

    let todos = |ctx: &syncsignal_core::SyncContext| {
        ctx.create_synced_structure(StructureOptions::new("todos", json!({"items": [], "filter": "all"})))
    };
    let left_todos = todos(&left)?;
    let right_todos = todos(&right)?;

    left_todos.patch(["items"], json!(["write demo"]))?;
    left_todos.patch(["filter"], "open")?;
    left_todos.sync();

    tokio::time::sleep(Duration::from_millis(200)).await;
    info!(
        theme = %right_theme.get().to_plain_json(),
        todos = %right_todos.state().to_plain_json(),
        "Right tab after sync"
    );

    left.clear_all_synced_entries();
    info!(keys = ?right.list_keys(Default::default()), "Stored keys after clearing");
    Ok(())
}
