use std::sync::Arc;

use basketry_db::event_store::SqlEventStore;
use basketry_db::pattern_store::SqlPatternStore;
use basketry_engine::orchestrator::Orchestrator;
use basketry_engine::refresh::RefreshEngine;

use super::{load_config, multi_thread_runtime, open_migrated_pool, settle, CommandResult};
use crate::logging;

/// Continuous mode: migrate, spawn the per-pattern refresh loops, and block
/// until interrupted.
pub fn run() -> CommandResult {
    let config = match load_config("run") {
        Ok(config) => config,
        Err(result) => return result,
    };

    logging::init(&config.logging);

    let runtime = match multi_thread_runtime("run") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_migrated_pool(&config).await?;
        let engine = RefreshEngine::new(
            Arc::new(SqlEventStore::new(pool.clone())),
            Arc::new(SqlPatternStore::new(pool.clone())),
        );
        let handle = Orchestrator::new(engine, config.refresh).spawn();
        tracing::info!(database = %config.database.url, "orchestrator running; press ctrl-c to stop");

        tokio::signal::ctrl_c()
            .await
            .map_err(|error| ("signal_handler", error.to_string(), 3u8))?;

        tracing::info!("shutdown requested; draining refresh loops");
        handle.shutdown().await;
        pool.close().await;
        Ok(())
    });

    settle("run", result, |()| CommandResult::success("run", "orchestrator stopped cleanly"))
}
