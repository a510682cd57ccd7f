use basketry_db::pattern_store::{PatternStore, SqlPatternStore};

use super::{current_thread_runtime, load_config, open_migrated_pool, settle, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("status") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match current_thread_runtime("status") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_migrated_pool(&config).await?;
        let store = SqlPatternStore::new(pool.clone());
        let infos = store
            .snapshot_counts()
            .await
            .map_err(|error| ("status_read", error.to_string(), 5u8))?;
        pool.close().await;
        Ok(infos)
    });

    settle("status", result, |infos| {
        let lines: Vec<String> = infos
            .iter()
            .map(|info| {
                let freshness = info
                    .last_updated
                    .map(|ts| ts.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string());
                format!("  - {}: {} rows, last refreshed {}", info.kind.as_str(), info.rows, freshness)
            })
            .collect();
        CommandResult::success("status", format!("pattern snapshots:\n{}", lines.join("\n")))
    })
}
