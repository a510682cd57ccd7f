use basketry_core::chrono::Utc;
use basketry_db::fixtures::seed_demo_events;

use super::{current_thread_runtime, load_config, open_migrated_pool, settle, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("seed") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match current_thread_runtime("seed") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_migrated_pool(&config).await?;
        let summary = seed_demo_events(&pool, Utc::now())
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        pool.close().await;
        Ok(summary)
    });

    settle("seed", result, |summary| {
        CommandResult::success(
            "seed",
            format!(
                "seeded {} search, {} interaction, {} cart events and {} orders ({} items)",
                summary.search_events,
                summary.interaction_events,
                summary.cart_events,
                summary.orders,
                summary.order_items
            ),
        )
    })
}
