use super::{current_thread_runtime, load_config, open_migrated_pool, settle, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match current_thread_runtime("migrate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_migrated_pool(&config).await?;
        pool.close().await;
        Ok(())
    });

    settle("migrate", result, |()| {
        CommandResult::success("migrate", "applied pending migrations")
    })
}
