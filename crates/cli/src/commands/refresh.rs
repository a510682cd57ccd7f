use std::sync::Arc;

use basketry_core::domain::pattern::PatternKind;
use basketry_db::event_store::SqlEventStore;
use basketry_db::pattern_store::SqlPatternStore;
use basketry_engine::refresh::RefreshEngine;

use super::{current_thread_runtime, load_config, open_migrated_pool, CommandResult, StepError};

pub fn run(pattern: Option<&str>) -> CommandResult {
    let selected = match pattern {
        Some(raw) => match PatternKind::parse(raw) {
            Some(kind) => Some(kind),
            None => {
                return CommandResult::failure(
                    "refresh",
                    "invalid_argument",
                    format!(
                        "unknown pattern `{raw}`; expected one of preference, association, reorder, behavior, session_context"
                    ),
                    2,
                );
            }
        },
        None => None,
    };

    let config = match load_config("refresh") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match current_thread_runtime("refresh") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_migrated_pool(&config).await?;
        let engine = RefreshEngine::new(
            Arc::new(SqlEventStore::new(pool.clone())),
            Arc::new(SqlPatternStore::new(pool.clone())),
        );

        let outcomes = match selected {
            Some(kind) => vec![(kind, engine.refresh(kind).await)],
            None => engine.refresh_all().await,
        };

        pool.close().await;
        Ok::<_, StepError>(outcomes)
    });

    let outcomes = match result {
        Ok(outcomes) => outcomes,
        Err((error_class, message, exit_code)) => {
            return CommandResult::failure("refresh", error_class, message, exit_code);
        }
    };

    let mut lines = Vec::with_capacity(outcomes.len());
    let mut failures = 0u32;
    for (kind, outcome) in &outcomes {
        match outcome {
            Ok(report) => lines.push(format!(
                "  - {}: {} rows ({} malformed events skipped, {}ms)",
                kind.as_str(),
                report.rows,
                report.skipped_events,
                report.elapsed_ms
            )),
            Err(error) => {
                failures += 1;
                lines.push(format!("  - {}: failed: {error}", kind.as_str()));
            }
        }
    }
    let message = format!("refreshed pattern tables:\n{}", lines.join("\n"));

    if failures > 0 {
        CommandResult::failure("refresh", "refresh_execution", message, 5)
    } else {
        CommandResult::success("refresh", message)
    }
}
