pub mod migrate;
pub mod refresh;
pub mod run;
pub mod seed;
pub mod status;

use basketry_core::config::{AppConfig, LoadOptions};
use basketry_db::{connect, migrations, DbPool};
use serde::Serialize;

/// What a subcommand hands back to `main`: a JSON line for stdout and the
/// process exit code. 0 success, 2 config/argument, 3 runtime, 4 database
/// connectivity, 5 command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'a str,
    error_class: Option<&'a str>,
    message: &'a str,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::render(command, "ok", None, &message.into(), 0)
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::render(command, "error", Some(error_class), &message.into(), exit_code)
    }

    fn render(
        command: &str,
        status: &str,
        error_class: Option<&str>,
        message: &str,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome { command, status, error_class, message };
        let output = serde_json::to_string(&payload).unwrap_or_else(|error| {
            format!(
                "{{\"command\":\"{command}\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
                error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
            )
        });
        Self { exit_code, output }
    }
}

/// Error class, human message, and exit code of a failed async step.
pub(crate) type StepError = (&'static str, String, u8);

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })
}

pub(crate) fn current_thread_runtime(
    command: &str,
) -> Result<tokio::runtime::Runtime, CommandResult> {
    build_runtime(command, tokio::runtime::Builder::new_current_thread())
}

pub(crate) fn multi_thread_runtime(
    command: &str,
) -> Result<tokio::runtime::Runtime, CommandResult> {
    build_runtime(command, tokio::runtime::Builder::new_multi_thread())
}

fn build_runtime(
    command: &str,
    mut builder: tokio::runtime::Builder,
) -> Result<tokio::runtime::Runtime, CommandResult> {
    builder.enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

/// Connect per the loaded config and bring the schema up to date. Every
/// command starts with this pair, so migrations can never be forgotten.
pub(crate) async fn open_migrated_pool(config: &AppConfig) -> Result<DbPool, StepError> {
    let pool = connect(&config.database)
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), 5u8))?;
    Ok(pool)
}

pub(crate) fn settle<T>(
    command: &str,
    result: Result<T, StepError>,
    on_success: impl FnOnce(T) -> CommandResult,
) -> CommandResult {
    match result {
        Ok(value) => on_success(value),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
    }
}
