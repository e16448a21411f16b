pub mod config;
pub mod decide;
pub mod doctor;
pub mod migrate;
pub mod quota;
pub mod seed;
pub mod show;
pub mod submit;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;
use uuid::Uuid;

use leaveflow_core::config::{AppConfig, LoadOptions};
use leaveflow_core::errors::{InterfaceError, WorkflowError};
use leaveflow_db::{connect_with_settings, migrations, DbPool, LeaveWorkflow};

use crate::effects::{HtmlDocumentGenerator, TracingNotifier};

/// `(error_class, message, exit_code)` carried out of a command's async block.
pub(crate) type Failure = (&'static str, String, u8);

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data: None,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: &impl Serialize,
    ) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => {
                let payload = CommandOutcome {
                    command: command.to_string(),
                    status: "ok".to_string(),
                    error_class: None,
                    message: message.into(),
                    data: Some(data),
                };
                Self { exit_code: 0, output: serialize_payload(payload) }
            }
            Err(error) => Self::failure(command, "serialization", error.to_string(), 3),
        }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub(crate) fn from_failure(command: &str, (error_class, message, exit_code): Failure) -> Self {
        Self::failure(command, error_class, message, exit_code)
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

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

pub(crate) fn build_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        )
    })
}

/// Connects and brings the schema up to date; every data command runs
/// against a migrated database.
pub(crate) async fn open_pool(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
    migrations::run_pending(&pool).await.map_err(|error| ("migration", error.to_string(), 5u8))?;
    Ok(pool)
}

pub(crate) fn build_workflow(pool: DbPool, config: &AppConfig) -> Result<LeaveWorkflow, Failure> {
    let documents = HtmlDocumentGenerator::new(config.documents.output_dir.clone())
        .map_err(|error| ("document_template", error.to_string(), 3u8))?;
    Ok(LeaveWorkflow::from_config(pool, config, Arc::new(documents), Arc::new(TracingNotifier)))
}

pub(crate) fn correlation_id() -> String {
    format!("cli-{}", Uuid::new_v4())
}

/// Persistence failures exit like connectivity failures; every other
/// workflow refusal exits with 6 and carries its taxonomy code.
pub(crate) fn workflow_failure(error: WorkflowError, correlation_id: &str) -> Failure {
    let code = error.code();
    let exit_code = if matches!(error, WorkflowError::Persistence(_)) { 4 } else { 6 };
    let detail = error.to_string();
    let interface: InterfaceError = error.into_interface(correlation_id);
    let message =
        format!("{} {detail} (correlation id {correlation_id})", interface.user_message());
    (code, message, exit_code)
}

pub(crate) fn repository_failure(error: impl std::fmt::Display) -> Failure {
    ("persistence", error.to_string(), 4)
}
