pub mod config;
pub mod intent;
pub mod migrate;
pub mod parse;
pub mod rates;
pub mod translate;

use std::future::Future;

use chainpolicy_core::config::LoadOptions;
use chainpolicy_core::errors::ApplicationError;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::bootstrap::{bootstrap, Application};

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
    data: Value,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, Value::Null)
    }

    pub fn success_with_data(command: &str, message: impl Into<String>, data: Value) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        Self::failure_with_data(command, error_class, message, exit_code, Value::Null)
    }

    pub fn failure_with_data(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
        data: Value,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_application(command: &str, error: ApplicationError, correlation_id: &str) -> Self {
        let interface = error.into_interface(correlation_id);
        let exit_code = match interface.error_class() {
            "bad_request" => 6,
            "not_found" => 7,
            "service_unavailable" => 8,
            _ => 9,
        };
        Self::failure_with_data(
            command,
            interface.error_class(),
            interface.message(),
            exit_code,
            serde_json::json!({ "correlation_id": correlation_id }),
        )
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\",\"data\":null}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

pub(crate) fn to_data(value: &impl Serialize) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

pub(crate) fn correlation_id() -> String {
    format!("cli-{}", Uuid::new_v4())
}

/// Runs `future` to completion on a fresh single-threaded runtime.
pub(crate) fn block_on<F>(command: &str, future: F) -> CommandResult
where
    F: Future<Output = CommandResult>,
{
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime.block_on(future),
        Err(error) => CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            3,
        ),
    }
}

/// Bootstraps the application or renders the failure as the command's result.
pub(crate) async fn open(command: &str, options: &LoadOptions) -> Result<Application, CommandResult> {
    bootstrap(options.clone()).await.map_err(|error| {
        CommandResult::failure(command, error.error_class(), error.to_string(), error.exit_code())
    })
}
