use chainpolicy_core::audit::TracingAuditSink;
use chainpolicy_core::config::LoadOptions;
use chainpolicy_core::domain::intent::IntentId;
use chrono::Utc;
use serde_json::json;

use crate::commands::{block_on, correlation_id, open, to_data, CommandResult};

pub fn create(options: &LoadOptions, owner: &str, text: &str) -> CommandResult {
    const COMMAND: &str = "intent.create";
    block_on(COMMAND, async {
        let app = match open(COMMAND, options).await {
            Ok(app) => app,
            Err(result) => return result,
        };
        let correlation_id = correlation_id();
        let result = app
            .intent_service(&TracingAuditSink, &correlation_id)
            .create(owner, text, Utc::now())
            .await;
        app.shutdown().await;

        match result {
            Ok(view) => CommandResult::success_with_data(
                COMMAND,
                format!("created intent {} with {} policies", view.intent.id, view.policies.len()),
                to_data(&view),
            ),
            Err(error) => CommandResult::from_application(COMMAND, error, &correlation_id),
        }
    })
}

pub fn update(options: &LoadOptions, id: &str, text: &str) -> CommandResult {
    const COMMAND: &str = "intent.update";
    block_on(COMMAND, async {
        let app = match open(COMMAND, options).await {
            Ok(app) => app,
            Err(result) => return result,
        };
        let correlation_id = correlation_id();
        let result = app
            .intent_service(&TracingAuditSink, &correlation_id)
            .update(&IntentId(id.to_owned()), text, Utc::now())
            .await;
        app.shutdown().await;

        match result {
            Ok(view) => CommandResult::success_with_data(
                COMMAND,
                format!("updated intent {} to {} policies", view.intent.id, view.policies.len()),
                to_data(&view),
            ),
            Err(error) => CommandResult::from_application(COMMAND, error, &correlation_id),
        }
    })
}

pub fn delete(options: &LoadOptions, id: &str) -> CommandResult {
    const COMMAND: &str = "intent.delete";
    block_on(COMMAND, async {
        let app = match open(COMMAND, options).await {
            Ok(app) => app,
            Err(result) => return result,
        };
        let correlation_id = correlation_id();
        let result = app
            .intent_service(&TracingAuditSink, &correlation_id)
            .delete(&IntentId(id.to_owned()))
            .await;
        app.shutdown().await;

        match result {
            Ok(retired) => CommandResult::success_with_data(
                COMMAND,
                format!("deleted intent {id} and retired {retired} policies"),
                json!({ "id": id, "retired": retired }),
            ),
            Err(error) => CommandResult::from_application(COMMAND, error, &correlation_id),
        }
    })
}

pub fn show(options: &LoadOptions, id: &str) -> CommandResult {
    const COMMAND: &str = "intent.show";
    block_on(COMMAND, async {
        let app = match open(COMMAND, options).await {
            Ok(app) => app,
            Err(result) => return result,
        };
        let correlation_id = correlation_id();
        let result = app
            .intent_service(&TracingAuditSink, &correlation_id)
            .show(&IntentId(id.to_owned()))
            .await;
        app.shutdown().await;

        match result {
            Ok(view) => CommandResult::success_with_data(COMMAND, view.intent.text.clone(), to_data(&view)),
            Err(error) => CommandResult::from_application(COMMAND, error, &correlation_id),
        }
    })
}

pub fn list(options: &LoadOptions, owner: &str) -> CommandResult {
    const COMMAND: &str = "intent.list";
    block_on(COMMAND, async {
        let app = match open(COMMAND, options).await {
            Ok(app) => app,
            Err(result) => return result,
        };
        let correlation_id = correlation_id();
        let result = app.intent_service(&TracingAuditSink, &correlation_id).list(owner).await;
        app.shutdown().await;

        match result {
            Ok(views) => CommandResult::success_with_data(
                COMMAND,
                format!("{} intents for {}", views.len(), owner.trim()),
                to_data(&views),
            ),
            Err(error) => CommandResult::from_application(COMMAND, error, &correlation_id),
        }
    })
}
