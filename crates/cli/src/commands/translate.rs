use chainpolicy_core::audit::TracingAuditSink;
use chainpolicy_core::config::LoadOptions;
use serde_json::json;

use crate::commands::{block_on, correlation_id, open, to_data, CommandResult};

const COMMAND: &str = "translate";

/// Translates without enforcing or persisting anything.
pub fn run(options: &LoadOptions, text: &str) -> CommandResult {
    block_on(COMMAND, async {
        let app = match open(COMMAND, options).await {
            Ok(app) => app,
            Err(result) => return result,
        };
        let correlation_id = correlation_id();
        let result = app.intent_service(&TracingAuditSink, &correlation_id).translate(text).await;
        app.shutdown().await;

        match result {
            Ok((intent, policies)) => CommandResult::success_with_data(
                COMMAND,
                format!("translated into {} polic{}", policies.len(), plural(policies.len())),
                json!({ "intent": to_data(&intent), "policies": to_data(&policies) }),
            ),
            Err(error) => CommandResult::from_application(COMMAND, error, &correlation_id),
        }
    })
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "y"
    } else {
        "ies"
    }
}
