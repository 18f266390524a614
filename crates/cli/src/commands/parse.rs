use chainpolicy_core::parser::parse;
use chainpolicy_core::refiner::Suggestion;
use serde_json::json;

use crate::commands::{to_data, CommandResult};

const COMMAND: &str = "parse";

/// Checks a sentence against the grammar. Incomplete or invalid input reports
/// the tokens the parser would accept next.
pub fn run(text: &str) -> CommandResult {
    match parse(text) {
        Ok(intent) => CommandResult::success_with_data(
            COMMAND,
            "intent is complete",
            json!({ "intent": to_data(&intent), "rendered": intent.render() }),
        ),
        Err(error) => {
            let suggestion = Suggestion::from(&error);
            CommandResult::failure_with_data(
                COMMAND,
                "bad_request",
                suggestion.message.clone(),
                6,
                to_data(&suggestion),
            )
        }
    }
}
