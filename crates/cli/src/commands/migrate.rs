use chainpolicy_core::config::{AppConfig, LoadOptions};
use chainpolicy_db::{connect, migrations};

use crate::commands::{block_on, CommandResult};

const COMMAND: &str = "migrate";

/// Applies pending migrations, or reverts all of them with `revert`.
pub fn run(options: &LoadOptions, revert: bool) -> CommandResult {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    block_on(COMMAND, async {
        let result = async {
            let pool = connect(&config.database)
                .await
                .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
            let applied = if revert {
                migrations::undo_all(&pool).await
            } else {
                migrations::run_pending(&pool).await
            };
            pool.close().await;
            applied.map_err(|error| ("migration", error.to_string(), 5u8))
        }
        .await;

        match result {
            Ok(()) if revert => CommandResult::success(COMMAND, "reverted all migrations"),
            Ok(()) => CommandResult::success(COMMAND, "applied pending migrations"),
            Err((error_class, message, exit_code)) => {
                CommandResult::failure(COMMAND, error_class, message, exit_code)
            }
        }
    })
}
