use std::str::FromStr;

use chainpolicy_core::config::LoadOptions;
use chainpolicy_core::domain::intent::Currency;
use chainpolicy_core::domain::policy::CANONICAL_CURRENCY;
use chainpolicy_db::repositories::{ConversionRate, ConversionRateRepository};
use chrono::Utc;
use rust_decimal::Decimal;

use crate::commands::{block_on, open, to_data, CommandResult};

/// Validated input for `rates set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateInput {
    pub currency: Currency,
    pub rate: Decimal,
}

pub fn parse_rate_input(currency: &str, rate: &str) -> Result<RateInput, String> {
    let currency =
        Currency::parse(currency).ok_or_else(|| format!("unsupported currency `{currency}`"))?;
    if currency == CANONICAL_CURRENCY {
        return Err(format!("{} is the canonical currency and always converts at 1", currency.code()));
    }
    let rate = Decimal::from_str(rate.trim()).map_err(|_| format!("invalid rate `{rate}`"))?;
    if rate <= Decimal::ZERO {
        return Err(format!("rate must be positive, got {rate}"));
    }
    Ok(RateInput { currency, rate: rate.normalize() })
}

pub fn set(options: &LoadOptions, currency: &str, rate: &str) -> CommandResult {
    const COMMAND: &str = "rates.set";
    let input = match parse_rate_input(currency, rate) {
        Ok(input) => input,
        Err(message) => return CommandResult::failure(COMMAND, "bad_request", message, 6),
    };

    block_on(COMMAND, async {
        let app = match open(COMMAND, options).await {
            Ok(app) => app,
            Err(result) => return result,
        };
        let stored = ConversionRate { currency: input.currency, rate: input.rate, updated_at: Utc::now() };
        let result = app.rates.save_rate(stored.clone()).await;
        app.shutdown().await;

        match result {
            Ok(()) => {
                tracing::info!(
                    event_name = "rates.updated",
                    currency = stored.currency.code(),
                    rate = %stored.rate,
                    "conversion rate stored"
                );
                CommandResult::success_with_data(
                    COMMAND,
                    format!("1 {} = {} {}", stored.currency.code(), stored.rate, CANONICAL_CURRENCY.code()),
                    to_data(&stored),
                )
            }
            Err(error) => CommandResult::failure(COMMAND, "service_unavailable", error.to_string(), 8),
        }
    })
}

pub fn list(options: &LoadOptions) -> CommandResult {
    const COMMAND: &str = "rates.list";
    block_on(COMMAND, async {
        let app = match open(COMMAND, options).await {
            Ok(app) => app,
            Err(result) => return result,
        };
        let result = app.rates.list_rates().await;
        app.shutdown().await;

        match result {
            Ok(rates) => CommandResult::success_with_data(
                COMMAND,
                format!("{} stored rates", rates.len()),
                to_data(&rates),
            ),
            Err(error) => CommandResult::failure(COMMAND, "service_unavailable", error.to_string(), 8),
        }
    })
}
