use std::str::FromStr;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::info;

use crate::domain::intent::{
    Blockchain, Currency, Filter, Intent, Interval, Modifier, Profile, Timeframe,
};
use crate::parser::states::ParserState;

/// Filter pairs that cannot both describe the same blockchain.
const CONFLICTING_FILTERS: [(Filter, Filter); 1] = [(Filter::Private, Filter::Public)];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("filters '{first}' and '{second}' cannot be combined")]
    ConflictingFilters { first: Filter, second: Filter },
    #[error("'{token}' is not a valid threshold, expected a non-negative number")]
    InvalidThreshold { token: String },
    #[error("'{token}' is outside the range a threshold can hold")]
    ThresholdOutOfRange { token: String },
    #[error("'{token}' is not a known {kind}")]
    UnknownValue { kind: &'static str, token: String },
}

/// Runs the semantic hook of `state` for a token its table already accepted,
/// recording the token on `intent`.
///
/// `Threshold` is free-form and handled by [`parse_threshold`]; `User` only
/// records. States without a hook accept silently.
pub fn validate(
    state: ParserState,
    token: &str,
    intent: &mut Intent,
) -> Result<(), ValidationError> {
    match state {
        ParserState::User => intent.add_user(token),
        ParserState::Timeframe => {
            intent.timeframe = Some(lookup("timeframe", token, Timeframe::parse)?);
        }
        ParserState::Selection => {
            if let Some(blockchain) = Blockchain::parse(token) {
                intent.blockchain = Some(blockchain);
            }
        }
        ParserState::Profile => {
            intent.profile = Some(lookup("profile", token, Profile::parse)?);
        }
        ParserState::ProfileFilters | ParserState::Filter => {
            if let Some(filter) = Filter::parse(token) {
                add_filter(intent, filter)?;
            }
        }
        ParserState::Whitelist => {
            intent.whitelist.insert(lookup("blockchain", token, Blockchain::parse)?);
        }
        ParserState::Blacklist => {
            intent.blacklist.insert(lookup("blockchain", token, Blockchain::parse)?);
        }
        ParserState::Modifier => {
            intent.modifiers.insert(lookup("modifier", token, Modifier::parse)?);
        }
        ParserState::Interval => {
            intent.interval = Some(lookup("interval", token, Interval::parse)?);
        }
        ParserState::Currency => {
            intent.currency = Some(lookup("currency", token, Currency::parse)?);
        }
        ParserState::DefaultKeyword => clear_for_default(intent),
        ParserState::Threshold => {
            intent.threshold = Some(parse_threshold(token)?);
        }
        _ => {}
    }

    Ok(())
}

/// Parses a cost threshold: any finite, non-negative numeric literal.
///
/// Literals that fit are kept exact; exponent forms beyond the decimal scale
/// fall back to the nearest representable value.
pub fn parse_threshold(token: &str) -> Result<Decimal, ValidationError> {
    let invalid = || ValidationError::InvalidThreshold { token: token.to_string() };

    let value = f64::from_str(token).ok().filter(|value| value.is_finite()).ok_or_else(invalid)?;
    if value < 0.0 {
        return Err(invalid());
    }

    let threshold = Decimal::from_str(token)
        .or_else(|_| Decimal::from_scientific(token))
        .ok()
        .or_else(|| Decimal::from_f64(value))
        .ok_or_else(|| ValidationError::ThresholdOutOfRange { token: token.to_string() })?;

    Ok(threshold.normalize())
}

fn add_filter(intent: &mut Intent, filter: Filter) -> Result<(), ValidationError> {
    if is_implied_by_profile(intent.profile, filter) {
        info!(
            event_name = "parser.filter_dropped",
            filter = filter.as_str(),
            profile = intent.profile.map(|profile| profile.as_str()).unwrap_or_default(),
            "dropping filter already implied by the profile"
        );
        return Ok(());
    }

    for (first, second) in CONFLICTING_FILTERS {
        let counterpart = match filter {
            f if f == first => second,
            f if f == second => first,
            _ => continue,
        };
        if intent.filters.contains(&counterpart) {
            return Err(ValidationError::ConflictingFilters { first, second });
        }
    }

    intent.filters.insert(filter);
    Ok(())
}

fn is_implied_by_profile(profile: Option<Profile>, filter: Filter) -> bool {
    matches!(
        (profile, filter),
        (Some(Profile::Cheapest), Filter::Cheap) | (Some(Profile::Fastest), Filter::Fast)
    )
}

fn clear_for_default(intent: &mut Intent) {
    if let Some(timeframe) = intent.timeframe.take() {
        info!(
            event_name = "parser.timeframe_cleared",
            timeframe = timeframe.as_str(),
            "default policies apply around the clock, dropping timeframe"
        );
    }
    intent.interval = None;
    intent.currency = None;
    intent.threshold = None;
}

fn lookup<T>(
    kind: &'static str,
    token: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, ValidationError> {
    parse(token).ok_or_else(|| ValidationError::UnknownValue { kind, token: token.to_string() })
}
