use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::intent::Intent;
use crate::domain::policy::Policy;
use crate::parser::{parse, ParseError};
use crate::translator::{RateLookup, TranslateError, Translator};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum RefineError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Translate(#[from] TranslateError),
}

/// Parse-then-translate entry point.
pub struct Refiner<R> {
    translator: Translator<R>,
}

impl<R> Refiner<R>
where
    R: RateLookup,
{
    pub fn new(translator: Translator<R>) -> Self {
        Self { translator }
    }

    pub fn refine(&self, text: &str) -> Result<Vec<Policy>, RefineError> {
        let intent = parse(text)?;
        Ok(self.translator.translate(&intent)?)
    }

    /// Like [`refine`](Self::refine) but also returns the parsed intent.
    pub fn refine_with_intent(&self, text: &str) -> Result<(Intent, Vec<Policy>), RefineError> {
        let intent = parse(text)?;
        let policies = self.translator.translate(&intent)?;
        Ok((intent, policies))
    }
}

/// Feedback for a partially typed intent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub complete: bool,
    pub message: String,
    pub expected: BTreeSet<String>,
}

impl Suggestion {
    pub fn complete() -> Self {
        Self { complete: true, message: "intent is complete".to_owned(), expected: BTreeSet::new() }
    }
}

impl From<&ParseError> for Suggestion {
    fn from(error: &ParseError) -> Self {
        Self { complete: false, message: error.to_string(), expected: error.expected().clone() }
    }
}

pub fn suggest(text: &str) -> Suggestion {
    match parse(text) {
        Ok(_) => Suggestion::complete(),
        Err(error) => Suggestion::from(&error),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rust_decimal::Decimal;

    use super::{suggest, RefineError, Refiner, Suggestion};
    use crate::domain::intent::Currency;
    use crate::parser::{parse, ParseError};
    use crate::translator::{RateTable, SelectionBaselines, Translator};

    fn refiner() -> Refiner<RateTable> {
        let rates = RateTable::new().with_rate(Currency::Chf, Decimal::new(109, 2));
        Refiner::new(Translator::new(rates, SelectionBaselines::default()))
    }

    fn set(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|word| word.to_string()).collect()
    }

    #[test]
    fn refine_parses_and_translates() {
        let policies = refiner()
            .refine("for a and b select the fastest blockchain until the daily costs reach chf 20")
            .expect("refines");

        assert_eq!(policies.len(), 2);
        assert_eq!(policies[1].user, "b");
        assert_eq!(policies[1].threshold, Decimal::new(218, 1));
    }

    #[test]
    fn refine_surfaces_parse_errors() {
        let error = refiner().refine("for a select").expect_err("incomplete");
        assert!(matches!(error, RefineError::Parse(ParseError::Incomplete { .. })));
    }

    #[test]
    fn suggestions_list_next_tokens() {
        let empty = suggest("");
        assert!(!empty.complete);
        assert_eq!(empty.message, "intent is incomplete");
        assert_eq!(empty.expected, set(&["for"]));

        let profile = suggest("for client1 select the");
        assert_eq!(profile.expected, set(&["cheapest", "fastest"]));

        let done = suggest("for client1 select bitcoin as default");
        assert!(done.complete);
        assert!(done.expected.is_empty());
    }

    #[test]
    fn suggestion_after_a_bad_token_reports_the_failure() {
        let suggestion = suggest("for a choose");
        assert!(!suggestion.complete);
        assert!(suggestion.message.contains("got 'choose'"));
        assert_eq!(suggestion.expected, set(&[",", "and", "in", "select"]));
    }

    #[test]
    fn suggestion_built_from_a_parse_error_matches_suggest() {
        let text = "for a select the fastest";
        let error = parse(text).expect_err("incomplete");

        let suggestion = Suggestion::from(&error);
        assert_eq!(suggestion, suggest(text));
        assert!(suggestion.expected.contains("blockchain"));
        assert_eq!(Suggestion::complete(), suggest("for a select eos as default"));
    }
}
