use std::collections::BTreeSet;

use thiserror::Error;
use tracing::warn;

use crate::domain::intent::{Currency, Intent};
use crate::parser::states::ParserState;
use crate::parser::tokenizer::Tokenizer;
use crate::parser::validation::{self, ValidationError};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("{state}: illegal transition at token {position}: expected one of {}, got '{token}'", listed(.expected))]
    Transition { state: ParserState, position: usize, token: String, expected: BTreeSet<String> },
    #[error("{state}: invalid token '{token}' at position {position}: {reason}")]
    Validation {
        state: ParserState,
        position: usize,
        token: String,
        #[source]
        reason: ValidationError,
        expected: BTreeSet<String>,
    },
    #[error("intent is incomplete")]
    Incomplete { state: ParserState, expected: BTreeSet<String> },
}

impl ParseError {
    pub fn state(&self) -> ParserState {
        match self {
            Self::Transition { state, .. }
            | Self::Validation { state, .. }
            | Self::Incomplete { state, .. } => *state,
        }
    }

    /// Tokens that would have been legal instead, for autocompletion.
    pub fn expected(&self) -> &BTreeSet<String> {
        match self {
            Self::Transition { expected, .. }
            | Self::Validation { expected, .. }
            | Self::Incomplete { expected, .. } => expected,
        }
    }

    /// Zero-based index of the offending token. `None` when input ran out.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Transition { position, .. } | Self::Validation { position, .. } => {
                Some(*position)
            }
            Self::Incomplete { .. } => None,
        }
    }
}

/// Incremental intent parser.
///
/// Tokens are fed one at a time. The first failure moves the parser into
/// [`ParserState::Error`], after which tokens are swallowed and [`finish`]
/// reports that failure again.
///
/// [`finish`]: IntentParser::finish
#[derive(Clone, Debug)]
pub struct IntentParser {
    state: ParserState,
    intent: Intent,
    position: usize,
    failure: Option<ParseError>,
}

impl Default for IntentParser {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentParser {
    pub fn new() -> Self {
        Self { state: ParserState::initial(), intent: Intent::default(), position: 0, failure: None }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn is_accepting(&self) -> bool {
        self.state.is_accepting()
    }

    pub fn expected(&self) -> BTreeSet<String> {
        match &self.failure {
            Some(failure) => failure.expected().clone(),
            None => self.state.expected(),
        }
    }

    pub fn feed(&mut self, token: &str) -> Result<ParserState, ParseError> {
        if self.state == ParserState::Error {
            self.position += 1;
            return Ok(ParserState::Error);
        }

        let position = self.position;
        self.position += 1;

        match self.step(token, position) {
            Ok(next) => {
                self.state = next;
                Ok(next)
            }
            Err(error) => {
                warn!(
                    event_name = "parser.token_rejected",
                    state = self.state.as_str(),
                    position,
                    token,
                    error = %error,
                    "rejected intent token"
                );
                self.state = ParserState::Error;
                self.failure = Some(error.clone());
                Err(error)
            }
        }
    }

    /// Releases the intent if the input ended in an accepting state.
    pub fn finish(self) -> Result<Intent, ParseError> {
        if let Some(failure) = self.failure {
            return Err(failure);
        }
        if self.state.is_accepting() {
            return Ok(self.intent);
        }

        Err(ParseError::Incomplete { state: self.state, expected: self.state.expected() })
    }

    fn step(&mut self, token: &str, position: usize) -> Result<ParserState, ParseError> {
        let state = self.state;
        let next = match state {
            ParserState::User => ParserState::AfterUser,
            ParserState::Threshold => ParserState::CostBounded,
            // A bare amount skips the optional currency.
            ParserState::Currency if Currency::parse(token).is_none() => {
                return self.validated(ParserState::Threshold, token, position, state)
                    .map(|_| ParserState::CostBounded);
            }
            _ => state.next(token).ok_or_else(|| ParseError::Transition {
                state,
                position,
                token: token.to_string(),
                expected: state.expected(),
            })?,
        };

        self.validated(state, token, position, state)?;
        Ok(next)
    }

    fn validated(
        &mut self,
        hook: ParserState,
        token: &str,
        position: usize,
        reported: ParserState,
    ) -> Result<(), ParseError> {
        validation::validate(hook, token, &mut self.intent).map_err(|reason| {
            ParseError::Validation {
                state: reported,
                position,
                token: token.to_string(),
                reason,
                expected: reported.expected(),
            }
        })
    }
}

/// Parses a complete intent sentence.
pub fn parse(text: &str) -> Result<Intent, ParseError> {
    let mut parser = IntentParser::new();
    for token in Tokenizer::new(text) {
        parser.feed(&token)?;
    }
    parser.finish()
}

fn listed(expected: &BTreeSet<String>) -> String {
    let items: Vec<&str> = expected.iter().map(String::as_str).collect();
    format!("[{}]", items.join(", "))
}
