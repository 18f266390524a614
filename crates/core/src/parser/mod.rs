pub mod engine;
pub mod states;
pub mod tokenizer;
pub mod validation;

pub use engine::{parse, IntentParser, ParseError};
pub use states::ParserState;
pub use tokenizer::{tokenize, Tokenizer};
pub use validation::ValidationError;
