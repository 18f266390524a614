use std::iter::Peekable;
use std::str::Chars;

/// Characters emitted as tokens of their own even when glued to a word.
const STANDALONE: &[char] = &[','];

/// Lower-cased word tokens of an intent sentence.
///
/// A clone continues from the same position as the original, so a caller can
/// look ahead without consuming. Building a new tokenizer over the same input
/// yields the same sequence again.
#[derive(Clone, Debug)]
pub struct Tokenizer<'a> {
    chars: Peekable<Chars<'a>>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { chars: input.chars().peekable() }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.chars.peek().copied() {
            if ch.is_whitespace() {
                self.chars.next();
                continue;
            }

            if STANDALONE.contains(&ch) {
                self.chars.next();
                return Some(ch.to_string());
            }

            let mut word = String::new();
            while let Some(c) = self.chars.peek().copied() {
                if c.is_whitespace() || STANDALONE.contains(&c) {
                    break;
                }
                word.extend(c.to_lowercase());
                self.chars.next();
            }
            return Some(word);
        }

        None
    }
}

pub fn tokenize(input: &str) -> Vec<String> {
    Tokenizer::new(input).collect()
}
