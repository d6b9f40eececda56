//! # Sentence Tokenizer
//!
//! Splits sentence text into tokens for the entity tagger. Offsets are
//! character positions, the same unit used by [`CharSpan`](crate::CharSpan).

/// A token with its character span in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The token text, unmodified
    pub text: String,
    /// Start character offset in the source text
    pub start: usize,
    /// End character offset in the source text (exclusive)
    pub end: usize,
    /// Token index in the sequence
    pub index: usize,
}

/// Characters that separate tokens and are dropped (in addition to whitespace).
const DELIMITERS: &[char] = &['_'];

/// Characters emitted as single-character tokens.
const PUNCTUATION: &[char] = &['(', ')', '[', ']', '{', '}', ',', ';', ':', '!', '?', '"'];

/// Whitespace and punctuation tokenizer.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer;

impl Tokenizer {
    /// Create a new tokenizer instance.
    pub fn new() -> Self {
        Self
    }

    /// Tokenize a sentence.
    ///
    /// # Examples
    /// ```
    /// use cordner_core::tokenizer::Tokenizer;
    ///
    /// let tokens = Tokenizer::new().tokenize("bats carry MERS_CoV (in vivo).");
    /// let texts: Vec<_> = tokens.iter().map(|t| t.text.as_str()).collect();
    /// assert_eq!(texts, ["bats", "carry", "MERS", "CoV", "(", "in", "vivo", ")", "."]);
    /// ```
    pub fn tokenize(&self, input: &str) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut current_start = 0;

        for (pos, c) in input.chars().enumerate() {
            if c.is_whitespace() || DELIMITERS.contains(&c) {
                flush(&mut tokens, &mut current, current_start);
            } else if PUNCTUATION.contains(&c) {
                flush(&mut tokens, &mut current, current_start);
                push(&mut tokens, c.to_string(), pos);
            } else {
                if current.is_empty() {
                    current_start = pos;
                }
                current.push(c);
            }
        }
        flush(&mut tokens, &mut current, current_start);

        tokens
    }

    /// Get the character span covered by tokens `start_idx..end_idx`.
    pub fn get_spans(
        &self,
        tokens: &[Token],
        start_idx: usize,
        end_idx: usize,
    ) -> Option<(usize, usize)> {
        if start_idx >= tokens.len() || end_idx > tokens.len() || start_idx >= end_idx {
            return None;
        }

        Some((tokens[start_idx].start, tokens[end_idx - 1].end))
    }
}

fn push(tokens: &mut Vec<Token>, text: String, start: usize) {
    let end = start + text.chars().count();
    let index = tokens.len();
    tokens.push(Token {
        text,
        start,
        end,
        index,
    });
}

// Emits the pending word, splitting off a sentence-final period.
fn flush(tokens: &mut Vec<Token>, current: &mut String, start: usize) {
    if current.is_empty() {
        return;
    }
    let text = std::mem::take(current);
    let len = text.chars().count();
    match text.strip_suffix('.') {
        Some(word) if len > 1 && !word.ends_with('.') => {
            push(tokens, word.to_string(), start);
            push(tokens, ".".to_string(), start + len - 1);
        }
        _ => push(tokens, text, start),
    }
}
