//! Phrase-pattern entity ruler.
//!
//! Matches exact token sequences from a pattern list, e.g.
//! `{"label": "CORONAVIRUS", "pattern": "SARS-CoV-2"}`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Context;
use cordner_core::{CharSpan, EntityType, Tokenizer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhrasePattern {
    pub label: EntityType,
    pub pattern: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRuler {
    patterns: Vec<PhrasePattern>,
    #[serde(skip)]
    tokenizer: Tokenizer,
}

impl EntityRuler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn patterns(&self) -> &[PhrasePattern] {
        &self.patterns
    }

    /// Add one pattern; returns `false` if an identical pattern is present.
    pub fn add_pattern(&mut self, pattern: PhrasePattern) -> bool {
        if self.patterns.contains(&pattern) {
            return false;
        }
        self.patterns.push(pattern);
        true
    }

    /// Add patterns, skipping duplicates. Returns how many were new.
    pub fn add_patterns<I: IntoIterator<Item = PhrasePattern>>(&mut self, patterns: I) -> usize {
        let mut added = 0;
        for pattern in patterns {
            if self.add_pattern(pattern) {
                added += 1;
            }
        }
        added
    }

    /// Load patterns from a JSONL file, one pattern object per line.
    /// Returns the number of patterns that were not already present.
    pub fn load_patterns<P: AsRef<Path>>(&mut self, path: P) -> anyhow::Result<usize> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open patterns file {}", path.display()))?;

        let mut count = 0;
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let pattern: PhrasePattern = serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: invalid pattern", path.display(), i + 1))?;
            if self.add_pattern(pattern) {
                count += 1;
            }
        }
        tracing::debug!(path = %path.display(), count, "loaded ruler patterns");
        Ok(count)
    }

    /// Find non-overlapping pattern matches, leftmost first, longest wins.
    pub fn find(&self, text: &str) -> Vec<CharSpan> {
        let tokens = self.tokenizer.tokenize(text);
        let mut candidates = Vec::new();

        for pattern in &self.patterns {
            let words: Vec<String> = self
                .tokenizer
                .tokenize(&pattern.pattern)
                .into_iter()
                .map(|t| t.text)
                .collect();
            if words.is_empty() || words.len() > tokens.len() {
                continue;
            }
            for window in tokens.windows(words.len()) {
                if window.iter().zip(&words).all(|(t, w)| t.text == *w) {
                    let start = window[0].start;
                    let end = window[window.len() - 1].end;
                    candidates.push(CharSpan::new(start, end, pattern.label));
                }
            }
        }

        candidates.sort_by_key(|s| (s.start, std::cmp::Reverse(s.end)));
        let mut matches: Vec<CharSpan> = Vec::new();
        for span in candidates {
            if matches.last().is_none_or(|m| span.start >= m.end) {
                matches.push(span);
            }
        }
        matches
    }
}
