//! Structured perceptron entity recognizer.
//! Sparse hand-crafted token features, BIO tags, constrained Viterbi decoding.

use std::collections::HashMap;

use cordner_core::{CharSpan, EntityType, Token, Tokenizer, TrainingExample};
use oorandom::Rand32;
use serde::{Deserialize, Serialize};

use crate::tags::{BioTag, TagSet};
use crate::viterbi::ViterbiDecoder;

/// Per-token gold tag; `None` marks tokens excluded from the loss.
pub type GoldTags = Vec<Option<usize>>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityRecognizer {
    tags: TagSet,
    /// Feature name -> per-tag weight.
    weights: HashMap<String, Vec<f32>>,
    /// `[from][to]` transition scores.
    transitions: Vec<Vec<f32>>,
    #[serde(skip)]
    tokenizer: Tokenizer,
}

impl EntityRecognizer {
    pub fn new() -> Self {
        Self {
            transitions: vec![vec![0.0]],
            ..Self::default()
        }
    }

    pub fn labels(&self) -> &[EntityType] {
        self.tags.labels()
    }

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Register a label, growing every weight row. Returns `false` if known.
    pub fn add_label(&mut self, label: EntityType) -> bool {
        if !self.tags.add_label(label) {
            return false;
        }
        let n = self.tags.num_tags();
        for row in self.weights.values_mut() {
            row.resize(n, 0.0);
        }
        self.transitions.resize_with(n, Vec::new);
        for row in &mut self.transitions {
            row.resize(n, 0.0);
        }
        true
    }

    fn extract_features(&self, tokens: &[Token], i: usize) -> Vec<String> {
        let token = tokens[i].text.as_str();
        let lower = token.to_lowercase();
        let chars: Vec<char> = lower.chars().collect();
        let prefix: String = chars.iter().take(3).collect();
        let suffix: String = chars[chars.len().saturating_sub(3)..].iter().collect();

        let mut features = vec![
            "bias".to_string(),
            format!("w={lower}"),
            format!("p3={prefix}"),
            format!("s3={suffix}"),
            format!("shape={}", word_shape(token)),
        ];

        if token.chars().any(|c| c.is_alphabetic())
            && token.chars().all(|c| !c.is_alphabetic() || c.is_uppercase())
        {
            features.push("all_caps".to_string());
        }
        if token.chars().next().is_some_and(char::is_uppercase) {
            features.push("title".to_string());
        }
        if token.chars().any(|c| c.is_ascii_digit()) {
            features.push("has_digit".to_string());
        }
        if token.contains('-') {
            features.push("has_hyphen".to_string());
        }

        // Context features
        match i.checked_sub(1).map(|p| &tokens[p]) {
            Some(prev) => features.push(format!("-1w={}", prev.text.to_lowercase())),
            None => features.push("BOS".to_string()),
        }
        match tokens.get(i + 1) {
            Some(next) => features.push(format!("+1w={}", next.text.to_lowercase())),
            None => features.push("EOS".to_string()),
        }

        features
    }

    fn emissions(&self, features: &[Vec<String>]) -> Vec<Vec<f32>> {
        let n = self.tags.num_tags();
        features
            .iter()
            .map(|feats| {
                let mut scores = vec![0.0f32; n];
                for f in feats {
                    if let Some(w) = self.weights.get(f) {
                        for (s, w) in scores.iter_mut().zip(w) {
                            *s += w;
                        }
                    }
                }
                scores
            })
            .collect()
    }

    fn decode(&self, features: &[Vec<String>]) -> Vec<usize> {
        let emissions = self.emissions(features);
        ViterbiDecoder::new(&self.tags).decode(&emissions, &self.transitions)
    }

    /// Derive gold tags from character spans.
    ///
    /// Tokens fully inside a span get `B-`/`I-`; tokens that straddle a span
    /// boundary, or belong to a span with an unregistered label, are `None`.
    /// A span overlapping an earlier one is skipped.
    pub fn gold_tags(&self, tokens: &[Token], spans: &[CharSpan]) -> GoldTags {
        let mut gold: GoldTags = vec![Some(TagSet::OUTSIDE); tokens.len()];

        for span in spans {
            let overlapping: Vec<usize> = tokens
                .iter()
                .filter(|t| t.start < span.end && t.end > span.start)
                .map(|t| t.index)
                .collect();
            if overlapping.iter().any(|&i| gold[i] != Some(TagSet::OUTSIDE)) {
                continue;
            }

            let begin = self.tags.index(BioTag::Begin(span.label));
            let inside = self.tags.index(BioTag::Inside(span.label));
            let mut seen_inside = false;
            for i in overlapping {
                let token = &tokens[i];
                let contained = token.start >= span.start && token.end <= span.end;
                gold[i] = match (contained, seen_inside) {
                    (false, _) => None,
                    (true, false) => begin,
                    (true, true) => inside,
                };
                seen_inside |= contained;
            }
        }

        gold
    }

    /// One perceptron step on a single example. Returns the number of gold
    /// tokens the model mistagged before the update.
    pub fn update(
        &mut self,
        example: &TrainingExample,
        rng: &mut Rand32,
        dropout: f32,
        learn_rate: f32,
    ) -> f32 {
        let tokens = self.tokenizer.tokenize(&example.text);
        if tokens.is_empty() {
            return 0.0;
        }
        let gold = self.gold_tags(&tokens, &example.entities);

        let features: Vec<Vec<String>> = (0..tokens.len())
            .map(|i| {
                let mut feats = self.extract_features(&tokens, i);
                if dropout > 0.0 {
                    feats.retain(|_| rng.rand_float() >= dropout);
                }
                feats
            })
            .collect();
        let predicted = self.decode(&features);

        let mut loss = 0.0;
        let n = self.tags.num_tags();
        for (i, feats) in features.iter().enumerate() {
            let Some(truth) = gold[i] else { continue };
            let guess = predicted[i];
            if truth == guess {
                continue;
            }
            loss += 1.0;
            for f in feats {
                let w = self
                    .weights
                    .entry(f.clone())
                    .or_insert_with(|| vec![0.0; n]);
                w[truth] += learn_rate;
                w[guess] -= learn_rate;
            }
        }

        for i in 1..tokens.len() {
            let (Some(from), Some(to)) = (gold[i - 1], gold[i]) else {
                continue;
            };
            let (pred_from, pred_to) = (predicted[i - 1], predicted[i]);
            if (pred_from, pred_to) != (from, to) {
                self.transitions[from][to] += learn_rate;
                self.transitions[pred_from][pred_to] -= learn_rate;
            }
        }

        loss
    }

    /// Predict entity spans in `text`, as character offsets.
    pub fn predict(&self, text: &str) -> Vec<CharSpan> {
        let tokens = self.tokenizer.tokenize(text);
        if tokens.is_empty() || self.tags.labels().is_empty() {
            return Vec::new();
        }
        let features: Vec<Vec<String>> = (0..tokens.len())
            .map(|i| self.extract_features(&tokens, i))
            .collect();
        let path = self.decode(&features);

        let mut spans = Vec::new();
        let mut open: Option<(usize, EntityType)> = None;
        for (i, &tag_idx) in path.iter().enumerate() {
            let tag = self.tags.tag(tag_idx).unwrap_or(BioTag::Outside);
            match tag {
                BioTag::Inside(t) if open.is_some_and(|(_, o)| o == t) => continue,
                _ => {}
            }
            if let Some((start, label)) = open.take() {
                spans.extend(self.span(&tokens, start, i, label));
            }
            if let BioTag::Begin(t) = tag {
                open = Some((i, t));
            }
        }
        if let Some((start, label)) = open {
            spans.extend(self.span(&tokens, start, tokens.len(), label));
        }

        spans
    }

    fn span(
        &self,
        tokens: &[Token],
        start: usize,
        end: usize,
        label: EntityType,
    ) -> Option<CharSpan> {
        self.tokenizer
            .get_spans(tokens, start, end)
            .map(|(s, e)| CharSpan::new(s, e, label))
    }
}

/// Collapsed character-class shape: `SARS-CoV-2` -> `X-Xx-d`.
fn word_shape(token: &str) -> String {
    let mut shape = String::new();
    for c in token.chars() {
        let class = if c.is_uppercase() {
            'X'
        } else if c.is_lowercase() {
            'x'
        } else if c.is_ascii_digit() {
            'd'
        } else {
            c
        };
        if !shape.ends_with(class) {
            shape.push(class);
        }
    }
    shape
}
