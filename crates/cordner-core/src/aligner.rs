//! # Corpus Aligner
//!
//! Pairs the CORD-NER annotation and token streams document by document,
//! keeps only the target entity types, and converts word offsets into
//! character spans over the reconstructed sentence string.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{CorpusError, Result, Stream};
use crate::types::{
    CharSpan, EntityTypes, NerDocument, NerSentence, TokenDocument, TokenSentence,
    TrainingCorpus, TrainingExample,
};

/// Character length of `tokens` joined with single spaces.
fn joined_len<S: AsRef<str>>(tokens: &[S]) -> usize {
    let chars: usize = tokens.iter().map(|t| t.as_ref().chars().count()).sum();
    chars + tokens.len().saturating_sub(1)
}

/// Convert a word span into a character span.
///
/// The character offsets index the string obtained by joining *all* of
/// `tokens` with single spaces; `word_end` and the returned end are exclusive.
///
/// # Errors
/// [`CorpusError::InvalidSpan`] when `word_start >= word_end` or when the
/// covered tokens are all empty, and [`CorpusError::SpanOutOfRange`] when
/// `word_end` exceeds the token count.
///
/// # Examples
/// ```
/// use cordner_core::aligner::compute_offsets;
///
/// let tokens = ["bats", "carry", "MERS_CoV"];
/// assert_eq!(compute_offsets(&tokens, 2, 3).unwrap(), (11, 19));
/// assert_eq!(compute_offsets(&tokens, 0, 2).unwrap(), (0, 10));
/// ```
pub fn compute_offsets<S: AsRef<str>>(
    tokens: &[S],
    word_start: usize,
    word_end: usize,
) -> Result<(usize, usize)> {
    if word_start >= word_end {
        return Err(CorpusError::InvalidSpan {
            start: word_start,
            end: word_end,
        });
    }
    if word_end > tokens.len() {
        return Err(CorpusError::SpanOutOfRange {
            end: word_end,
            len: tokens.len(),
        });
    }

    let char_start = if word_start == 0 {
        0
    } else {
        joined_len(&tokens[..word_start]) + 1
    };
    let char_end = joined_len(&tokens[..word_end]);
    if char_start >= char_end {
        return Err(CorpusError::InvalidSpan {
            start: char_start,
            end: char_end,
        });
    }
    Ok((char_start, char_end))
}

/// Build the sentence text: tokens joined with single spaces, underscores
/// replaced by spaces. Both steps preserve character positions.
pub fn normalize_sentence<S: AsRef<str>>(tokens: &[S]) -> String {
    let mut text = String::with_capacity(joined_len(tokens));
    for (i, token) in tokens.iter().enumerate() {
        if i > 0 {
            text.push(' ');
        }
        text.extend(
            token
                .as_ref()
                .chars()
                .map(|c| if c == '_' { ' ' } else { c }),
        );
    }
    text
}

/// Newline-delimited JSON reader that skips blank lines and tracks line numbers.
struct JsonLines<R> {
    lines: Lines<R>,
    line: usize,
    stream: Stream,
}

impl<R: BufRead> JsonLines<R> {
    fn new(reader: R, stream: Stream) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            stream,
        }
    }

    fn next_record<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        for line in self.lines.by_ref() {
            self.line += 1;
            let line = line.map_err(|source| CorpusError::Read {
                stream: self.stream,
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|source| {
                CorpusError::MalformedRecord {
                    stream: self.stream,
                    line: self.line,
                    source,
                }
            })?;
            return Ok(Some(record));
        }
        Ok(None)
    }
}

/// Running counts reported once a corpus is complete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignStats {
    pub documents: usize,
    pub sentences: usize,
    pub kept: usize,
    pub entities: usize,
}

/// Aligns paired annotation/token streams into a [`TrainingCorpus`].
#[derive(Debug, Clone)]
pub struct CorpusAligner {
    allowed: EntityTypes,
}

impl CorpusAligner {
    /// Create an aligner that keeps only entities in `allowed`.
    pub fn new(allowed: EntityTypes) -> Self {
        Self { allowed }
    }

    pub fn allowed(&self) -> &EntityTypes {
        &self.allowed
    }

    /// Turn one sentence pair into an example, or `None` when it holds no
    /// target entity. Identifiers are assumed to be already checked.
    pub fn align_sentence(
        &self,
        annotations: &NerSentence,
        tokens: &TokenSentence,
    ) -> Result<Option<TrainingExample>> {
        let toks = &tokens.sent_tokens;
        let mut spans = Vec::new();
        for entity in &annotations.entities {
            let Some(label) = self.allowed.resolve(&entity.entity_type) else {
                continue;
            };
            let (start, end) = compute_offsets(toks, entity.start, entity.end)?;
            spans.push(CharSpan::new(start, end, label));
        }

        if spans.is_empty() {
            return Ok(None);
        }
        Ok(Some(TrainingExample::new(normalize_sentence(toks), spans)))
    }

    /// Align one document pair, checking sentence counts and identifiers.
    pub fn align_document(
        &self,
        index: usize,
        annotations: &NerDocument,
        tokens: &TokenDocument,
    ) -> Result<Vec<TrainingExample>> {
        if annotations.doc_id != tokens.doc_id {
            return Err(CorpusError::DocumentIdMismatch {
                index,
                annotations: annotations.doc_id.clone(),
                tokens: tokens.doc_id.clone(),
            });
        }
        if annotations.sents.len() != tokens.sents.len() {
            return Err(CorpusError::SentenceCountMismatch {
                doc_id: annotations.doc_id.clone(),
                annotations: annotations.sents.len(),
                tokens: tokens.sents.len(),
            });
        }

        let mut examples = Vec::new();
        for (i, (sn, sc)) in annotations.sents.iter().zip(&tokens.sents).enumerate() {
            if sn.sent_id != sc.sent_id {
                return Err(CorpusError::SentenceIdMismatch {
                    doc_id: annotations.doc_id.clone(),
                    index: i,
                    annotations: sn.sent_id.clone(),
                    tokens: sc.sent_id.clone(),
                });
            }
            if let Some(example) = self.align_sentence(sn, sc)? {
                examples.push(example);
            }
        }
        Ok(examples)
    }

    /// Read both streams in lockstep and build the complete corpus.
    ///
    /// Fails on the first malformed record or misalignment; no partial corpus
    /// is ever returned.
    pub fn build_corpus<A: BufRead, T: BufRead>(
        &self,
        annotations: A,
        tokens: T,
    ) -> Result<TrainingCorpus> {
        let mut ner = JsonLines::new(annotations, Stream::Annotations);
        let mut corpus = JsonLines::new(tokens, Stream::Tokens);
        let mut examples = Vec::new();
        let mut stats = AlignStats::default();

        loop {
            let doc_ner: Option<NerDocument> = ner.next_record()?;
            let doc_tokens: Option<TokenDocument> = corpus.next_record()?;

            let (doc_ner, doc_tokens) = match (doc_ner, doc_tokens) {
                (None, None) => break,
                (Some(_), None) => {
                    return Err(CorpusError::StreamLengthMismatch {
                        exhausted: Stream::Tokens,
                        documents: stats.documents,
                    });
                }
                (None, Some(_)) => {
                    return Err(CorpusError::StreamLengthMismatch {
                        exhausted: Stream::Annotations,
                        documents: stats.documents,
                    });
                }
                (Some(n), Some(c)) => (n, c),
            };

            let aligned = self.align_document(stats.documents, &doc_ner, &doc_tokens)?;
            debug!(
                doc_id = %doc_ner.doc_id,
                sentences = doc_ner.sents.len(),
                kept = aligned.len(),
                "aligned document"
            );

            stats.documents += 1;
            stats.sentences += doc_ner.sents.len();
            stats.kept += aligned.len();
            stats.entities += aligned.iter().map(|e| e.entities.len()).sum::<usize>();
            examples.extend(aligned);
        }

        info!(
            documents = stats.documents,
            sentences = stats.sentences,
            kept = stats.kept,
            entities = stats.entities,
            "built training corpus"
        );
        Ok(TrainingCorpus::new(examples))
    }
}

/// Build a corpus from two in-memory or streaming sources.
pub fn build_corpus<A: BufRead, T: BufRead>(
    annotations: A,
    tokens: T,
    allowed: &EntityTypes,
) -> Result<TrainingCorpus> {
    CorpusAligner::new(allowed.clone()).build_corpus(annotations, tokens)
}

/// Build a corpus from the two release files and persist it to `out_path`.
pub fn build_corpus_from_files<P, Q, O>(
    annotations_path: P,
    tokens_path: Q,
    out_path: O,
    allowed: &EntityTypes,
) -> Result<TrainingCorpus>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
    O: AsRef<Path>,
{
    let open = |path: &Path| {
        File::open(path)
            .map(BufReader::new)
            .map_err(|e| CorpusError::io(path, e))
    };
    let annotations = open(annotations_path.as_ref())?;
    let tokens = open(tokens_path.as_ref())?;

    let corpus = build_corpus(annotations, tokens, allowed)?;
    corpus.save(out_path)?;
    Ok(corpus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{char_slice, EntityType};

    const NER_ONE: &str = r#"{"doc_id": "d1", "sents": [{"sent_id": 0, "entities": [{"start": 2, "end": 3, "type": "CORONAVIRUS"}]}]}"#;
    const TOK_ONE: &str = r#"{"doc_id": "d1", "sents": [{"sent_id": 0, "sent_tokens": ["bats", "carry", "MERS_CoV"]}]}"#;

    fn targets() -> EntityTypes {
        EntityTypes::targets()
    }

    #[test]
    fn test_offsets_first_token() {
        let tokens = ["bats", "carry", "MERS_CoV"];
        assert_eq!(compute_offsets(&tokens, 0, 1).unwrap(), (0, 4));
    }

    #[test]
    fn test_offsets_last_token() {
        let tokens = ["bats", "carry", "MERS_CoV"];
        assert_eq!(compute_offsets(&tokens, 2, 3).unwrap(), (11, 19));
    }

    #[test]
    fn test_offsets_slice_property() {
        let tokens = ["SARS-CoV-2", "binds", "β", "ACE2", "receptors", "in", "bats"];
        let joined = tokens.join(" ");
        for s in 0..tokens.len() {
            for e in s + 1..=tokens.len() {
                let (cs, ce) = compute_offsets(&tokens, s, e).unwrap();
                assert_eq!(
                    char_slice(&joined, cs, ce).unwrap(),
                    tokens[s..e].join(" "),
                    "span {s}..{e}"
                );
            }
        }
    }

    #[test]
    fn test_offsets_reject_empty_or_reversed() {
        let tokens = ["a", "b"];
        assert!(matches!(
            compute_offsets(&tokens, 1, 1),
            Err(CorpusError::InvalidSpan { start: 1, end: 1 })
        ));
        assert!(compute_offsets(&tokens, 2, 1).is_err());
    }

    #[test]
    fn test_offsets_reject_out_of_range() {
        let tokens = ["a", "b"];
        let err = compute_offsets(&tokens, 1, 3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
    }

    #[test]
    fn test_normalize_preserves_length() {
        let tokens = ["MERS_CoV", "__init__", "a_b_c", "plain"];
        let raw = tokens.join(" ");
        let text = normalize_sentence(&tokens);
        assert_eq!(text.chars().count(), raw.chars().count());
        assert_eq!(text, "MERS CoV   init   a b c plain");
    }

    #[test]
    fn test_single_sentence_scenario() {
        let corpus = build_corpus(NER_ONE.as_bytes(), TOK_ONE.as_bytes(), &targets()).unwrap();
        assert_eq!(corpus.len(), 1);
        let example = &corpus.examples()[0];
        assert_eq!(example.text, "bats carry MERS CoV");
        assert_eq!(
            example.entities,
            vec![CharSpan::new(11, 19, EntityType::Coronavirus)]
        );
        assert_eq!(example.entities[0].slice(&example.text), Some("MERS CoV"));
    }

    #[test]
    fn test_non_target_sentence_is_dropped() {
        let ner = NER_ONE.replace("CORONAVIRUS", "DISEASE");
        let corpus = build_corpus(ner.as_bytes(), TOK_ONE.as_bytes(), &targets()).unwrap();
        assert!(corpus.is_empty());
    }

    #[test]
    fn test_mixed_entities_keep_only_targets() {
        let ner = r#"{"doc_id": "d1", "sents": [{"sent_id": 0, "entities": [{"start": 0, "end": 1, "type": "WILDLIFE"}, {"start": 1, "end": 2, "type": "DISEASE"}, {"start": 2, "end": 3, "type": "CORONAVIRUS"}]}]}"#;
        let corpus = build_corpus(ner.as_bytes(), TOK_ONE.as_bytes(), &targets()).unwrap();
        let spans = &corpus.examples()[0].entities;
        assert_eq!(
            spans,
            &vec![
                CharSpan::new(0, 4, EntityType::Wildlife),
                CharSpan::new(11, 19, EntityType::Coronavirus),
            ]
        );
    }

    #[test]
    fn test_allow_list_is_respected() {
        let allowed: EntityTypes = [EntityType::Wildlife].into_iter().collect();
        let corpus = build_corpus(NER_ONE.as_bytes(), TOK_ONE.as_bytes(), &allowed).unwrap();
        assert!(corpus.is_empty());
    }

    #[test]
    fn test_extra_annotation_document_is_alignment_error() {
        let ner = format!("{NER_ONE}\n{}\n", NER_ONE.replace("d1", "d2"));
        let err = build_corpus(ner.as_bytes(), TOK_ONE.as_bytes(), &targets()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Alignment);
        assert!(matches!(
            err,
            CorpusError::StreamLengthMismatch {
                exhausted: Stream::Tokens,
                documents: 1
            }
        ));
    }

    #[test]
    fn test_extra_token_document_is_alignment_error() {
        let tokens = format!("{TOK_ONE}\n{TOK_ONE}\n");
        let err = build_corpus(NER_ONE.as_bytes(), tokens.as_bytes(), &targets()).unwrap_err();
        assert!(matches!(
            err,
            CorpusError::StreamLengthMismatch {
                exhausted: Stream::Annotations,
                ..
            }
        ));
    }

    #[test]
    fn test_document_id_mismatch() {
        let tokens = TOK_ONE.replace("d1", "other");
        let err = build_corpus(NER_ONE.as_bytes(), tokens.as_bytes(), &targets()).unwrap_err();
        assert!(matches!(err, CorpusError::DocumentIdMismatch { index: 0, .. }));
    }

    #[test]
    fn test_sentence_id_mismatch() {
        let tokens = TOK_ONE.replace("\"sent_id\": 0", "\"sent_id\": 1");
        let err = build_corpus(NER_ONE.as_bytes(), tokens.as_bytes(), &targets()).unwrap_err();
        assert!(matches!(err, CorpusError::SentenceIdMismatch { index: 0, .. }));
    }

    #[test]
    fn test_sentence_count_mismatch() {
        let ner = r#"{"doc_id": "d1", "sents": [{"sent_id": 0, "entities": []}, {"sent_id": 1, "entities": []}]}"#;
        let err = build_corpus(ner.as_bytes(), TOK_ONE.as_bytes(), &targets()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Alignment);
    }

    #[test]
    fn test_malformed_record_reports_line() {
        let ner = format!("\n{}\n", r#"{"doc_id": "d1"}"#);
        let err = build_corpus(ner.as_bytes(), TOK_ONE.as_bytes(), &targets()).unwrap_err();
        assert!(matches!(
            err,
            CorpusError::MalformedRecord {
                stream: Stream::Annotations,
                line: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_target_offset_fails() {
        let ner = NER_ONE.replace("\"start\": 2", "\"start\": 3");
        let err = build_corpus(ner.as_bytes(), TOK_ONE.as_bytes(), &targets()).unwrap_err();
        assert!(matches!(err, CorpusError::InvalidSpan { start: 3, end: 3 }));
    }

    #[test]
    fn test_offsets_reject_empty_tokens() {
        let tokens = ["bats", ""];
        assert!(matches!(
            compute_offsets(&tokens, 1, 2),
            Err(CorpusError::InvalidSpan { start: 5, end: 5 })
        ));
        assert_eq!(compute_offsets(&tokens, 0, 2).unwrap(), (0, 5));
    }

    #[test]
    fn test_empty_token_entity_fails_corpus() {
        let ner = r#"{"doc_id": "d1", "sents": [{"sent_id": 0, "entities": [{"start": 1, "end": 2, "type": "CORONAVIRUS"}]}]}"#;
        let tokens = r#"{"doc_id": "d1", "sents": [{"sent_id": 0, "sent_tokens": ["bats", ""]}]}"#;
        let err = build_corpus(ner.as_bytes(), tokens.as_bytes(), &targets()).unwrap_err();
        assert!(matches!(err, CorpusError::InvalidSpan { start: 5, end: 5 }));
        assert_eq!(err.kind(), ErrorKind::DataFormat);
    }

    #[test]
    fn test_blank_lines_are_skipped() {
        let ner = format!("\n{NER_ONE}\n\n");
        let tokens = format!("{TOK_ONE}\n\n\n");
        let corpus = build_corpus(ner.as_bytes(), tokens.as_bytes(), &targets()).unwrap();
        assert_eq!(corpus.len(), 1);
    }

    #[test]
    fn test_build_from_files_persists_corpus() {
        let dir = tempfile::tempdir().unwrap();
        let ner_path = dir.path().join("CORD-NER-ner.json");
        let tok_path = dir.path().join("CORD-NER-corpus.json");
        let out_path = dir.path().join("TRAIN_DATA.json");
        std::fs::write(&ner_path, NER_ONE).unwrap();
        std::fs::write(&tok_path, TOK_ONE).unwrap();

        let corpus = build_corpus_from_files(&ner_path, &tok_path, &out_path, &targets()).unwrap();
        assert_eq!(TrainingCorpus::load(&out_path).unwrap(), corpus);
    }
}
