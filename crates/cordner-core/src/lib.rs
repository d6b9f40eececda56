//! # Cordner Core
//!
//! Turns the CORD-NER release (a per-document entity annotation stream and a
//! matching token stream) into sentence-level training examples for a
//! recognizer restricted to a set of target entity types.
//!
//! ## Quick Start
//!
//! ```rust
//! use cordner_core::{build_corpus, EntityType, EntityTypes};
//!
//! let ner = r#"{"doc_id": "d1", "sents": [{"sent_id": 0, "entities": [{"start": 2, "end": 3, "type": "CORONAVIRUS"}]}]}"#;
//! let tokens = r#"{"doc_id": "d1", "sents": [{"sent_id": 0, "sent_tokens": ["bats", "carry", "MERS_CoV"]}]}"#;
//!
//! let corpus = build_corpus(ner.as_bytes(), tokens.as_bytes(), &EntityTypes::targets()).unwrap();
//! let example = &corpus.examples()[0];
//!
//! assert_eq!(example.text, "bats carry MERS CoV");
//! assert_eq!(example.entities[0].label, EntityType::Coronavirus);
//! ```
pub mod aligner;
pub mod error;
pub mod tokenizer;
pub mod types;

// Re-export primary API
pub use aligner::{
    build_corpus, build_corpus_from_files, compute_offsets, normalize_sentence, CorpusAligner,
};
pub use error::{CorpusError, ErrorKind, Result, Stream};
pub use tokenizer::{Token, Tokenizer};
pub use types::{
    char_slice, CharSpan, EntityType, EntityTypes, RecordId, TrainingCorpus, TrainingExample,
};
