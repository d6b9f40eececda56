//! Raw CORD-NER input records, one JSON object per line.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A document or sentence identifier.
///
/// The release uses strings for `doc_id` and integers for `sent_id`; both
/// forms are accepted for either field and compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{n}"),
            RecordId::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Text(s.to_string())
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Int(n)
    }
}

/// One entity annotation in word offsets. `end` is exclusive.
///
/// `entity_type` stays a raw string: the release carries many more labels
/// than the target set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEntity {
    pub start: usize,
    pub end: usize,
    #[serde(rename = "type")]
    pub entity_type: String,
}

/// Entity side of a sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NerSentence {
    pub sent_id: RecordId,
    pub entities: Vec<RawEntity>,
}

/// Entity side of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NerDocument {
    pub doc_id: RecordId,
    pub sents: Vec<NerSentence>,
}

/// Token side of a sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSentence {
    pub sent_id: RecordId,
    pub sent_tokens: Vec<String>,
}

/// Token side of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDocument {
    pub doc_id: RecordId,
    pub sents: Vec<TokenSentence>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ner_document() {
        let line = r#"{"doc_id": "abc", "sents": [{"sent_id": 0, "entities": [{"start": 2, "end": 3, "type": "CORONAVIRUS"}]}]}"#;
        let doc: NerDocument = serde_json::from_str(line).unwrap();
        assert_eq!(doc.doc_id, RecordId::from("abc"));
        assert_eq!(doc.sents[0].sent_id, RecordId::Int(0));
        assert_eq!(doc.sents[0].entities[0].entity_type, "CORONAVIRUS");
    }

    #[test]
    fn test_parse_token_document() {
        let line = r#"{"doc_id": "abc", "sents": [{"sent_id": "s0", "sent_tokens": ["bats", "carry"]}]}"#;
        let doc: TokenDocument = serde_json::from_str(line).unwrap();
        assert_eq!(doc.sents[0].sent_id, RecordId::from("s0"));
        assert_eq!(doc.sents[0].sent_tokens, vec!["bats", "carry"]);
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let line = r#"{"doc_id": "abc", "sents": [{"sent_id": 0}]}"#;
        assert!(serde_json::from_str::<NerDocument>(line).is_err());
    }

    #[test]
    fn test_ids_of_different_kind_differ() {
        assert_ne!(RecordId::Int(1), RecordId::from("1"));
    }
}
