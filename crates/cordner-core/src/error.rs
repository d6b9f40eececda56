use std::path::PathBuf;

use thiserror::Error;

use crate::types::RecordId;

/// Which input stream a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Per-document entity annotations (`CORD-NER-ner.json`).
    Annotations,
    /// Per-document sentence tokens (`CORD-NER-corpus.json`).
    Tokens,
    /// A serialized training corpus (`TRAIN_DATA.json`).
    Corpus,
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stream::Annotations => write!(f, "annotation stream"),
            Stream::Tokens => write!(f, "token stream"),
            Stream::Corpus => write!(f, "training corpus"),
        }
    }
}

/// Broad class of a [`CorpusError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The two input streams disagree on document or sentence structure.
    Alignment,
    /// A record is malformed or carries an invalid offset.
    DataFormat,
    /// Reading an input or writing an artifact failed.
    Io,
}

/// Errors raised while aligning or persisting a training corpus.
///
/// Every variant is fatal: the aligner never returns a partial corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// One stream ran out of documents before the other.
    #[error("{exhausted} ended after {documents} documents but the other stream continues")]
    StreamLengthMismatch {
        /// The stream that was exhausted first.
        exhausted: Stream,
        /// Documents successfully paired before the mismatch.
        documents: usize,
    },

    /// Paired document records carry different identifiers.
    #[error("document id mismatch at document {index}: annotations have {annotations}, tokens have {tokens}")]
    DocumentIdMismatch {
        /// Zero-based document position in both streams.
        index: usize,
        annotations: RecordId,
        tokens: RecordId,
    },

    /// Paired document records hold a different number of sentences.
    #[error("document {doc_id}: annotations have {annotations} sentences, tokens have {tokens}")]
    SentenceCountMismatch {
        doc_id: RecordId,
        annotations: usize,
        tokens: usize,
    },

    /// Paired sentences carry different identifiers.
    #[error("document {doc_id}, sentence {index}: annotations have sent_id {annotations}, tokens have {tokens}")]
    SentenceIdMismatch {
        doc_id: RecordId,
        /// Zero-based sentence position within the document.
        index: usize,
        annotations: RecordId,
        tokens: RecordId,
    },

    /// A line could not be decoded into the expected record shape.
    #[error("malformed record in {stream} at line {line}: {source}")]
    MalformedRecord {
        stream: Stream,
        /// One-based line number.
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// A span whose start does not precede its end.
    #[error("invalid span: start {start} must be less than end {end}")]
    InvalidSpan { start: usize, end: usize },

    /// A span that reaches past the end of its sentence.
    #[error("span end {end} exceeds sentence length {len}")]
    SpanOutOfRange { end: usize, len: usize },

    /// A serialized example uses a label outside the known entity types.
    #[error("unknown entity label: {0:?}")]
    UnknownLabel(String),

    /// Filesystem failure on an input or output path.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Read failure on an already-open stream.
    #[error("failed to read {stream}: {source}")]
    Read {
        stream: Stream,
        #[source]
        source: std::io::Error,
    },
}

impl CorpusError {
    /// Classify this error into the alignment / data-format / I/O taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CorpusError::StreamLengthMismatch { .. }
            | CorpusError::DocumentIdMismatch { .. }
            | CorpusError::SentenceCountMismatch { .. }
            | CorpusError::SentenceIdMismatch { .. } => ErrorKind::Alignment,
            CorpusError::MalformedRecord { .. }
            | CorpusError::InvalidSpan { .. }
            | CorpusError::SpanOutOfRange { .. }
            | CorpusError::UnknownLabel(_) => ErrorKind::DataFormat,
            CorpusError::Io { .. } | CorpusError::Read { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CorpusError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for corpus operations.
pub type Result<T> = std::result::Result<T, CorpusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = CorpusError::InvalidSpan { start: 3, end: 3 };
        assert_eq!(err.to_string(), "invalid span: start 3 must be less than end 3");

        let err = CorpusError::StreamLengthMismatch {
            exhausted: Stream::Tokens,
            documents: 1,
        };
        assert!(err.to_string().contains("token stream"));
    }

    #[test]
    fn error_kinds() {
        let err = CorpusError::DocumentIdMismatch {
            index: 0,
            annotations: RecordId::from("a"),
            tokens: RecordId::from("b"),
        };
        assert_eq!(err.kind(), ErrorKind::Alignment);
        assert_eq!(CorpusError::UnknownLabel("X".into()).kind(), ErrorKind::DataFormat);
        assert_eq!(
            CorpusError::io("x", std::io::Error::other("boom")).kind(),
            ErrorKind::Io
        );
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CorpusError>();
    }
}
