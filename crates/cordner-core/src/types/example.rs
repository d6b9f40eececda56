use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::entity::EntityType;
use crate::error::{CorpusError, Result, Stream};

/// A labelled character span, serialized as `[start, end, "LABEL"]`.
///
/// Offsets count characters (not bytes) and `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(usize, usize, EntityType)", into = "(usize, usize, EntityType)")]
pub struct CharSpan {
    pub start: usize,
    pub end: usize,
    pub label: EntityType,
}

impl CharSpan {
    pub fn new(start: usize, end: usize, label: EntityType) -> Self {
        Self { start, end, label }
    }

    /// The covered text, or `None` when the span does not fit in `text`.
    pub fn slice<'a>(&self, text: &'a str) -> Option<&'a str> {
        char_slice(text, self.start, self.end)
    }
}

impl From<(usize, usize, EntityType)> for CharSpan {
    fn from((start, end, label): (usize, usize, EntityType)) -> Self {
        Self { start, end, label }
    }
}

impl From<CharSpan> for (usize, usize, EntityType) {
    fn from(span: CharSpan) -> Self {
        (span.start, span.end, span.label)
    }
}

/// Slice `text` by character offsets.
pub fn char_slice(text: &str, start: usize, end: usize) -> Option<&str> {
    if start > end {
        return None;
    }
    let mut bounds = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()));
    let from = bounds.nth(start)?;
    let to = if end == start {
        from
    } else {
        bounds.nth(end - start - 1)?
    };
    Some(&text[from..to])
}

/// The annotation object paired with each sentence on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Annotations {
    pub entities: Vec<CharSpan>,
}

/// One sentence of training data with its target entity spans.
///
/// Serialized as `["sentence text", {"entities": [[s, e, "LABEL"], ...]}]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, Annotations)", into = "(String, Annotations)")]
pub struct TrainingExample {
    pub text: String,
    pub entities: Vec<CharSpan>,
}

impl TrainingExample {
    pub fn new(text: impl Into<String>, entities: Vec<CharSpan>) -> Self {
        Self {
            text: text.into(),
            entities,
        }
    }

    /// Check that every span is non-empty and lies inside the text.
    pub fn validate(&self) -> Result<()> {
        let len = self.text.chars().count();
        for span in &self.entities {
            if span.start >= span.end {
                return Err(CorpusError::InvalidSpan {
                    start: span.start,
                    end: span.end,
                });
            }
            if span.end > len {
                return Err(CorpusError::SpanOutOfRange { end: span.end, len });
            }
        }
        Ok(())
    }
}

impl From<(String, Annotations)> for TrainingExample {
    fn from((text, annotations): (String, Annotations)) -> Self {
        Self {
            text,
            entities: annotations.entities,
        }
    }
}

impl From<TrainingExample> for (String, Annotations) {
    fn from(example: TrainingExample) -> Self {
        (
            example.text,
            Annotations {
                entities: example.entities,
            },
        )
    }
}

/// The full training set, persisted as `{"DATA": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrainingCorpus {
    #[serde(rename = "DATA")]
    examples: Vec<TrainingExample>,
}

impl TrainingCorpus {
    pub fn new(examples: Vec<TrainingExample>) -> Self {
        Self { examples }
    }

    pub fn examples(&self) -> &[TrainingExample] {
        &self.examples
    }

    pub fn into_examples(self) -> Vec<TrainingExample> {
        self.examples
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Total number of entity spans across all examples.
    pub fn entity_count(&self) -> usize {
        self.examples.iter().map(|e| e.entities.len()).sum()
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> serde_json::Result<()> {
        serde_json::to_writer(writer, self)
    }

    /// Decode a corpus and validate every span against its text.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let corpus: TrainingCorpus =
            serde_json::from_reader(reader).map_err(|source| CorpusError::MalformedRecord {
                stream: Stream::Corpus,
                line: source.line(),
                source,
            })?;
        for example in &corpus.examples {
            example.validate()?;
        }
        Ok(corpus)
    }

    /// Write the corpus to `path`, replacing any existing file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| CorpusError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        self.to_writer(&mut writer)
            .map_err(|e| CorpusError::io(path, e.into()))?;
        writer.flush().map_err(|e| CorpusError::io(path, e))?;
        tracing::info!(path = %path.display(), examples = self.len(), "saved training corpus");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CorpusError::io(path, e))?;
        let corpus = Self::from_reader(BufReader::new(file))?;
        tracing::info!(path = %path.display(), examples = corpus.len(), "loaded training corpus");
        Ok(corpus)
    }
}

impl FromIterator<TrainingExample> for TrainingCorpus {
    fn from_iter<I: IntoIterator<Item = TrainingExample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn sample() -> TrainingCorpus {
        TrainingCorpus::new(vec![
            TrainingExample::new(
                "bats carry MERS CoV",
                vec![CharSpan::new(11, 19, EntityType::Coronavirus)],
            ),
            TrainingExample::new(
                "pigs and bats",
                vec![
                    CharSpan::new(0, 4, EntityType::Livestock),
                    CharSpan::new(9, 13, EntityType::Wildlife),
                ],
            ),
        ])
    }

    #[test]
    fn test_wire_format() {
        let corpus = TrainingCorpus::new(vec![TrainingExample::new(
            "bats carry MERS CoV",
            vec![CharSpan::new(11, 19, EntityType::Coronavirus)],
        )]);
        let json = serde_json::to_string(&corpus).unwrap();
        assert_eq!(
            json,
            r#"{"DATA":[["bats carry MERS CoV",{"entities":[[11,19,"CORONAVIRUS"]]}]]}"#
        );
    }

    #[test]
    fn test_roundtrip_preserves_order() {
        let corpus = sample();
        let mut buf = Vec::new();
        corpus.to_writer(&mut buf).unwrap();
        let back = TrainingCorpus::from_reader(buf.as_slice()).unwrap();
        assert_eq!(back, corpus);
        assert_eq!(back.entity_count(), 3);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("TRAIN_DATA.json");
        let corpus = sample();
        corpus.save(&path).unwrap();
        assert_eq!(TrainingCorpus::load(&path).unwrap(), corpus);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TrainingCorpus::load(dir.path().join("nope.json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_rejects_unknown_label() {
        let json = r#"{"DATA":[["bats",{"entities":[[0,4,"DISEASE"]]}]]}"#;
        let err = TrainingCorpus::from_reader(json.as_bytes()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
    }

    #[test]
    fn test_rejects_out_of_range_span() {
        let json = r#"{"DATA":[["bats",{"entities":[[0,5,"WILDLIFE"]]}]]}"#;
        let err = TrainingCorpus::from_reader(json.as_bytes()).unwrap_err();
        assert!(matches!(err, CorpusError::SpanOutOfRange { end: 5, len: 4 }));
    }

    #[test]
    fn test_rejects_empty_span() {
        let json = r#"{"DATA":[["bats",{"entities":[[2,2,"WILDLIFE"]]}]]}"#;
        let err = TrainingCorpus::from_reader(json.as_bytes()).unwrap_err();
        assert!(matches!(err, CorpusError::InvalidSpan { start: 2, end: 2 }));
    }

    #[test]
    fn test_char_slice() {
        assert_eq!(char_slice("bats carry", 5, 10), Some("carry"));
        assert_eq!(char_slice("bats carry", 0, 0), Some(""));
        assert_eq!(char_slice("bats", 0, 5), None);
        assert_eq!(char_slice("β-coronavirus", 2, 13), Some("coronavirus"));
    }
}
