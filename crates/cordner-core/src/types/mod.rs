pub mod entity;
pub mod example;
pub mod record;

pub use entity::{EntityType, EntityTypes};
pub use example::{char_slice, Annotations, CharSpan, TrainingCorpus, TrainingExample};
pub use record::{NerDocument, NerSentence, RawEntity, RecordId, TokenDocument, TokenSentence};
