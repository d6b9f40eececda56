//! # Cordner Trainer
//!
//! Trains an entity recognizer on the corpus produced by `cordner-core`.
//! The loop in [`trainer`] drives any [`TrainableEntityRecognizer`]; the
//! bundled [`Pipeline`] pairs a structured-perceptron tagger with an
//! optional phrase-pattern ruler.

pub mod batching;
pub mod config;
pub mod model;
pub mod pipeline;
pub mod recognizer;
pub mod ruler;
pub mod tags;
pub mod trainer;
pub mod viterbi;

pub use batching::{minibatch, Compounding};
pub use config::TrainingConfig;
pub use model::EntityRecognizer;
pub use pipeline::{Component, Pipeline};
pub use recognizer::{PredictedEntity, TrainableEntityRecognizer, NER_COMPONENT};
pub use ruler::{EntityRuler, PhrasePattern};
pub use trainer::{predict_entities, run_training, train_model, TrainingReport};
