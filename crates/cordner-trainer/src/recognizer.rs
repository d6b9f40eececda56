//! The capability interface the training loop drives.

use std::path::Path;

use cordner_core::{EntityType, TrainingExample};

/// Pipeline name of the entity-recognition component.
pub const NER_COMPONENT: &str = "ner";

/// An entity found by a recognizer, with character offsets into the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredictedEntity {
    pub start: usize,
    pub end: usize,
    pub label: EntityType,
    pub text: String,
}

/// A trainable entity recognizer.
///
/// The training loop only ever talks to a model through this trait, so any
/// implementation that can learn from `(text, spans)` batches and report spans
/// back can be trained by [`run_training`](crate::trainer::run_training).
pub trait TrainableEntityRecognizer {
    /// Optimizer state created once per training run.
    type Optimizer;

    /// Attach an entity-recognition component named [`NER_COMPONENT`] if absent.
    fn ensure_entity_recognizer(&mut self);

    /// Register a label with the entity-recognition component.
    /// Returns `false` if it was already known.
    fn add_label(&mut self, label: EntityType) -> bool;

    /// Disable every component except `component`, returning the names that
    /// were switched off.
    fn disable_all_except(&mut self, component: &str) -> Vec<String>;

    /// Re-enable components previously returned by [`disable_all_except`].
    ///
    /// [`disable_all_except`]: TrainableEntityRecognizer::disable_all_except
    fn enable(&mut self, names: &[String]);

    /// Create a fresh optimizer bound to this model.
    fn begin_training(&mut self, seed: u64) -> Self::Optimizer;

    /// Apply one update over `batch`; returns the loss accumulated by it.
    fn update(
        &mut self,
        batch: &[TrainingExample],
        optimizer: &mut Self::Optimizer,
        dropout: f32,
    ) -> anyhow::Result<f32>;

    /// Recognize entities in `text`, in the order the model reports them.
    fn predict(&self, text: &str) -> Vec<PredictedEntity>;

    /// Write the full model state to `path`, replacing what is there.
    fn save_to(&self, path: &Path) -> anyhow::Result<()>;

    /// Restore a model previously written with [`save_to`].
    ///
    /// [`save_to`]: TrainableEntityRecognizer::save_to
    fn load_from(path: &Path) -> anyhow::Result<Self>
    where
        Self: Sized;
}
