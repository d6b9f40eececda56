use std::path::PathBuf;

use crate::batching::Compounding;

/// Default number of passes over the corpus.
pub const DEFAULT_ITERATIONS: usize = 20;
/// Default checkpoint directory, overwritten after every pass.
pub const DEFAULT_CHECKPOINT_DIR: &str = "cord_model";

/// Configuration for the training loop.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    /// Number of full passes over the shuffled corpus
    pub iterations: usize,
    /// First batch size of the compounding schedule
    pub batch_start: f64,
    /// Largest batch size of the compounding schedule
    pub batch_stop: f64,
    /// Per-batch growth factor of the batch size
    pub batch_compound: f64,
    /// Feature dropout rate applied during updates
    pub dropout: f32,
    /// Where the model is written after each pass
    pub checkpoint_dir: PathBuf,
    /// Shuffle/dropout seed; `None` seeds from the clock
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            batch_start: 4.0,
            batch_stop: 32.0,
            batch_compound: 1.001,
            dropout: 0.35,
            checkpoint_dir: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
            seed: None,
        }
    }
}

impl TrainingConfig {
    /// Create a new training configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations;
        self
    }

    /// Set the compounding batch schedule.
    pub fn with_batch_schedule(mut self, start: f64, stop: f64, compound: f64) -> Self {
        self.batch_start = start;
        self.batch_stop = stop;
        self.batch_compound = compound;
        self
    }

    /// Set the dropout rate, clamped to `[0.0, 0.99]`.
    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout.clamp(0.0, 0.99);
        self
    }

    pub fn with_checkpoint_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.checkpoint_dir = dir.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The batch-size schedule for one pass.
    pub fn batch_sizes(&self) -> Compounding {
        Compounding::new(self.batch_start, self.batch_stop, self.batch_compound)
    }
}
