//! Training loop over an aligned corpus.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use cordner_core::{EntityType, EntityTypes, TrainingCorpus, TrainingExample};
use oorandom::Rand32;
use tracing::{debug, info, warn};

use crate::batching::minibatch;
use crate::config::TrainingConfig;
use crate::pipeline::Pipeline;
use crate::recognizer::{TrainableEntityRecognizer, NER_COMPONENT};

/// Outcome of a training run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    /// Seed used for shuffling and dropout
    pub seed: u64,
    /// Summed loss of every completed pass, in order
    pub losses: Vec<f32>,
}

impl TrainingReport {
    pub fn passes(&self) -> usize {
        self.losses.len()
    }

    pub fn final_loss(&self) -> Option<f32> {
        self.losses.last().copied()
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

fn shuffle<T>(items: &mut [T], rng: &mut Rand32) {
    for i in (1..items.len()).rev() {
        let j = rng.rand_range(0..(i as u32 + 1)) as usize;
        items.swap(i, j);
    }
}

/// Load `prior` (or start a blank English pipeline) and train it on `corpus`.
pub fn train_model(
    corpus: &TrainingCorpus,
    allowed: &EntityTypes,
    prior: Option<&Path>,
    config: &TrainingConfig,
) -> anyhow::Result<Pipeline> {
    let mut nlp = match prior {
        Some(path) => {
            let nlp = Pipeline::load_from(path)
                .with_context(|| format!("failed to load model from {}", path.display()))?;
            info!(path = %path.display(), "loaded model");
            nlp
        }
        None => {
            info!("created blank 'en' model");
            Pipeline::blank("en")
        }
    };
    run_training(&mut nlp, corpus, allowed, config)?;
    Ok(nlp)
}

/// Train `model` on `corpus` for `config.iterations` passes.
///
/// Every label in `allowed` is registered first. Other components are
/// disabled while training and re-enabled before returning, also on error.
/// After each pass the model is written to `config.checkpoint_dir`.
pub fn run_training<M: TrainableEntityRecognizer>(
    model: &mut M,
    corpus: &TrainingCorpus,
    allowed: &EntityTypes,
    config: &TrainingConfig,
) -> anyhow::Result<TrainingReport> {
    model.ensure_entity_recognizer();
    for label in allowed.iter() {
        model.add_label(label);
    }

    let seed = config.seed.unwrap_or_else(clock_seed);
    let mut report = TrainingReport {
        seed,
        losses: Vec::with_capacity(config.iterations),
    };

    if corpus.is_empty() {
        warn!("training corpus is empty, nothing to train");
        return Ok(report);
    }

    let disabled = model.disable_all_except(NER_COMPONENT);
    if !disabled.is_empty() {
        debug!(?disabled, "disabled components for training");
    }
    let result = train_passes(model, corpus.examples(), config, &mut report);
    model.enable(&disabled);
    result?;

    Ok(report)
}

fn train_passes<M: TrainableEntityRecognizer>(
    model: &mut M,
    examples: &[TrainingExample],
    config: &TrainingConfig,
    report: &mut TrainingReport,
) -> anyhow::Result<()> {
    let mut optimizer = model.begin_training(report.seed);
    let mut rng = Rand32::new(report.seed);
    let mut order = examples.to_vec();

    info!(
        examples = examples.len(),
        iterations = config.iterations,
        seed = report.seed,
        "starting training"
    );

    for pass in 0..config.iterations {
        shuffle(&mut order, &mut rng);

        let mut loss = 0.0;
        for batch in minibatch(&order, config.batch_sizes()) {
            loss += model
                .update(batch, &mut optimizer, config.dropout)
                .with_context(|| format!("update failed in pass {}", pass + 1))?;
            debug!(pass = pass + 1, size = batch.len(), "batch done");
        }
        info!(pass = pass + 1, loss, "losses");

        model.save_to(&config.checkpoint_dir).with_context(|| {
            format!(
                "failed to save checkpoint to {}",
                config.checkpoint_dir.display()
            )
        })?;
        info!(path = %config.checkpoint_dir.display(), "saved model");
        report.losses.push(loss);
    }

    Ok(())
}

/// Surface text and type of every entity `model` finds in `text`.
pub fn predict_entities<M: TrainableEntityRecognizer>(
    model: &M,
    text: &str,
) -> Vec<(String, EntityType)> {
    model
        .predict(text)
        .into_iter()
        .map(|e| (e.text, e.label))
        .collect()
}
