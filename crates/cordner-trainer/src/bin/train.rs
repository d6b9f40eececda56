//! `cordner`: build the CORD-NER training corpus and train a recognizer on it.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cordner_core::{build_corpus_from_files, EntityTypes, TrainingCorpus};
use cordner_trainer::config::{DEFAULT_CHECKPOINT_DIR, DEFAULT_ITERATIONS};
use cordner_trainer::{
    predict_entities, run_training, train_model, Pipeline, TrainableEntityRecognizer,
    TrainingConfig,
};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "cordner")]
#[command(about = "Align CORD-NER annotations and train an entity recognizer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Align the annotation and token streams into a training corpus
    Prepare(PrepareArgs),
    /// Train from an existing training corpus
    Train {
        /// Training corpus written by `prepare`
        #[arg(long, env = "CORDNER_TRAIN_DATA", default_value = "TRAIN_DATA.json")]
        train_data: PathBuf,

        #[command(flatten)]
        training: TrainArgs,
    },
    /// Prepare the corpus, then train on it
    Run {
        #[command(flatten)]
        prepare: PrepareArgs,

        #[command(flatten)]
        training: TrainArgs,
    },
    /// Tag text with a trained model
    Predict {
        /// Model directory
        #[arg(short, long, env = "CORDNER_MODEL", default_value = DEFAULT_CHECKPOINT_DIR)]
        model: PathBuf,

        /// Extra phrase patterns (JSONL) applied before the recognizer
        #[arg(long, env = "CORDNER_PATTERNS")]
        patterns: Option<PathBuf>,

        /// Text to tag; reads lines from stdin when empty
        text: Vec<String>,
    },
}

#[derive(Args)]
struct PrepareArgs {
    /// Per-document entity annotations (JSONL)
    #[arg(long, env = "CORDNER_NER_FILE", default_value = "CORD-NER-ner.json")]
    ner_file: PathBuf,

    /// Per-document sentence tokens (JSONL)
    #[arg(long, env = "CORDNER_CORPUS_FILE", default_value = "CORD-NER-corpus.json")]
    corpus_file: PathBuf,

    /// Where the aligned training corpus is written
    #[arg(long, env = "CORDNER_TRAIN_DATA", default_value = "TRAIN_DATA.json")]
    output: PathBuf,
}

#[derive(Args)]
struct TrainArgs {
    /// Existing model to continue training; starts blank when absent
    #[arg(short, long, env = "CORDNER_MODEL")]
    model: Option<PathBuf>,

    /// Checkpoint directory, overwritten after every pass
    #[arg(long, env = "CORDNER_CHECKPOINT_DIR", default_value = DEFAULT_CHECKPOINT_DIR)]
    checkpoint_dir: PathBuf,

    /// Passes over the corpus
    #[arg(short = 'n', long, env = "CORDNER_ITERATIONS", default_value_t = DEFAULT_ITERATIONS)]
    iterations: usize,

    /// Feature dropout rate
    #[arg(long, env = "CORDNER_DROPOUT", default_value_t = 0.35)]
    dropout: f32,

    /// First batch size
    #[arg(long, env = "CORDNER_BATCH_START", default_value_t = 4.0)]
    batch_start: f64,

    /// Largest batch size
    #[arg(long, env = "CORDNER_BATCH_STOP", default_value_t = 32.0)]
    batch_stop: f64,

    /// Per-batch growth factor
    #[arg(long, env = "CORDNER_BATCH_COMPOUND", default_value_t = 1.001)]
    batch_compound: f64,

    /// Shuffle seed; seeded from the clock when absent
    #[arg(long, env = "CORDNER_SEED")]
    seed: Option<u64>,

    /// Phrase patterns (JSONL) stored with the model
    #[arg(long, env = "CORDNER_PATTERNS")]
    patterns: Option<PathBuf>,
}

impl TrainArgs {
    fn config(&self) -> TrainingConfig {
        let config = TrainingConfig::new()
            .with_iterations(self.iterations)
            .with_dropout(self.dropout)
            .with_batch_schedule(self.batch_start, self.batch_stop, self.batch_compound)
            .with_checkpoint_dir(&self.checkpoint_dir);
        match self.seed {
            Some(seed) => config.with_seed(seed),
            None => config,
        }
    }
}

fn prepare(args: &PrepareArgs, allowed: &EntityTypes) -> Result<TrainingCorpus> {
    info!(
        ner = %args.ner_file.display(),
        tokens = %args.corpus_file.display(),
        "building training corpus"
    );
    let corpus = build_corpus_from_files(&args.ner_file, &args.corpus_file, &args.output, allowed)
        .context("failed to build training corpus")?;
    info!(
        examples = corpus.len(),
        entities = corpus.entity_count(),
        path = %args.output.display(),
        "wrote training corpus"
    );
    Ok(corpus)
}

fn load_pipeline(path: &Path) -> Result<Pipeline> {
    Pipeline::load_from(path).with_context(|| format!("failed to load model {}", path.display()))
}

fn train(corpus: &TrainingCorpus, args: &TrainArgs, allowed: &EntityTypes) -> Result<()> {
    let config = args.config();
    let Some(patterns) = &args.patterns else {
        train_model(corpus, allowed, args.model.as_deref(), &config)?;
        return Ok(());
    };

    let mut nlp = match &args.model {
        Some(path) => load_pipeline(path)?,
        None => Pipeline::blank("en"),
    };
    let count = nlp.entity_ruler_mut()?.load_patterns(patterns)?;
    info!(count, "added ruler patterns");
    run_training(&mut nlp, corpus, allowed, &config)?;
    Ok(())
}

fn predict(model: &Path, patterns: Option<&Path>, text: Vec<String>) -> Result<()> {
    let mut nlp = load_pipeline(model)?;
    if let Some(patterns) = patterns {
        nlp.entity_ruler_mut()?.load_patterns(patterns)?;
    }

    let print = |line: &str| {
        for (surface, label) in predict_entities(&nlp, line) {
            println!("{surface}\t{label}");
        }
    };

    if text.is_empty() {
        for line in io::stdin().lock().lines() {
            print(&line.context("failed to read stdin")?);
        }
    } else {
        print(&text.join(" "));
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let allowed = EntityTypes::targets();

    match cli.command {
        Commands::Prepare(args) => {
            prepare(&args, &allowed)?;
        }
        Commands::Train {
            train_data,
            training,
        } => {
            let corpus = TrainingCorpus::load(&train_data)
                .with_context(|| format!("failed to load {}", train_data.display()))?;
            info!(examples = corpus.len(), "loaded training corpus");
            train(&corpus, &training, &allowed)?;
        }
        Commands::Run { prepare: args, training } => {
            let corpus = prepare(&args, &allowed)?;
            train(&corpus, &training, &allowed)?;
        }
        Commands::Predict {
            model,
            patterns,
            text,
        } => predict(&model, patterns.as_deref(), text)?,
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
