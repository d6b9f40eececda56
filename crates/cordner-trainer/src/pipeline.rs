//! # Recognition Pipeline
//!
//! An ordered list of named components run over a text. Components earlier in
//! the pipeline claim spans first; later components never override them.
//!
//! On disk a pipeline is a directory holding `meta.json` plus one
//! `<name>.json` per component.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context};
use cordner_core::{char_slice, CharSpan, EntityType, TrainingExample};
use oorandom::Rand32;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::EntityRecognizer;
use crate::recognizer::{PredictedEntity, TrainableEntityRecognizer, NER_COMPONENT};
use crate::ruler::EntityRuler;

/// Pipeline name of the phrase-pattern component.
pub const RULER_COMPONENT: &str = "entity_ruler";

const META_FILE: &str = "meta.json";

#[derive(Debug, Clone)]
pub enum Component {
    Ner(EntityRecognizer),
    Ruler(EntityRuler),
}

impl Component {
    fn kind(&self) -> ComponentKind {
        match self {
            Component::Ner(_) => ComponentKind::Ner,
            Component::Ruler(_) => ComponentKind::EntityRuler,
        }
    }

    fn find(&self, text: &str) -> Vec<CharSpan> {
        match self {
            Component::Ner(ner) => ner.predict(text),
            Component::Ruler(ruler) => ruler.find(text),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ComponentKind {
    Ner,
    EntityRuler,
}

#[derive(Debug, Clone)]
struct Pipe {
    name: String,
    enabled: bool,
    component: Component,
}

#[derive(Debug, Serialize, Deserialize)]
struct PipeMeta {
    name: String,
    kind: ComponentKind,
}

#[derive(Debug, Serialize, Deserialize)]
struct Meta {
    lang: String,
    pipeline: Vec<PipeMeta>,
    #[serde(default)]
    labels: Vec<EntityType>,
}

/// Optimizer state for perceptron updates.
#[derive(Debug, Clone)]
pub struct Optimizer {
    pub learn_rate: f32,
    pub steps: u64,
    rng: Rand32,
}

impl Optimizer {
    pub fn new(seed: u64) -> Self {
        Self {
            learn_rate: 1.0,
            steps: 0,
            rng: Rand32::new(seed),
        }
    }
}

/// The concrete recognizer: a language tag plus an ordered component list.
#[derive(Debug, Clone)]
pub struct Pipeline {
    lang: String,
    pipes: Vec<Pipe>,
}

impl Pipeline {
    /// An empty pipeline for `lang`.
    pub fn blank(lang: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            pipes: Vec::new(),
        }
    }

    pub fn lang(&self) -> &str {
        &self.lang
    }

    /// Names of all components, enabled or not, in pipeline order.
    pub fn pipe_names(&self) -> Vec<&str> {
        self.pipes.iter().map(|p| p.name.as_str()).collect()
    }

    /// Names of the enabled components.
    pub fn enabled_pipes(&self) -> Vec<&str> {
        self.pipes
            .iter()
            .filter(|p| p.enabled)
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn has_pipe(&self, name: &str) -> bool {
        self.pipes.iter().any(|p| p.name == name)
    }

    fn check_new_pipe(&self, name: &str, component: &Component) -> anyhow::Result<()> {
        if self.has_pipe(name) {
            bail!("pipeline already has a component named {name:?}");
        }
        let reserved = match name {
            NER_COMPONENT => Some(ComponentKind::Ner),
            RULER_COMPONENT => Some(ComponentKind::EntityRuler),
            _ => None,
        };
        if let Some(kind) = reserved.filter(|&k| k != component.kind()) {
            bail!("component name {name:?} is reserved for {kind:?} components");
        }
        Ok(())
    }

    /// Append a component. Names must be unique, and the reserved names
    /// `ner` and `entity_ruler` only take components of their own kind.
    pub fn add_pipe(
        &mut self,
        name: impl Into<String>,
        component: Component,
    ) -> anyhow::Result<()> {
        let name = name.into();
        self.check_new_pipe(&name, &component)?;
        self.pipes.push(Pipe {
            name,
            enabled: true,
            component,
        });
        Ok(())
    }

    /// Insert a component before `before`, or append when `before` is absent.
    pub fn add_pipe_before(
        &mut self,
        name: impl Into<String>,
        component: Component,
        before: &str,
    ) -> anyhow::Result<()> {
        let name = name.into();
        let at = self
            .pipes
            .iter()
            .position(|p| p.name == before)
            .unwrap_or(self.pipes.len());
        self.add_pipe_at(at, &name, component)
    }

    pub fn entity_recognizer(&self) -> Option<&EntityRecognizer> {
        self.pipes.iter().find_map(|p| match &p.component {
            Component::Ner(ner) if p.name == NER_COMPONENT => Some(ner),
            _ => None,
        })
    }

    fn entity_recognizer_mut(&mut self) -> Option<&mut EntityRecognizer> {
        self.pipes.iter_mut().find_map(|p| match &mut p.component {
            Component::Ner(ner) if p.name == NER_COMPONENT => Some(ner),
            _ => None,
        })
    }

    /// The entity ruler, created ahead of the recognizer if missing.
    pub fn entity_ruler_mut(&mut self) -> anyhow::Result<&mut EntityRuler> {
        if !self.has_pipe(RULER_COMPONENT) {
            let at = self
                .pipes
                .iter()
                .position(|p| p.name == NER_COMPONENT)
                .unwrap_or(self.pipes.len());
            self.add_pipe_at(at, RULER_COMPONENT, Component::Ruler(EntityRuler::new()))?;
        }
        let pipe = self
            .pipes
            .iter_mut()
            .find(|p| p.name == RULER_COMPONENT)
            .map(|p| &mut p.component);
        match pipe {
            Some(Component::Ruler(ruler)) => Ok(ruler),
            _ => bail!("component {RULER_COMPONENT:?} is not an entity ruler"),
        }
    }

    fn add_pipe_at(&mut self, at: usize, name: &str, component: Component) -> anyhow::Result<()> {
        self.check_new_pipe(name, &component)?;
        self.pipes.insert(
            at,
            Pipe {
                name: name.to_string(),
                enabled: true,
                component,
            },
        );
        Ok(())
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .with_context(|| format!("failed to write {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))
}

impl TrainableEntityRecognizer for Pipeline {
    type Optimizer = Optimizer;

    fn ensure_entity_recognizer(&mut self) {
        if self.entity_recognizer().is_none() {
            debug!("attaching new entity recognizer");
            self.pipes.retain(|p| p.name != NER_COMPONENT);
            self.pipes.push(Pipe {
                name: NER_COMPONENT.to_string(),
                enabled: true,
                component: Component::Ner(EntityRecognizer::new()),
            });
        }
    }

    fn add_label(&mut self, label: EntityType) -> bool {
        self.ensure_entity_recognizer();
        self.entity_recognizer_mut()
            .is_some_and(|ner| ner.add_label(label))
    }

    fn disable_all_except(&mut self, component: &str) -> Vec<String> {
        let mut disabled = Vec::new();
        for pipe in &mut self.pipes {
            if pipe.name != component && pipe.enabled {
                pipe.enabled = false;
                disabled.push(pipe.name.clone());
            }
        }
        disabled
    }

    fn enable(&mut self, names: &[String]) {
        for pipe in &mut self.pipes {
            if names.contains(&pipe.name) {
                pipe.enabled = true;
            }
        }
    }

    fn begin_training(&mut self, seed: u64) -> Optimizer {
        self.ensure_entity_recognizer();
        Optimizer::new(seed)
    }

    fn update(
        &mut self,
        batch: &[TrainingExample],
        optimizer: &mut Optimizer,
        dropout: f32,
    ) -> anyhow::Result<f32> {
        let enabled = self
            .pipes
            .iter()
            .any(|p| p.name == NER_COMPONENT && p.enabled);
        if !enabled {
            bail!("cannot update: no enabled {NER_COMPONENT:?} component");
        }
        let learn_rate = optimizer.learn_rate;
        let Some(ner) = self.entity_recognizer_mut() else {
            bail!("cannot update: no {NER_COMPONENT:?} component");
        };

        let mut loss = 0.0;
        for example in batch {
            loss += ner.update(example, &mut optimizer.rng, dropout, learn_rate);
        }
        optimizer.steps += 1;
        Ok(loss)
    }

    fn predict(&self, text: &str) -> Vec<PredictedEntity> {
        let mut claimed: Vec<CharSpan> = Vec::new();
        for pipe in self.pipes.iter().filter(|p| p.enabled) {
            for span in pipe.component.find(text) {
                let overlaps = claimed
                    .iter()
                    .any(|c| span.start < c.end && c.start < span.end);
                if !overlaps {
                    claimed.push(span);
                }
            }
        }
        claimed.sort_by_key(|s| s.start);

        claimed
            .into_iter()
            .filter_map(|span| {
                char_slice(text, span.start, span.end).map(|surface| PredictedEntity {
                    start: span.start,
                    end: span.end,
                    label: span.label,
                    text: surface.to_string(),
                })
            })
            .collect()
    }

    fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(path)
            .with_context(|| format!("failed to create model directory {}", path.display()))?;

        let meta = Meta {
            lang: self.lang.clone(),
            pipeline: self
                .pipes
                .iter()
                .map(|p| PipeMeta {
                    name: p.name.clone(),
                    kind: p.component.kind(),
                })
                .collect(),
            labels: self
                .entity_recognizer()
                .map(|ner| ner.labels().to_vec())
                .unwrap_or_default(),
        };
        write_json(&path.join(META_FILE), &meta)?;

        for pipe in &self.pipes {
            let file = path.join(format!("{}.json", pipe.name));
            match &pipe.component {
                Component::Ner(ner) => write_json(&file, ner)?,
                Component::Ruler(ruler) => write_json(&file, ruler)?,
            }
        }
        Ok(())
    }

    fn load_from(path: &Path) -> anyhow::Result<Self> {
        let meta: Meta = read_json(&path.join(META_FILE))?;
        let mut pipeline = Pipeline::blank(meta.lang);

        for pipe in meta.pipeline {
            let file = path.join(format!("{}.json", pipe.name));
            let component = match pipe.kind {
                ComponentKind::Ner => Component::Ner(read_json(&file)?),
                ComponentKind::EntityRuler => Component::Ruler(read_json(&file)?),
            };
            pipeline.add_pipe(pipe.name, component)?;
        }
        debug!(
            path = %path.display(),
            pipes = ?pipeline.pipe_names(),
            labels = meta.labels.len(),
            "loaded pipeline"
        );
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ruler::PhrasePattern;

    fn example() -> TrainingExample {
        TrainingExample::new(
            "bats carry MERS CoV",
            vec![CharSpan::new(11, 19, EntityType::Coronavirus)],
        )
    }

    fn trained() -> Pipeline {
        let mut nlp = Pipeline::blank("en");
        nlp.add_label(EntityType::Coronavirus);
        let mut optimizer = nlp.begin_training(3);
        let converged =
            (0..100).any(|_| nlp.update(&[example()], &mut optimizer, 0.0).unwrap() == 0.0);
        assert!(converged);
        nlp
    }

    #[test]
    fn test_blank_has_no_pipes() {
        let nlp = Pipeline::blank("en");
        assert_eq!(nlp.lang(), "en");
        assert!(nlp.pipe_names().is_empty());
        assert!(nlp.predict("bats").is_empty());
    }

    #[test]
    fn test_ensure_entity_recognizer_is_idempotent() {
        let mut nlp = Pipeline::blank("en");
        nlp.ensure_entity_recognizer();
        nlp.add_label(EntityType::Wildlife);
        nlp.ensure_entity_recognizer();
        assert_eq!(nlp.pipe_names(), vec!["ner"]);
        assert_eq!(
            nlp.entity_recognizer().unwrap().labels(),
            &[EntityType::Wildlife]
        );
    }

    #[test]
    fn test_add_label_reports_new_labels() {
        let mut nlp = Pipeline::blank("en");
        assert!(nlp.add_label(EntityType::Wildlife));
        assert!(!nlp.add_label(EntityType::Wildlife));
    }

    #[test]
    fn test_duplicate_pipe_name_rejected() {
        let mut nlp = Pipeline::blank("en");
        nlp.add_pipe("ner", Component::Ner(EntityRecognizer::new())).unwrap();
        assert!(nlp.add_pipe("ner", Component::Ner(EntityRecognizer::new())).is_err());
    }

    #[test]
    fn test_reserved_names_need_matching_kind() {
        let mut nlp = Pipeline::blank("en");
        assert!(nlp
            .add_pipe(RULER_COMPONENT, Component::Ner(EntityRecognizer::new()))
            .is_err());
        assert!(nlp
            .add_pipe_before(NER_COMPONENT, Component::Ruler(EntityRuler::new()), "x")
            .is_err());
        assert!(nlp.pipe_names().is_empty());

        nlp.add_pipe("custom_ner", Component::Ner(EntityRecognizer::new()))
            .unwrap();
        assert!(nlp.entity_ruler_mut().is_ok());
        assert_eq!(nlp.pipe_names(), vec!["custom_ner", "entity_ruler"]);
    }

    #[test]
    fn test_load_rejects_mismatched_component_kind() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("meta.json"),
            r#"{"lang": "en", "pipeline": [{"name": "entity_ruler", "kind": "ner"}]}"#,
        )
        .unwrap();
        let ner = serde_json::to_string(&EntityRecognizer::new()).unwrap();
        std::fs::write(dir.path().join("entity_ruler.json"), ner).unwrap();

        let err = Pipeline::load_from(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("reserved"));
    }

    #[test]
    fn test_disable_and_enable() {
        let mut nlp = Pipeline::blank("en");
        nlp.entity_ruler_mut().unwrap();
        nlp.ensure_entity_recognizer();
        assert_eq!(nlp.pipe_names(), vec!["entity_ruler", "ner"]);

        let disabled = nlp.disable_all_except(NER_COMPONENT);
        assert_eq!(disabled, vec!["entity_ruler".to_string()]);
        assert_eq!(nlp.enabled_pipes(), vec!["ner"]);

        nlp.enable(&disabled);
        assert_eq!(nlp.enabled_pipes(), vec!["entity_ruler", "ner"]);
    }

    #[test]
    fn test_update_requires_enabled_ner() {
        let mut nlp = Pipeline::blank("en");
        nlp.add_label(EntityType::Coronavirus);
        let mut optimizer = nlp.begin_training(0);
        nlp.disable_all_except("something_else");
        assert!(nlp.update(&[example()], &mut optimizer, 0.0).is_err());
    }

    #[test]
    fn test_update_counts_steps() {
        let mut nlp = Pipeline::blank("en");
        nlp.add_label(EntityType::Coronavirus);
        let mut optimizer = nlp.begin_training(0);
        nlp.update(&[example(), example()], &mut optimizer, 0.35).unwrap();
        assert_eq!(optimizer.steps, 1);
    }

    #[test]
    fn test_trained_pipeline_predicts() {
        let nlp = trained();
        let found = nlp.predict("bats carry MERS CoV");
        assert_eq!(
            found,
            vec![PredictedEntity {
                start: 11,
                end: 19,
                label: EntityType::Coronavirus,
                text: "MERS CoV".to_string(),
            }]
        );
    }

    #[test]
    fn test_ruler_claims_spans_first() {
        let mut nlp = trained();
        nlp.entity_ruler_mut().unwrap().add_patterns([PhrasePattern {
            label: EntityType::Wildlife,
            pattern: "MERS".into(),
        }]);
        let found = nlp.predict("bats carry MERS CoV");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, EntityType::Wildlife);
        assert_eq!(found[0].text, "MERS");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut nlp = trained();
        nlp.entity_ruler_mut().unwrap().add_patterns([PhrasePattern {
            label: EntityType::Wildlife,
            pattern: "bats".into(),
        }]);
        nlp.save_to(dir.path()).unwrap();
        // Saving again overwrites in place.
        nlp.save_to(dir.path()).unwrap();

        let loaded = Pipeline::load_from(dir.path()).unwrap();
        assert_eq!(loaded.pipe_names(), nlp.pipe_names());
        assert_eq!(loaded.predict("bats carry MERS CoV"), nlp.predict("bats carry MERS CoV"));
    }

    #[test]
    fn test_load_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Pipeline::load_from(&dir.path().join("missing")).is_err());
    }
}
