//! # BIO Tags
//!
//! Tag scheme for sequence labeling over a growable set of entity labels.
//! Index 0 is `O`; label `i` owns `B-` at `1 + 2i` and `I-` at `2 + 2i`, so
//! registering a new label never renumbers existing tags.

use std::fmt;

use cordner_core::EntityType;
use serde::{Deserialize, Serialize};

/// A BIO tag for one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BioTag {
    Outside,
    Begin(EntityType),
    Inside(EntityType),
}

impl BioTag {
    /// Get the entity type for this tag.
    pub fn entity_type(&self) -> Option<EntityType> {
        match self {
            BioTag::Begin(t) | BioTag::Inside(t) => Some(*t),
            BioTag::Outside => None,
        }
    }

    pub fn is_begin(&self) -> bool {
        matches!(self, BioTag::Begin(_))
    }

    pub fn is_inside(&self) -> bool {
        matches!(self, BioTag::Inside(_))
    }

    /// `I-X` may only follow `B-X` or `I-X`; every other transition is allowed.
    pub fn is_valid_transition(from: BioTag, to: BioTag) -> bool {
        match to {
            BioTag::Inside(t) => matches!(from, BioTag::Begin(f) | BioTag::Inside(f) if f == t),
            _ => true,
        }
    }

    /// A sequence cannot open with an `I-` tag.
    pub fn is_valid_start(tag: BioTag) -> bool {
        !tag.is_inside()
    }
}

impl fmt::Display for BioTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BioTag::Outside => write!(f, "O"),
            BioTag::Begin(t) => write!(f, "B-{t}"),
            BioTag::Inside(t) => write!(f, "I-{t}"),
        }
    }
}

/// The labels a recognizer knows, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet {
    labels: Vec<EntityType>,
}

impl TagSet {
    pub const OUTSIDE: usize = 0;

    pub fn new() -> Self {
        Self::default()
    }

    /// Register a label. Returns `false` if it was already present.
    pub fn add_label(&mut self, label: EntityType) -> bool {
        if self.labels.contains(&label) {
            return false;
        }
        self.labels.push(label);
        true
    }

    pub fn labels(&self) -> &[EntityType] {
        &self.labels
    }

    pub fn contains(&self, label: EntityType) -> bool {
        self.labels.contains(&label)
    }

    /// Total number of distinct tags.
    pub fn num_tags(&self) -> usize {
        1 + 2 * self.labels.len()
    }

    /// Get the tag index for a tag, if its label is registered.
    pub fn index(&self, tag: BioTag) -> Option<usize> {
        let label_index = |t: EntityType| self.labels.iter().position(|l| *l == t);
        match tag {
            BioTag::Outside => Some(Self::OUTSIDE),
            BioTag::Begin(t) => label_index(t).map(|i| 1 + 2 * i),
            BioTag::Inside(t) => label_index(t).map(|i| 2 + 2 * i),
        }
    }

    /// Get the tag at an index.
    pub fn tag(&self, index: usize) -> Option<BioTag> {
        if index == Self::OUTSIDE {
            return Some(BioTag::Outside);
        }
        let label = *self.labels.get((index - 1) / 2)?;
        Some(if index % 2 == 1 {
            BioTag::Begin(label)
        } else {
            BioTag::Inside(label)
        })
    }

    /// Pre-computed `[from][to]` mask of allowed transitions.
    pub fn transition_mask(&self) -> Vec<Vec<bool>> {
        let n = self.num_tags();
        let tags: Vec<BioTag> = (0..n).filter_map(|i| self.tag(i)).collect();
        tags.iter()
            .map(|from| {
                tags.iter()
                    .map(|to| BioTag::is_valid_transition(*from, *to))
                    .collect()
            })
            .collect()
    }

    /// Mask of tags allowed at the first position.
    pub fn start_mask(&self) -> Vec<bool> {
        (0..self.num_tags())
            .map(|i| self.tag(i).is_some_and(BioTag::is_valid_start))
            .collect()
    }
}
