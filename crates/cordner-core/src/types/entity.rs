use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CorpusError;

/// Target entity types for the COVID and human-activity recognizer.
///
/// Serialized as the upper snake case label used by the CORD-NER release
/// (e.g. `VIRAL_PROTEIN`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    // COVID-specific types
    Coronavirus,
    ViralProtein,
    Livestock,
    Wildlife,
    Evolution,
    PhysicalScience,
    Substrate,
    Material,
    ImmuneResponse,
    // Activity types
    Activity,
    Behavior,
    SocialBehavior,
    IndividualBehavior,
    DailyOrRecreationalActivity,
    OccupationalActivity,
    HealthCareActivity,
    LaboratoryProcedure,
    DiagnosticProcedure,
    TherapeuticOrPreventiveProcedure,
    ResearchActivity,
    GovernmentalOrRegulatoryActivity,
    EducationalActivity,
    MachineActivity,
}

impl EntityType {
    /// Total number of target types.
    pub const COUNT: usize = 23;

    /// All target types, COVID types first, then activity types.
    pub const ALL: [EntityType; Self::COUNT] = [
        EntityType::Coronavirus,
        EntityType::ViralProtein,
        EntityType::Livestock,
        EntityType::Wildlife,
        EntityType::Evolution,
        EntityType::PhysicalScience,
        EntityType::Substrate,
        EntityType::Material,
        EntityType::ImmuneResponse,
        EntityType::Activity,
        EntityType::Behavior,
        EntityType::SocialBehavior,
        EntityType::IndividualBehavior,
        EntityType::DailyOrRecreationalActivity,
        EntityType::OccupationalActivity,
        EntityType::HealthCareActivity,
        EntityType::LaboratoryProcedure,
        EntityType::DiagnosticProcedure,
        EntityType::TherapeuticOrPreventiveProcedure,
        EntityType::ResearchActivity,
        EntityType::GovernmentalOrRegulatoryActivity,
        EntityType::EducationalActivity,
        EntityType::MachineActivity,
    ];

    /// The label string as it appears in annotation records.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Coronavirus => "CORONAVIRUS",
            EntityType::ViralProtein => "VIRAL_PROTEIN",
            EntityType::Livestock => "LIVESTOCK",
            EntityType::Wildlife => "WILDLIFE",
            EntityType::Evolution => "EVOLUTION",
            EntityType::PhysicalScience => "PHYSICAL_SCIENCE",
            EntityType::Substrate => "SUBSTRATE",
            EntityType::Material => "MATERIAL",
            EntityType::ImmuneResponse => "IMMUNE_RESPONSE",
            EntityType::Activity => "ACTIVITY",
            EntityType::Behavior => "BEHAVIOR",
            EntityType::SocialBehavior => "SOCIAL_BEHAVIOR",
            EntityType::IndividualBehavior => "INDIVIDUAL_BEHAVIOR",
            EntityType::DailyOrRecreationalActivity => "DAILY_OR_RECREATIONAL_ACTIVITY",
            EntityType::OccupationalActivity => "OCCUPATIONAL_ACTIVITY",
            EntityType::HealthCareActivity => "HEALTH_CARE_ACTIVITY",
            EntityType::LaboratoryProcedure => "LABORATORY_PROCEDURE",
            EntityType::DiagnosticProcedure => "DIAGNOSTIC_PROCEDURE",
            EntityType::TherapeuticOrPreventiveProcedure => "THERAPEUTIC_OR_PREVENTIVE_PROCEDURE",
            EntityType::ResearchActivity => "RESEARCH_ACTIVITY",
            EntityType::GovernmentalOrRegulatoryActivity => "GOVERNMENTAL_OR_REGULATORY_ACTIVITY",
            EntityType::EducationalActivity => "EDUCATIONAL_ACTIVITY",
            EntityType::MachineActivity => "MACHINE_ACTIVITY",
        }
    }

    /// Whether this is one of the COVID-specific types.
    pub fn is_covid(&self) -> bool {
        (*self as usize) < 9
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = CorpusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CorpusError::UnknownLabel(s.to_string()))
    }
}

/// The allow-list of entity types a run targets.
///
/// Built once at startup and passed explicitly to the aligner and trainer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTypes {
    types: BTreeSet<EntityType>,
}

impl EntityTypes {
    /// All 23 target types.
    pub fn targets() -> Self {
        EntityType::ALL.into_iter().collect()
    }

    pub fn contains(&self, entity_type: EntityType) -> bool {
        self.types.contains(&entity_type)
    }

    /// Resolve a raw label from an annotation record, returning it only when
    /// it is a known type present in this allow-list.
    pub fn resolve(&self, label: &str) -> Option<EntityType> {
        label
            .parse::<EntityType>()
            .ok()
            .filter(|t| self.contains(*t))
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityType> + '_ {
        self.types.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl Default for EntityTypes {
    fn default() -> Self {
        Self::targets()
    }
}

impl FromIterator<EntityType> for EntityTypes {
    fn from_iter<I: IntoIterator<Item = EntityType>>(iter: I) -> Self {
        Self {
            types: iter.into_iter().collect(),
        }
    }
}
