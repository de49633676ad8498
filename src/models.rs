use std::collections::BTreeMap;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub block_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competency {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub cluster_id: String,
    #[serde(default)]
    pub required_skills: String,
    #[serde(default)]
    pub priority: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDescription {
    pub competency_id: String,
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlossaryTerm {
    pub term: String,
    pub definition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelScaleEntry {
    pub level: u8,
    pub description: String,
}

/// Output of the model extractor. Everything except `competencies` and
/// `clusters` passes through the normalizer untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompetencyModel {
    pub categories: Vec<Category>,
    pub blocks: Vec<Block>,
    pub clusters: Vec<Cluster>,
    pub competencies: Vec<Competency>,
    pub level_descriptions: Vec<LevelDescription>,
    /// category id -> competency id -> target level. Absent pairs have no target.
    pub target_levels: IndexMap<String, IndexMap<String, u8>>,
    /// Keyed by canonical term.
    pub glossary: IndexMap<String, GlossaryTerm>,
    #[serde(default)]
    pub level_scale: Vec<LevelScaleEntry>,
}

/// The 70/20/10 taxonomy plus the two catch-all types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "70")]
    Practice,
    #[serde(rename = "20")]
    Workplace,
    #[serde(rename = "10")]
    Learning,
    #[serde(rename = "resource")]
    Resource,
    #[serde(rename = "other")]
    Other,
}

impl ActionType {
    pub const ALL: [ActionType; 5] = [
        ActionType::Practice,
        ActionType::Workplace,
        ActionType::Learning,
        ActionType::Resource,
        ActionType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::Practice => "70",
            ActionType::Workplace => "20",
            ActionType::Learning => "10",
            ActionType::Resource => "resource",
            ActionType::Other => "other",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A proficiency level 1-5, or the sentinel that applies to every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum LevelBucket {
    Level(u8),
    All,
}

impl LevelBucket {
    pub fn level(value: u8) -> Option<Self> {
        (1..=5).contains(&value).then_some(LevelBucket::Level(value))
    }

    /// Every bucket a stored dataset can contain, in output order.
    pub fn all_buckets() -> impl Iterator<Item = LevelBucket> {
        (1..=5).map(LevelBucket::Level).chain(std::iter::once(LevelBucket::All))
    }
}

impl fmt::Display for LevelBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelBucket::Level(level) => write!(f, "{level}"),
            LevelBucket::All => f.write_str("all"),
        }
    }
}

impl From<LevelBucket> for String {
    fn from(bucket: LevelBucket) -> Self {
        bucket.to_string()
    }
}

impl TryFrom<String> for LevelBucket {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "all" {
            return Ok(LevelBucket::All);
        }
        value
            .parse::<u8>()
            .ok()
            .and_then(LevelBucket::level)
            .ok_or_else(|| format!("invalid level bucket '{value}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAction {
    /// Heading the action was listed under, as authored.
    pub reference: String,
    pub level: LevelBucket,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub text: String,
    /// Unmodified source line.
    pub line: String,
    pub slide: usize,
    /// Section default that an inline type marker overrode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_conflict: Option<ActionType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResource {
    pub cluster_ref: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub line: String,
    pub slide: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedAction {
    pub competency_id: String,
    pub level_bucket: LevelBucket,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub text: String,
    pub slide: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Action,
    Resource,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Action => f.write_str("action"),
            EntryKind::Resource => f.write_str("resource"),
        }
    }
}

/// Serialized with the same labels as `Display`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnmatchedReason {
    #[serde(rename = "no match")]
    NoMatch,
    #[serde(rename = "ambiguous")]
    Ambiguous,
    #[serde(rename = "empty cluster")]
    EmptyCluster,
}

impl fmt::Display for UnmatchedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UnmatchedReason::NoMatch => "no match",
            UnmatchedReason::Ambiguous => "ambiguous",
            UnmatchedReason::EmptyCluster => "empty cluster",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedEntry {
    pub kind: EntryKind,
    pub reference: String,
    pub text: String,
    pub line: String,
    pub slide: usize,
    pub reason: UnmatchedReason,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

/// Matched actions of one competency, keyed by level bucket then type.
/// "all" is stored once; see [`CompetencyActions::for_level`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompetencyActions(pub BTreeMap<LevelBucket, BTreeMap<ActionType, Vec<MatchedAction>>>);

impl CompetencyActions {
    pub fn bucket(&self, bucket: LevelBucket, action_type: ActionType) -> &[MatchedAction] {
        self.0
            .get(&bucket)
            .and_then(|types| types.get(&action_type))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Actions visible when browsing `level`: its own bucket plus the shared "all" bucket.
    pub fn for_level(&self, level: u8) -> Vec<&MatchedAction> {
        [LevelBucket::Level(level), LevelBucket::All]
            .iter()
            .filter_map(|bucket| self.0.get(bucket))
            .flat_map(|types| types.values().flatten())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.values().flat_map(BTreeMap::values).map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &MatchedAction> {
        self.0.values().flat_map(BTreeMap::values).flatten()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedCompetency {
    #[serde(flatten)]
    pub competency: Competency,
    pub actions: CompetencyActions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedCluster {
    #[serde(flatten)]
    pub cluster: Cluster,
    pub competency_ids: Vec<String>,
    pub resources: Vec<Resource>,
}

/// The document the browsing client loads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedDataset {
    pub categories: Vec<Category>,
    pub blocks: Vec<Block>,
    pub clusters: Vec<MergedCluster>,
    pub competencies: Vec<MergedCompetency>,
    pub level_descriptions: Vec<LevelDescription>,
    pub target_levels: IndexMap<String, IndexMap<String, u8>>,
    pub glossary: IndexMap<String, GlossaryTerm>,
    #[serde(default)]
    pub level_scale: Vec<LevelScaleEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Model,
    Actions,
    Resources,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Model => "model",
            Stage::Actions => "actions",
            Stage::Resources => "resources",
        };
        f.write_str(label)
    }
}

/// A recoverable issue, collected and reported at the end of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub stage: Stage,
    pub message: String,
}

impl Warning {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::warn!(%stage, "{message}");
        Self { stage, message }
    }
}
