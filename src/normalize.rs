//! Normalizer: binds raw actions and resources to the model, buckets them and
//! assembles the merged dataset plus the quarantine list.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::canonical::canonicalize;
use crate::deck;
use crate::matcher::{Binding, MatchResult, ModelIndex};
use crate::models::{
    ActionType, CompetencyActions, CompetencyModel, EntryKind, MatchedAction, MergedCluster,
    MergedCompetency, MergedDataset, RawAction, RawResource, Resource, UnmatchedEntry,
    UnmatchedReason,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchStats {
    pub matched_actions: usize,
    pub unmatched_actions: usize,
    /// Bound actions whose text was already present in the same bucket.
    pub duplicate_actions: usize,
    pub matched_resources: usize,
    pub unmatched_resources: usize,
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub dataset: MergedDataset,
    pub unmatched: Vec<UnmatchedEntry>,
    pub stats: MatchStats,
}

/// Ordered resources of one cluster, unique by canonical title.
#[derive(Default)]
struct ResourceList {
    items: Vec<Resource>,
    keys: HashSet<String>,
}

impl ResourceList {
    fn push(&mut self, title: String, url: Option<String>) {
        let key = canonicalize(&title);
        if !key.is_empty() && self.keys.insert(key) {
            self.items.push(Resource { title, url });
        }
    }
}

struct Merger {
    index: ModelIndex,
    members: IndexMap<String, Vec<String>>,
    cluster_of: HashMap<String, String>,
    actions: IndexMap<String, CompetencyActions>,
    action_keys: HashSet<(String, String)>,
    resources: IndexMap<String, ResourceList>,
    unmatched: Vec<UnmatchedEntry>,
    stats: MatchStats,
}

impl Merger {
    fn new(model: &CompetencyModel) -> Self {
        let mut members: IndexMap<String, Vec<String>> = model
            .clusters
            .iter()
            .map(|cluster| (cluster.id.clone(), Vec::new()))
            .collect();
        let mut cluster_of = HashMap::new();
        for competency in &model.competencies {
            members
                .entry(competency.cluster_id.clone())
                .or_default()
                .push(competency.id.clone());
            cluster_of.insert(competency.id.clone(), competency.cluster_id.clone());
        }

        Self {
            index: ModelIndex::new(model),
            members,
            cluster_of,
            actions: model
                .competencies
                .iter()
                .map(|c| (c.id.clone(), CompetencyActions::default()))
                .collect(),
            action_keys: HashSet::new(),
            resources: model
                .clusters
                .iter()
                .map(|c| (c.id.clone(), ResourceList::default()))
                .collect(),
            unmatched: Vec::new(),
            stats: MatchStats::default(),
        }
    }

    fn quarantine(&mut self, entry: UnmatchedEntry) {
        match entry.kind {
            EntryKind::Action => self.stats.unmatched_actions += 1,
            EntryKind::Resource => self.stats.unmatched_resources += 1,
        }
        tracing::warn!(
            kind = %entry.kind,
            slide = entry.slide,
            reason = %entry.reason,
            reference = %entry.reference,
            "unmatched entry quarantined"
        );
        self.unmatched.push(entry);
    }

    fn add_action(&mut self, raw: &RawAction) {
        let competency_ids = match self.index.match_action(&raw.reference) {
            MatchResult::Bound { binding: Binding::Competency(id), tier } => {
                tracing::debug!(slide = raw.slide, competency = %id, ?tier, "action bound");
                vec![id]
            }
            MatchResult::Bound { binding: Binding::Cluster(id), tier } => {
                let ids = self.members.get(&id).cloned().unwrap_or_default();
                if ids.is_empty() {
                    self.quarantine(unmatched_action(raw, UnmatchedReason::EmptyCluster, vec![id]));
                    return;
                }
                tracing::debug!(slide = raw.slide, cluster = %id, ?tier, "action bound to every competency of cluster");
                ids
            }
            MatchResult::Unmatched { reason, candidates } => {
                self.quarantine(unmatched_action(raw, reason, candidates));
                return;
            }
        };
        self.stats.matched_actions += 1;

        let text_key = format!("{}|{}|{}", raw.level, raw.action_type, canonicalize(&raw.text));
        for competency_id in &competency_ids {
            if !self.action_keys.insert((competency_id.clone(), text_key.clone())) {
                self.stats.duplicate_actions += 1;
                continue;
            }
            if let Some(actions) = self.actions.get_mut(competency_id) {
                actions
                    .0
                    .entry(raw.level)
                    .or_default()
                    .entry(raw.action_type)
                    .or_default()
                    .push(MatchedAction {
                        competency_id: competency_id.clone(),
                        level_bucket: raw.level,
                        action_type: raw.action_type,
                        text: raw.text.clone(),
                        slide: raw.slide,
                    });
            }
        }

        if raw.action_type == ActionType::Resource {
            let mut clusters: Vec<String> = Vec::new();
            for competency_id in &competency_ids {
                if let Some(cluster_id) = self.cluster_of.get(competency_id) {
                    if !clusters.contains(cluster_id) {
                        clusters.push(cluster_id.clone());
                    }
                }
            }
            let (title, url) = deck::split_url(&raw.text);
            for cluster_id in clusters {
                if let Some(list) = self.resources.get_mut(&cluster_id) {
                    list.push(title.clone(), url.clone());
                }
            }
        }
    }

    fn add_resource(&mut self, raw: &RawResource) {
        let (reason, candidates) = match self.index.match_resource(&raw.cluster_ref) {
            MatchResult::Bound { binding: Binding::Cluster(id), .. } => {
                self.stats.matched_resources += 1;
                if let Some(list) = self.resources.get_mut(&id) {
                    list.push(raw.title.clone(), raw.url.clone());
                }
                return;
            }
            // Resource headings are only matched against clusters.
            MatchResult::Bound { binding: Binding::Competency(id), .. } => (UnmatchedReason::NoMatch, vec![id]),
            MatchResult::Unmatched { reason, candidates } => (reason, candidates),
        };
        self.quarantine(UnmatchedEntry {
            kind: EntryKind::Resource,
            reference: raw.cluster_ref.clone(),
            text: raw.title.clone(),
            line: raw.line.clone(),
            slide: raw.slide,
            reason,
            candidates,
        });
    }

    fn finish(mut self, model: CompetencyModel) -> Normalized {
        let clusters = model
            .clusters
            .into_iter()
            .map(|cluster| MergedCluster {
                competency_ids: self.members.swap_remove(&cluster.id).unwrap_or_default(),
                resources: self
                    .resources
                    .swap_remove(&cluster.id)
                    .map(|list| list.items)
                    .unwrap_or_default(),
                cluster,
            })
            .collect();
        let competencies = model
            .competencies
            .into_iter()
            .map(|competency| MergedCompetency {
                actions: self.actions.swap_remove(&competency.id).unwrap_or_default(),
                competency,
            })
            .collect();

        Normalized {
            dataset: MergedDataset {
                categories: model.categories,
                blocks: model.blocks,
                clusters,
                competencies,
                level_descriptions: model.level_descriptions,
                target_levels: model.target_levels,
                glossary: model.glossary,
                level_scale: model.level_scale,
            },
            unmatched: self.unmatched,
            stats: self.stats,
        }
    }
}

fn unmatched_action(raw: &RawAction, reason: UnmatchedReason, candidates: Vec<String>) -> UnmatchedEntry {
    UnmatchedEntry {
        kind: EntryKind::Action,
        reference: raw.reference.clone(),
        text: raw.text.clone(),
        line: raw.line.clone(),
        slide: raw.slide,
        reason,
        candidates,
    }
}

/// Runs every raw record through the matcher. The model passes through
/// untouched apart from gaining actions and resources.
pub fn normalize(model: CompetencyModel, actions: &[RawAction], resources: &[RawResource]) -> Normalized {
    let mut merger = Merger::new(&model);
    for action in actions {
        merger.add_action(action);
    }
    for resource in resources {
        merger.add_resource(resource);
    }
    let normalized = merger.finish(model);

    tracing::info!(
        matched_actions = normalized.stats.matched_actions,
        unmatched_actions = normalized.stats.unmatched_actions,
        matched_resources = normalized.stats.matched_resources,
        unmatched_resources = normalized.stats.unmatched_resources,
        "normalization finished"
    );
    normalized
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::models::{Block, Cluster, Competency, LevelBucket};

    fn sample_model() -> CompetencyModel {
        CompetencyModel {
            blocks: vec![Block {
                id: "b1".to_string(),
                name: "Цифровые навыки".to_string(),
            }],
            clusters: vec![
                Cluster {
                    id: "cl1".to_string(),
                    name: "Работа с данными".to_string(),
                    block_id: "b1".to_string(),
                },
                Cluster {
                    id: "cl2".to_string(),
                    name: "Управление".to_string(),
                    block_id: "b1".to_string(),
                },
                Cluster {
                    id: "cl3".to_string(),
                    name: "Пустой кластер".to_string(),
                    block_id: "b1".to_string(),
                },
            ],
            competencies: vec![
                competency("c1", "Аналитика данных", "cl1"),
                competency("c4", "Визуализация", "cl1"),
                competency("c2", "Управление проектами", "cl2"),
                competency("c3", "Управление проектами цифровыми", "cl2"),
            ],
            ..CompetencyModel::default()
        }
    }

    fn competency(id: &str, name: &str, cluster_id: &str) -> Competency {
        Competency {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            cluster_id: cluster_id.to_string(),
            required_skills: String::new(),
            priority: String::new(),
        }
    }

    fn raw(reference: &str, level: LevelBucket, action_type: ActionType, text: &str) -> RawAction {
        RawAction {
            reference: reference.to_string(),
            level,
            action_type,
            text: text.to_string(),
            line: text.to_string(),
            slide: 1,
            type_conflict: None,
        }
    }

    fn actions_of<'a>(normalized: &'a Normalized, id: &str) -> &'a CompetencyActions {
        &normalized
            .dataset
            .competencies
            .iter()
            .find(|c| c.competency.id == id)
            .unwrap()
            .actions
    }

    #[test]
    fn heading_with_markers_lands_in_its_bucket() {
        let actions = vec![raw("Аналитика данных:", LevelBucket::Level(2), ActionType::Practice, "Пройти курс по SQL")];
        let normalized = normalize(sample_model(), &actions, &[]);

        let bucket = actions_of(&normalized, "c1").bucket(LevelBucket::Level(2), ActionType::Practice);
        assert_eq!(
            bucket,
            &[MatchedAction {
                competency_id: "c1".to_string(),
                level_bucket: LevelBucket::Level(2),
                action_type: ActionType::Practice,
                text: "Пройти курс по SQL".to_string(),
                slide: 1,
            }]
        );
        assert!(normalized.unmatched.is_empty());
    }

    #[test]
    fn level_specific_action_only_visible_at_that_level() {
        let actions = vec![raw("Аналитика данных", LevelBucket::Level(3), ActionType::Workplace, "Провести аудит")];
        let normalized = normalize(sample_model(), &actions, &[]);
        let stored = actions_of(&normalized, "c1");

        for level in 1..=5u8 {
            assert_eq!(stored.for_level(level).len(), usize::from(level == 3), "level {level}");
        }
    }

    #[test]
    fn all_levels_action_is_stored_once_and_visible_everywhere() {
        let actions = vec![raw("Аналитика данных", LevelBucket::All, ActionType::Learning, "Читать отраслевые обзоры")];
        let normalized = normalize(sample_model(), &actions, &[]);
        let stored = actions_of(&normalized, "c1");

        assert_eq!(stored.len(), 1);
        assert_eq!(stored.0.len(), 1);
        for level in 1..=5 {
            let texts: Vec<&str> = stored.for_level(level).iter().map(|a| a.text.as_str()).collect();
            assert_eq!(texts, vec!["Читать отраслевые обзоры"]);
        }
    }

    #[test]
    fn cluster_heading_fans_out_to_members() {
        let actions = vec![raw("Кластер: Работа с данными", LevelBucket::All, ActionType::Other, "Вести дневник")];
        let normalized = normalize(sample_model(), &actions, &[]);

        assert_eq!(actions_of(&normalized, "c1").len(), 1);
        assert_eq!(actions_of(&normalized, "c4").len(), 1);
        assert!(actions_of(&normalized, "c2").is_empty());
        assert_eq!(normalized.stats.matched_actions, 1);
    }

    #[test]
    fn ambiguous_and_unknown_references_are_quarantined() {
        let actions = vec![
            raw("проектами", LevelBucket::All, ActionType::Practice, "Вести проект"),
            raw("Кибербезопасность", LevelBucket::Level(1), ActionType::Other, "Пройти тренинг"),
            raw("Пустой кластер", LevelBucket::All, ActionType::Other, "Ничего"),
        ];
        let normalized = normalize(sample_model(), &actions, &[]);

        let reasons: Vec<UnmatchedReason> = normalized.unmatched.iter().map(|u| u.reason).collect();
        assert_eq!(
            reasons,
            vec![UnmatchedReason::Ambiguous, UnmatchedReason::NoMatch, UnmatchedReason::EmptyCluster]
        );
        assert_eq!(normalized.unmatched[0].candidates, vec!["c2", "c3"]);
        assert_eq!(normalized.unmatched[0].text, "Вести проект");
        assert!(normalized.dataset.competencies.iter().all(|c| c.actions.is_empty()));
        assert_eq!(normalized.stats.unmatched_actions, 3);
    }

    #[test]
    fn every_raw_action_is_matched_or_quarantined() {
        let actions = vec![
            raw("Аналитика данных", LevelBucket::Level(1), ActionType::Practice, "A"),
            raw("Аналитика данных", LevelBucket::Level(1), ActionType::Practice, "A"),
            raw("проектами", LevelBucket::All, ActionType::Other, "B"),
            raw("Работа с данными", LevelBucket::Level(4), ActionType::Resource, "C — https://example.org/c"),
            raw("Нечто", LevelBucket::All, ActionType::Learning, "D"),
        ];
        let normalized = normalize(sample_model(), &actions, &[]);

        let raw_texts: BTreeSet<&str> = actions.iter().map(|a| a.text.as_str()).collect();
        let mut covered: BTreeSet<&str> = normalized
            .dataset
            .competencies
            .iter()
            .flat_map(|c| c.actions.iter())
            .map(|a| a.text.as_str())
            .collect();
        covered.extend(normalized.unmatched.iter().map(|u| u.text.as_str()));
        assert_eq!(covered, raw_texts);
        assert_eq!(normalized.stats.duplicate_actions, 1);
    }

    #[test]
    fn matched_actions_reference_existing_competencies() {
        let actions = vec![
            raw("Работа с данными", LevelBucket::All, ActionType::Other, "X"),
            raw("Управление проектами", LevelBucket::Level(5), ActionType::Practice, "Y"),
        ];
        let normalized = normalize(sample_model(), &actions, &[]);
        let ids: BTreeSet<&str> = normalized
            .dataset
            .competencies
            .iter()
            .map(|c| c.competency.id.as_str())
            .collect();

        for competency in &normalized.dataset.competencies {
            for action in competency.actions.iter() {
                assert!(ids.contains(action.competency_id.as_str()));
                assert_eq!(action.competency_id, competency.competency.id);
            }
        }
    }

    #[test]
    fn cluster_resources_merge_without_duplicates() {
        let actions = vec![raw(
            "Работа с данными",
            LevelBucket::All,
            ActionType::Resource,
            "Курс «SQL» — https://example.org/sql",
        )];
        let resources = vec![
            RawResource {
                cluster_ref: "Список ресурсов: работа с данными".to_string(),
                title: "курс SQL".to_string(),
                url: Some("https://mirror.example.org/sql".to_string()),
                line: "2. курс SQL".to_string(),
                slide: 8,
            },
            RawResource {
                cluster_ref: "Работа с данными".to_string(),
                title: "Книга «Данные»".to_string(),
                url: None,
                line: "3. Книга «Данные»".to_string(),
                slide: 8,
            },
            RawResource {
                cluster_ref: "Маркетинг".to_string(),
                title: "Книга".to_string(),
                url: None,
                line: "1. Книга".to_string(),
                slide: 9,
            },
        ];
        let normalized = normalize(sample_model(), &actions, &resources);

        let cluster = &normalized.dataset.clusters[0];
        assert_eq!(cluster.cluster.id, "cl1");
        assert_eq!(cluster.competency_ids, vec!["c1", "c4"]);
        assert_eq!(
            cluster.resources,
            vec![
                Resource {
                    title: "Курс «SQL»".to_string(),
                    url: Some("https://example.org/sql".to_string()),
                },
                Resource {
                    title: "Книга «Данные»".to_string(),
                    url: None,
                },
            ]
        );
        assert_eq!(normalized.unmatched.len(), 1);
        assert_eq!(normalized.unmatched[0].kind, EntryKind::Resource);
        assert_eq!(normalized.stats.matched_resources, 2);
    }

    #[test]
    fn normalizing_twice_gives_identical_documents() {
        let actions = vec![
            raw("Аналитика данных", LevelBucket::Level(2), ActionType::Practice, "A"),
            raw("Управление", LevelBucket::All, ActionType::Workplace, "B"),
            raw("проектами", LevelBucket::All, ActionType::Other, "C"),
        ];
        let first = normalize(sample_model(), &actions, &[]);
        let second = normalize(sample_model(), &actions, &[]);

        assert_eq!(
            serde_json::to_string(&first.dataset).unwrap(),
            serde_json::to_string(&second.dataset).unwrap()
        );
        assert_eq!(
            serde_json::to_string(&first.unmatched).unwrap(),
            serde_json::to_string(&second.unmatched).unwrap()
        );
    }
}
