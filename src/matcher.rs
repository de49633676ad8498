//! Binding free-text references to model entities.
//!
//! Tiers are tried in order and the first success wins:
//! 1. exact canonical key of a competency (actions) or cluster (resources),
//! 2. exact canonical key of a cluster, binding every competency in it (actions),
//! 3. unique containment in either direction across all candidate keys,
//! 4. otherwise no match.
//!
//! Ties at any tier are never broken; they come back as `Ambiguous`.

use crate::canonical::canonicalize;
use crate::models::{CompetencyModel, UnmatchedReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    ExactCompetency,
    ExactCluster,
    Containment,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Competency(String),
    Cluster(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Bound { binding: Binding, tier: MatchTier },
    Unmatched { reason: UnmatchedReason, candidates: Vec<String> },
}

impl MatchResult {
    fn unmatched(reason: UnmatchedReason, candidates: Vec<String>) -> Self {
        MatchResult::Unmatched { reason, candidates }
    }
}

struct Keyed {
    key: String,
    binding: Binding,
}

/// Canonical keys of every competency and cluster. Must be built from the
/// complete model: ambiguity can only be judged against the full name set.
pub struct ModelIndex {
    competencies: Vec<Keyed>,
    clusters: Vec<Keyed>,
}

impl ModelIndex {
    pub fn new(model: &CompetencyModel) -> Self {
        let competencies = model
            .competencies
            .iter()
            .map(|c| Keyed {
                key: canonicalize(&c.name),
                binding: Binding::Competency(c.id.clone()),
            })
            .collect();
        let clusters = model
            .clusters
            .iter()
            .map(|c| Keyed {
                key: canonicalize(&c.name),
                binding: Binding::Cluster(c.id.clone()),
            })
            .collect();
        Self { competencies, clusters }
    }

    /// Resolves an action heading to a competency or a whole cluster.
    pub fn match_action(&self, reference: &str) -> MatchResult {
        let key = canonicalize(reference);
        if key.is_empty() {
            return MatchResult::unmatched(UnmatchedReason::NoMatch, Vec::new());
        }
        if let Some(result) = exact(&self.competencies, &key, MatchTier::ExactCompetency) {
            return result;
        }
        if let Some(result) = exact(&self.clusters, &key, MatchTier::ExactCluster) {
            return result;
        }
        containment(self.competencies.iter().chain(&self.clusters), &key)
    }

    /// Resolves a resource-list heading to a cluster.
    pub fn match_resource(&self, reference: &str) -> MatchResult {
        let key = canonicalize(reference);
        if key.is_empty() {
            return MatchResult::unmatched(UnmatchedReason::NoMatch, Vec::new());
        }
        if let Some(result) = exact(&self.clusters, &key, MatchTier::ExactCluster) {
            return result;
        }
        containment(self.clusters.iter(), &key)
    }
}

fn binding_id(binding: &Binding) -> String {
    match binding {
        Binding::Competency(id) | Binding::Cluster(id) => id.clone(),
    }
}

fn exact(entries: &[Keyed], key: &str, tier: MatchTier) -> Option<MatchResult> {
    let hits: Vec<&Keyed> = entries.iter().filter(|entry| entry.key == key).collect();
    match hits.as_slice() {
        [] => None,
        [single] => Some(MatchResult::Bound {
            binding: single.binding.clone(),
            tier,
        }),
        many => Some(MatchResult::unmatched(
            UnmatchedReason::Ambiguous,
            many.iter().map(|entry| binding_id(&entry.binding)).collect(),
        )),
    }
}

fn containment<'a>(entries: impl Iterator<Item = &'a Keyed>, key: &str) -> MatchResult {
    let hits: Vec<&Keyed> = entries
        .filter(|entry| !entry.key.is_empty() && (entry.key.contains(key) || key.contains(entry.key.as_str())))
        .collect();
    match hits.as_slice() {
        [] => MatchResult::unmatched(UnmatchedReason::NoMatch, Vec::new()),
        [single] => MatchResult::Bound {
            binding: single.binding.clone(),
            tier: MatchTier::Containment,
        },
        many => MatchResult::unmatched(
            UnmatchedReason::Ambiguous,
            many.iter().map(|entry| binding_id(&entry.binding)).collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cluster, Competency};

    fn model(clusters: &[(&str, &str)], competencies: &[(&str, &str, &str)]) -> CompetencyModel {
        CompetencyModel {
            clusters: clusters
                .iter()
                .map(|(id, name)| Cluster {
                    id: id.to_string(),
                    name: name.to_string(),
                    block_id: "b1".to_string(),
                })
                .collect(),
            competencies: competencies
                .iter()
                .map(|(id, name, cluster_id)| Competency {
                    id: id.to_string(),
                    name: name.to_string(),
                    description: String::new(),
                    cluster_id: cluster_id.to_string(),
                    required_skills: String::new(),
                    priority: String::new(),
                })
                .collect(),
            ..CompetencyModel::default()
        }
    }

    fn sample() -> ModelIndex {
        ModelIndex::new(&model(
            &[("cl1", "Работа с данными"), ("cl2", "Управление")],
            &[
                ("c1", "Аналитика данных", "cl1"),
                ("c2", "Управление проектами", "cl2"),
                ("c3", "Управление проектами цифровыми", "cl2"),
            ],
        ))
    }

    #[test]
    fn exact_competency_wins() {
        assert_eq!(
            sample().match_action("Аналитика данных:"),
            MatchResult::Bound {
                binding: Binding::Competency("c1".to_string()),
                tier: MatchTier::ExactCompetency
            }
        );
    }

    #[test]
    fn exact_cluster_binds_cluster() {
        assert_eq!(
            sample().match_action("Кластер: Работа с данными"),
            MatchResult::Bound {
                binding: Binding::Cluster("cl1".to_string()),
                tier: MatchTier::ExactCluster
            }
        );
    }

    #[test]
    fn exact_match_beats_containment() {
        // "управление проектами" is also contained in c3's key.
        assert_eq!(
            sample().match_action("Управление проектами"),
            MatchResult::Bound {
                binding: Binding::Competency("c2".to_string()),
                tier: MatchTier::ExactCompetency
            }
        );
    }

    #[test]
    fn ambiguous_containment_is_quarantined() {
        match sample().match_action("проектами") {
            MatchResult::Unmatched { reason, candidates } => {
                assert_eq!(reason, UnmatchedReason::Ambiguous);
                assert_eq!(candidates, vec!["c2", "c3"]);
            }
            other => panic!("expected ambiguity, got {other:?}"),
        }
    }

    #[test]
    fn unique_containment_binds() {
        assert_eq!(
            sample().match_action("Аналитика данных и BI"),
            MatchResult::Bound {
                binding: Binding::Competency("c1".to_string()),
                tier: MatchTier::Containment
            }
        );
    }

    #[test]
    fn unknown_reference_is_no_match() {
        assert_eq!(
            sample().match_action("Кибербезопасность"),
            MatchResult::Unmatched {
                reason: UnmatchedReason::NoMatch,
                candidates: vec![]
            }
        );
        assert_eq!(
            sample().match_action(" : "),
            MatchResult::Unmatched {
                reason: UnmatchedReason::NoMatch,
                candidates: vec![]
            }
        );
    }

    #[test]
    fn resources_only_consider_clusters() {
        let index = sample();
        assert_eq!(
            index.match_resource("Список ресурсов: Работа с данными"),
            MatchResult::Bound {
                binding: Binding::Cluster("cl1".to_string()),
                tier: MatchTier::ExactCluster
            }
        );
        assert_eq!(
            index.match_resource("Аналитика данных"),
            MatchResult::Unmatched {
                reason: UnmatchedReason::NoMatch,
                candidates: vec![]
            }
        );
    }

    #[test]
    fn duplicate_names_are_ambiguous_even_when_exact() {
        let index = ModelIndex::new(&model(
            &[("cl1", "Данные")],
            &[("a", "Этика", "cl1"), ("b", "этика.", "cl1")],
        ));
        assert!(matches!(
            index.match_action("Этика"),
            MatchResult::Unmatched { reason: UnmatchedReason::Ambiguous, .. }
        ));
    }
}
