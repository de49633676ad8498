use std::collections::HashSet;

use crate::models::MergedDataset;

/// Gaps and broken references found in a merged dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// (category id, competency id) pairs without a target level.
    pub missing_targets: Vec<(String, String)>,
    pub missing_descriptions: Vec<(String, u8)>,
    pub competencies_without_actions: Vec<String>,
    pub clusters_without_resources: Vec<String>,
    /// Dangling ids. Any entry here means the dataset must not be published.
    pub violations: Vec<String>,
}

impl IntegrityReport {
    pub fn gap_count(&self) -> usize {
        self.missing_targets.len()
            + self.missing_descriptions.len()
            + self.competencies_without_actions.len()
            + self.clusters_without_resources.len()
    }

    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

pub fn check(dataset: &MergedDataset) -> IntegrityReport {
    let mut report = IntegrityReport::default();

    let block_ids: HashSet<&str> = dataset.blocks.iter().map(|b| b.id.as_str()).collect();
    let cluster_ids: HashSet<&str> = dataset.clusters.iter().map(|c| c.cluster.id.as_str()).collect();
    let competency_ids: HashSet<&str> = dataset
        .competencies
        .iter()
        .map(|c| c.competency.id.as_str())
        .collect();
    let category_ids: HashSet<&str> = dataset.categories.iter().map(|c| c.id.as_str()).collect();

    for cluster in &dataset.clusters {
        if !block_ids.contains(cluster.cluster.block_id.as_str()) {
            report.violations.push(format!(
                "cluster '{}' references missing block '{}'",
                cluster.cluster.id, cluster.cluster.block_id
            ));
        }
        for id in &cluster.competency_ids {
            if !competency_ids.contains(id.as_str()) {
                report
                    .violations
                    .push(format!("cluster '{}' lists missing competency '{id}'", cluster.cluster.id));
            }
        }
        if cluster.resources.is_empty() {
            report.clusters_without_resources.push(cluster.cluster.id.clone());
        }
    }

    for entry in &dataset.competencies {
        let competency = &entry.competency;
        if !cluster_ids.contains(competency.cluster_id.as_str()) {
            report.violations.push(format!(
                "competency '{}' references missing cluster '{}'",
                competency.id, competency.cluster_id
            ));
        }
        for action in entry.actions.iter() {
            if action.competency_id != competency.id {
                report.violations.push(format!(
                    "action '{}' stored under '{}' but bound to '{}'",
                    action.text, competency.id, action.competency_id
                ));
            }
        }
        if entry.actions.is_empty() {
            report.competencies_without_actions.push(competency.id.clone());
        }

        for level in 1..=5u8 {
            let described = dataset
                .level_descriptions
                .iter()
                .any(|d| d.competency_id == competency.id && d.level == level);
            if !described {
                report.missing_descriptions.push((competency.id.clone(), level));
            }
        }

        for category in &dataset.categories {
            let has_target = dataset
                .target_levels
                .get(&category.id)
                .is_some_and(|targets| targets.contains_key(&competency.id));
            if !has_target {
                report
                    .missing_targets
                    .push((category.id.clone(), competency.id.clone()));
            }
        }
    }

    for (category_id, targets) in &dataset.target_levels {
        if !category_ids.contains(category_id.as_str()) {
            report
                .violations
                .push(format!("target levels reference missing category '{category_id}'"));
        }
        for competency_id in targets.keys() {
            if !competency_ids.contains(competency_id.as_str()) {
                report.violations.push(format!(
                    "target level for '{category_id}' references missing competency '{competency_id}'"
                ));
            }
        }
    }

    report
}
