use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::integrity::IntegrityReport;
use crate::models::{ActionType, LevelBucket, MergedDataset};
use crate::pipeline::PipelineOutput;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTypeSummary {
    pub action_type: ActionType,
    pub count: usize,
}

pub fn summarize_by_type(dataset: &MergedDataset) -> Vec<ActionTypeSummary> {
    let mut map: BTreeMap<ActionType, usize> = BTreeMap::new();

    for competency in &dataset.competencies {
        for action in competency.actions.iter() {
            *map.entry(action.action_type).or_insert(0) += 1;
        }
    }

    let mut summaries: Vec<ActionTypeSummary> = map
        .into_iter()
        .map(|(action_type, count)| ActionTypeSummary { action_type, count })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count));
    summaries
}

/// Stored action count per bucket, in output order, zero buckets included.
pub fn summarize_by_bucket(dataset: &MergedDataset) -> Vec<(LevelBucket, usize)> {
    LevelBucket::all_buckets()
        .map(|bucket| {
            let count = dataset
                .competencies
                .iter()
                .flat_map(|competency| {
                    ActionType::ALL
                        .into_iter()
                        .map(move |action_type| competency.actions.bucket(bucket, action_type).len())
                })
                .sum();
            (bucket, count)
        })
        .collect()
}

/// Actions a reader sees when browsing `level`, shared "all" entries included.
pub fn visible_at_level(dataset: &MergedDataset, level: u8) -> usize {
    dataset
        .competencies
        .iter()
        .map(|competency| competency.actions.for_level(level).len())
        .sum()
}

pub fn build_report(generated_on: NaiveDate, output: &PipelineOutput, integrity: &IntegrityReport) -> String {
    let dataset = &output.dataset;
    let stats = &output.stats;
    let mut report = String::new();

    let _ = writeln!(report, "# Competency Pipeline Run Report");
    let _ = writeln!(report, "Generated on {generated_on}");
    let _ = writeln!(report);
    let _ = writeln!(report, "## Model");
    let _ = writeln!(report, "- Categories: {}", dataset.categories.len());
    let _ = writeln!(report, "- Blocks: {}", dataset.blocks.len());
    let _ = writeln!(report, "- Clusters: {}", dataset.clusters.len());
    let _ = writeln!(report, "- Competencies: {}", dataset.competencies.len());
    let _ = writeln!(report, "- Level descriptions: {}", dataset.level_descriptions.len());
    let _ = writeln!(report, "- Glossary terms: {}", dataset.glossary.len());

    let _ = writeln!(report);
    let _ = writeln!(report, "## Matching");
    let _ = writeln!(
        report,
        "- Raw actions: {} ({} matched, {} duplicates, {} quarantined)",
        output.raw_actions.len(),
        stats.matched_actions,
        stats.duplicate_actions,
        stats.unmatched_actions
    );
    let _ = writeln!(
        report,
        "- Raw resources: {} ({} matched, {} quarantined)",
        output.raw_resources.len(),
        stats.matched_resources,
        stats.unmatched_resources
    );

    let _ = writeln!(report);
    let _ = writeln!(report, "## Action Mix");
    let summaries = summarize_by_type(dataset);
    if summaries.is_empty() {
        let _ = writeln!(report, "No actions matched.");
    } else {
        for summary in &summaries {
            let _ = writeln!(report, "- {}: {} actions", summary.action_type, summary.count);
        }
        for (bucket, count) in summarize_by_bucket(dataset) {
            match bucket {
                LevelBucket::Level(level) => {
                    let _ = writeln!(
                        report,
                        "- level {level}: {count} actions ({} visible)",
                        visible_at_level(dataset, level)
                    );
                }
                LevelBucket::All => {
                    let _ = writeln!(report, "- all levels: {count} actions");
                }
            }
        }
    }

    let _ = writeln!(report);
    let _ = writeln!(report, "## Unmatched Entries");
    if output.unmatched.is_empty() {
        let _ = writeln!(report, "Every action and resource was matched.");
    } else {
        for entry in &output.unmatched {
            let _ = write!(
                report,
                "- [{}] slide {}: '{}' under '{}' ({})",
                entry.kind, entry.slide, entry.line, entry.reference, entry.reason
            );
            if !entry.candidates.is_empty() {
                let _ = write!(report, ", candidates: {}", entry.candidates.join(", "));
            }
            let _ = writeln!(report);
        }
    }

    let _ = writeln!(report);
    let _ = writeln!(report, "## Warnings");
    if output.warnings.is_empty() {
        let _ = writeln!(report, "No warnings.");
    } else {
        for warning in &output.warnings {
            let _ = writeln!(report, "- {}: {}", warning.stage, warning.message);
        }
    }

    let _ = writeln!(report);
    report.push_str(&render_integrity(integrity));
    report
}

pub fn render_integrity(integrity: &IntegrityReport) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "## Data Integrity");
    if integrity.violations.is_empty() {
        let _ = writeln!(output, "All references resolve.");
    } else {
        for violation in &integrity.violations {
            let _ = writeln!(output, "- VIOLATION: {violation}");
        }
    }

    let _ = writeln!(
        output,
        "- Missing target levels: {}",
        integrity.missing_targets.len()
    );
    for (category, competency) in integrity.missing_targets.iter().take(10) {
        let _ = writeln!(output, "  - {category} / {competency}");
    }
    let _ = writeln!(
        output,
        "- Missing level descriptions: {}",
        integrity.missing_descriptions.len()
    );
    for (competency, level) in integrity.missing_descriptions.iter().take(10) {
        let _ = writeln!(output, "  - {competency} level {level}");
    }
    let _ = writeln!(
        output,
        "- Competencies without actions: {}",
        integrity.competencies_without_actions.len()
    );
    for id in &integrity.competencies_without_actions {
        let _ = writeln!(output, "  - {id}");
    }
    let _ = writeln!(
        output,
        "- Clusters without resources: {}",
        integrity.clusters_without_resources.len()
    );
    for id in &integrity.clusters_without_resources {
        let _ = writeln!(output, "  - {id}");
    }

    output
}
