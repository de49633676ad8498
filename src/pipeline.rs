//! Runs the four stages in order and writes their documents.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

use crate::actions::extract_actions;
use crate::error::ExtractError;
use crate::models::{CompetencyModel, MergedDataset, RawAction, RawResource, UnmatchedEntry, Warning};
use crate::normalize::{normalize, MatchStats};
use crate::resources::extract_resources;
use crate::source::{self, DeckSource, Sheet, SheetSource, Slide};
use crate::workbook::extract_model;

pub const MODEL_FILE: &str = "model.json";
pub const RAW_ACTIONS_FILE: &str = "actions.raw.json";
pub const RAW_RESOURCES_FILE: &str = "resources.raw.json";
pub const DATA_FILE: &str = "data.json";
pub const UNMATCHED_FILE: &str = "unmatched.json";

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub model: CompetencyModel,
    pub raw_actions: Vec<RawAction>,
    pub raw_resources: Vec<RawResource>,
    pub dataset: MergedDataset,
    pub unmatched: Vec<UnmatchedEntry>,
    pub stats: MatchStats,
    pub warnings: Vec<Warning>,
}

/// The model is extracted completely before anything is matched against it.
pub fn run(sheets: &[Sheet], slides: &[Slide]) -> Result<PipelineOutput, ExtractError> {
    let extraction = extract_model(sheets)?;
    let mut warnings = extraction.warnings;

    let actions = extract_actions(slides);
    warnings.extend(actions.warnings);
    let resources = extract_resources(slides);
    warnings.extend(resources.warnings);

    let normalized = normalize(extraction.model.clone(), &actions.actions, &resources.resources);

    Ok(PipelineOutput {
        model: extraction.model,
        raw_actions: actions.actions,
        raw_resources: resources.resources,
        dataset: normalized.dataset,
        unmatched: normalized.unmatched,
        stats: normalized.stats,
        warnings,
    })
}

pub fn read_sheets(workbook: &Path) -> anyhow::Result<Vec<Sheet>> {
    source::open_workbook(workbook)
        .read_sheets()
        .with_context(|| format!("failed to read workbook {}", workbook.display()))
}

pub fn read_slides(deck: &Path) -> anyhow::Result<Vec<Slide>> {
    source::open_deck(deck)
        .read_slides()
        .with_context(|| format!("failed to read slide deck {}", deck.display()))
}

/// Reads both sources, runs every stage, and only then writes the documents.
pub fn build(workbook: &Path, deck: &Path, out_dir: &Path) -> anyhow::Result<PipelineOutput> {
    let sheets = read_sheets(workbook)?;
    let slides = read_slides(deck)?;
    let output = run(&sheets, &slides).context("model extraction failed; nothing was written")?;
    write_outputs(&output, out_dir)?;
    Ok(output)
}

pub fn write_outputs(output: &PipelineOutput, out_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let documents = [
        (MODEL_FILE, to_json(&output.model)?),
        (RAW_ACTIONS_FILE, to_json(&output.raw_actions)?),
        (RAW_RESOURCES_FILE, to_json(&output.raw_resources)?),
        (DATA_FILE, to_json(&output.dataset)?),
        (UNMATCHED_FILE, to_json(&output.unmatched)?),
    ];

    let mut written = Vec::with_capacity(documents.len());
    for (name, body) in documents {
        let path = out_dir.join(name);
        std::fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
        tracing::info!(path = %path.display(), "document written");
        written.push(path);
    }
    Ok(written)
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, to_json(value)?).with_context(|| format!("failed to write {}", path.display()))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<String> {
    let mut body = serde_json::to_string_pretty(value)?;
    body.push('\n');
    Ok(body)
}

pub fn load_dataset(path: &Path) -> anyhow::Result<MergedDataset> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid merged dataset {}", path.display()))
}
