//! Model extractor: workbook sheets to [`CompetencyModel`].
//!
//! Every sheet's header is validated before its rows are read. Structural
//! problems abort with [`ExtractError`]; blank rows are skipped with a warning.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::canonical::{canonicalize, slug};
use crate::error::ExtractError;
use crate::models::{
    Block, Category, Cluster, Competency, CompetencyModel, GlossaryTerm, LevelDescription,
    LevelScaleEntry, Stage, Warning,
};
use crate::source::Sheet;

pub const CATEGORIES: &str = "categories";
pub const BLOCKS: &str = "blocks";
pub const CLUSTERS: &str = "clusters";
pub const COMPETENCIES: &str = "competencies";
pub const LEVEL_DESCRIPTIONS: &str = "level_descriptions";
pub const TARGET_LEVELS: &str = "target_levels";
pub const GLOSSARY: &str = "glossary";
pub const LEVEL_SCALE: &str = "level_scale";

#[derive(Debug, Clone)]
pub struct ModelExtraction {
    pub model: CompetencyModel,
    pub warnings: Vec<Warning>,
}

/// A sheet whose header row has been checked against the required columns.
struct Table<'a> {
    name: &'a str,
    header: &'a [String],
    columns: HashMap<String, usize>,
    rows: &'a [Vec<String>],
}

impl<'a> Table<'a> {
    fn open(sheets: &'a [Sheet], name: &str, required: &[&str]) -> Result<Self, ExtractError> {
        let sheet = find_sheet(sheets, name).ok_or_else(|| ExtractError::MissingSheet {
            sheet: name.to_string(),
        })?;
        Self::from_sheet(sheet, required)
    }

    fn from_sheet(sheet: &'a Sheet, required: &[&str]) -> Result<Self, ExtractError> {
        let (header, rows): (&[String], &[Vec<String>]) = match sheet.rows.split_first() {
            Some((header, rows)) => (header, rows),
            None => (&[], &[]),
        };
        let mut columns = HashMap::new();
        for (idx, cell) in header.iter().enumerate() {
            let key = canonicalize(cell);
            if !key.is_empty() {
                columns.entry(key).or_insert(idx);
            }
        }

        for column in required {
            if !columns.contains_key(&canonicalize(column)) {
                return Err(ExtractError::MissingColumn {
                    sheet: sheet.name.clone(),
                    column: column.to_string(),
                });
            }
        }

        Ok(Self {
            name: &sheet.name,
            header,
            columns,
            rows,
        })
    }

    fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(&canonicalize(column))
    }

    /// Data rows paired with their 1-based sheet row number.
    fn rows(&self) -> impl Iterator<Item = (usize, &'a Vec<String>)> {
        let rows = self.rows;
        rows.iter().enumerate().map(|(idx, row)| (idx + 2, row))
    }

    fn cell<'r>(&self, row: &'r [String], column: &str) -> &'r str {
        self.columns
            .get(&canonicalize(column))
            .and_then(|idx| row.get(*idx))
            .map(|value| value.trim())
            .unwrap_or("")
    }

    fn dangling(&self, row: usize, entity: &'static str, reference: &str) -> ExtractError {
        ExtractError::DanglingReference {
            sheet: self.name.to_string(),
            row,
            entity,
            reference: reference.to_string(),
        }
    }
}

fn find_sheet<'a>(sheets: &'a [Sheet], name: &str) -> Option<&'a Sheet> {
    let key = canonicalize(name);
    sheets.iter().find(|sheet| canonicalize(&sheet.name) == key)
}

/// Ids of one entity family, resolvable by id or by canonical name.
#[derive(Default)]
struct Registry {
    ids: HashSet<String>,
    names: HashMap<String, String>,
}

impl Registry {
    fn insert(&mut self, sheet: &str, row: usize, id: &str, name: &str) -> Result<(), ExtractError> {
        if !self.ids.insert(id.to_string()) {
            return Err(ExtractError::DuplicateId {
                sheet: sheet.to_string(),
                row,
                id: id.to_string(),
            });
        }
        self.names.entry(canonicalize(name)).or_insert_with(|| id.to_string());
        Ok(())
    }

    fn resolve(&self, reference: &str) -> Option<String> {
        let reference = reference.trim();
        if reference.is_empty() {
            return None;
        }
        if self.ids.contains(reference) {
            return Some(reference.to_string());
        }
        if let Some(id) = self.names.get(&canonicalize(reference)) {
            return Some(id.clone());
        }
        let slugged = slug(reference);
        self.ids.contains(&slugged).then_some(slugged)
    }
}

/// Reads `id`/`name` for an entity row; `None` (with a warning) when the name is blank.
fn identity(table: &Table<'_>, row_no: usize, row: &[String], warnings: &mut Vec<Warning>) -> Option<(String, String)> {
    let name = table.cell(row, "name");
    let explicit = if table.has_column("id") { table.cell(row, "id") } else { "" };
    let id = if explicit.is_empty() { slug(name) } else { explicit.to_string() };

    if name.is_empty() || id.is_empty() {
        if row.iter().any(|cell| !cell.trim().is_empty()) {
            warnings.push(Warning::new(
                Stage::Model,
                format!("sheet '{}' row {row_no}: blank name, row skipped", table.name),
            ));
        }
        return None;
    }
    Some((id, name.to_string()))
}

/// Accepts `3` and `3.0`; anything else non-empty is fatal.
fn parse_level(table: &Table<'_>, row: usize, column: &str, value: &str) -> Result<u8, ExtractError> {
    let invalid = || ExtractError::InvalidLevel {
        sheet: table.name.to_string(),
        row,
        column: column.to_string(),
        value: value.to_string(),
    };
    let number: f64 = value.replace(',', ".").parse().map_err(|_| invalid())?;
    if number.fract() != 0.0 || !(1.0..=5.0).contains(&number) {
        return Err(invalid());
    }
    Ok(number as u8)
}

pub fn extract_model(sheets: &[Sheet]) -> Result<ModelExtraction, ExtractError> {
    let mut warnings = Vec::new();
    let mut model = CompetencyModel::default();

    // Validate every header before any row is processed.
    let categories = Table::open(sheets, CATEGORIES, &["name"])?;
    let blocks = Table::open(sheets, BLOCKS, &["name"])?;
    let clusters = Table::open(sheets, CLUSTERS, &["name", "block"])?;
    let competencies = Table::open(sheets, COMPETENCIES, &["name", "cluster"])?;
    let descriptions = Table::open(sheets, LEVEL_DESCRIPTIONS, &["competency", "level", "text"])?;
    let targets = open_target_table(sheets)?;
    let glossary = Table::open(sheets, GLOSSARY, &["term", "definition"])?;
    let scale = find_sheet(sheets, LEVEL_SCALE)
        .map(|sheet| Table::from_sheet(sheet, &["level", "description"]))
        .transpose()?;

    let mut category_ids = Registry::default();
    for (row_no, row) in categories.rows() {
        let Some((id, name)) = identity(&categories, row_no, row, &mut warnings) else {
            continue;
        };
        category_ids.insert(categories.name, row_no, &id, &name)?;
        model.categories.push(Category { id, name });
    }

    let mut block_ids = Registry::default();
    for (row_no, row) in blocks.rows() {
        let Some((id, name)) = identity(&blocks, row_no, row, &mut warnings) else {
            continue;
        };
        block_ids.insert(blocks.name, row_no, &id, &name)?;
        model.blocks.push(Block { id, name });
    }

    let mut cluster_ids = Registry::default();
    for (row_no, row) in clusters.rows() {
        let Some((id, name)) = identity(&clusters, row_no, row, &mut warnings) else {
            continue;
        };
        let block = clusters.cell(row, "block");
        let block_id = block_ids
            .resolve(block)
            .ok_or_else(|| clusters.dangling(row_no, "block", block))?;
        cluster_ids.insert(clusters.name, row_no, &id, &name)?;
        model.clusters.push(Cluster { id, name, block_id });
    }

    let mut competency_ids = Registry::default();
    for (row_no, row) in competencies.rows() {
        let Some((id, name)) = identity(&competencies, row_no, row, &mut warnings) else {
            continue;
        };
        let cluster = competencies.cell(row, "cluster");
        let cluster_id = cluster_ids
            .resolve(cluster)
            .ok_or_else(|| competencies.dangling(row_no, "cluster", cluster))?;
        competency_ids.insert(competencies.name, row_no, &id, &name)?;
        model.competencies.push(Competency {
            id,
            name,
            description: competencies.cell(row, "description").to_string(),
            cluster_id,
            required_skills: competencies.cell(row, "required_skills").to_string(),
            priority: competencies.cell(row, "priority").to_string(),
        });
    }

    let mut seen_descriptions: HashMap<(String, u8), usize> = HashMap::new();
    for (row_no, row) in descriptions.rows() {
        let competency = descriptions.cell(row, "competency");
        let text = descriptions.cell(row, "text");
        if competency.is_empty() || text.is_empty() {
            if row.iter().any(|cell| !cell.trim().is_empty()) {
                warnings.push(Warning::new(
                    Stage::Model,
                    format!("sheet '{}' row {row_no}: blank competency or text, row skipped", descriptions.name),
                ));
            }
            continue;
        }
        let competency_id = competency_ids
            .resolve(competency)
            .ok_or_else(|| descriptions.dangling(row_no, "competency", competency))?;
        let level = parse_level(&descriptions, row_no, "level", descriptions.cell(row, "level"))?;

        let entry = LevelDescription {
            competency_id: competency_id.clone(),
            level,
            text: text.to_string(),
        };
        match seen_descriptions.get(&(competency_id.clone(), level)) {
            Some(&idx) => {
                warnings.push(Warning::new(
                    Stage::Model,
                    format!("sheet '{}' row {row_no}: level {level} of '{competency_id}' described twice, last one kept", descriptions.name),
                ));
                model.level_descriptions[idx] = entry;
            }
            None => {
                seen_descriptions.insert((competency_id, level), model.level_descriptions.len());
                model.level_descriptions.push(entry);
            }
        }
    }

    model.target_levels = extract_targets(&targets, &category_ids, &competency_ids, &model, &mut warnings)?;

    for (row_no, row) in glossary.rows() {
        let term = glossary.cell(row, "term");
        let key = canonicalize(term);
        if key.is_empty() {
            if row.iter().any(|cell| !cell.trim().is_empty()) {
                warnings.push(Warning::new(
                    Stage::Model,
                    format!("sheet '{}' row {row_no}: blank term, row skipped", glossary.name),
                ));
            }
            continue;
        }
        let entry = GlossaryTerm {
            term: term.to_string(),
            definition: glossary.cell(row, "definition").to_string(),
        };
        if model.glossary.insert(key, entry).is_some() {
            warnings.push(Warning::new(
                Stage::Model,
                format!("sheet '{}' row {row_no}: duplicate term '{term}', last definition kept", glossary.name),
            ));
        }
    }

    if let Some(scale) = scale {
        for (row_no, row) in scale.rows() {
            let level = scale.cell(row, "level");
            if level.is_empty() {
                continue;
            }
            model.level_scale.push(LevelScaleEntry {
                level: parse_level(&scale, row_no, "level", level)?,
                description: scale.cell(row, "description").to_string(),
            });
        }
    }

    tracing::info!(
        categories = model.categories.len(),
        blocks = model.blocks.len(),
        clusters = model.clusters.len(),
        competencies = model.competencies.len(),
        glossary = model.glossary.len(),
        "competency model extracted"
    );

    Ok(ModelExtraction { model, warnings })
}

/// Rows are competencies and columns categories, or the transpose when the
/// first header cell says `category`.
fn open_target_table(sheets: &[Sheet]) -> Result<(Table<'_>, bool), ExtractError> {
    let sheet = find_sheet(sheets, TARGET_LEVELS).ok_or_else(|| ExtractError::MissingSheet {
        sheet: TARGET_LEVELS.to_string(),
    })?;
    let first = sheet
        .rows
        .first()
        .and_then(|header| header.first())
        .map(|cell| canonicalize(cell))
        .unwrap_or_default();
    let transposed = first == "category";
    let axis = if transposed { "category" } else { "competency" };
    Ok((Table::from_sheet(sheet, &[axis])?, transposed))
}

fn extract_targets(
    (table, transposed): &(Table<'_>, bool),
    category_ids: &Registry,
    competency_ids: &Registry,
    model: &CompetencyModel,
    warnings: &mut Vec<Warning>,
) -> Result<IndexMap<String, IndexMap<String, u8>>, ExtractError> {
    let (row_entity, row_ids, column_entity, column_ids) = if *transposed {
        ("category", category_ids, "competency", competency_ids)
    } else {
        ("competency", competency_ids, "category", category_ids)
    };
    let row_axis = table.columns.get(row_entity).copied();

    let mut axis = Vec::new();
    for (idx, cell) in table.header.iter().enumerate() {
        if Some(idx) == row_axis || cell.trim().is_empty() {
            continue;
        }
        let id = column_ids
            .resolve(cell)
            .ok_or_else(|| table.dangling(1, column_entity, cell))?;
        axis.push((idx, cell.trim(), id));
    }

    let mut targets: IndexMap<String, IndexMap<String, u8>> = model
        .categories
        .iter()
        .map(|category| (category.id.clone(), IndexMap::new()))
        .collect();

    for (row_no, row) in table.rows() {
        let reference = table.cell(row, row_entity);
        if reference.is_empty() {
            if row.iter().any(|cell| !cell.trim().is_empty()) {
                warnings.push(Warning::new(
                    Stage::Model,
                    format!("sheet '{}' row {row_no}: blank {row_entity}, row skipped", table.name),
                ));
            }
            continue;
        }
        let row_id = row_ids
            .resolve(reference)
            .ok_or_else(|| table.dangling(row_no, row_entity, reference))?;

        for (idx, column, column_id) in &axis {
            let value = row.get(*idx).map(|v| v.trim()).unwrap_or("");
            if value.is_empty() {
                continue;
            }
            let level = parse_level(table, row_no, column, value)?;
            let (category_id, competency_id) = if *transposed {
                (row_id.clone(), column_id.clone())
            } else {
                (column_id.clone(), row_id.clone())
            };
            targets.entry(category_id).or_default().insert(competency_id, level);
        }
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(name: &str, rows: &[&[&str]]) -> Sheet {
        Sheet {
            name: name.to_string(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect(),
        }
    }

    fn sample_workbook() -> Vec<Sheet> {
        vec![
            sheet("Categories", &[&["id", "name"], &["leaders", "Руководители"], &["", "Эксперты"]]),
            sheet("Blocks", &[&["name"], &["Цифровое мышление"]]),
            sheet(
                "Clusters",
                &[&["id", "name", "block"], &["cl1", "Работа с данными", "Цифровое мышление"]],
            ),
            sheet(
                "Competencies",
                &[
                    &["id", "name", "description", "cluster", "required_skills", "priority"],
                    &["c1", "Аналитика данных", "Анализ и интерпретация", "cl1", "SQL, статистика", "Высокий"],
                    &["", "", "", "", "", ""],
                    &["", "Визуализация", "", "Работа с данными"],
                ],
            ),
            sheet(
                "level_descriptions",
                &[&["competency", "level", "text"], &["c1", "1", "Знает основы"], &["визуализация", "5", "Эксперт"]],
            ),
            sheet(
                "target_levels",
                &[
                    &["competency", "leaders", "Эксперты"],
                    &["c1", "3", ""],
                    &["Визуализация", "2.0", "4"],
                ],
            ),
            sheet(
                "glossary",
                &[&["term", "definition"], &["BI", "first"], &["bi ", "second"], &["", ""]],
            ),
        ]
    }

    fn replace(sheets: &mut [Sheet], replacement: Sheet) {
        let slot = sheets
            .iter_mut()
            .find(|s| canonicalize(&s.name) == canonicalize(&replacement.name))
            .unwrap();
        *slot = replacement;
    }

    #[test]
    fn extracts_hierarchy_and_matrix() {
        let ModelExtraction { model, warnings } = extract_model(&sample_workbook()).unwrap();

        let category_ids: Vec<&str> = model.categories.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(category_ids, vec!["leaders", "эксперты"]);
        assert_eq!(model.blocks[0].id, "цифровое_мышление");
        assert_eq!(model.clusters[0].block_id, "цифровое_мышление");
        assert_eq!(model.competencies.len(), 2);
        assert_eq!(model.competencies[1].id, "визуализация");
        assert_eq!(model.competencies[1].cluster_id, "cl1");
        assert_eq!(model.competencies[0].required_skills, "SQL, статистика");
        assert_eq!(model.competencies[0].priority, "Высокий");
        assert_eq!(model.competencies[1].required_skills, "");
        assert_eq!(model.competencies[1].priority, "");

        assert_eq!(model.target_levels["leaders"]["c1"], 3);
        assert_eq!(model.target_levels["leaders"]["визуализация"], 2);
        assert_eq!(model.target_levels["эксперты"].get("c1"), None);
        assert_eq!(model.target_levels["эксперты"]["визуализация"], 4);

        assert_eq!(model.level_descriptions.len(), 2);
        assert_eq!(model.level_descriptions[1].competency_id, "визуализация");

        assert_eq!(model.glossary.len(), 1);
        assert_eq!(model.glossary["bi"].definition, "second");
        assert!(warnings.iter().any(|w| w.message.contains("duplicate term")));
        assert!(model.level_scale.is_empty());
    }

    #[test]
    fn blank_named_row_is_skipped_with_warning() {
        let mut sheets = sample_workbook();
        replace(
            &mut sheets,
            sheet("blocks", &[&["name"], &["Цифровое мышление"], &["", "stray note"]]),
        );

        let extraction = extract_model(&sheets).unwrap();
        assert_eq!(extraction.model.blocks.len(), 1);
        assert!(extraction
            .warnings
            .iter()
            .any(|w| w.stage == Stage::Model && w.message.contains("blank name")));
    }

    #[test]
    fn missing_column_names_sheet_and_column() {
        let mut sheets = sample_workbook();
        replace(&mut sheets, sheet("clusters", &[&["id", "name"], &["cl1", "Работа с данными"]]));

        let err = extract_model(&sheets).unwrap_err();
        assert_eq!(
            err,
            ExtractError::MissingColumn {
                sheet: "clusters".to_string(),
                column: "block".to_string()
            }
        );
    }

    #[test]
    fn missing_sheet_is_fatal() {
        let sheets: Vec<Sheet> = sample_workbook()
            .into_iter()
            .filter(|s| s.name != "glossary")
            .collect();
        assert_eq!(
            extract_model(&sheets).unwrap_err(),
            ExtractError::MissingSheet {
                sheet: GLOSSARY.to_string()
            }
        );
    }

    #[test]
    fn dangling_block_reference_is_fatal() {
        let mut sheets = sample_workbook();
        replace(
            &mut sheets,
            sheet("clusters", &[&["id", "name", "block"], &["cl1", "Работа с данными", "Нет такого"]]),
        );

        match extract_model(&sheets).unwrap_err() {
            ExtractError::DanglingReference { sheet, row, entity, reference } => {
                assert_eq!(sheet, "clusters");
                assert_eq!(row, 2);
                assert_eq!(entity, "block");
                assert_eq!(reference, "Нет такого");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn dangling_cluster_reference_is_fatal() {
        let mut sheets = sample_workbook();
        replace(
            &mut sheets,
            sheet(
                "competencies",
                &[&["id", "name", "cluster"], &["c1", "Аналитика данных", "cl1"], &["c2", "Этика", "cl9"]],
            ),
        );

        match extract_model(&sheets).unwrap_err() {
            ExtractError::DanglingReference { sheet, row, entity, reference } => {
                assert_eq!(sheet, "competencies");
                assert_eq!(row, 3);
                assert_eq!(entity, "cluster");
                assert_eq!(reference, "cl9");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn non_numeric_target_is_fatal() {
        let mut sheets = sample_workbook();
        replace(
            &mut sheets,
            sheet("target_levels", &[&["competency", "leaders"], &["c1", "высокий"]]),
        );

        let err = extract_model(&sheets).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidLevel { ref value, row: 2, .. } if value == "высокий"));
        assert!(err.to_string().contains("target_levels"));
    }

    #[test]
    fn out_of_range_target_is_fatal() {
        let mut sheets = sample_workbook();
        replace(&mut sheets, sheet("target_levels", &[&["competency", "leaders"], &["c1", "7"]]));
        assert!(matches!(extract_model(&sheets), Err(ExtractError::InvalidLevel { .. })));
    }

    #[test]
    fn transposed_matrix_is_read_by_category_rows() {
        let mut sheets = sample_workbook();
        replace(
            &mut sheets,
            sheet("target_levels", &[&["category", "c1", "Визуализация"], &["Руководители", "5", "1"]]),
        );

        let model = extract_model(&sheets).unwrap().model;
        assert_eq!(model.target_levels["leaders"]["c1"], 5);
        assert_eq!(model.target_levels["leaders"]["визуализация"], 1);
    }

    #[test]
    fn duplicate_competency_id_is_fatal() {
        let mut sheets = sample_workbook();
        replace(
            &mut sheets,
            sheet(
                "competencies",
                &[&["id", "name", "cluster"], &["c1", "Аналитика данных", "cl1"], &["c1", "Другое", "cl1"]],
            ),
        );
        assert!(matches!(
            extract_model(&sheets),
            Err(ExtractError::DuplicateId { row: 3, .. })
        ));
    }

    #[test]
    fn optional_level_scale_passes_through() {
        let mut sheets = sample_workbook();
        sheets.push(sheet("Level scale", &[&["level", "description"], &["1", "Базовый"], &["2", "Развивающийся"]]));

        let model = extract_model(&sheets).unwrap().model;
        assert_eq!(model.level_scale.len(), 2);
        assert_eq!(model.level_scale[1].description, "Развивающийся");
    }
}
