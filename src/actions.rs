//! Action extractor: slides to an ordered list of [`RawAction`].
//!
//! Never fails. A slide whose lines cannot be attributed to a heading yields
//! no actions and a warning; the rest of the deck is still read. Headings and
//! section defaults carry over to following untitled slides, so a menu may
//! span several slides.

use crate::deck::{self, SlideKind};
use crate::models::{ActionType, LevelBucket, RawAction, Stage, Warning};
use crate::source::Slide;

#[derive(Debug, Clone, Default)]
pub struct ActionExtraction {
    pub actions: Vec<RawAction>,
    pub warnings: Vec<Warning>,
}

pub fn extract_actions(slides: &[Slide]) -> ActionExtraction {
    let mut extraction = ActionExtraction::default();
    let mut cursor = Cursor::default();

    for slide in slides {
        if let Some(reason) = &slide.malformed {
            extraction.warnings.push(Warning::new(
                Stage::Actions,
                format!("slide {}: {reason}; no actions taken from it", slide.number),
            ));
            continue;
        }
        match deck::classify(slide) {
            SlideKind::Skip => {
                tracing::debug!(slide = slide.number, "skipping non-menu slide");
            }
            SlideKind::Resources => {
                let found = resource_actions(slide);
                if found.is_empty() {
                    tracing::debug!(slide = slide.number, "resource slide without entries");
                }
                extraction.actions.extend(found);
            }
            SlideKind::Actions => match slide_actions(slide, &cursor, &mut extraction.warnings) {
                Ok((found, next)) => {
                    extraction.actions.extend(found);
                    cursor = next;
                }
                Err(reason) => extraction.warnings.push(Warning::new(
                    Stage::Actions,
                    format!("slide {}: {reason}; no actions taken from it", slide.number),
                )),
            },
        }
    }

    tracing::info!(
        actions = extraction.actions.len(),
        warnings = extraction.warnings.len(),
        "development actions extracted"
    );
    extraction
}

/// Section defaults declared in the deck.
#[derive(Debug, Clone, Default)]
struct Section {
    action_type: Option<ActionType>,
    level: Option<u8>,
}

/// Heading and section defaults in effect at the end of the last action slide.
#[derive(Debug, Clone, Default)]
struct Cursor {
    heading: Option<String>,
    section: Section,
}

fn slide_actions(
    slide: &Slide,
    carried: &Cursor,
    warnings: &mut Vec<Warning>,
) -> Result<(Vec<RawAction>, Cursor), String> {
    let mut cursor = carried.clone();

    if let Some(title) = slide.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        if let Some(action_type) = deck::section_type(title) {
            cursor.section.action_type = Some(action_type);
        } else {
            cursor.heading = Some(title.trim_end_matches(':').trim().to_string());
            cursor.section = Section::default();
        }
    }

    let mut actions = Vec::new();
    let mut conflicts = Vec::new();
    for line in deck::lines(slide) {
        if let Some(action_type) = deck::section_type(line) {
            cursor.section.action_type = Some(action_type);
            continue;
        }
        if let Some(level) = deck::section_level(line) {
            cursor.section.level = Some(level);
            continue;
        }
        if let Some(name) = deck::heading_line(line) {
            cursor.heading = Some(name.to_string());
            cursor.section = Section::default();
            continue;
        }

        let parsed = deck::parse_action_line(line);
        if parsed.text.is_empty() || parsed.text.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let Some(reference) = cursor.heading.clone() else {
            return Err(format!("line '{line}' appears before any heading"));
        };

        let mut type_conflict = None;
        let action_type = match (parsed.action_type, cursor.section.action_type) {
            (Some(inline), Some(default)) if inline != default => {
                type_conflict = Some(default);
                conflicts.push(format!(
                    "slide {}: '{}' is marked {inline} inside a {default} section; inline marker kept",
                    slide.number, parsed.text
                ));
                inline
            }
            (Some(inline), _) => inline,
            (None, Some(default)) => default,
            (None, None) => ActionType::Other,
        };
        let level = parsed
            .level
            .or_else(|| cursor.section.level.and_then(LevelBucket::level))
            .unwrap_or(LevelBucket::All);

        actions.push(RawAction {
            reference,
            level,
            action_type,
            text: parsed.text,
            line: line.to_string(),
            slide: slide.number,
            type_conflict,
        });
    }

    warnings.extend(
        conflicts
            .into_iter()
            .map(|message| Warning::new(Stage::Actions, message)),
    );
    Ok((actions, cursor))
}

/// Resource list lines also enter the action stream, typed as resources.
fn resource_actions(slide: &Slide) -> Vec<RawAction> {
    let Some(heading) = resource_heading(slide) else {
        return Vec::new();
    };
    resource_lines(slide)
        .map(|line| RawAction {
            reference: heading.clone(),
            level: LevelBucket::All,
            action_type: ActionType::Resource,
            text: deck::clean_line(line),
            line: line.to_string(),
            slide: slide.number,
            type_conflict: None,
        })
        .filter(|action| !action.text.is_empty())
        .collect()
}

/// The cluster named on a resource slide: the title, or the first body line
/// that is neither the "Список ресурсов" label nor a list entry.
pub fn resource_heading(slide: &Slide) -> Option<String> {
    slide
        .title
        .iter()
        .map(String::as_str)
        .chain(deck::lines(slide).filter(|line| !is_resource_line(line)))
        .map(|text| text.trim().trim_end_matches(':').trim())
        .find(|text| !text.is_empty() && !deck::is_resource_label(text))
        .map(str::to_string)
}

pub fn is_resource_line(line: &str) -> bool {
    deck::is_enumerated(line) || line.contains(" — ") || line.contains("http://") || line.contains("https://")
}

pub fn resource_lines(slide: &Slide) -> impl Iterator<Item = &str> {
    deck::lines(slide).filter(|line| is_resource_line(line) && !deck::is_resource_label(line))
}
