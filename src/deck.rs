//! Authoring conventions of the development-actions deck: how slides are
//! classified, which lines are section markers, and which inline markers an
//! action line may carry.

use std::sync::OnceLock;

use regex::Regex;

use crate::canonical::canonicalize;
use crate::models::{ActionType, LevelBucket};
use crate::source::Slide;

/// Single words must be the whole canonical title; phrases may appear anywhere
/// in it. "Руководство командой" is a competency, "Руководство" is not.
const SKIP_TITLES: &[&str] = &[
    "содержание",
    "меню развивающих действий",
    "цель меню",
    "из чего состоит",
    "как пользоваться",
    "руководство",
    "руководство по использованию",
    "словарь терминов",
    "перечень внешних образовательных ресурсов",
    "contents",
    "how to use",
    "glossary",
];

const RESOURCE_LABELS: &[&str] = &["список ресурсов", "resource list"];

const SECTION_PHRASES: &[(&str, ActionType)] = &[
    ("обучение на практике", ActionType::Practice),
    ("развитие на рабочем месте", ActionType::Workplace),
    ("обучение и саморазвитие", ActionType::Learning),
    ("learning on the job", ActionType::Practice),
    ("learning from others", ActionType::Workplace),
    ("formal learning", ActionType::Learning),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideKind {
    /// Contents, instructions, glossary.
    Skip,
    Resources,
    Actions,
}

fn is_skip_title(key: &str) -> bool {
    SKIP_TITLES.iter().any(|keyword| {
        if keyword.contains(' ') {
            key.contains(keyword)
        } else {
            key == *keyword
        }
    })
}

pub fn classify(slide: &Slide) -> SlideKind {
    let title = slide.title.as_deref().unwrap_or("").to_lowercase();
    if is_skip_title(&canonicalize(&title)) {
        return SlideKind::Skip;
    }

    let body = slide
        .paragraphs
        .iter()
        .map(|p| p.to_lowercase())
        .collect::<Vec<_>>()
        .join("\n");
    let text = format!("{title}\n{body}");
    if RESOURCE_LABELS.iter().any(|label| text.contains(label)) {
        SlideKind::Resources
    } else if text.contains("словарь терминов") {
        SlideKind::Skip
    } else {
        SlideKind::Actions
    }
}

/// Slide paragraphs split into trimmed, non-empty lines.
pub fn lines(slide: &Slide) -> impl Iterator<Item = &str> {
    slide
        .paragraphs
        .iter()
        .flat_map(|p| p.lines())
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("deck pattern must compile"))
}

fn percent_section_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^\s*(70|20|10)\s*(?:%|процентов)")
}

fn section_level_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)^\s*(?:описание\s+)?(?:уровень|уровня|level)\s*[:\-]?\s*([1-5])\s*[:.]?\s*$",
    )
}

fn inline_type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"(?i)\[\s*(70|20|10|resource|ресурс)\s*%?\s*\]")
}

fn inline_level_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(
        &RE,
        r"(?i)[\[(]\s*(?:(?:level|уровень)\s*[:\-]?\s*([1-5])|(all levels|все уровни))\s*[\])]|\b(?:level|уровень)\s+([1-5])\b|\b(all levels|все уровни)\b",
    )
}

fn bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r"^(?:[•\-\*–—·▪●○►✓]\s*|\d{1,2}[.)]\s+)+")
}

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    regex(&RE, r#"https?://[^\s<>"»)\]]+"#)
}

/// A "70% Обучение на практике"-style line setting the slide's default type.
pub fn section_type(line: &str) -> Option<ActionType> {
    if let Some(caps) = percent_section_re().captures(line) {
        return parse_type(&caps[1]);
    }
    let key = canonicalize(line);
    SECTION_PHRASES
        .iter()
        .find(|(phrase, _)| key == *phrase)
        .map(|(_, action_type)| *action_type)
}

/// A line consisting only of "Уровень 3" sets the slide's default level.
pub fn section_level(line: &str) -> Option<u8> {
    section_level_re()
        .captures(line)
        .and_then(|caps| caps[1].parse().ok())
}

fn parse_type(marker: &str) -> Option<ActionType> {
    match marker.to_lowercase().as_str() {
        "70" => Some(ActionType::Practice),
        "20" => Some(ActionType::Workplace),
        "10" => Some(ActionType::Learning),
        "resource" | "ресурс" => Some(ActionType::Resource),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionLine {
    pub action_type: Option<ActionType>,
    pub level: Option<LevelBucket>,
    pub text: String,
}

/// Strips bullets and inline markers. The first marker of each kind wins.
pub fn parse_action_line(line: &str) -> ActionLine {
    let mut action_type = None;
    let mut level = None;

    for caps in inline_type_re().captures_iter(line) {
        action_type = action_type.or_else(|| parse_type(&caps[1]));
    }
    for caps in inline_level_re().captures_iter(line) {
        let found = match caps.get(1).or_else(|| caps.get(3)) {
            Some(number) => number.as_str().parse().ok().and_then(LevelBucket::level),
            None => Some(LevelBucket::All),
        };
        level = level.or(found);
    }

    let stripped = inline_type_re().replace_all(line, " ");
    let stripped = inline_level_re().replace_all(&stripped, " ");
    ActionLine {
        action_type,
        level,
        text: clean_line(&stripped),
    }
}

pub fn has_inline_markers(line: &str) -> bool {
    inline_type_re().is_match(line) || inline_level_re().is_match(line)
}

/// Removes bullets and list numbering, collapses whitespace.
pub fn clean_line(line: &str) -> String {
    let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
    bullet_re().replace(&collapsed, "").trim().to_string()
}

/// A paragraph such as "Аналитика данных:" that opens a new heading on the slide.
pub fn heading_line(line: &str) -> Option<&str> {
    let name = line.trim().strip_suffix(':')?.trim();
    if name.is_empty() || has_inline_markers(name) || canonicalize(name).is_empty() {
        return None;
    }
    Some(name)
}

pub fn is_enumerated(line: &str) -> bool {
    bullet_re().is_match(line.trim())
}

pub fn is_resource_label(text: &str) -> bool {
    let key = canonicalize(text);
    RESOURCE_LABELS.contains(&key.as_str())
}

/// Splits a resource line into its title and first absolute URL.
pub fn split_url(text: &str) -> (String, Option<String>) {
    let Some(found) = url_re().find(text) else {
        return (clean_line(text), None);
    };
    let url = found
        .as_str()
        .trim_end_matches(['.', ',', ';', ':'])
        .to_string();
    let rest = format!("{} {}", &text[..found.start()], &text[found.end()..]);
    let title = clean_line(&rest)
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '—' | '–' | '-' | ':' | '|'))
        .to_string();
    if title.is_empty() {
        (url.clone(), Some(url))
    } else {
        (title, Some(url))
    }
}
