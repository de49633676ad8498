//! Readers that turn the two office documents into ordered records.
//!
//! Extractors only see [`Sheet`] rows and [`Slide`] paragraphs; which container
//! the records came from is decided here by path.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use calamine::Reader;
use quick_xml::events::Event;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slide {
    /// 1-based position in the deck.
    pub number: usize,
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
    /// Set when the slide part could not be parsed; the slide then has no text.
    pub malformed: Option<String>,
}

pub trait SheetSource {
    fn read_sheets(&self) -> anyhow::Result<Vec<Sheet>>;
}

pub trait DeckSource {
    fn read_slides(&self) -> anyhow::Result<Vec<Slide>>;
}

/// A directory holding one `<sheet>.csv` per sheet, without header handling.
pub struct CsvDirectory {
    pub dir: PathBuf,
}

impl SheetSource for CsvDirectory {
    fn read_sheets(&self) -> anyhow::Result<Vec<Sheet>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut sheets = Vec::new();
        for path in paths {
            let name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_path(&path)
                .with_context(|| format!("failed to open {}", path.display()))?;

            let mut rows = Vec::new();
            for record in reader.records() {
                let record = record.with_context(|| format!("failed to read {}", path.display()))?;
                rows.push(record.iter().map(str::to_string).collect());
            }
            sheets.push(Sheet { name, rows });
        }

        Ok(sheets)
    }
}

/// An `.xlsx`/`.xls`/`.ods` workbook.
pub struct SpreadsheetFile {
    pub path: PathBuf,
}

impl SheetSource for SpreadsheetFile {
    fn read_sheets(&self) -> anyhow::Result<Vec<Sheet>> {
        let mut workbook = calamine::open_workbook_auto(&self.path)
            .with_context(|| format!("failed to open workbook {}", self.path.display()))?;

        let names: Vec<String> = workbook.sheet_names().to_vec();
        let mut sheets = Vec::with_capacity(names.len());
        for name in names {
            let range = workbook
                .worksheet_range(&name)
                .with_context(|| format!("failed to read sheet '{name}'"))?;
            let rows = range
                .rows()
                .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                .collect();
            sheets.push(Sheet { name, rows });
        }

        Ok(sheets)
    }
}

/// A slide dump: `{"slides": [{"title": "...", "paragraphs": ["..."]}]}`.
pub struct JsonDeck {
    pub path: PathBuf,
}

#[derive(Deserialize)]
struct DeckDump {
    slides: Vec<SlideDump>,
}

#[derive(Deserialize)]
struct SlideDump {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    paragraphs: Vec<String>,
}

impl DeckSource for JsonDeck {
    fn read_slides(&self) -> anyhow::Result<Vec<Slide>> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        let dump: DeckDump = serde_json::from_str(&raw)
            .with_context(|| format!("invalid slide dump {}", self.path.display()))?;

        Ok(dump
            .slides
            .into_iter()
            .enumerate()
            .map(|(idx, slide)| Slide {
                number: idx + 1,
                title: slide.title,
                paragraphs: slide.paragraphs,
                malformed: None,
            })
            .collect())
    }
}

/// A `.pptx` presentation: zip container with one XML part per slide.
pub struct PptxDeck {
    pub path: PathBuf,
}

impl DeckSource for PptxDeck {
    /// A slide part that fails to parse comes back with no text and
    /// `malformed` set; the rest of the deck is still read.
    fn read_slides(&self) -> anyhow::Result<Vec<Slide>> {
        let file = std::fs::File::open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        let mut archive = zip::ZipArchive::new(file)
            .with_context(|| format!("{} is not a zip container", self.path.display()))?;

        let parts = match presentation_order(&mut archive)? {
            Some(parts) => parts,
            None => file_name_order(&archive),
        };

        let mut slides = Vec::with_capacity(parts.len());
        for (idx, name) in parts.into_iter().enumerate() {
            let number = idx + 1;
            let parsed = read_part(&mut archive, &name)
                .and_then(|xml| xml.with_context(|| format!("missing slide part {name}")))
                .and_then(|xml| parse_slide_xml(&xml));
            let slide = match parsed {
                Ok((title, paragraphs)) => Slide {
                    number,
                    title,
                    paragraphs,
                    malformed: None,
                },
                Err(e) => {
                    tracing::debug!(slide = number, part = %name, "unreadable slide part: {e:#}");
                    Slide {
                        number,
                        title: None,
                        paragraphs: Vec::new(),
                        malformed: Some(format!("slide part {name} could not be read: {e:#}")),
                    }
                }
            };
            slides.push(slide);
        }

        Ok(slides)
    }
}

fn read_part<R: std::io::Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> anyhow::Result<Option<String>> {
    let mut part = match archive.by_name(name) {
        Ok(part) => part,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("failed to open part {name}")),
    };
    let mut xml = String::new();
    part.read_to_string(&mut xml)
        .with_context(|| format!("failed to read part {name}"))?;
    Ok(Some(xml))
}

/// Slide parts sorted by the number in `slideN.xml`. Only used when the deck
/// has no presentation part, since reordering slides keeps their part names.
fn file_name_order<R: std::io::Read + std::io::Seek>(archive: &zip::ZipArchive<R>) -> Vec<String> {
    let mut parts: Vec<(usize, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse::<usize>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    parts.sort();
    parts.into_iter().map(|(_, name)| name).collect()
}

/// Slide parts in presentation order: `<p:sldIdLst>` of `ppt/presentation.xml`
/// resolved through `ppt/_rels/presentation.xml.rels`.
fn presentation_order<R: std::io::Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> anyhow::Result<Option<Vec<String>>> {
    let Some(presentation) = read_part(archive, "ppt/presentation.xml")? else {
        return Ok(None);
    };
    let Some(rels) = read_part(archive, "ppt/_rels/presentation.xml.rels")? else {
        return Ok(None);
    };

    let targets = parse_relationships(&rels).context("malformed ppt/_rels/presentation.xml.rels")?;
    let ids = parse_slide_ids(&presentation).context("malformed ppt/presentation.xml")?;

    let mut parts = Vec::with_capacity(ids.len());
    for id in ids {
        match targets.get(&id) {
            Some(target) => parts.push(target.clone()),
            None => tracing::warn!(relationship = %id, "slide id without a relationship target"),
        }
    }
    Ok(Some(parts))
}

/// Relationship id to archive path, for slide targets only.
fn parse_relationships(xml: &str) -> anyhow::Result<std::collections::HashMap<String, String>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut targets = std::collections::HashMap::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"Relationship" => {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes() {
                    let attr = attr?;
                    match attr.key.as_ref() {
                        b"Id" => id = Some(attr.unescape_value()?.into_owned()),
                        b"Target" => target = Some(attr.unescape_value()?.into_owned()),
                        _ => {}
                    }
                }
                if let (Some(id), Some(target)) = (id, target) {
                    let path = match target.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("ppt/{target}"),
                    };
                    if path.starts_with("ppt/slides/") {
                        targets.insert(id, path);
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!("XML parse error at {}: {e}", reader.buffer_position()),
            _ => {}
        }
    }

    Ok(targets)
}

/// The `r:id` of every `<p:sldId>`, in list order.
fn parse_slide_ids(xml: &str) -> anyhow::Result<Vec<String>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut ids = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.local_name().as_ref() == b"sldId" => {
                for attr in e.attributes() {
                    let attr = attr?;
                    if attr.key.prefix().is_some() && attr.key.local_name().as_ref() == b"id" {
                        ids.push(attr.unescape_value()?.into_owned());
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!("XML parse error at {}: {e}", reader.buffer_position()),
            _ => {}
        }
    }

    Ok(ids)
}

/// Collects `<a:p>` paragraphs in document order; the title placeholder's
/// text becomes the title instead of a paragraph.
fn parse_slide_xml(xml: &str) -> anyhow::Result<(Option<String>, Vec<String>)> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut title = None;
    let mut paragraphs = Vec::new();

    let mut shape_paragraphs: Vec<String> = Vec::new();
    let mut in_shape = false;
    let mut shape_is_title = false;
    let mut paragraph = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"sp" => {
                    in_shape = true;
                    shape_is_title = false;
                    shape_paragraphs.clear();
                }
                b"ph" => {
                    if let Some(kind) = e.try_get_attribute("type")? {
                        shape_is_title |= matches!(kind.value.as_ref(), b"title" | b"ctrTitle");
                    }
                }
                b"p" => paragraph.clear(),
                b"br" => paragraph.push('\n'),
                _ => {}
            },
            Ok(Event::Text(ref e)) => {
                if in_text {
                    paragraph.push_str(&e.unescape()?);
                }
            }
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let text = paragraph.trim();
                    if !text.is_empty() {
                        if in_shape {
                            shape_paragraphs.push(text.to_string());
                        } else {
                            paragraphs.push(text.to_string());
                        }
                    }
                    paragraph.clear();
                }
                b"sp" => {
                    if shape_is_title && title.is_none() {
                        title = Some(shape_paragraphs.join(" "));
                    } else {
                        paragraphs.append(&mut shape_paragraphs);
                    }
                    shape_paragraphs.clear();
                    in_shape = false;
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => bail!("XML parse error at {}: {e}", reader.buffer_position()),
            _ => {}
        }
    }

    Ok((title.filter(|t| !t.is_empty()), paragraphs))
}

pub fn open_workbook(path: &Path) -> Box<dyn SheetSource> {
    if path.is_dir() {
        Box::new(CsvDirectory {
            dir: path.to_path_buf(),
        })
    } else {
        Box::new(SpreadsheetFile {
            path: path.to_path_buf(),
        })
    }
}

pub fn open_deck(path: &Path) -> Box<dyn DeckSource> {
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json")) {
        Box::new(JsonDeck {
            path: path.to_path_buf(),
        })
    } else {
        Box::new(PptxDeck {
            path: path.to_path_buf(),
        })
    }
}
