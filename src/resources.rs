//! Resource extractor: "Список ресурсов" slides to [`RawResource`] records.

use std::collections::HashSet;

use crate::actions::{resource_heading, resource_lines};
use crate::canonical::canonicalize;
use crate::deck::{self, SlideKind};
use crate::models::{RawResource, Stage, Warning};
use crate::source::Slide;

#[derive(Debug, Clone, Default)]
pub struct ResourceExtraction {
    pub resources: Vec<RawResource>,
    pub warnings: Vec<Warning>,
}

/// Records keep deck order. Titles repeated under the same cluster reference
/// are dropped at source, first one wins.
pub fn extract_resources(slides: &[Slide]) -> ResourceExtraction {
    let mut extraction = ResourceExtraction::default();
    let mut seen: HashSet<(String, String)> = HashSet::new();

    for slide in slides.iter().filter(|s| deck::classify(s) == SlideKind::Resources) {
        let Some(cluster_ref) = resource_heading(slide) else {
            extraction.warnings.push(Warning::new(
                Stage::Resources,
                format!("slide {}: resource list without a cluster heading", slide.number),
            ));
            continue;
        };
        let cluster_key = canonicalize(&cluster_ref);

        for line in resource_lines(slide) {
            let (title, url) = deck::split_url(line);
            let title_key = canonicalize(&title);
            if title_key.is_empty() {
                continue;
            }
            if !seen.insert((cluster_key.clone(), title_key)) {
                tracing::debug!(slide = slide.number, %title, "duplicate resource skipped");
                continue;
            }
            extraction.resources.push(RawResource {
                cluster_ref: cluster_ref.clone(),
                title,
                url,
                line: line.to_string(),
                slide: slide.number,
            });
        }
    }

    tracing::info!(resources = extraction.resources.len(), "resources extracted");
    extraction
}
