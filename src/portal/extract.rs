use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use tracing::{debug, warn};

use crate::types::{CourseRecord, Snapshot};

const HEADER_CLASS: &str = "gb-class-header";
const BLOCK_CLASS: &str = "gb-class-row";
const LAST_UPDATE_PREFIX: &str = "Last Update:";
const MISSING_MARKER: &str = "Missing";
/// Placeholder the portal shows in place of a score.
const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedBlock {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Extraction {
    pub snapshot: Snapshot,
    pub skipped: Vec<SkippedBlock>,
}

struct Selectors {
    blocks_and_headers: Selector,
    title: Selector,
    score: Selector,
    missing: Selector,
    div: Selector,
    last_update: Selector,
}

impl Selectors {
    fn new() -> Option<Self> {
        Some(Self {
            blocks_and_headers: Selector::parse(&format!("div.{HEADER_CLASS}, div.{BLOCK_CLASS}"))
                .ok()?,
            title: Selector::parse("button.course-title").ok()?,
            score: Selector::parse("span.score").ok()?,
            missing: Selector::parse("div.class-item-lessemphasis").ok()?,
            div: Selector::parse("div").ok()?,
            last_update: Selector::parse("span.last-update").ok()?,
        })
    }
}

pub fn extract(markup: &str) -> Snapshot {
    extract_detailed(markup).snapshot
}

/// Extracts every course block of a gradebook page, keeping a record of the
/// blocks that could not be attributed to a course.
pub fn extract_detailed(markup: &str) -> Extraction {
    let mut extraction = Extraction::default();
    let Some(selectors) = Selectors::new() else {
        return extraction;
    };
    let document = Html::parse_document(markup);

    let mut header: Option<ElementRef<'_>> = None;
    let mut index = 0;
    for element in document.select(&selectors.blocks_and_headers) {
        if has_class(&element, HEADER_CLASS) {
            header = Some(element);
            continue;
        }

        let block_index = index;
        index += 1;
        let name = match header {
            None => Err("no preceding course header"),
            Some(h) => course_title(&h, &selectors),
        };
        let name = match name {
            Ok(name) => name,
            Err(reason) => {
                warn!("skipping gradebook block {block_index}: {reason}");
                extraction.skipped.push(SkippedBlock {
                    index: block_index,
                    reason: reason.to_string(),
                });
                continue;
            }
        };

        let record = read_block(&name, &element, &selectors);
        merge_into(&mut extraction.snapshot, record);
    }

    debug!(
        "extracted {} courses ({} blocks skipped)",
        extraction.snapshot.len(),
        extraction.skipped.len()
    );
    extraction
}

fn course_title(header: &ElementRef<'_>, selectors: &Selectors) -> Result<String, &'static str> {
    let title = header
        .select(&selectors.title)
        .next()
        .ok_or("course header has no title")?;
    let name = element_text(&title);
    if name.is_empty() {
        return Err("course title is empty");
    }
    Ok(name)
}

fn read_block(name: &str, block: &ElementRef<'_>, selectors: &Selectors) -> CourseRecord {
    let mut record = CourseRecord::new(name);

    let score = block
        .select(&selectors.score)
        .next()
        .map(|el| element_text(&el))
        .filter(|text| !text.is_empty() && text != NOT_AVAILABLE);
    record.set_score(score);

    if let Some(wrapper) = block.select(&selectors.missing).next() {
        // ElementRef::select also yields the wrapper itself.
        let first_inner = wrapper
            .select(&selectors.div)
            .find(|inner| inner.id() != wrapper.id());
        if let Some(inner) = first_inner {
            record.missing_assignments = parse_missing_count(&element_text(&inner));
        }
    }

    record.last_update = block
        .select(&selectors.last_update)
        .next()
        .map(|el| strip_last_update_prefix(&element_text(&el)))
        .filter(|text| !text.is_empty());

    record
}

pub fn parse_missing_count(text: &str) -> u32 {
    if !text.contains(MISSING_MARKER) {
        return 0;
    }
    text.split_whitespace()
        .next()
        .and_then(|token| token.parse::<u32>().ok())
        .unwrap_or(0)
}

fn strip_last_update_prefix(text: &str) -> String {
    text.replace(LAST_UPDATE_PREFIX, "").trim().to_string()
}

/// Later occurrences of a course refine the earlier record. Last-update
/// strings compare lexicographically, not as dates.
fn merge_into(snapshot: &mut Snapshot, record: CourseRecord) {
    let Some(existing) = snapshot.get_mut(&record.name) else {
        snapshot.insert(record);
        return;
    };
    debug!("merging duplicate gradebook block for {}", record.name);
    if record.raw_score.is_some() {
        existing.set_score(record.raw_score);
    }
    existing.missing_assignments = existing
        .missing_assignments
        .max(record.missing_assignments);
    if let Some(later) = record.last_update {
        let replace = match &existing.last_update {
            None => true,
            Some(current) => later > *current,
        };
        if replace {
            existing.last_update = Some(later);
        }
    }
}

fn has_class(element: &ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
