//! Page batching: N records per output page.
//!
//! Rows are split into consecutive groups of `records_per_page`. Each group
//! becomes one page built from a clone of the reference page, with slot `s`
//! of the group filling placeholders suffixed `_s` (slot 1 is unsuffixed).

use crate::dataset::Dataset;
use crate::document::{OutputDocument, Page, Shape, Template};
use crate::error::{Error, Result};
use crate::progress::{emit, LogSink};
use crate::substitute::{substitute_shape, Replacements, SlotReplacementMap};
use std::ops::Range;

/// Placeholder key for `column` in record slot `slot` (1-based).
pub fn effective_key(column: &str, slot: usize) -> String {
    if slot <= 1 {
        column.to_string()
    } else {
        format!("{}_{}", column, slot)
    }
}

/// Result of substituting one shape on one page.
#[derive(Debug)]
pub struct ShapeOutcome {
    /// Shape name.
    pub shape: String,
    /// Whether text changed, or why the shape was skipped.
    pub result: Result<bool>,
}

/// Per-page record of what happened to each shape.
#[derive(Debug)]
pub struct PageReport {
    /// 1-based page number.
    pub number: usize,
    /// Dataset rows placed on this page.
    pub rows: Range<usize>,
    pub outcomes: Vec<ShapeOutcome>,
}

impl PageReport {
    /// Outcomes that failed.
    pub fn failures(&self) -> impl Iterator<Item = &ShapeOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

/// A finished batch run: the document plus its page reports.
#[derive(Debug)]
pub struct Batch {
    pub document: OutputDocument,
    pub pages: Vec<PageReport>,
}

impl Batch {
    /// Total shapes skipped across all pages.
    pub fn skipped_shapes(&self) -> usize {
        self.pages.iter().map(|p| p.failures().count()).sum()
    }
}

/// Partitions rows into pages and builds each page from the template.
#[derive(Debug, Clone, Copy)]
pub struct PageBatcher {
    records_per_page: usize,
}

impl PageBatcher {
    /// Create a batcher placing `records_per_page` rows on each page.
    pub fn new(records_per_page: usize) -> Result<Self> {
        if records_per_page == 0 {
            return Err(Error::InvalidLayout(records_per_page));
        }
        Ok(Self { records_per_page })
    }

    /// Rows per page.
    pub fn records_per_page(&self) -> usize {
        self.records_per_page
    }

    /// Human-readable mode name: `Single` or `<N>-Up`.
    pub fn mode_name(&self) -> String {
        if self.records_per_page == 1 {
            "Single".to_string()
        } else {
            format!("{}-Up", self.records_per_page)
        }
    }

    /// Number of pages needed for `rows` rows.
    pub fn page_count(&self, rows: usize) -> usize {
        rows.div_ceil(self.records_per_page)
    }

    /// Row range of each page, in order. The last range may be short.
    pub fn groups(&self, rows: usize) -> impl Iterator<Item = Range<usize>> {
        let n = self.records_per_page;
        (0..rows)
            .step_by(n)
            .map(move |start| start..(start + n).min(rows))
    }

    /// Replacement map for the group starting at row `start`.
    ///
    /// Slots past the end of the dataset map every key to the empty string.
    pub fn slot_replacements(&self, dataset: &Dataset, start: usize) -> SlotReplacementMap {
        let mut map = SlotReplacementMap::new();
        for offset in 0..self.records_per_page {
            let slot = offset + 1;
            match dataset.row(start + offset) {
                Some(row) => {
                    for (column, value) in row.iter() {
                        map.insert(effective_key(column, slot), value.to_string());
                    }
                }
                None => {
                    for column in dataset.columns() {
                        map.insert(effective_key(column, slot), String::new());
                    }
                }
            }
        }
        map
    }

    /// Build one page: clone every reference shape and substitute its text.
    ///
    /// A shape that fails substitution is kept as its unmodified clone and
    /// reported in the outcomes; the page is still built.
    pub fn build_page(&self, reference: &Page, replacements: &Replacements) -> (Page, Vec<ShapeOutcome>) {
        let mut page = Page::new();
        let mut outcomes = Vec::with_capacity(reference.shapes.len());

        for shape in &reference.shapes {
            let mut copy = shape.clone();
            substitute_tree(&mut copy, replacements, &mut outcomes);
            page.push(copy);
        }

        (page, outcomes)
    }

    /// Build every page for `dataset` from `template`.
    pub fn generate(
        &self,
        template: &Template,
        dataset: &Dataset,
        sink: &mut dyn LogSink,
    ) -> Result<Batch> {
        let reference = template
            .reference_page
            .as_ref()
            .ok_or_else(|| Error::Template("template has no slides".to_string()))?;

        emit(
            sink,
            &format!(
                "Running {} merge mode ({} per page)...",
                self.mode_name(),
                self.records_per_page
            ),
        );

        let total_rows = dataset.len();
        let total_pages = self.page_count(total_rows);
        let mut document = OutputDocument::new(template.page_size);
        let mut pages = Vec::with_capacity(total_pages);

        for (index, rows) in self.groups(total_rows).enumerate() {
            let number = index + 1;
            emit(
                sink,
                &format!(
                    "Processing page {}/{} (rows {}-{})...",
                    number,
                    total_pages,
                    rows.start + 1,
                    rows.end
                ),
            );

            let map = self.slot_replacements(dataset, rows.start);
            let replacements = Replacements::from(&map);
            let (page, outcomes) = self.build_page(reference, &replacements);

            for failure in outcomes.iter().filter_map(|o| o.result.as_ref().err()) {
                log::warn!("Page {}: {}", number, failure);
                sink.line(&format!("Skipped shape on page {}: {}", number, failure));
            }

            document.pages.push(page);
            pages.push(PageReport {
                number,
                rows,
                outcomes,
            });
        }

        Ok(Batch { document, pages })
    }
}

fn substitute_tree(shape: &mut Shape, replacements: &Replacements, outcomes: &mut Vec<ShapeOutcome>) {
    match shape {
        Shape::Group(group) => {
            for child in &mut group.children {
                substitute_tree(child, replacements, outcomes);
            }
        }
        _ => {
            let result = substitute_shape(shape, replacements);
            outcomes.push(ShapeOutcome {
                shape: shape.name().to_string(),
                result,
            });
        }
    }
}
