//! PPTX template reader.

use crate::package::{
    extract_slide_number, parse_relationships, rel_types, rels_path_for, resolve_target, Package,
    Relationship,
};
use crate::slide::{parse_slide, SlideFrame};
use crate::xml::{attribute, child_elements};
use deckmerge_core::{Error, PageSize, ResourceKind, Result, Template};
use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

pub(crate) const PRESENTATION_PART: &str = "ppt/presentation.xml";

/// The reference slide: its part name, frame markup and relationships.
#[derive(Debug, Clone)]
pub(crate) struct ReferenceSlide {
    pub part: String,
    pub frame: SlideFrame,
    pub relationships: Vec<Relationship>,
}

/// An opened PPTX template.
///
/// Holds the whole package so the writer can reuse masters, layouts, themes
/// and media, plus the parsed first slide.
#[derive(Debug, Clone)]
pub struct PptxTemplate {
    pub(crate) package: Package,
    pub(crate) reference: Option<ReferenceSlide>,
    slide_parts: Vec<String>,
    template: Template,
}

impl PptxTemplate {
    /// Open a template from disk.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ResourceNotFound {
                kind: ResourceKind::Template,
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Read a template from any seekable reader.
    pub fn from_reader<R: Read + Seek>(reader: R) -> Result<Self> {
        let package = Package::from_reader(reader)?;

        let presentation = package.read_string(PRESENTATION_PART).map_err(|_| {
            Error::Template(format!("not a presentation: missing {}", PRESENTATION_PART))
        })?;
        let page_size = read_page_size(&presentation)?;

        let slide_parts = slide_order(&package, &presentation)?;
        log::debug!("Template has {} slide(s)", slide_parts.len());

        let (reference, reference_page) = match slide_parts.first() {
            Some(part) => {
                let xml = package.read_string(part)?;
                let (frame, page) = parse_slide(&xml)?;
                let rels_part = rels_path_for(part);
                let relationships = if package.contains(&rels_part) {
                    parse_relationships(&package.read_string(&rels_part)?)?
                } else {
                    Vec::new()
                };
                log::debug!("Using {} as reference slide ({} shapes)", part, page.shapes.len());
                (
                    Some(ReferenceSlide {
                        part: part.clone(),
                        frame,
                        relationships,
                    }),
                    Some(page),
                )
            }
            None => (None, None),
        };

        Ok(Self {
            package,
            reference,
            slide_parts,
            template: Template::new(page_size, reference_page),
        })
    }

    /// The template model: page size and reference page.
    pub fn template(&self) -> &Template {
        &self.template
    }

    /// Number of slides in the template.
    pub fn slide_count(&self) -> usize {
        self.slide_parts.len()
    }

    /// Slide part names in presentation order.
    pub fn slide_parts(&self) -> &[String] {
        &self.slide_parts
    }
}

/// Page size from `p:sldSz`, falling back to the 4:3 default.
fn read_page_size(presentation: &str) -> Result<PageSize> {
    let default = PageSize::default();
    let Some(size) = child_elements(presentation)?
        .into_iter()
        .find(|n| n.name == "sldSz")
    else {
        return Ok(default);
    };

    let read = |name: &str, fallback: i64| -> Result<i64> {
        Ok(attribute(size.raw, name)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(fallback))
    };

    Ok(PageSize {
        width: read("cx", default.width)?,
        height: read("cy", default.height)?,
    })
}

/// Slide part names in presentation order.
///
/// Order comes from `p:sldIdLst`; if the list is missing, slide
/// relationships are ordered by the number in their id or target.
fn slide_order(package: &Package, presentation: &str) -> Result<Vec<String>> {
    let rels_path = rels_path_for(PRESENTATION_PART);
    let relationships = parse_relationships(&package.read_string(&rels_path)?)?;
    let slide_rels: Vec<&Relationship> = relationships
        .iter()
        .filter(|r| r.is(rel_types::SLIDE))
        .collect();

    let mut ordered = Vec::new();
    if let Some(list) = child_elements(presentation)?
        .into_iter()
        .find(|n| n.name == "sldIdLst")
    {
        for entry in child_elements(list.raw)? {
            // `r:id` shares its local name with the numeric `id`; only the prefixed one is a rel id.
            let rel_id = crate::xml::attributes(entry.raw)?
                .into_iter()
                .find(|(k, _)| k.contains(':') && k.ends_with(":id"))
                .map(|(_, v)| v);
            if let Some(rel) = rel_id.and_then(|id| slide_rels.iter().find(|r| r.id == id)) {
                ordered.push(resolve_target(PRESENTATION_PART, &rel.target));
            }
        }
    }

    if ordered.is_empty() && !slide_rels.is_empty() {
        let mut slides: Vec<(String, Option<usize>)> = slide_rels
            .iter()
            .map(|r| {
                let order = extract_slide_number(&r.id).or_else(|| extract_slide_number(&r.target));
                (resolve_target(PRESENTATION_PART, &r.target), order)
            })
            .collect();

        slides.sort_by(|a, b| match (a.1, b.1) {
            (Some(na), Some(nb)) => na.cmp(&nb),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.0.cmp(&b.0),
        });
        ordered = slides.into_iter().map(|(path, _)| path).collect();
    }

    Ok(ordered)
}
