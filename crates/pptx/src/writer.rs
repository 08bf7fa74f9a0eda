//! PPTX output writer.
//!
//! The output package is the template package with its slides replaced: every
//! original slide and notes slide is dropped and one slide part is written
//! per output page. New slides share the reference slide's relationships, so
//! they keep its layout, master and images.

use crate::package::{
    parse_relationships, rel_types, rels_path_for, render_relationships, resolve_target,
    Relationship, SLIDE_CONTENT_TYPE, SLIDE_RELATIONSHIP_TYPE,
};
use crate::reader::{PptxTemplate, PRESENTATION_PART};
use crate::slide::render_page;
use deckmerge_core::{Error, OutputDocument, PageSize, Result};
use regex::{Captures, Regex};
use std::collections::HashSet;
use std::io::{Cursor, Seek, Write};
use std::path::Path;
use std::sync::LazyLock;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTENT_TYPES_PART: &str = "[Content_Types].xml";
const APP_PROPERTIES_PART: &str = "docProps/app.xml";

/// Slide ids must be at least 256.
const FIRST_SLIDE_ID: usize = 256;

static SLIDE_ID_LIST_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<((?:\w+:)?)sldIdLst(?:\s*/>|>.*?</(?:\w+:)?sldIdLst>)").unwrap()
});

static MASTER_ID_LIST_END_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</((?:\w+:)?)sldMasterIdLst>").unwrap());

static SLIDE_SIZE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(?:\w+:)?sldSz\b[^>]*>").unwrap());

static CX_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bcx="[^"]*""#).unwrap());

static CY_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"\bcy="[^"]*""#).unwrap());

/// Section lists reference slide ids that no longer exist.
static SECTION_EXT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)<(?:\w+:)?ext\s+uri="\{521415D9-36F7-43E2-AB2F-B90AF26B5E84\}"\s*>.*?</(?:\w+:)?ext>"#,
    )
    .unwrap()
});

/// Custom shows reference slide relationships that no longer exist.
static CUSTOM_SHOW_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<(?:\w+:)?custShowLst(?:\s*/>|>.*?</(?:\w+:)?custShowLst>)").unwrap()
});

static SLIDE_OVERRIDE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<Override\s+PartName="/ppt/(?:slides|notesSlides)/[^"]*"[^>]*/>"#).unwrap()
});

static APP_SLIDES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Slides>\d+</Slides>").unwrap());

static APP_NOTES_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<Notes>\d+</Notes>").unwrap());

static RELATIONSHIP_REF_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\b(\w+:id)="([^"]*)""#).unwrap());

/// Writes an [`OutputDocument`] as a PPTX package based on a template.
pub struct PptxWriter<'a> {
    template: &'a PptxTemplate,
}

impl<'a> PptxWriter<'a> {
    /// Create a writer reusing the given template's package.
    pub fn new(template: &'a PptxTemplate) -> Self {
        Self { template }
    }

    /// Serialize `document` and write it to `path`.
    ///
    /// The package is assembled in memory first, so a failure leaves no partial file.
    pub fn write_to_path(&self, document: &OutputDocument, path: &Path) -> Result<()> {
        let serialization = |reason: String| Error::Serialization {
            path: path.to_path_buf(),
            reason,
        };

        let bytes = self
            .to_bytes(document)
            .map_err(|e| serialization(e.to_string()))?;
        std::fs::write(path, bytes).map_err(|e| serialization(e.to_string()))?;

        log::debug!("Wrote {} slide(s) to {}", document.len(), path.display());
        Ok(())
    }

    /// Serialize `document` into an in-memory PPTX.
    pub fn to_bytes(&self, document: &OutputDocument) -> Result<Vec<u8>> {
        Ok(self.write(document, Cursor::new(Vec::new()))?.into_inner())
    }

    /// Serialize `document` into `writer`, returning the writer.
    pub fn write<W: Write + Seek>(&self, document: &OutputDocument, writer: W) -> Result<W> {
        let package = &self.template.package;

        let pres_rels_part = rels_path_for(PRESENTATION_PART);
        let mut pres_rels: Vec<Relationship> =
            parse_relationships(&package.read_string(&pres_rels_part)?)?
                .into_iter()
                .filter(|r| !r.is(rel_types::SLIDE))
                .collect();
        let mut next_id = pres_rels
            .iter()
            .filter_map(Relationship::numeric_id)
            .max()
            .unwrap_or(0)
            + 1;

        let mut slide_rel_ids = Vec::with_capacity(document.len());
        let mut new_parts: Vec<(String, Vec<u8>)> = Vec::with_capacity(document.len() * 2);

        if !document.is_empty() {
            let reference = self
                .template
                .reference
                .as_ref()
                .ok_or_else(|| Error::Template("template has no slides".to_string()))?;
            let slide_rels = page_relationships(&reference.part, &reference.relationships);
            let dropped: HashSet<&str> = reference
                .relationships
                .iter()
                .filter(|r| !is_page_relationship(r))
                .map(|r| r.id.as_str())
                .collect();

            for (index, page) in document.pages.iter().enumerate() {
                let number = index + 1;
                let part = format!("ppt/slides/slide{}.xml", number);
                let id = format!("rId{}", next_id);
                next_id += 1;

                pres_rels.push(Relationship {
                    id: id.clone(),
                    rel_type: SLIDE_RELATIONSHIP_TYPE.to_string(),
                    target: format!("slides/slide{}.xml", number),
                    target_mode: None,
                });
                slide_rel_ids.push(id);

                let xml = unlink_relationships(&render_page(&reference.frame, page), &dropped);
                new_parts.push((part.clone(), xml.into_bytes()));
                if !slide_rels.is_empty() {
                    new_parts.push((
                        rels_path_for(&part),
                        render_relationships(&slide_rels).into_bytes(),
                    ));
                }
            }
        }

        let mut zip = ZipWriter::new(writer);
        let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let stored = FileOptions::default().compression_method(CompressionMethod::Stored);

        for (name, data) in package.entries() {
            if is_slide_content(name) {
                continue;
            }

            let replaced = match name {
                PRESENTATION_PART => Some(rewrite_presentation(
                    &package.read_string(name)?,
                    &slide_rel_ids,
                    document.page_size,
                )),
                CONTENT_TYPES_PART => Some(rewrite_content_types(
                    &package.read_string(name)?,
                    document.len(),
                )),
                APP_PROPERTIES_PART => Some(rewrite_app_properties(
                    &package.read_string(name)?,
                    document.len(),
                )),
                n if n == pres_rels_part => Some(render_relationships(&pres_rels)),
                _ => None,
            };

            let options = if name.starts_with("ppt/media/") {
                stored
            } else {
                deflated
            };
            zip.start_file(name, options)
                .map_err(|e| Error::Zip(format!("Failed to add '{}': {}", name, e)))?;
            match &replaced {
                Some(xml) => zip.write_all(xml.as_bytes())?,
                None => zip.write_all(data)?,
            }
        }

        for (name, data) in &new_parts {
            zip.start_file(name.as_str(), deflated)
                .map_err(|e| Error::Zip(format!("Failed to add '{}': {}", name, e)))?;
            zip.write_all(data)?;
        }

        zip.finish()
            .map_err(|e| Error::Zip(format!("Failed to finish ZIP: {}", e)))
    }
}

/// Parts belonging to the template's own slides, which the output replaces.
fn is_slide_content(name: &str) -> bool {
    name.starts_with("ppt/slides/") || name.starts_with("ppt/notesSlides/")
}

/// Whether a reference-slide relationship carries over to generated slides.
///
/// Notes and comments belong to the old slide; links to other slides point
/// at parts the output no longer has.
fn is_page_relationship(rel: &Relationship) -> bool {
    !rel.is(rel_types::NOTES_SLIDE) && !rel.is(rel_types::COMMENTS) && !rel.is(rel_types::SLIDE)
}

/// Blank out `r:id` references to relationships a generated slide does not have.
fn unlink_relationships(xml: &str, dropped: &HashSet<&str>) -> String {
    if dropped.is_empty() {
        return xml.to_string();
    }
    RELATIONSHIP_REF_REGEX
        .replace_all(xml, |caps: &Captures| {
            if dropped.contains(&caps[2]) {
                format!("{}=\"\"", &caps[1])
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Relationships for a generated slide: the reference slide's, minus notes,
/// comments and slide links.
///
/// Targets are made absolute when the reference slide does not live in `ppt/slides/`.
fn page_relationships(reference_part: &str, relationships: &[Relationship]) -> Vec<Relationship> {
    let same_directory = reference_part
        .rsplit_once('/')
        .is_some_and(|(dir, _)| dir == "ppt/slides");

    relationships
        .iter()
        .filter(|r| is_page_relationship(r))
        .map(|r| {
            let mut rel = r.clone();
            if !same_directory && rel.target_mode.is_none() && !rel.target.starts_with('/') {
                rel.target = format!("/{}", resolve_target(reference_part, &rel.target));
            }
            rel
        })
        .collect()
}

/// Point the slide id list at the new slides, resize, and drop stale section lists.
pub(crate) fn rewrite_presentation(xml: &str, slide_rel_ids: &[String], size: PageSize) -> String {
    let render_list = |prefix: &str| -> String {
        if slide_rel_ids.is_empty() {
            return String::new();
        }
        let items: String = slide_rel_ids
            .iter()
            .enumerate()
            .map(|(i, rid)| {
                format!(
                    "<{}sldId id=\"{}\" r:id=\"{}\"/>",
                    prefix,
                    FIRST_SLIDE_ID + i,
                    rid
                )
            })
            .collect();
        format!("<{p}sldIdLst>{}</{p}sldIdLst>", items, p = prefix)
    };

    let mut out = if SLIDE_ID_LIST_REGEX.is_match(xml) {
        SLIDE_ID_LIST_REGEX
            .replace(xml, |caps: &Captures| render_list(&caps[1]))
            .into_owned()
    } else {
        MASTER_ID_LIST_END_REGEX
            .replace(xml, |caps: &Captures| format!("{}{}", &caps[0], render_list(&caps[1])))
            .into_owned()
    };

    out = SLIDE_SIZE_REGEX
        .replace(&out, |caps: &Captures| {
            let tag = CX_REGEX.replace(&caps[0], format!("cx=\"{}\"", size.width).as_str());
            CY_REGEX
                .replace(&tag, format!("cy=\"{}\"", size.height).as_str())
                .into_owned()
        })
        .into_owned();

    out = SECTION_EXT_REGEX.replace_all(&out, "").into_owned();
    CUSTOM_SHOW_REGEX.replace_all(&out, "").into_owned()
}

/// Replace slide content-type overrides with one per generated slide.
pub(crate) fn rewrite_content_types(xml: &str, slide_count: usize) -> String {
    let mut out = SLIDE_OVERRIDE_REGEX.replace_all(xml, "").into_owned();
    let overrides: String = (1..=slide_count)
        .map(|n| {
            format!(
                "<Override PartName=\"/ppt/slides/slide{}.xml\" ContentType=\"{}\"/>",
                n, SLIDE_CONTENT_TYPE
            )
        })
        .collect();
    if let Some(pos) = out.rfind("</Types>") {
        out.insert_str(pos, &overrides);
    }
    out
}

/// Keep the document statistics consistent with the new slide count.
pub(crate) fn rewrite_app_properties(xml: &str, slide_count: usize) -> String {
    let out = APP_SLIDES_REGEX.replace(xml, format!("<Slides>{}</Slides>", slide_count).as_str());
    APP_NOTES_REGEX.replace(&out, "<Notes>0</Notes>").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRESENTATION: &str = r#"<p:presentation xmlns:p="p" xmlns:r="r"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:sldIdLst><p:sldId id="256" r:id="rId2"/><p:sldId id="257" r:id="rId3"/></p:sldIdLst><p:sldSz cx="9144000" cy="6858000" type="screen4x3"/><p:notesSz cx="6858000" cy="9144000"/><p:extLst><p:ext uri="{521415D9-36F7-43E2-AB2F-B90AF26B5E84}"><p14:sectionLst><p14:section name="A"/></p14:sectionLst></p:ext></p:extLst></p:presentation>"#;

    #[test]
    fn test_rewrite_presentation_slide_list() {
        let out = rewrite_presentation(
            PRESENTATION,
            &["rId7".to_string(), "rId8".to_string(), "rId9".to_string()],
            PageSize {
                width: 12_192_000,
                height: 6_858_000,
            },
        );
        assert!(out.contains(
            r#"<p:sldIdLst><p:sldId id="256" r:id="rId7"/><p:sldId id="257" r:id="rId8"/><p:sldId id="258" r:id="rId9"/></p:sldIdLst>"#
        ));
        assert!(out.contains(r#"<p:sldSz cx="12192000" cy="6858000" type="screen4x3"/>"#));
        assert!(out.contains(r#"<p:notesSz cx="6858000" cy="9144000"/>"#));
        assert!(!out.contains("sectionLst"));
        assert!(out.contains("<p:extLst></p:extLst>"));
    }

    #[test]
    fn test_rewrite_presentation_without_pages_drops_list() {
        let out = rewrite_presentation(PRESENTATION, &[], PageSize::default());
        assert!(!out.contains("sldIdLst"));
        assert!(!out.contains("rId2"));
    }

    #[test]
    fn test_rewrite_presentation_inserts_missing_list() {
        let xml = r#"<p:presentation><p:sldMasterIdLst><p:sldMasterId id="1" r:id="rId1"/></p:sldMasterIdLst><p:sldSz cx="1" cy="2"/></p:presentation>"#;
        let out = rewrite_presentation(xml, &["rId5".to_string()], PageSize::default());
        assert!(out.contains(
            r#"</p:sldMasterIdLst><p:sldIdLst><p:sldId id="256" r:id="rId5"/></p:sldIdLst>"#
        ));
    }

    #[test]
    fn test_rewrite_content_types() {
        let xml = r#"<Types xmlns="t"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/ppt/presentation.xml" ContentType="p"/><Override PartName="/ppt/slides/slide1.xml" ContentType="s"/><Override PartName="/ppt/notesSlides/notesSlide1.xml" ContentType="n"/></Types>"#;
        let out = rewrite_content_types(xml, 2);
        assert!(out.contains(r#"<Override PartName="/ppt/presentation.xml" ContentType="p"/>"#));
        assert!(!out.contains("notesSlide1"));
        assert_eq!(out.matches("/ppt/slides/slide").count(), 2);
        assert!(out.contains("/ppt/slides/slide2.xml"));
        assert!(out.ends_with("</Types>"));
    }

    #[test]
    fn test_rewrite_app_properties() {
        let xml = "<Properties><Slides>1</Slides><Notes>1</Notes></Properties>";
        assert_eq!(
            rewrite_app_properties(xml, 5),
            "<Properties><Slides>5</Slides><Notes>0</Notes></Properties>"
        );
    }

    #[test]
    fn test_page_relationships_drop_notes() {
        let rels = vec![
            Relationship {
                id: "rId1".to_string(),
                rel_type: "http://x/relationships/slideLayout".to_string(),
                target: "../slideLayouts/slideLayout1.xml".to_string(),
                target_mode: None,
            },
            Relationship {
                id: "rId2".to_string(),
                rel_type: "http://x/relationships/notesSlide".to_string(),
                target: "../notesSlides/notesSlide1.xml".to_string(),
                target_mode: None,
            },
        ];
        let kept = page_relationships("ppt/slides/slide1.xml", &rels);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].target, "../slideLayouts/slideLayout1.xml");

        let moved = page_relationships("ppt/custom/first.xml", &rels);
        assert_eq!(moved[0].target, "/ppt/slideLayouts/slideLayout1.xml");
    }

    #[test]
    fn test_slide_links_dropped_and_unlinked() {
        let rels = vec![
            Relationship {
                id: "rId1".to_string(),
                rel_type: "http://x/relationships/slideLayout".to_string(),
                target: "../slideLayouts/slideLayout1.xml".to_string(),
                target_mode: None,
            },
            Relationship {
                id: "rId3".to_string(),
                rel_type: SLIDE_RELATIONSHIP_TYPE.to_string(),
                target: "slide4.xml".to_string(),
                target_mode: None,
            },
        ];
        let kept = page_relationships("ppt/slides/slide1.xml", &rels);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].is("/slideLayout"));

        let dropped: HashSet<&str> = ["rId3"].into_iter().collect();
        let xml = r#"<a:hlinkClick r:id="rId3" action="ppaction://hlinksldjump"/><a:blip r:embed="rId2"/><a:hlinkClick r:id="rId31"/>"#;
        assert_eq!(
            unlink_relationships(xml, &dropped),
            r#"<a:hlinkClick r:id="" action="ppaction://hlinksldjump"/><a:blip r:embed="rId2"/><a:hlinkClick r:id="rId31"/>"#
        );
    }
}
