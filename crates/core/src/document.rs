//! Presentation document model: templates, pages, shapes and rich text.
//!
//! The model only captures what substitution needs to see. Everything else a
//! format carries (geometry, fills, body and paragraph properties) is kept as
//! opaque markup strings that the backend writes back untouched.

use serde::{Deserialize, Serialize};

/// Vertical tab, the paragraph-text stand-in for a line break.
pub const LINE_BREAK: char = '\u{000B}';

/// Page dimensions in English Metric Units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSize {
    pub width: i64,
    pub height: i64,
}

impl Default for PageSize {
    /// 10 x 7.5 inches, the 4:3 default.
    fn default() -> Self {
        Self {
            width: 9_144_000,
            height: 6_858_000,
        }
    }
}

/// A read-only template: the first page of the input document.
#[derive(Debug, Clone, Default)]
pub struct Template {
    /// Size of every page in the template.
    pub page_size: PageSize,
    /// The reference page, if the template has any pages at all.
    pub reference_page: Option<Page>,
}

impl Template {
    /// Create a template from its page size and reference page.
    pub fn new(page_size: PageSize, reference_page: Option<Page>) -> Self {
        Self {
            page_size,
            reference_page,
        }
    }
}

/// A single page: an ordered list of shapes.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub shapes: Vec<Shape>,
}

impl Page {
    /// Create an empty page.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a shape, keeping z-order.
    pub fn push(&mut self, shape: Shape) {
        self.shapes.push(shape);
    }
}

/// The generated document: one page per group of records.
#[derive(Debug, Clone, Default)]
pub struct OutputDocument {
    pub page_size: PageSize,
    pub pages: Vec<Page>,
}

impl OutputDocument {
    /// Create an empty document with the given page size.
    pub fn new(page_size: PageSize) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
        }
    }

    /// Number of pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Whether the document has no pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// A node in a page's shape tree.
#[derive(Debug, Clone)]
pub enum Shape {
    /// A shape with a text body.
    Text(TextShape),
    /// A picture; carried through untouched.
    Picture(OpaqueShape),
    /// A group of shapes.
    Group(GroupShape),
    /// Connectors, graphic frames and text-less shapes.
    Other(OpaqueShape),
}

impl Shape {
    /// Display name of the shape, used in log lines.
    pub fn name(&self) -> &str {
        match self {
            Self::Text(s) => &s.name,
            Self::Picture(s) | Self::Other(s) => &s.name,
            Self::Group(s) => &s.name,
        }
    }

    /// Full text of a text-bearing shape: paragraphs joined by `\n`.
    ///
    /// Groups yield the text of their text-bearing descendants, one per line.
    /// Returns `None` for shapes without text.
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Text(s) => match &s.body {
                TextBody::Parsed(block) => Some(block.text()),
                TextBody::Unreadable { .. } => None,
            },
            Self::Group(g) => {
                let texts: Vec<String> = g.children.iter().filter_map(Shape::text).collect();
                if texts.is_empty() {
                    None
                } else {
                    Some(texts.join("\n"))
                }
            }
            Self::Picture(_) | Self::Other(_) => None,
        }
    }
}

/// A shape whose markup is carried through untouched.
#[derive(Debug, Clone)]
pub struct OpaqueShape {
    pub name: String,
    pub markup: String,
}

/// A group shape: opening markup, children, closing markup.
#[derive(Debug, Clone)]
pub struct GroupShape {
    pub name: String,
    /// Markup before the first child (group properties).
    pub open: String,
    pub children: Vec<Shape>,
    /// Markup after the last child.
    pub close: String,
}

/// A shape with a text body.
#[derive(Debug, Clone)]
pub struct TextShape {
    pub name: String,
    /// Markup before the text body (non-visual and shape properties).
    pub before: String,
    pub body: TextBody,
    /// Markup after the text body.
    pub after: String,
}

/// The text body of a shape, which may have failed to parse.
#[derive(Debug, Clone)]
pub enum TextBody {
    Parsed(TextBlock),
    /// The body could not be read; its markup is kept verbatim.
    Unreadable { markup: String, reason: String },
}

/// A block of rich text: an ordered list of paragraphs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextBlock {
    /// Markup before the first paragraph (body open tag and properties).
    pub open: String,
    pub paragraphs: Vec<Paragraph>,
    /// Markup after the last paragraph.
    pub close: String,
}

impl TextBlock {
    /// Paragraph texts joined by `\n`.
    pub fn text(&self) -> String {
        self.paragraphs
            .iter()
            .map(Paragraph::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A paragraph: properties plus an ordered list of runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Paragraph {
    /// Opaque paragraph properties markup.
    pub properties: Option<String>,
    pub runs: Vec<Run>,
    /// Opaque end-of-paragraph run properties markup.
    pub end_properties: Option<String>,
    /// Markup as read, including whitespace or comments before the element.
    /// Written back verbatim while the paragraph is untouched.
    pub original: Option<String>,
}

impl Paragraph {
    /// Paragraph text; line breaks appear as [`LINE_BREAK`].
    pub fn text(&self) -> String {
        self.runs.iter().map(Run::text).collect()
    }

    /// The first text run, whose style is the reference for rewrites.
    pub fn first_text_run(&self) -> Option<&Run> {
        self.runs.iter().find(|r| r.kind == RunKind::Text)
    }

    /// Replace the paragraph content with `text`, every run carrying `style`.
    ///
    /// [`LINE_BREAK`] and newline characters become line-break runs.
    pub fn set_text(&mut self, text: &str, style: &FontStyle) {
        let text = text.replace("\r\n", "\n");
        let mut runs = Vec::new();
        for (i, segment) in text.split([LINE_BREAK, '\n']).enumerate() {
            if i > 0 {
                runs.push(Run::line_break(style.clone()));
            }
            if !segment.is_empty() {
                runs.push(Run::new(segment, style.clone()));
            }
        }
        self.runs = runs;
        self.original = None;
    }
}

/// What a run represents inside its paragraph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunKind {
    /// Plain text.
    Text,
    /// A soft line break; its text is [`LINE_BREAK`].
    LineBreak,
    /// A field (slide number, date); `attributes` is the opaque tag attribute markup.
    Field { attributes: String },
}

/// A text fragment paired with its font style.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub kind: RunKind,
    pub text: String,
    pub style: FontStyle,
    /// Original run-properties markup, written back verbatim while the run is untouched.
    pub properties: Option<String>,
}

impl Run {
    /// A text run with a style and no original markup.
    pub fn new(text: impl Into<String>, style: FontStyle) -> Self {
        Self {
            kind: RunKind::Text,
            text: text.into(),
            style,
            properties: None,
        }
    }

    /// A line-break run.
    pub fn line_break(style: FontStyle) -> Self {
        Self {
            kind: RunKind::LineBreak,
            text: String::new(),
            style,
            properties: None,
        }
    }

    /// Text this run contributes to its paragraph.
    pub fn text(&self) -> &str {
        match self.kind {
            RunKind::LineBreak => "\u{000B}",
            _ => &self.text,
        }
    }
}

/// Font attributes captured from and reapplied to runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontStyle {
    /// Typeface name.
    pub family: Option<String>,
    /// Size in hundredths of a point.
    pub size: Option<u32>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    /// Underline style token, e.g. `sng` or `none`.
    pub underline: Option<String>,
    pub color: Option<Color>,
}

impl FontStyle {
    /// Whether no attribute is set.
    pub fn is_inherited(&self) -> bool {
        *self == Self::default()
    }
}

/// A solid text color.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Color {
    /// Hex RGB, e.g. `FF0000`.
    Rgb(String),
    /// A theme color slot, e.g. `accent1`.
    Scheme(String),
}
