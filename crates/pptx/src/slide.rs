//! Slide XML to shape tree, and back.

use crate::xml::{
    attribute, child_elements, close_tag_start, escape, find_child, open_tag_len, text_content,
    Node,
};
use deckmerge_core::{
    Color, Error, FontStyle, GroupShape, OpaqueShape, Page, Paragraph, Result, Run, RunKind,
    Shape, TextBlock, TextBody, TextShape,
};

/// Shape-tree children that are tree properties rather than shapes.
const TREE_PROPERTIES: &[&str] = &["nvGrpSpPr", "grpSpPr"];

/// Slide markup surrounding the shapes of its shape tree.
#[derive(Debug, Clone)]
pub(crate) struct SlideFrame {
    /// Everything up to and including the tree properties.
    pub head: String,
    /// Everything from the tree's extension list or closing tag onward.
    pub tail: String,
}

/// Where the shapes of a shape tree (or group) sit inside its markup.
struct TreeLayout<'a> {
    head_end: usize,
    /// Each shape with the whitespace or comments that precede it.
    shapes: Vec<(&'a str, Node<'a>)>,
    tail_start: usize,
}

fn tree_layout(xml: &str) -> Result<TreeLayout<'_>> {
    let mut head_end = open_tag_len(xml)?;
    let mut nodes = Vec::new();

    for child in child_elements(xml)? {
        if TREE_PROPERTIES.contains(&child.name) {
            head_end = child.end;
        } else if child.name == "extLst" {
            break;
        } else {
            nodes.push(child);
        }
    }

    let mut cursor = head_end;
    let mut shapes = Vec::with_capacity(nodes.len());
    for node in nodes {
        let lead = &xml[cursor.min(node.start)..node.start];
        cursor = node.end;
        shapes.push((lead, node));
    }

    Ok(TreeLayout {
        head_end,
        shapes,
        tail_start: cursor,
    })
}

/// Parse a slide part into its frame and the page of shapes it holds.
pub(crate) fn parse_slide(xml: &str) -> Result<(SlideFrame, Page)> {
    let root = child_elements(xml)?;
    let c_sld = root
        .iter()
        .find(|n| n.name == "cSld")
        .ok_or_else(|| Error::Template("slide has no common slide data".to_string()))?;
    let tree = find_child(c_sld.raw, "spTree")?
        .ok_or_else(|| Error::Template("slide has no shape tree".to_string()))?;
    if close_tag_start(tree.raw) == tree.raw.len() {
        return Err(Error::Template("slide shape tree is empty".to_string()));
    }

    let base = c_sld.start + tree.start;
    let layout = tree_layout(tree.raw)?;

    let mut page = Page::new();
    for (lead, node) in &layout.shapes {
        page.push(parse_shape_or_keep(lead, node.raw));
    }

    let frame = SlideFrame {
        head: xml[..base + layout.head_end].to_string(),
        tail: xml[base + layout.tail_start..].to_string(),
    };
    Ok((frame, page))
}

/// Parse a shape; markup that cannot be interpreted is kept as an opaque shape.
///
/// `lead` is the text between the previous sibling and this shape.
fn parse_shape_or_keep(lead: &str, raw: &str) -> Shape {
    let mut shape = match parse_shape(raw) {
        Ok(shape) => shape,
        Err(e) => {
            log::warn!("Keeping unparsed shape markup: {}", e);
            Shape::Other(OpaqueShape {
                name: String::new(),
                markup: raw.to_string(),
            })
        }
    };

    let leading_markup = match &mut shape {
        Shape::Text(text) => &mut text.before,
        Shape::Picture(opaque) | Shape::Other(opaque) => &mut opaque.markup,
        Shape::Group(group) => &mut group.open,
    };
    leading_markup.insert_str(0, lead);
    shape
}

fn parse_shape(raw: &str) -> Result<Shape> {
    let children = child_elements(raw)?;
    let name = shape_name(&children)?;
    let kind = crate::xml::local_name(root_qname(raw).as_bytes()).to_vec();

    match kind.as_slice() {
        b"sp" => match children.iter().find(|n| n.name == "txBody") {
            Some(body) => Ok(Shape::Text(TextShape {
                name,
                before: raw[..body.start].to_string(),
                body: parse_text_body(body.raw),
                after: raw[body.end..].to_string(),
            })),
            None => Ok(Shape::Other(OpaqueShape {
                name,
                markup: raw.to_string(),
            })),
        },
        b"pic" => Ok(Shape::Picture(OpaqueShape {
            name,
            markup: raw.to_string(),
        })),
        b"grpSp" => {
            let layout = tree_layout(raw)?;
            Ok(Shape::Group(GroupShape {
                name,
                open: raw[..layout.head_end].to_string(),
                children: layout
                    .shapes
                    .iter()
                    .map(|(lead, n)| parse_shape_or_keep(lead, n.raw))
                    .collect(),
                close: raw[layout.tail_start..].to_string(),
            }))
        }
        _ => Ok(Shape::Other(OpaqueShape {
            name,
            markup: raw.to_string(),
        })),
    }
}

fn root_qname(raw: &str) -> &str {
    let rest = raw.trim_start().trim_start_matches('<');
    let len = rest
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(rest.len());
    &rest[..len]
}

/// Name from the shape's non-visual properties (`nv*Pr/cNvPr/@name`).
fn shape_name(children: &[Node<'_>]) -> Result<String> {
    let Some(nv) = children.iter().find(|n| n.name.starts_with("nv")) else {
        return Ok(String::new());
    };
    match find_child(nv.raw, "cNvPr")? {
        Some(c_nv_pr) => Ok(attribute(c_nv_pr.raw, "name")?.unwrap_or_default()),
        None => Ok(String::new()),
    }
}

/// Parse a text body; failures keep the markup verbatim.
fn parse_text_body(raw: &str) -> TextBody {
    match parse_text_block(raw) {
        Ok(block) => TextBody::Parsed(block),
        Err(e) => TextBody::Unreadable {
            markup: raw.to_string(),
            reason: e.to_string(),
        },
    }
}

pub(crate) fn parse_text_block(raw: &str) -> Result<TextBlock> {
    let children = child_elements(raw)?;
    let paragraphs: Vec<&Node<'_>> = children.iter().filter(|n| n.name == "p").collect();

    let (Some(first), Some(last)) = (paragraphs.first(), paragraphs.last()) else {
        return Ok(TextBlock {
            open: raw.to_string(),
            paragraphs: Vec::new(),
            close: String::new(),
        });
    };

    let mut cursor = first.start;
    let mut parsed = Vec::with_capacity(paragraphs.len());
    for node in &paragraphs {
        let mut paragraph = parse_paragraph(node.raw)?;
        paragraph.original = Some(raw[cursor.min(node.start)..node.end].to_string());
        cursor = node.end;
        parsed.push(paragraph);
    }

    Ok(TextBlock {
        open: raw[..first.start].to_string(),
        paragraphs: parsed,
        close: raw[last.end..].to_string(),
    })
}

fn parse_paragraph(raw: &str) -> Result<Paragraph> {
    let mut paragraph = Paragraph::default();

    for child in child_elements(raw)? {
        match child.name {
            "pPr" => paragraph.properties = Some(child.raw.to_string()),
            "endParaRPr" => paragraph.end_properties = Some(child.raw.to_string()),
            "r" => paragraph.runs.push(parse_run(child.raw, RunKind::Text)?),
            "br" => paragraph.runs.push(parse_run(child.raw, RunKind::LineBreak)?),
            "fld" => {
                let open = &child.raw[..open_tag_len(child.raw)?];
                let attributes = open
                    .trim_start_matches('<')
                    .trim_start_matches(root_qname(child.raw))
                    .trim_end_matches('>')
                    .trim_end_matches('/')
                    .to_string();
                paragraph
                    .runs
                    .push(parse_run(child.raw, RunKind::Field { attributes })?);
            }
            other => log::debug!("Ignoring paragraph child <{}>", other),
        }
    }

    Ok(paragraph)
}

fn parse_run(raw: &str, kind: RunKind) -> Result<Run> {
    let mut run = Run {
        kind,
        text: String::new(),
        style: FontStyle::default(),
        properties: None,
    };

    for child in child_elements(raw)? {
        match child.name {
            "rPr" => {
                run.style = parse_font_style(child.raw)?;
                run.properties = Some(child.raw.to_string());
            }
            "t" if run.kind != RunKind::LineBreak => run.text = text_content(child.raw)?,
            _ => {}
        }
    }

    Ok(run)
}

/// Read the captured font attributes from run properties.
///
/// A color is only captured for an explicit solid fill.
pub(crate) fn parse_font_style(raw: &str) -> Result<FontStyle> {
    let flag = |v: Option<String>| v.map(|v| v == "1" || v == "true");

    let mut style = FontStyle {
        family: None,
        size: attribute(raw, "sz")?.and_then(|v| v.parse().ok()),
        bold: flag(attribute(raw, "b")?),
        italic: flag(attribute(raw, "i")?),
        underline: attribute(raw, "u")?,
        color: None,
    };

    for child in child_elements(raw)? {
        match child.name {
            "latin" => style.family = attribute(child.raw, "typeface")?,
            "solidFill" => style.color = parse_color(child.raw)?,
            _ => {}
        }
    }

    Ok(style)
}

fn parse_color(raw: &str) -> Result<Option<Color>> {
    for child in child_elements(raw)? {
        let color = match child.name {
            "srgbClr" => attribute(child.raw, "val")?.map(Color::Rgb),
            "sysClr" => attribute(child.raw, "lastClr")?.map(Color::Rgb),
            "schemeClr" => attribute(child.raw, "val")?.map(Color::Scheme),
            _ => None,
        };
        if color.is_some() {
            return Ok(color);
        }
    }
    Ok(None)
}

/// Render a page back into a complete slide part.
pub(crate) fn render_page(frame: &SlideFrame, page: &Page) -> String {
    let mut out = String::with_capacity(frame.head.len() + frame.tail.len() + 4096);
    out.push_str(&frame.head);
    for shape in &page.shapes {
        render_shape(shape, &mut out);
    }
    out.push_str(&frame.tail);
    out
}

fn render_shape(shape: &Shape, out: &mut String) {
    match shape {
        Shape::Text(text) => {
            out.push_str(&text.before);
            match &text.body {
                TextBody::Parsed(block) => render_text_block(block, out),
                TextBody::Unreadable { markup, .. } => out.push_str(markup),
            }
            out.push_str(&text.after);
        }
        Shape::Picture(opaque) | Shape::Other(opaque) => out.push_str(&opaque.markup),
        Shape::Group(group) => {
            out.push_str(&group.open);
            for child in &group.children {
                render_shape(child, out);
            }
            out.push_str(&group.close);
        }
    }
}

pub(crate) fn render_text_block(block: &TextBlock, out: &mut String) {
    out.push_str(&block.open);
    for paragraph in &block.paragraphs {
        render_paragraph(paragraph, out);
    }
    out.push_str(&block.close);
}

fn render_paragraph(paragraph: &Paragraph, out: &mut String) {
    if let Some(original) = &paragraph.original {
        out.push_str(original);
        return;
    }

    out.push_str("<a:p>");
    if let Some(props) = &paragraph.properties {
        out.push_str(props);
    }
    for run in &paragraph.runs {
        render_run(run, out);
    }
    if let Some(props) = &paragraph.end_properties {
        out.push_str(props);
    }
    out.push_str("</a:p>");
}

fn render_run(run: &Run, out: &mut String) {
    let props = match &run.properties {
        Some(raw) => raw.clone(),
        None => render_font_style(&run.style),
    };

    match &run.kind {
        RunKind::Text => {
            out.push_str("<a:r>");
            out.push_str(&props);
            out.push_str("<a:t>");
            out.push_str(&escape(&run.text));
            out.push_str("</a:t></a:r>");
        }
        RunKind::LineBreak => {
            if props.is_empty() {
                out.push_str("<a:br/>");
            } else {
                out.push_str("<a:br>");
                out.push_str(&props);
                out.push_str("</a:br>");
            }
        }
        RunKind::Field { attributes } => {
            out.push_str("<a:fld");
            out.push_str(attributes);
            out.push('>');
            out.push_str(&props);
            out.push_str("<a:t>");
            out.push_str(&escape(&run.text));
            out.push_str("</a:t></a:fld>");
        }
    }
}

/// Run properties for a style; empty when everything is inherited.
pub(crate) fn render_font_style(style: &FontStyle) -> String {
    if style.is_inherited() {
        return String::new();
    }

    let mut attrs = String::new();
    if let Some(size) = style.size {
        attrs.push_str(&format!(" sz=\"{}\"", size));
    }
    if let Some(bold) = style.bold {
        attrs.push_str(&format!(" b=\"{}\"", u8::from(bold)));
    }
    if let Some(italic) = style.italic {
        attrs.push_str(&format!(" i=\"{}\"", u8::from(italic)));
    }
    if let Some(underline) = &style.underline {
        attrs.push_str(&format!(" u=\"{}\"", escape(underline)));
    }

    let mut children = String::new();
    match &style.color {
        Some(Color::Rgb(rgb)) => children.push_str(&format!(
            "<a:solidFill><a:srgbClr val=\"{}\"/></a:solidFill>",
            escape(rgb)
        )),
        Some(Color::Scheme(slot)) => children.push_str(&format!(
            "<a:solidFill><a:schemeClr val=\"{}\"/></a:solidFill>",
            escape(slot)
        )),
        None => {}
    }
    if let Some(family) = &style.family {
        children.push_str(&format!("<a:latin typeface=\"{}\"/>", escape(family)));
    }

    if children.is_empty() {
        format!("<a:rPr{}/>", attrs)
    } else {
        format!("<a:rPr{}>{}</a:rPr>", attrs, children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckmerge_core::{substitute, Replacements};

    const SLIDE: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/><p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr><a:xfrm><a:off x="10" y="20"/><a:ext cx="100" cy="50"/></a:xfrm></p:spPr><p:txBody><a:bodyPr/><a:lstStyle/><a:p><a:pPr algn="ctr"/><a:r><a:rPr lang="en-US" sz="2800" b="1"><a:solidFill><a:srgbClr val="1F4E79"/></a:solidFill><a:latin typeface="Calibri"/></a:rPr><a:t>[Name]</a:t></a:r><a:r><a:rPr lang="en-US"/><a:t> scored [Score]</a:t></a:r></a:p><a:p><a:r><a:t>Static</a:t></a:r><a:br/><a:fld id="{1}" type="slidenum"><a:t>1</a:t></a:fld></a:p></p:txBody></p:sp><p:pic><p:nvPicPr><p:cNvPr id="3" name="Logo"/><p:cNvPicPr/><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId2"/></p:blipFill><p:spPr/></p:pic><p:grpSp><p:nvGrpSpPr><p:cNvPr id="4" name="Card"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr/><p:sp><p:nvSpPr><p:cNvPr id="5" name="Inner"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr><p:spPr/><p:txBody><a:bodyPr/><a:p><a:r><a:t>[Name_2]</a:t></a:r></a:p></p:txBody></p:sp></p:grpSp></p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#;

    #[test]
    fn test_parse_slide_shapes() {
        let (_, page) = parse_slide(SLIDE).unwrap();
        let names: Vec<_> = page.shapes.iter().map(Shape::name).collect();
        assert_eq!(names, vec!["Title 1", "Logo", "Card"]);
        assert!(matches!(page.shapes[0], Shape::Text(_)));
        assert!(matches!(page.shapes[1], Shape::Picture(_)));
        assert_eq!(
            page.shapes[0].text().as_deref(),
            Some("[Name] scored [Score]\nStatic\u{000B}1")
        );
        assert_eq!(page.shapes[2].text().as_deref(), Some("[Name_2]"));
    }

    #[test]
    fn test_untouched_slide_round_trips_exactly() {
        let (frame, page) = parse_slide(SLIDE).unwrap();
        assert_eq!(render_page(&frame, &page), SLIDE);
    }

    #[test]
    fn test_formatting_between_elements_round_trips() {
        let xml = r#"<p:sld xmlns:a="a" xmlns:p="p">
  <p:cSld>
    <p:spTree>
      <p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>
      <p:grpSpPr/>
      <!-- c -->
      <p:sp>
        <p:nvSpPr><p:cNvPr id="2" name="Body"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr>
        <p:spPr/>
        <p:txBody>
          <a:bodyPr/>
          <a:p>
            <a:r><a:t>[Name]</a:t></a:r>
            <!-- run -->
            <a:br/>
          </a:p>
          <!-- between -->
          <a:p><a:r><a:t>Static</a:t></a:r></a:p>
        </p:txBody>
      </p:sp>
      <p:grpSp>
        <p:nvGrpSpPr><p:cNvPr id="3" name="Group"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>
        <p:grpSpPr/>
        <p:cxnSp><p:nvCxnSpPr><p:cNvPr id="4" name="Line"/></p:nvCxnSpPr></p:cxnSp>
      </p:grpSp>
    </p:spTree>
  </p:cSld>
</p:sld>"#;
        let (frame, mut page) = parse_slide(xml).unwrap();
        assert_eq!(page.shapes.len(), 2);
        assert_eq!(render_page(&frame, &page), xml);

        let replacements = Replacements::from_entries(vec![("Name", Some("Ann"))]);
        if let Shape::Text(shape) = &mut page.shapes[0] {
            if let TextBody::Parsed(block) = &mut shape.body {
                assert!(substitute(block, &replacements));
            }
        }
        let rendered = render_page(&frame, &page);
        assert!(rendered.contains("<a:p><a:r><a:t>Ann</a:t></a:r><a:br/></a:p>"));
        assert!(rendered.contains("\n          <!-- between -->\n          <a:p><a:r><a:t>Static</a:t></a:r></a:p>"));
        assert!(rendered.contains("<!-- c -->"));
    }

    #[test]
    fn test_first_run_style_captured() {
        let (_, page) = parse_slide(SLIDE).unwrap();
        let Shape::Text(shape) = &page.shapes[0] else {
            panic!("expected text shape");
        };
        let TextBody::Parsed(block) = &shape.body else {
            panic!("expected parsed body");
        };
        let style = &block.paragraphs[0].runs[0].style;
        assert_eq!(style.family.as_deref(), Some("Calibri"));
        assert_eq!(style.size, Some(2800));
        assert_eq!(style.bold, Some(true));
        assert_eq!(style.italic, None);
        assert_eq!(style.color, Some(Color::Rgb("1F4E79".to_string())));
    }

    #[test]
    fn test_substituted_slide_renders_styled_run() {
        let (frame, mut page) = parse_slide(SLIDE).unwrap();
        let replacements = Replacements::from_entries(vec![
            ("Name", Some("Ann & Co")),
            ("Score", Some("90")),
        ]);
        if let Shape::Text(shape) = &mut page.shapes[0] {
            if let TextBody::Parsed(block) = &mut shape.body {
                assert!(substitute(block, &replacements));
            }
        }
        let xml = render_page(&frame, &page);
        assert!(xml.contains(
            r#"<a:p><a:pPr algn="ctr"/><a:r><a:rPr sz="2800" b="1"><a:solidFill><a:srgbClr val="1F4E79"/></a:solidFill><a:latin typeface="Calibri"/></a:rPr><a:t>Ann &amp; Co scored 90</a:t></a:r></a:p>"#
        ));
        assert!(xml.contains(r#"<a:fld id="{1}" type="slidenum"><a:t>1</a:t></a:fld>"#));
        assert!(xml.contains(r#"<a:blip r:embed="rId2"/>"#));
    }

    #[test]
    fn test_bad_entity_makes_body_unreadable() {
        let body = "<p:txBody><a:bodyPr/><a:p><a:r><a:t>&bogus;</a:t></a:r></a:p></p:txBody>";
        match parse_text_body(body) {
            TextBody::Unreadable { markup, .. } => assert_eq!(markup, body),
            TextBody::Parsed(_) => panic!("expected unreadable body"),
        }
    }

    #[test]
    fn test_render_font_style() {
        assert_eq!(render_font_style(&FontStyle::default()), "");
        let style = FontStyle {
            italic: Some(false),
            underline: Some("sng".to_string()),
            color: Some(Color::Scheme("accent1".to_string())),
            ..Default::default()
        };
        assert_eq!(
            render_font_style(&style),
            r#"<a:rPr i="0" u="sng"><a:solidFill><a:schemeClr val="accent1"/></a:solidFill></a:rPr>"#
        );
    }

    #[test]
    fn test_font_style_round_trip_through_markup() {
        let style = FontStyle {
            family: Some("Georgia".to_string()),
            size: Some(1800),
            bold: Some(false),
            italic: Some(true),
            underline: Some("dbl".to_string()),
            color: Some(Color::Rgb("00FF00".to_string())),
        };
        assert_eq!(parse_font_style(&render_font_style(&style)).unwrap(), style);
    }

    #[test]
    fn test_slide_without_shape_tree_is_error() {
        let xml = r#"<p:sld><p:cSld></p:cSld></p:sld>"#;
        assert!(matches!(parse_slide(xml), Err(Error::Template(_))));
    }
}
