//! Small helpers for slicing OOXML parts without building a DOM.
//!
//! Parts are walked with `quick_xml`'s pull reader. Child elements are
//! returned as byte ranges into the source so anything we do not model can
//! be written back exactly as it was read.

use deckmerge_core::{Error, Result};
use quick_xml::events::Event;
use quick_xml::name::QName;
use quick_xml::Reader;

/// A child element located inside its parent's markup.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Node<'a> {
    /// Local name without namespace prefix.
    pub name: &'a str,
    /// The element's full markup.
    pub raw: &'a str,
    /// Offset of the element's `<` in the parent source.
    pub start: usize,
    /// Offset just past the element's closing `>` in the parent source.
    pub end: usize,
}

/// Extract the local name from a potentially namespaced XML element name.
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}

fn xml_error(e: quick_xml::Error) -> Error {
    Error::Xml(e.to_string())
}

/// `pos` as reported by the reader may sit just past the `<` of the next tag.
fn tag_start(xml: &str, pos: usize) -> usize {
    let bytes = xml.as_bytes();
    if bytes.get(pos) == Some(&b'<') {
        pos
    } else if pos > 0 && bytes.get(pos - 1) == Some(&b'<') {
        pos - 1
    } else {
        xml[pos..].find('<').map(|i| pos + i).unwrap_or(pos)
    }
}

fn str_name(xml: &str, start: usize) -> &str {
    // Tag name runs from after `<` to the first whitespace, `/` or `>`.
    let rest = &xml[start + 1..];
    let len = rest
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(rest.len());
    let qname = &rest[..len];
    match qname.find(':') {
        Some(i) => &qname[i + 1..],
        None => qname,
    }
}

/// Direct children of the root element in `xml`.
pub(crate) fn child_elements(xml: &str) -> Result<Vec<Node<'_>>> {
    let mut reader = Reader::from_str(xml);
    let mut nodes = Vec::new();
    let mut in_root = false;

    loop {
        let before = reader.buffer_position();
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                if !in_root {
                    in_root = true;
                    continue;
                }
                let qname = e.name().as_ref().to_vec();
                reader.read_to_end(QName(&qname)).map_err(xml_error)?;
                let start = tag_start(xml, before);
                let end = reader.buffer_position();
                nodes.push(Node {
                    name: str_name(xml, start),
                    raw: &xml[start..end],
                    start,
                    end,
                });
            }
            Event::Empty(_) => {
                if !in_root {
                    break;
                }
                let start = tag_start(xml, before);
                let end = reader.buffer_position();
                nodes.push(Node {
                    name: str_name(xml, start),
                    raw: &xml[start..end],
                    start,
                    end,
                });
            }
            Event::End(_) | Event::Eof => break,
            _ => {}
        }
    }

    Ok(nodes)
}

/// Find the first direct child named `name`.
pub(crate) fn find_child<'a>(xml: &'a str, name: &str) -> Result<Option<Node<'a>>> {
    Ok(child_elements(xml)?.into_iter().find(|n| n.name == name))
}

/// Length of the root element's opening tag, including `>`.
pub(crate) fn open_tag_len(xml: &str) -> Result<usize> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(_) | Event::Empty(_) => return Ok(reader.buffer_position()),
            Event::Eof => return Err(Error::Xml("no root element".to_string())),
            _ => {}
        }
    }
}

/// Offset of the root element's closing tag, or `xml.len()` if self-closing.
pub(crate) fn close_tag_start(xml: &str) -> usize {
    let trimmed = xml.trim_end();
    if trimmed.ends_with("/>") && !trimmed.contains("</") {
        return xml.len();
    }
    trimmed.rfind("</").unwrap_or(xml.len())
}

/// Root element attributes as `(qualified name, unescaped value)` pairs.
pub(crate) fn attributes(xml: &str) -> Result<Vec<(String, String)>> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) => {
                let mut attrs = Vec::new();
                for attr in e.attributes().flatten() {
                    let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
                    let value = attr.decode_and_unescape_value(&reader).map_err(xml_error)?.into_owned();
                    attrs.push((key, value));
                }
                return Ok(attrs);
            }
            Event::Eof => return Ok(Vec::new()),
            _ => {}
        }
    }
}

/// Value of the root attribute whose local name is `name`.
pub(crate) fn attribute(xml: &str, name: &str) -> Result<Option<String>> {
    Ok(attributes(xml)?
        .into_iter()
        .find(|(k, _)| local_name(k.as_bytes()) == name.as_bytes())
        .map(|(_, v)| v))
}

/// Concatenated, unescaped text content of an element.
pub(crate) fn text_content(xml: &str) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Text(e) => text.push_str(&e.unescape().map_err(xml_error)?),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e.into_inner())),
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}

/// Escape text for element content or attribute values.
pub(crate) fn escape(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}
