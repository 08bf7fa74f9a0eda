//! XLSX (Office Open XML spreadsheet) reader.
//!
//! Reads the first worksheet of a workbook into raw string rows, one per
//! sheet row from row 1 onward. Cell values are stringified here; trimming,
//! header and trailing-row rules are applied by the caller.

use crate::cell::{
    column_index, format_date, format_number, is_builtin_date_format, is_date_format, DateSystem,
    MAX_ROWS,
};
use crate::RawTable;
use deckmerge_core::{Error, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Read, Seek};
use zip::ZipArchive;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const WORKBOOK_RELS_PART: &str = "xl/_rels/workbook.xml.rels";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const STYLES_PART: &str = "xl/styles.xml";
const DEFAULT_SHEET_PART: &str = "xl/worksheets/sheet1.xml";

/// XLSX worksheet reader.
pub struct XlsxReader;

impl XlsxReader {
    pub fn new() -> Self {
        Self
    }

    /// Read the first worksheet of the workbook.
    ///
    /// Sheet row 1 is the header. Blank rows, and rows missing from the
    /// sheet data, are kept as empty records so later rows keep their position.
    pub fn read<R: Read + Seek>(&self, reader: R) -> Result<RawTable> {
        let mut archive = ZipArchive::new(reader)
            .map_err(|e| Error::Zip(format!("Failed to open ZIP: {}", e)))?;

        let workbook = read_file_from_archive(&mut archive, WORKBOOK_PART)?;
        let (sheet_rel, date_system) = parse_workbook(&workbook)?;

        let sheet_part = match sheet_rel {
            Some(rel_id) if has_file(&archive, WORKBOOK_RELS_PART) => {
                let rels = read_file_from_archive(&mut archive, WORKBOOK_RELS_PART)?;
                resolve_sheet_part(&rels, &rel_id)?.unwrap_or_else(|| DEFAULT_SHEET_PART.to_string())
            }
            _ => DEFAULT_SHEET_PART.to_string(),
        };
        log::debug!("Reading worksheet {}", sheet_part);

        let shared_strings = if has_file(&archive, SHARED_STRINGS_PART) {
            parse_shared_strings(&read_file_from_archive(&mut archive, SHARED_STRINGS_PART)?)?
        } else {
            Vec::new()
        };
        let date_styles = if has_file(&archive, STYLES_PART) {
            parse_date_styles(&read_file_from_archive(&mut archive, STYLES_PART)?)?
        } else {
            Vec::new()
        };

        let sheet = read_file_from_archive(&mut archive, &sheet_part)?;
        let context = CellContext {
            shared_strings: &shared_strings,
            date_styles: &date_styles,
            date_system,
        };
        let mut rows = parse_worksheet(&sheet, &context)?.into_iter();

        let header = rows.next().unwrap_or_default();
        Ok(RawTable {
            header,
            records: rows.collect(),
        })
    }
}

impl Default for XlsxReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything needed to stringify a cell.
struct CellContext<'a> {
    shared_strings: &'a [String],
    date_styles: &'a [bool],
    date_system: DateSystem,
}

/// Extract the local name from a potentially namespaced XML element name.
fn local_name(name: &[u8]) -> &[u8] {
    if let Some(pos) = name.iter().position(|&b| b == b':') {
        &name[pos + 1..]
    } else {
        name
    }
}

fn has_file<R: Read + Seek>(archive: &ZipArchive<R>, path: &str) -> bool {
    archive.file_names().any(|name| name == path)
}

fn read_file_from_archive<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| Error::Zip(format!("File not found in archive '{}': {}", path, e)))?;

    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| Error::Zip(format!("Failed to read '{}': {}", path, e)))?;

    Ok(content)
}

/// Attribute value by local name, unescaped.
fn attr(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>> {
    // Workbook parts are read with `Reader::from_str`, so decode as UTF-8.
    let decoder = Reader::from_str("");
    for a in e.attributes().flatten() {
        if local_name(a.key.as_ref()) == name {
            let value = a
                .decode_and_unescape_value(&decoder)
                .map_err(|err| Error::Xml(format!("Bad attribute value: {}", err)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Relationship id of the first sheet, and the workbook's date system.
fn parse_workbook(xml: &str) -> Result<(Option<String>, DateSystem)> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut first_sheet = None;
    let mut date_system = DateSystem::Excel1900;

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) => {
                match local_name(e.name().as_ref()) {
                    b"workbookPr" => {
                        if matches!(attr(e, b"date1904")?.as_deref(), Some("1") | Some("true")) {
                            date_system = DateSystem::Excel1904;
                        }
                    }
                    b"sheet" if first_sheet.is_none() => {
                        // Only the prefixed `r:id` is a relationship id.
                        first_sheet = e
                            .attributes()
                            .flatten()
                            .find(|a| {
                                let key = a.key.as_ref();
                                key.contains(&b':') && local_name(key) == b"id"
                            })
                            .map(|a| String::from_utf8_lossy(&a.value).into_owned());
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(format!("Error parsing workbook: {}", e))),
            _ => {}
        }
    }

    Ok((first_sheet, date_system))
}

/// Part name of the worksheet with relationship id `rel_id`.
fn resolve_sheet_part(rels: &str, rel_id: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(rels);
    reader.trim_text(true);

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if local_name(e.name().as_ref()) == b"Relationship" =>
            {
                if attr(e, b"Id")?.as_deref() != Some(rel_id) {
                    continue;
                }
                let Some(target) = attr(e, b"Target")? else {
                    return Ok(None);
                };
                let part = match target.strip_prefix('/') {
                    Some(absolute) => absolute.to_string(),
                    None => format!("xl/{}", target.trim_start_matches("./")),
                };
                return Ok(Some(part));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Xml(format!(
                    "Error parsing workbook relationships: {}",
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(None)
}

/// The shared string table; rich text runs are concatenated, phonetic hints skipped.
fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_item = false;
    let mut in_text = false;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                b"si" => {
                    in_item = true;
                    current.clear();
                }
                b"rPh" => phonetic_depth += 1,
                b"t" if in_item && phonetic_depth == 0 => in_text = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) if local_name(e.name().as_ref()) == b"si" => {
                strings.push(String::new());
            }
            Ok(Event::Text(e)) if in_text => {
                let text = e
                    .unescape()
                    .map_err(|err| Error::Xml(format!("Bad shared string: {}", err)))?;
                current.push_str(&text);
            }
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()) {
                b"si" => {
                    in_item = false;
                    strings.push(std::mem::take(&mut current));
                }
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(format!("Error parsing shared strings: {}", e))),
            _ => {}
        }
    }

    Ok(strings)
}

/// For each cell format (`cellXfs` entry), whether it displays a date.
fn parse_date_styles(xml: &str) -> Result<Vec<bool>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);
    let mut custom_formats: HashMap<u32, String> = HashMap::new();
    let mut format_ids = Vec::new();
    let mut in_cell_xfs = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if local_name(e.name().as_ref()) == b"cellXfs" => {
                in_cell_xfs = true;
            }
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) => {
                match local_name(e.name().as_ref()) {
                    b"numFmt" => {
                        let id = attr(e, b"numFmtId")?.and_then(|v| v.parse().ok());
                        let code = attr(e, b"formatCode")?;
                        if let (Some(id), Some(code)) = (id, code) {
                            custom_formats.insert(id, code);
                        }
                    }
                    b"xf" if in_cell_xfs => {
                        let id: u32 = attr(e, b"numFmtId")?
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0);
                        format_ids.push(id);
                    }
                    _ => {}
                }
            }
            Ok(Event::End(ref e)) if local_name(e.name().as_ref()) == b"cellXfs" => {
                in_cell_xfs = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(format!("Error parsing styles: {}", e))),
            _ => {}
        }
    }

    Ok(format_ids
        .into_iter()
        .map(|id| match custom_formats.get(&id) {
            Some(code) => is_date_format(code),
            None => is_builtin_date_format(id),
        })
        .collect())
}

/// A cell being assembled while its children are read.
#[derive(Default)]
struct PendingCell {
    column: usize,
    cell_type: Option<String>,
    style: Option<usize>,
    value: String,
}

/// Zero-based index of a `<row>`, or `next` when it carries no number.
fn row_index(e: &BytesStart<'_>, next: usize) -> Result<usize> {
    match attr(e, b"r")? {
        Some(r) => match r.trim().parse::<usize>() {
            Ok(n) if (1..=MAX_ROWS).contains(&n) => Ok(n - 1),
            _ => Err(Error::Xml(format!("Bad row number '{}'", r))),
        },
        None => Ok(next),
    }
}

/// Pad `rows` with empty rows up to `index`.
fn fill_missing_rows(rows: &mut Vec<Vec<String>>, index: usize) {
    if rows.len() < index {
        rows.resize_with(index, Vec::new);
    }
}

/// Rows of a worksheet from row 1 to the last row present, each padded to
/// its last populated column. Blank and missing rows are empty.
fn parse_worksheet(xml: &str, context: &CellContext<'_>) -> Result<Vec<Vec<String>>> {
    let mut reader = Reader::from_str(xml);
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell: Option<PendingCell> = None;
    let mut next_column = 0usize;
    let mut in_value = false;
    let mut in_inline = false;
    let mut in_phonetic = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => match local_name(e.name().as_ref()) {
                b"row" => {
                    let index = row_index(e, rows.len())?;
                    fill_missing_rows(&mut rows, index);
                    row.clear();
                    next_column = 0;
                }
                b"c" => {
                    let pending = start_cell(e, next_column)?;
                    next_column = pending.column + 1;
                    cell = Some(pending);
                }
                b"v" => in_value = true,
                b"is" => in_inline = true,
                b"rPh" => in_phonetic = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match local_name(e.name().as_ref()) {
                b"c" => next_column = start_cell(e, next_column)?.column + 1,
                b"row" => {
                    let index = row_index(e, rows.len())?;
                    fill_missing_rows(&mut rows, index);
                    rows.push(Vec::new());
                }
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if let Some(pending) = cell.as_mut() {
                    if in_value || (in_inline && !in_phonetic) {
                        let text = e
                            .unescape()
                            .map_err(|err| Error::Xml(format!("Bad cell value: {}", err)))?;
                        pending.value.push_str(&text);
                    }
                }
            }
            Ok(Event::End(ref e)) => match local_name(e.name().as_ref()) {
                b"v" => in_value = false,
                b"is" => in_inline = false,
                b"rPh" => in_phonetic = false,
                b"c" => {
                    if let Some(pending) = cell.take() {
                        let column = pending.column;
                        let text = cell_text(pending, context);
                        if row.len() <= column {
                            row.resize(column + 1, String::new());
                        }
                        row[column] = text;
                    }
                }
                b"row" => rows.push(std::mem::take(&mut row)),
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(Error::Xml(format!("Error parsing worksheet: {}", e))),
            _ => {}
        }
    }

    Ok(rows)
}

fn start_cell(e: &BytesStart<'_>, next_column: usize) -> Result<PendingCell> {
    let column = match attr(e, b"r")? {
        Some(r) => column_index(&r)
            .ok_or_else(|| Error::Xml(format!("Bad cell reference '{}'", r)))?,
        None => next_column,
    };
    Ok(PendingCell {
        column,
        cell_type: attr(e, b"t")?,
        style: attr(e, b"s")?.and_then(|s| s.parse().ok()),
        value: String::new(),
    })
}

/// Stringify a cell according to its type and style.
fn cell_text(cell: PendingCell, context: &CellContext<'_>) -> String {
    match cell.cell_type.as_deref() {
        Some("s") => cell
            .value
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| context.shared_strings.get(i))
            .cloned()
            .unwrap_or_default(),
        Some("str") | Some("inlineStr") => cell.value,
        Some("b") => match cell.value.trim() {
            "1" | "true" => "True".to_string(),
            _ => "False".to_string(),
        },
        Some("e") => String::new(),
        Some("d") => cell.value.trim().replacen('T', " ", 1),
        _ => {
            let raw = cell.value.trim();
            let Ok(number) = raw.parse::<f64>() else {
                return cell.value;
            };
            let is_date = cell
                .style
                .and_then(|s| context.date_styles.get(s))
                .copied()
                .unwrap_or(false);
            if is_date {
                format_date(number, context.date_system)
            } else {
                format_number(number)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>(strings: &'a [String], styles: &'a [bool]) -> CellContext<'a> {
        CellContext {
            shared_strings: strings,
            date_styles: styles,
            date_system: DateSystem::Excel1900,
        }
    }

    #[test]
    fn test_parse_workbook() {
        let xml = r#"<workbook xmlns:r="r"><workbookPr date1904="1"/><sheets><sheet name="Data" sheetId="3" r:id="rId5"/><sheet name="Other" sheetId="1" r:id="rId1"/></sheets></workbook>"#;
        let (rel, system) = parse_workbook(xml).unwrap();
        assert_eq!(rel.as_deref(), Some("rId5"));
        assert_eq!(system, DateSystem::Excel1904);
    }

    #[test]
    fn test_resolve_sheet_part() {
        let rels = r#"<Relationships><Relationship Id="rId1" Target="worksheets/sheet2.xml"/><Relationship Id="rId5" Target="/xl/worksheets/data.xml"/></Relationships>"#;
        assert_eq!(
            resolve_sheet_part(rels, "rId1").unwrap().as_deref(),
            Some("xl/worksheets/sheet2.xml")
        );
        assert_eq!(
            resolve_sheet_part(rels, "rId5").unwrap().as_deref(),
            Some("xl/worksheets/data.xml")
        );
        assert_eq!(resolve_sheet_part(rels, "rId9").unwrap(), None);
    }

    #[test]
    fn test_parse_shared_strings() {
        let xml = r#"<sst><si><t>Name</t></si><si><r><t>Bold</t></r><r><t xml:space="preserve"> text</t></r></si><si/><si><t>漢字</t><rPh sb="0" eb="2"><t>カンジ</t></rPh></si><si><t>a &amp; b</t></si></sst>"#;
        let strings = parse_shared_strings(xml).unwrap();
        assert_eq!(strings, vec!["Name", "Bold text", "", "漢字", "a & b"]);
    }

    #[test]
    fn test_parse_date_styles() {
        let xml = r#"<styleSheet><numFmts count="2"><numFmt numFmtId="164" formatCode="yyyy/mm/dd"/><numFmt numFmtId="165" formatCode="0.000"/></numFmts><cellStyleXfs count="1"><xf numFmtId="14"/></cellStyleXfs><cellXfs count="5"><xf numFmtId="0"/><xf numFmtId="14" applyNumberFormat="1"/><xf numFmtId="164"/><xf numFmtId="165"/><xf/></cellXfs></styleSheet>"#;
        assert_eq!(
            parse_date_styles(xml).unwrap(),
            vec![false, true, true, false, false]
        );
    }

    #[test]
    fn test_parse_worksheet_cell_types() {
        let strings = vec!["Name".to_string(), "Ann".to_string()];
        let styles = vec![false, true];
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="s"><v>0</v></c><c r="B1" t="inlineStr"><is><t>Score</t></is></c><c r="C1" t="str"><v>Joined</v></c><c r="D1" t="str"><v>Ok</v></c></row>
            <row r="2"><c r="A2" t="s"><v>1</v></c><c r="B2"><v>90</v></c><c r="C2" s="1"><v>45296</v></c><c r="D2" t="b"><v>1</v></c></row>
            <row r="3"><c r="A3" s="0"/><c r="B3"/></row>
            <row r="4"><c r="B4"><f>B2/2</f><v>45.5</v></c><c r="D4" t="e"><v>#DIV/0!</v></c></row>
        </sheetData></worksheet>"#;

        let rows = parse_worksheet(xml, &context(&strings, &styles)).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], vec!["Name", "Score", "Joined", "Ok"]);
        assert_eq!(rows[1], vec!["Ann", "90", "2024-01-05 00:00:00", "True"]);
        assert!(rows[2].is_empty());
        assert_eq!(rows[3], vec!["", "45.5", "", ""]);
    }

    #[test]
    fn test_parse_worksheet_keeps_row_positions() {
        let xml = r#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="inlineStr"><is><t>Name</t></is></c><c r="B1" t="inlineStr"><is><t>Score</t></is></c></row>
            <row r="2"><c r="A2" t="inlineStr"><is><t>Ann</t></is></c><c r="B2"><v>1</v></c></row>
            <row r="3"/>
            <row r="5"><c r="A5" t="inlineStr"><is><t>Cy</t></is></c><c r="B5"><v>3</v></c></row>
            <row r="6"><c r="A6" t="inlineStr"><is><t> </t></is></c></row>
        </sheetData></worksheet>"#;

        let rows = parse_worksheet(xml, &context(&[], &[])).unwrap();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[1], vec!["Ann", "1"]);
        assert!(rows[2].is_empty());
        assert!(rows[3].is_empty());
        assert_eq!(rows[4], vec!["Cy", "3"]);

        let mut rows = rows.into_iter();
        let header = rows.next().unwrap();
        let dataset = deckmerge_core::Dataset::from_records(header, rows.collect());
        assert_eq!(dataset.len(), 4);
        assert_eq!(dataset.row(1).unwrap().get("Name"), Some(""));
        assert_eq!(dataset.row(3).unwrap().get("Name"), Some("Cy"));
    }

    #[test]
    fn test_parse_worksheet_header_in_later_row() {
        let xml = r#"<worksheet><sheetData><row r="2"><c r="B2" t="inlineStr"><is><t>Name</t></is></c></row></sheetData></worksheet>"#;
        let rows = parse_worksheet(xml, &context(&[], &[])).unwrap();
        assert_eq!(rows, vec![Vec::<String>::new(), vec![String::new(), "Name".to_string()]]);
    }

    #[test]
    fn test_parse_worksheet_rejects_bad_references() {
        let ctx = context(&[], &[]);
        let wide = r#"<worksheet><sheetData><row r="1"><c r="ZZZZZZZZZZZZZZ1"><v>1</v></c></row></sheetData></worksheet>"#;
        assert!(matches!(parse_worksheet(wide, &ctx), Err(Error::Xml(_))));

        let tall = r#"<worksheet><sheetData><row r="99999999"><c><v>1</v></c></row></sheetData></worksheet>"#;
        assert!(matches!(parse_worksheet(tall, &ctx), Err(Error::Xml(_))));
    }

    #[test]
    fn test_parse_worksheet_without_references() {
        let xml = r#"<worksheet><sheetData><row><c t="inlineStr"><is><t>A</t></is></c><c t="inlineStr"><is><t>B</t></is></c></row></sheetData></worksheet>"#;
        let rows = parse_worksheet(xml, &context(&[], &[])).unwrap();
        assert_eq!(rows, vec![vec!["A".to_string(), "B".to_string()]]);
    }
}
