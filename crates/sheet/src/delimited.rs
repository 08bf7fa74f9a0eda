//! Comma-separated text reader.

use crate::RawTable;
use std::io::Read;

const BOM: char = '\u{feff}';

/// Read comma-separated text: first record is the header.
///
/// Records may have differing lengths; empty lines are skipped.
pub fn read_csv<R: Read>(reader: R) -> csv::Result<RawTable> {
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut records = Vec::new();
    for record in csv.records() {
        records.push(record?.iter().map(str::to_string).collect::<Vec<_>>());
    }

    let mut records = records.into_iter();
    let mut header = records.next().unwrap_or_default();
    if let Some(first) = header.first_mut() {
        if let Some(stripped) = first.strip_prefix(BOM) {
            *first = stripped.to_string();
        }
    }

    Ok(RawTable {
        header,
        records: records.collect(),
    })
}
