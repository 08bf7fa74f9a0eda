//! Legacy binary workbook (`.xls`) reader.

use crate::cell::{format_number, DATE_TIME_FORMAT};
use crate::RawTable;
use calamine::{Data, Range, Reader, Xls, XlsError};
use std::io::{Read, Seek};

/// Read the first worksheet of a BIFF workbook.
///
/// Rows and columns are positioned from `A1` the same way the XLSX reader
/// positions them, so sheet row 1 is the header.
pub fn read_xls<R: Read + Seek>(reader: R) -> Result<RawTable, XlsError> {
    let mut workbook: Xls<R> = Xls::new(reader)?;
    match workbook.worksheet_range_at(0) {
        Some(range) => Ok(range_to_table(&range?)),
        None => Ok(RawTable::default()),
    }
}

fn range_to_table(range: &Range<Data>) -> RawTable {
    let Some((first_row, first_column)) = range.start() else {
        return RawTable::default();
    };

    let mut rows: Vec<Vec<String>> = vec![Vec::new(); first_row as usize];
    for cells in range.rows() {
        let mut row = vec![String::new(); first_column as usize];
        row.extend(cells.iter().map(cell_text));
        rows.push(row);
    }

    let mut rows = rows.into_iter();
    let header = rows.next().unwrap_or_default();
    RawTable {
        header,
        records: rows.collect(),
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) | Data::DurationIso(s) => s.clone(),
        Data::DateTimeIso(s) => s.replacen('T', " ", 1),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_number(*f),
        Data::Bool(true) => "True".to_string(),
        Data::Bool(false) => "False".to_string(),
        Data::DateTime(value) => match value.as_datetime() {
            Some(datetime) if !value.is_duration() => datetime.format(DATE_TIME_FORMAT).to_string(),
            _ => format_number(value.as_f64()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::CellErrorType;
    use std::io::Cursor;

    #[test]
    fn test_range_positions_from_a1() {
        let mut range = Range::new((0, 1), (3, 2));
        range.set_value((0, 1), Data::String("Name".to_string()));
        range.set_value((0, 2), Data::String("Score".to_string()));
        range.set_value((1, 1), Data::String("Ann".to_string()));
        range.set_value((1, 2), Data::Float(90.0));
        range.set_value((3, 1), Data::Bool(true));
        range.set_value((3, 2), Data::Error(CellErrorType::Div0));

        let table = range_to_table(&range);
        assert_eq!(table.header, vec!["", "Name", "Score"]);
        assert_eq!(
            table.records,
            vec![
                vec!["".to_string(), "Ann".to_string(), "90".to_string()],
                vec![String::new(); 3],
                vec!["".to_string(), "True".to_string(), "".to_string()],
            ]
        );
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Int(7)), "7");
        assert_eq!(cell_text(&Data::Float(85.5)), "85.5");
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(
            cell_text(&Data::DateTimeIso("2024-01-05T18:00:00".to_string())),
            "2024-01-05 18:00:00"
        );
    }

    #[test]
    fn test_empty_range() {
        let range: Range<Data> = Range::empty();
        assert_eq!(range_to_table(&range), RawTable::default());
    }

    #[test]
    fn test_read_xls_rejects_garbage() {
        assert!(read_xls(Cursor::new(b"not a workbook".to_vec())).is_err());

        // Truncated compound-file header.
        let mut data = vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
        data.extend_from_slice(&[0u8; 64]);
        assert!(read_xls(Cursor::new(data)).is_err());
    }
}
