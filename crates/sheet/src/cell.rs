//! Cell value stringification: numbers, dates and number-format detection.

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Rendering used for date-styled numeric cells.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Columns in a worksheet, `A` through `XFD`.
pub const MAX_COLUMNS: usize = 16_384;

/// Rows in a worksheet.
pub const MAX_ROWS: usize = 1_048_576;

/// Which epoch a workbook's date serials count from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateSystem {
    /// Windows default: serial 1 is 1900-01-01, with the phantom 1900-02-29.
    #[default]
    Excel1900,
    /// Classic Mac: serial 0 is 1904-01-01.
    Excel1904,
}

/// Render a numeric cell the way a spreadsheet user reads it.
///
/// Integral values drop the fractional part: `90.0` becomes `90`.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Convert a date serial to a timestamp, rounded to the nearest second.
pub fn serial_to_datetime(serial: f64, system: DateSystem) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }

    let epoch = match system {
        // Serials before the phantom leap day are one day off the 1899-12-30 epoch.
        DateSystem::Excel1900 if serial < 60.0 => NaiveDate::from_ymd_opt(1899, 12, 31)?,
        DateSystem::Excel1900 => NaiveDate::from_ymd_opt(1899, 12, 30)?,
        DateSystem::Excel1904 => NaiveDate::from_ymd_opt(1904, 1, 1)?,
    };

    let seconds = (serial * 86_400.0).round() as i64;
    epoch
        .and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::try_seconds(seconds)?)
}

/// Render a date-styled numeric cell, falling back to the plain number.
pub fn format_date(serial: f64, system: DateSystem) -> String {
    match serial_to_datetime(serial, system) {
        Some(datetime) => datetime.format(DATE_TIME_FORMAT).to_string(),
        None => format_number(serial),
    }
}

/// Whether a built-in number format id is a date or time format.
pub fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=22 | 27..=36 | 45..=47 | 50..=58)
}

/// Whether a custom number format code displays a date or time.
///
/// Only the first section is considered. Quoted literals, escaped characters
/// and bracketed locale or color tokens are skipped; elapsed-time formats
/// such as `[h]:mm` are durations and do not count.
pub fn is_date_format(code: &str) -> bool {
    let mut escaped = false;
    let mut quoted = false;
    let mut bracket: Option<String> = None;

    for c in code.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        if quoted {
            if c == '"' {
                quoted = false;
            }
            continue;
        }
        if let Some(content) = bracket.as_mut() {
            if c != ']' {
                content.push(c);
                continue;
            }
            // Elapsed time such as `[h]:mm` is a duration, not a date.
            if !content.is_empty() && content.chars().all(|c| "hmsHMS".contains(c)) {
                return false;
            }
            bracket = None;
            continue;
        }
        match c {
            '\\' | '_' => escaped = true,
            '"' => quoted = true,
            ';' => return false,
            '[' => bracket = Some(String::new()),
            'd' | 'm' | 'y' | 'h' | 's' | 'D' | 'M' | 'Y' | 'H' | 'S' => return true,
            _ => {}
        }
    }
    false
}

/// Zero-based column index of a cell reference such as `B7` or `AA1`.
///
/// References past column `XFD` are rejected.
pub fn column_index(reference: &str) -> Option<usize> {
    let letters: &str = reference
        .split(|c: char| c.is_ascii_digit())
        .next()
        .filter(|s| !s.is_empty())?;

    let mut index = 0usize;
    for byte in letters.bytes() {
        if !byte.is_ascii_alphabetic() {
            return None;
        }
        index = index
            .checked_mul(26)?
            .checked_add((byte.to_ascii_uppercase() - b'A' + 1) as usize)?;
        if index > MAX_COLUMNS {
            return None;
        }
    }
    Some(index - 1)
}
