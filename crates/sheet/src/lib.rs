//! Dataset loading from spreadsheet and delimited-text files.
//!
//! The format is detected from the file's signature (XLSX is a ZIP package,
//! XLS a compound file) or its extension (`.csv`). Every backend produces a
//! [`RawTable`] that is normalized into a [`Dataset`] the same way.

pub mod cell;
pub mod delimited;
pub mod xls;
pub mod xlsx;

pub use xlsx::XlsxReader;

use deckmerge_core::{Dataset, Error, ResourceKind, Result};
use std::io::Cursor;
use std::path::Path;

const ZIP_SIGNATURE: &[u8] = b"PK\x03\x04";
const OLE_SIGNATURE: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Header and data records exactly as read, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub header: Vec<String>,
    pub records: Vec<Vec<String>>,
}

impl RawTable {
    /// Apply trimming, missing-value and header rules.
    pub fn into_dataset(self) -> Dataset {
        Dataset::from_records(self.header, self.records)
    }
}

/// Supported dataset file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Xlsx,
    Xls,
    Csv,
}

/// Identify the format of a dataset from its leading bytes and file name.
pub fn detect_format(path: &Path, data: &[u8]) -> std::result::Result<SourceFormat, String> {
    if data.starts_with(ZIP_SIGNATURE) {
        return Ok(SourceFormat::Xlsx);
    }
    if data.starts_with(OLE_SIGNATURE) {
        return Ok(SourceFormat::Xls);
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("csv") => Ok(SourceFormat::Csv),
        Some(other) => Err(format!("unsupported dataset format '.{}'", other)),
        None => Err("unsupported dataset format".to_string()),
    }
}

/// Loads datasets from files.
pub struct DatasetLoader;

impl DatasetLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load `path` into a [`Dataset`].
    ///
    /// Fails with [`Error::ResourceNotFound`] if the path does not exist and
    /// [`Error::DataSource`] if no supported reader can parse it.
    pub fn load(&self, path: &Path) -> Result<Dataset> {
        if !path.exists() {
            return Err(Error::ResourceNotFound {
                kind: ResourceKind::Dataset,
                path: path.to_path_buf(),
            });
        }

        let data_source = |reason: String| Error::DataSource {
            path: path.to_path_buf(),
            reason,
        };

        let data = std::fs::read(path).map_err(|e| data_source(e.to_string()))?;
        let format = detect_format(path, &data).map_err(data_source)?;
        log::debug!("Reading {} as {:?}", path.display(), format);

        let table = match format {
            SourceFormat::Xlsx => XlsxReader::new()
                .read(Cursor::new(data))
                .map_err(|e| data_source(e.to_string()))?,
            SourceFormat::Xls => {
                xls::read_xls(Cursor::new(data)).map_err(|e| data_source(e.to_string()))?
            }
            SourceFormat::Csv => {
                delimited::read_csv(data.as_slice()).map_err(|e| data_source(e.to_string()))?
            }
        };

        let dataset = table.into_dataset();
        log::debug!(
            "Dataset has {} row(s) and columns {:?}",
            dataset.len(),
            dataset.columns()
        );
        Ok(dataset)
    }
}

impl Default for DatasetLoader {
    fn default() -> Self {
        Self::new()
    }
}
