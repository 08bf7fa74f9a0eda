//! Generation settings from a JSON file and command-line flags.

use chrono::{DateTime, Local};
use deckmerge_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of records placed on each page.
pub const DEFAULT_RECORDS_PER_PAGE: usize = 1;

fn default_records_per_page() -> usize {
    DEFAULT_RECORDS_PER_PAGE
}

/// Fully resolved settings for one generation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub template_path: PathBuf,
    pub dataset_path: PathBuf,
    pub output_path: PathBuf,
    #[serde(default = "default_records_per_page")]
    pub records_per_page: usize,
}

impl GenerationConfig {
    /// Settings with the default output name and one record per page.
    pub fn new(template_path: impl Into<PathBuf>, dataset_path: impl Into<PathBuf>) -> Self {
        Self {
            template_path: template_path.into(),
            dataset_path: dataset_path.into(),
            output_path: default_output_path(Local::now()),
            records_per_page: DEFAULT_RECORDS_PER_PAGE,
        }
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_records_per_page(mut self, records_per_page: usize) -> Self {
        self.records_per_page = records_per_page;
        self
    }

    /// Reject layouts with fewer than one record per page.
    pub fn validate(&self) -> Result<()> {
        if self.records_per_page < 1 {
            return Err(Error::InvalidLayout(self.records_per_page));
        }
        Ok(())
    }
}

/// Partial settings as they appear in a config file or on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigFile {
    pub template_path: Option<PathBuf>,
    pub dataset_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub records_per_page: Option<usize>,
}

impl ConfigFile {
    /// Read settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    /// Combine with `overrides`, whose values win where present.
    pub fn overlay(self, overrides: ConfigFile) -> Self {
        Self {
            template_path: overrides.template_path.or(self.template_path),
            dataset_path: overrides.dataset_path.or(self.dataset_path),
            output_path: overrides.output_path.or(self.output_path),
            records_per_page: overrides.records_per_page.or(self.records_per_page),
        }
    }

    /// Fill in defaults; the template and dataset paths are required.
    pub fn resolve(self, now: DateTime<Local>) -> Result<GenerationConfig> {
        let template_path = self.template_path.ok_or_else(|| {
            Error::Config("No template given (use --template or templatePath)".to_string())
        })?;
        let dataset_path = self.dataset_path.ok_or_else(|| {
            Error::Config("No dataset given (use --data or datasetPath)".to_string())
        })?;

        Ok(GenerationConfig {
            template_path,
            dataset_path,
            output_path: self.output_path.unwrap_or_else(|| default_output_path(now)),
            records_per_page: self.records_per_page.unwrap_or(DEFAULT_RECORDS_PER_PAGE),
        })
    }
}

/// `Result_<YYYYMMDD_HHMMSS>.pptx` in the current directory.
pub fn default_output_path(now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!("Result_{}.pptx", now.format("%Y%m%d_%H%M%S")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 12, 5, 7).unwrap()
    }

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(noon()),
            PathBuf::from("Result_20240309_120507.pptx")
        );
    }

    #[test]
    fn test_config_file_camel_case() {
        let json = r#"{"templatePath": "t.pptx", "datasetPath": "d.xlsx", "recordsPerPage": 3}"#;
        let file: ConfigFile = serde_json::from_str(json).unwrap();
        assert_eq!(file.template_path, Some(PathBuf::from("t.pptx")));
        assert_eq!(file.records_per_page, Some(3));
        assert_eq!(file.output_path, None);

        let config = file.resolve(noon()).unwrap();
        assert_eq!(config.output_path, PathBuf::from("Result_20240309_120507.pptx"));
        assert_eq!(config.records_per_page, 3);
    }

    #[test]
    fn test_overlay_prefers_overrides() {
        let file = ConfigFile {
            template_path: Some("a.pptx".into()),
            dataset_path: Some("a.xlsx".into()),
            output_path: None,
            records_per_page: Some(2),
        };
        let flags = ConfigFile {
            dataset_path: Some("b.csv".into()),
            records_per_page: Some(4),
            ..Default::default()
        };

        let merged = file.overlay(flags);
        assert_eq!(merged.template_path, Some(PathBuf::from("a.pptx")));
        assert_eq!(merged.dataset_path, Some(PathBuf::from("b.csv")));
        assert_eq!(merged.records_per_page, Some(4));
    }

    #[test]
    fn test_resolve_requires_paths() {
        let err = ConfigFile::default().resolve(noon()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("template"));
    }

    #[test]
    fn test_load_reports_config_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deckmerge.json");

        let missing = ConfigFile::load(&path).unwrap_err();
        assert!(matches!(missing, Error::Config(_)));

        std::fs::write(&path, "{\"recordsPerPage\": \"two\"}").unwrap();
        let invalid = ConfigFile::load(&path).unwrap_err();
        assert!(matches!(invalid, Error::Config(_)));
        assert!(invalid.to_string().contains("Invalid config"));

        std::fs::write(&path, "{\"templatePath\": \"t.pptx\"}").unwrap();
        let file = ConfigFile::load(&path).unwrap();
        assert_eq!(file.template_path, Some(PathBuf::from("t.pptx")));
    }

    #[test]
    fn test_records_per_page_defaults_to_one() {
        let json = r#"{"templatePath": "t.pptx", "datasetPath": "d.xlsx", "outputPath": "o.pptx"}"#;
        let config: GenerationConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.records_per_page, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = GenerationConfig::new("t.pptx", "d.xlsx").with_records_per_page(0);
        assert!(matches!(config.validate(), Err(Error::InvalidLayout(0))));
    }
}
