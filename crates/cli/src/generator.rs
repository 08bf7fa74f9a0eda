//! The generation pipeline: load, extract, batch, substitute, serialize.

use crate::config::GenerationConfig;
use deckmerge_core::progress::emit;
use deckmerge_core::{extract_placeholders, Error, LogSink, PageBatcher, ResourceKind, Result};
use deckmerge_pptx::{PptxTemplate, PptxWriter};
use deckmerge_sheet::DatasetLoader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// What a successful run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSummary {
    pub output_path: PathBuf,
    /// Pages written.
    pub pages: usize,
    /// Dataset rows consumed.
    pub rows: usize,
    /// Placeholder names found on the template slide.
    pub placeholders: Vec<String>,
    /// Shapes kept unmodified because substitution failed.
    pub skipped_shapes: usize,
}

/// Runs a whole generation from a [`GenerationConfig`].
pub struct Generator {
    loader: DatasetLoader,
}

impl Generator {
    pub fn new() -> Self {
        Self {
            loader: DatasetLoader::new(),
        }
    }

    /// Generate the output deck, reporting progress to `sink`.
    ///
    /// Missing inputs and invalid layouts are rejected before anything is
    /// read. A fatal error is also reported to the sink before it is returned.
    pub fn run(&self, config: &GenerationConfig, sink: &mut dyn LogSink) -> Result<GenerationSummary> {
        match self.generate(config, sink) {
            Ok(summary) => Ok(summary),
            Err(e) => {
                log::error!("{}", e);
                sink.line(&format!("Error: {}", e));
                Err(e)
            }
        }
    }

    /// Placeholder names on the template's first slide.
    pub fn list_placeholders(&self, template_path: &Path) -> Result<BTreeSet<String>> {
        let template = PptxTemplate::open(template_path)?;
        Ok(extract_placeholders(template.template()))
    }

    fn generate(&self, config: &GenerationConfig, sink: &mut dyn LogSink) -> Result<GenerationSummary> {
        require(&config.template_path, ResourceKind::Template)?;
        require(&config.dataset_path, ResourceKind::Dataset)?;
        config.validate()?;
        let batcher = PageBatcher::new(config.records_per_page)?;

        let template = PptxTemplate::open(&config.template_path)?;
        emit(
            sink,
            &format!("Loaded template: {}", file_name(&config.template_path)),
        );
        if template.slide_count() > 1 {
            log::warn!(
                "Template has {} slides; only the first is used",
                template.slide_count()
            );
        }

        let dataset = self.loader.load(&config.dataset_path)?;
        emit(sink, &format!("Loaded dataset: {} rows", dataset.len()));

        let placeholders: Vec<String> = extract_placeholders(template.template())
            .into_iter()
            .collect();
        emit(
            sink,
            &format!("Detected template placeholders: [{}]", placeholders.join(", ")),
        );

        let batch = batcher.generate(template.template(), &dataset, sink)?;
        let skipped_shapes = batch.skipped_shapes();

        PptxWriter::new(&template).write_to_path(&batch.document, &config.output_path)?;
        emit(sink, &format!("Saved: {}", config.output_path.display()));

        let summary = GenerationSummary {
            output_path: config.output_path.clone(),
            pages: batch.document.len(),
            rows: dataset.len(),
            placeholders,
            skipped_shapes,
        };
        let mut done = format!(
            "Done: {} page(s) from {} row(s)",
            summary.pages, summary.rows
        );
        if skipped_shapes > 0 {
            done.push_str(&format!(", {} shape(s) skipped", skipped_shapes));
        }
        emit(sink, &done);

        Ok(summary)
    }
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

fn require(path: &Path, kind: ResourceKind) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::ResourceNotFound {
            kind,
            path: path.to_path_buf(),
        })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
