//! CLI tool for generating a slide deck from a template and a spreadsheet.

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use deckmerge_cli::{ConfigFile, Generator};
use std::path::PathBuf;

/// Fill a one-slide PowerPoint template with spreadsheet rows.
#[derive(Parser, Debug)]
#[command(name = "deckmerge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Template presentation (.pptx); only the first slide is used
    #[arg(short, long)]
    template: Option<PathBuf>,

    /// Dataset (.xlsx, .xls or .csv); the first row holds column names
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Output presentation (default: Result_<timestamp>.pptx)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Records per page; slot 2 and later use `[Column_2]`, `[Column_3]`, ...
    #[arg(short = 'n', long)]
    records_per_page: Option<usize>,

    /// JSON config file; command-line flags take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the template's placeholders and exit
    #[arg(long)]
    list_placeholders: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn flags(&self) -> ConfigFile {
        ConfigFile {
            template_path: self.template.clone(),
            dataset_path: self.data.clone(),
            output_path: self.output.clone(),
            records_per_page: self.records_per_page,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let file = match &args.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };
    let settings = file.overlay(args.flags());
    let generator = Generator::new();

    if args.list_placeholders {
        let template = settings
            .template_path
            .context("--list-placeholders needs a template (use --template)")?;
        let placeholders = generator
            .list_placeholders(&template)
            .with_context(|| format!("Failed to read {}", template.display()))?;
        for name in placeholders {
            println!("[{}]", name);
        }
        return Ok(());
    }

    let config = settings.resolve(Local::now())?;
    let mut sink = |line: &str| {
        eprintln!("[{}] {}", Local::now().format("%H:%M:%S"), line);
    };

    let summary = generator
        .run(&config, &mut sink)
        .with_context(|| format!("Failed to generate {}", config.output_path.display()))?;

    if summary.skipped_shapes > 0 {
        log::warn!("{} shape(s) could not be filled", summary.skipped_shapes);
    }
    println!("{}", summary.output_path.display());

    Ok(())
}
