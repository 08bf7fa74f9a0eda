//! Deck generation facade and configuration for the `deckmerge` command.

pub mod config;
pub mod generator;

pub use config::{default_output_path, ConfigFile, GenerationConfig, DEFAULT_RECORDS_PER_PAGE};
pub use generator::{GenerationSummary, Generator};
