//! Core data model, placeholder substitution, and page batching
//! for generating slide decks from a template and a dataset.

pub mod batch;
pub mod dataset;
pub mod document;
pub mod error;
pub mod placeholder;
pub mod progress;
pub mod substitute;

pub use batch::{effective_key, Batch, PageBatcher, PageReport, ShapeOutcome};
pub use dataset::{Dataset, Row};
pub use document::{
    Color, FontStyle, GroupShape, OpaqueShape, OutputDocument, Page, PageSize, Paragraph, Run,
    RunKind, Shape, Template, TextBlock, TextBody, TextShape,
};
pub use error::{Error, ResourceKind, Result};
pub use placeholder::extract_placeholders;
pub use progress::{LogSink, MemorySink, NullSink};
pub use substitute::{substitute, Replacements, SlotReplacementMap};
