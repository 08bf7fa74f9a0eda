//! PPTX (Office Open XML) backend for templated slide generation.
//!
//! Reads a template package and its first slide into the shared document
//! model, and writes generated pages back out as a new package that reuses
//! the template's masters, layouts, theme and media.

pub mod package;
pub mod reader;
pub(crate) mod slide;
pub mod writer;
pub(crate) mod xml;

pub use package::{Package, Relationship};
pub use reader::PptxTemplate;
pub use writer::PptxWriter;
