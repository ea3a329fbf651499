//! Composition engine for Word (.docx) packages: fills `${name}` templates with
//! scalars, bullet lists, images and generated tables, and merges independently
//! produced packages into one.

pub mod compose;
pub mod config;
pub mod docx;
pub mod error;
pub mod forms;
pub mod jobs;
pub mod template;

pub use docx::document::DocxDocument;
pub use error::{AssembleError, ErrorClass, Stage};
