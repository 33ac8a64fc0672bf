pub mod types;
pub mod extractor;
pub mod sanitize;
pub mod pdf;

pub use types::*;
pub use extractor::*;
pub use sanitize::*;
pub use pdf::*;

use thiserror::Error;

use crate::models::{UnitId, UnitKind};

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Host document could not be read: {0}")]
    Host(String),

    #[error("Duplicate {kind} unit with id {id}")]
    DuplicateUnit { kind: UnitKind, id: UnitId },

    #[error("Unit id {id} is not valid for a {kind}")]
    IdKindMismatch { kind: UnitKind, id: UnitId },

    #[error("Structure serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("PDF has no extractable text layer")]
    NoTextLayer,
}
