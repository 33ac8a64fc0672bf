use serde::{Deserialize, Serialize};

use super::ExtractionError;
use crate::models::{StructureUnit, UnitId, UnitKind};

/// A unit as reported by the host, before ordering and validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostUnit {
    /// Document-order key. Units are sorted by this, never by kind.
    pub position: usize,
    pub id: UnitId,
    pub kind: UnitKind,
    pub text: String,
    pub style: Option<String>,
}

impl HostUnit {
    pub fn into_unit(self) -> StructureUnit {
        StructureUnit {
            id: self.id,
            kind: self.kind,
            text: self.text,
            style: self.style,
        }
    }
}

/// Read-only view of a host document's addressable text units.
pub trait DocumentSource {
    /// Enumerate every addressable unit. Must not mutate the document.
    fn enumerate(&self) -> Result<Vec<HostUnit>, ExtractionError>;
}

/// Extracts the text of an uploaded source file (e.g. a PDF).
pub trait SourceTextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractionError>;
}
