use serde::{Deserialize, Serialize};

use super::enums::UnitKind;
use super::patch::ClaimedId;

/// Stable positional identifier of a unit within its collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UnitId {
    /// Paragraph or section ordinal.
    Index(usize),
    /// Table cell coordinates.
    Cell { table: usize, row: usize, col: usize },
}

impl UnitId {
    /// Does an oracle-supplied id refer to this unit?
    pub fn matches(&self, claimed: &ClaimedId) -> bool {
        match (self, claimed) {
            (Self::Index(i), ClaimedId::Index(c)) => usize::try_from(*c).is_ok_and(|c| c == *i),
            (
                Self::Cell { table, row, col },
                ClaimedId::Cell {
                    table: t,
                    row: r,
                    col: c,
                },
            ) => {
                usize::try_from(*t).is_ok_and(|t| t == *table)
                    && usize::try_from(*r).is_ok_and(|r| r == *row)
                    && usize::try_from(*c).is_ok_and(|c| c == *col)
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for UnitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Cell { table, row, col } => write!(f, "{table}:{row}:{col}"),
        }
    }
}

/// One addressable region of a document, snapshotted at extraction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureUnit {
    pub id: UnitId,
    pub kind: UnitKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
}

impl StructureUnit {
    pub fn paragraph(index: usize, text: &str) -> Self {
        Self {
            id: UnitId::Index(index),
            kind: UnitKind::Paragraph,
            text: text.to_string(),
            style: None,
        }
    }

    pub fn section(index: usize, text: &str) -> Self {
        Self {
            id: UnitId::Index(index),
            kind: UnitKind::Section,
            text: text.to_string(),
            style: None,
        }
    }

    pub fn table_cell(table: usize, row: usize, col: usize, text: &str) -> Self {
        Self {
            id: UnitId::Cell { table, row, col },
            kind: UnitKind::TableCell,
            text: text.to_string(),
            style: None,
        }
    }

    pub fn with_style(mut self, style: &str) -> Self {
        self.style = Some(style.to_string());
        self
    }
}

/// The frozen document structure for one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructureSnapshot {
    pub units: Vec<StructureUnit>,
    /// Base64 SHA-256 of the serialized units.
    pub fingerprint: String,
}

impl StructureSnapshot {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Bounds check: the unit of `kind` whose id matches the claim, if any.
    pub fn resolve(&self, kind: UnitKind, claimed: &ClaimedId) -> Option<&StructureUnit> {
        self.units
            .iter()
            .find(|u| u.kind == kind && u.id.matches(claimed))
    }

    pub fn get(&self, kind: UnitKind, id: &UnitId) -> Option<&StructureUnit> {
        self.units.iter().find(|u| u.kind == kind && u.id == *id)
    }
}
