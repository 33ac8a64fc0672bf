use serde::{Deserialize, Serialize};

use super::enums::{PatchMode, UnitKind};

/// The id an oracle claims a patch targets. Signed so that a negative index
/// survives parsing and is rejected by the bounds check like any other miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimedId {
    Index(i64),
    Cell { table: i64, row: i64, col: i64 },
}

impl std::fmt::Display for ClaimedId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Cell { table, row, col } => write!(f, "{table}:{row}:{col}"),
        }
    }
}

/// One instruction returned by the remote oracle. Untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOp {
    pub target_kind: UnitKind,
    pub target_id: ClaimedId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_text: Option<String>,
    pub content: String,
    pub mode: PatchMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl PatchOp {
    pub fn append_after(kind: UnitKind, id: ClaimedId, content: &str) -> Self {
        Self {
            target_kind: kind,
            target_id: id,
            target_text: None,
            content: content.to_string(),
            mode: PatchMode::AppendAfter,
            explanation: None,
        }
    }

    pub fn replace(kind: UnitKind, id: ClaimedId, target_text: &str, content: &str) -> Self {
        Self {
            target_kind: kind,
            target_id: id,
            target_text: Some(target_text.to_string()),
            content: content.to_string(),
            mode: PatchMode::ReplaceInPlace,
            explanation: None,
        }
    }

    pub fn annotate(kind: UnitKind, id: ClaimedId, content: &str) -> Self {
        Self {
            target_kind: kind,
            target_id: id,
            target_text: None,
            content: content.to_string(),
            mode: PatchMode::Annotate,
            explanation: None,
        }
    }

    pub fn with_target_text(mut self, target_text: &str) -> Self {
        self.target_text = Some(target_text.to_string());
        self
    }

    pub fn with_explanation(mut self, explanation: &str) -> Self {
        self.explanation = Some(explanation.to_string());
        self
    }
}
