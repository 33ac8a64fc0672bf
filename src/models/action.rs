use serde::{Deserialize, Serialize};

use super::enums::UnitKind;
use super::structure::UnitId;

/// Half-open UTF-8 byte range into a unit's text. Always on char boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn overlaps(&self, other: &TextRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Where an edit lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Anchor {
    WholeUnit,
    Range(TextRange),
}

impl Anchor {
    pub fn range(&self) -> Option<TextRange> {
        match self {
            Self::WholeUnit => None,
            Self::Range(r) => Some(*r),
        }
    }
}

/// The host mutation an action asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Pure insertion after the anchor; existing text is untouched.
    InsertAfter,
    /// Splice `content` over an exact sub-range.
    ReplaceRange,
    /// Attach `content` as a comment. `highlight` marks the anchored range as well.
    Comment { highlight: bool },
}

/// Validated, host-independent instruction ready for execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyAction {
    /// Position of the originating op in the oracle's batch.
    pub sequence: usize,
    pub unit_id: UnitId,
    pub unit_kind: UnitKind,
    pub anchor: Anchor,
    pub kind: ActionKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Scope was reduced during reconciliation (substring miss or overlap).
    #[serde(default)]
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlapping_ranges() {
        let a = TextRange::new(0, 5);
        assert!(a.overlaps(&TextRange::new(4, 8)));
        assert!(!a.overlaps(&TextRange::new(5, 8)));
        assert!(!TextRange::new(6, 9).overlaps(&a));
    }

    #[test]
    fn anchor_serializes_with_tag() {
        let json = serde_json::to_string(&Anchor::Range(TextRange::new(4, 7))).unwrap();
        assert_eq!(json, r#"{"type":"range","start":4,"end":7}"#);
        let json = serde_json::to_string(&Anchor::WholeUnit).unwrap();
        assert_eq!(json, r#"{"type":"whole_unit"}"#);
    }

    #[test]
    fn range_len() {
        let r = TextRange::new(4, 7);
        assert_eq!(r.len(), 3);
        assert!(!r.is_empty());
        assert!(TextRange::new(2, 2).is_empty());
    }
}
