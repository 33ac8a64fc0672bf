//! In-memory host document.
//!
//! Reference implementation of both host seams ([`DocumentSource`] and
//! [`ApplyExecutor`]) over an ordered list of blocks. Used by embedders
//! without a live editor and by the pipeline tests.

use serde::Serialize;

use super::apply::{ApplyError, ApplyExecutor};
use super::extraction::{DocumentSource, ExtractionError, HostUnit};
use crate::config::AnalysisConfig;
use crate::models::{ActionKind, Anchor, ApplyAction, TextRange, UnitId, UnitKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocComment {
    /// `None` for a comment on the whole block.
    pub range: Option<TextRange>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    /// Address at the last extraction. Blocks inserted since have none.
    pub id: Option<UnitId>,
    pub kind: UnitKind,
    pub text: String,
    pub style: Option<String>,
    /// Origin unit of an inserted block.
    pub inserted_for: Option<(UnitKind, UnitId)>,
    pub comments: Vec<DocComment>,
    pub highlights: Vec<TextRange>,
}

impl Block {
    fn new(id: UnitId, kind: UnitKind, text: &str, style: Option<String>) -> Self {
        Self {
            id: Some(id),
            kind,
            text: text.to_string(),
            style,
            inserted_for: None,
            comments: Vec::new(),
            highlights: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryDocument {
    blocks: Vec<Block>,
    inherit_style: bool,
}

impl MemoryDocument {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            inherit_style: true,
        }
    }

    /// Empty document following the host settings in `config`.
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new().inherit_style(config.inherit_style)
    }

    /// Whether paragraphs inserted after a unit copy its style.
    pub fn inherit_style(mut self, inherit: bool) -> Self {
        self.inherit_style = inherit;
        self
    }

    pub fn push_paragraph(&mut self, text: &str) -> UnitId {
        self.push_indexed(UnitKind::Paragraph, text, None)
    }

    pub fn push_styled_paragraph(&mut self, text: &str, style: &str) -> UnitId {
        self.push_indexed(UnitKind::Paragraph, text, Some(style.to_string()))
    }

    pub fn push_section(&mut self, text: &str) -> UnitId {
        self.push_indexed(UnitKind::Section, text, None)
    }

    pub fn push_cell(&mut self, table: usize, row: usize, col: usize, text: &str) -> UnitId {
        let id = UnitId::Cell { table, row, col };
        self.blocks.push(Block::new(id, UnitKind::TableCell, text, None));
        id
    }

    fn push_indexed(&mut self, kind: UnitKind, text: &str, style: Option<String>) -> UnitId {
        let ordinal = self.blocks.iter().filter(|b| b.kind == kind).count();
        let id = UnitId::Index(ordinal);
        self.blocks.push(Block::new(id, kind, text, style));
        id
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn block(&self, kind: UnitKind, id: UnitId) -> Option<&Block> {
        self.position_of(kind, id).map(|i| &self.blocks[i])
    }

    /// Overwrite a unit's text directly, outside any pass.
    pub fn set_text(&mut self, kind: UnitKind, id: UnitId, text: &str) -> Result<(), ApplyError> {
        let index = self
            .position_of(kind, id)
            .ok_or(ApplyError::UnitNotFound { kind, id })?;
        self.blocks[index].text = text.to_string();
        Ok(())
    }

    /// Reassign ordinal ids in document order so inserted blocks become
    /// addressable by the next pass.
    pub fn renumber(&mut self) {
        let mut paragraphs = 0usize;
        let mut sections = 0usize;
        for block in &mut self.blocks {
            match block.kind {
                UnitKind::Paragraph => {
                    block.id = Some(UnitId::Index(paragraphs));
                    paragraphs += 1;
                }
                UnitKind::Section => {
                    block.id = Some(UnitId::Index(sections));
                    sections += 1;
                }
                UnitKind::TableCell => {}
            }
            block.inserted_for = None;
        }
    }

    /// Plain text of the document, one block per line.
    pub fn render(&self) -> String {
        self.blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn position_of(&self, kind: UnitKind, id: UnitId) -> Option<usize> {
        self.blocks
            .iter()
            .position(|b| b.kind == kind && b.id == Some(id))
    }

    fn checked_range(&self, index: usize, range: TextRange) -> Result<TextRange, ApplyError> {
        let block = &self.blocks[index];
        let text = &block.text;
        if range.start > range.end
            || range.end > text.len()
            || !text.is_char_boundary(range.start)
            || !text.is_char_boundary(range.end)
        {
            return Err(ApplyError::RangeOutOfBounds {
                kind: block.kind,
                id: block.id.unwrap_or(UnitId::Index(index)),
                range,
                len: text.len(),
            });
        }
        Ok(range)
    }

    /// Inserts are block-level: a range anchor only names the unit, and the
    /// content always lands after the whole unit.
    fn insert_after(&mut self, index: usize, action: &ApplyAction) {
        let origin = (action.unit_kind, action.unit_id);

        if action.unit_kind == UnitKind::TableCell {
            let cell = &mut self.blocks[index];
            if !cell.text.is_empty() {
                cell.text.push('\n');
            }
            cell.text.push_str(&action.content);
            return;
        }

        let style = if self.inherit_style {
            self.blocks[index].style.clone()
        } else {
            None
        };

        // After the unit and anything already inserted for it
        let mut at = index + 1;
        while self
            .blocks
            .get(at)
            .is_some_and(|b| b.inserted_for == Some(origin))
        {
            at += 1;
        }

        for line in action.content.lines() {
            self.blocks.insert(
                at,
                Block {
                    id: None,
                    kind: UnitKind::Paragraph,
                    text: line.to_string(),
                    style: style.clone(),
                    inserted_for: Some(origin),
                    comments: Vec::new(),
                    highlights: Vec::new(),
                },
            );
            at += 1;
        }
    }

    fn replace_range(&mut self, index: usize, range: TextRange, content: &str) {
        let block = &mut self.blocks[index];
        block.text.replace_range(range.start..range.end, content);

        let delta = content.len() as isize - range.len() as isize;
        let new_end = range.start + content.len();
        let shift = |r: &mut TextRange| shift_range(r, range, new_end, delta);

        block.highlights.iter_mut().for_each(shift);
        block
            .comments
            .iter_mut()
            .filter_map(|c| c.range.as_mut())
            .for_each(shift);
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Move `r` to account for `replaced` being spliced to end at `new_end`.
fn shift_range(r: &mut TextRange, replaced: TextRange, new_end: usize, delta: isize) {
    if r.end <= replaced.start {
        return;
    }
    if r.start >= replaced.end {
        r.start = r.start.saturating_add_signed(delta);
        r.end = r.end.saturating_add_signed(delta);
        return;
    }
    // Overlaps the splice: cover the new text.
    r.start = r.start.min(replaced.start);
    r.end = if r.end > replaced.end {
        r.end.saturating_add_signed(delta)
    } else {
        new_end
    };
}

impl DocumentSource for MemoryDocument {
    fn enumerate(&self) -> Result<Vec<HostUnit>, ExtractionError> {
        Ok(self
            .blocks
            .iter()
            .enumerate()
            .filter_map(|(position, b)| {
                b.id.map(|id| HostUnit {
                    position,
                    id,
                    kind: b.kind,
                    text: b.text.clone(),
                    style: b.style.clone(),
                })
            })
            .collect())
    }
}

impl ApplyExecutor for MemoryDocument {
    fn apply(&mut self, action: &ApplyAction) -> Result<(), ApplyError> {
        let index = self
            .position_of(action.unit_kind, action.unit_id)
            .ok_or(ApplyError::UnitNotFound {
                kind: action.unit_kind,
                id: action.unit_id,
            })?;

        match (action.kind, action.anchor) {
            (ActionKind::InsertAfter, _) => self.insert_after(index, action),
            (ActionKind::ReplaceRange, Anchor::Range(range)) => {
                let range = self.checked_range(index, range)?;
                self.replace_range(index, range, &action.content);
            }
            (ActionKind::ReplaceRange, Anchor::WholeUnit) => {
                return Err(ApplyError::Host {
                    message: "replace requires a range".into(),
                });
            }
            (ActionKind::Comment { highlight }, anchor) => {
                let range = match anchor {
                    Anchor::Range(range) => Some(self.checked_range(index, range)?),
                    Anchor::WholeUnit => None,
                };
                let block = &mut self.blocks[index];
                if let (true, Some(range)) = (highlight, range) {
                    block.highlights.push(range);
                }
                block.comments.push(DocComment {
                    range,
                    text: action.content.clone(),
                });
            }
        }
        Ok(())
    }
}
