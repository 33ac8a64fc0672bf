use std::collections::HashMap;

use crate::models::{TextRange, UnitId, UnitKind};

/// Maps snapshot-coordinate ranges to live-document coordinates.
///
/// Every successful replacement in a unit shifts the bytes after it by
/// `content.len() - range.len()`. Ranges handed out by the reconciler never
/// overlap an earlier replacement, so only replacements ending at or before
/// a range's start contribute to its offset.
#[derive(Debug, Default)]
pub struct RangeRebaser {
    edits: HashMap<(UnitKind, UnitId), Vec<(TextRange, isize)>>,
}

impl RangeRebaser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live range for a snapshot range, or `None` if the arithmetic leaves
    /// the unit (only possible if the caller skipped reconciliation).
    pub fn rebase(&self, kind: UnitKind, id: UnitId, range: TextRange) -> Option<TextRange> {
        let Some(edits) = self.edits.get(&(kind, id)) else {
            return Some(range);
        };

        let shift: isize = edits
            .iter()
            .filter(|(replaced, _)| replaced.end <= range.start)
            .map(|(_, delta)| *delta)
            .sum();

        let start = range.start.checked_add_signed(shift)?;
        let end = range.end.checked_add_signed(shift)?;
        Some(TextRange::new(start, end))
    }

    /// Record a replacement that succeeded, in snapshot coordinates.
    pub fn record_replacement(
        &mut self,
        kind: UnitKind,
        id: UnitId,
        snapshot_range: TextRange,
        new_len: usize,
    ) {
        let delta = new_len as isize - snapshot_range.len() as isize;
        self.edits
            .entry((kind, id))
            .or_default()
            .push((snapshot_range, delta));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P0: UnitId = UnitId::Index(0);

    #[test]
    fn untouched_unit_is_identity() {
        let rebaser = RangeRebaser::new();
        let r = TextRange::new(3, 7);
        assert_eq!(rebaser.rebase(UnitKind::Paragraph, P0, r), Some(r));
    }

    #[test]
    fn earlier_replacement_shifts_later_ranges() {
        let mut rebaser = RangeRebaser::new();
        // "The cat sat on the mat": "cat" (4..7) -> "tiger"
        rebaser.record_replacement(UnitKind::Paragraph, P0, TextRange::new(4, 7), 5);
        // "mat" at 19..22 moves right by 2
        assert_eq!(
            rebaser.rebase(UnitKind::Paragraph, P0, TextRange::new(19, 22)),
            Some(TextRange::new(21, 24))
        );
        // "The" before the edit does not move
        assert_eq!(
            rebaser.rebase(UnitKind::Paragraph, P0, TextRange::new(0, 3)),
            Some(TextRange::new(0, 3))
        );
    }

    #[test]
    fn shrinking_replacements_accumulate() {
        let mut rebaser = RangeRebaser::new();
        rebaser.record_replacement(UnitKind::Paragraph, P0, TextRange::new(0, 5), 1);
        rebaser.record_replacement(UnitKind::Paragraph, P0, TextRange::new(10, 14), 2);
        assert_eq!(
            rebaser.rebase(UnitKind::Paragraph, P0, TextRange::new(20, 25)),
            Some(TextRange::new(14, 19))
        );
    }

    #[test]
    fn edits_are_scoped_to_their_unit() {
        let mut rebaser = RangeRebaser::new();
        rebaser.record_replacement(UnitKind::Paragraph, P0, TextRange::new(0, 3), 10);
        let r = TextRange::new(5, 6);
        assert_eq!(rebaser.rebase(UnitKind::Paragraph, UnitId::Index(1), r), Some(r));
        assert_eq!(rebaser.rebase(UnitKind::Section, P0, r), Some(r));
    }
}
