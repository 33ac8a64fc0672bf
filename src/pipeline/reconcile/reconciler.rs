use std::collections::HashMap;

use super::types::{Reconciliation, Rejection, RejectionReason};
use crate::models::{
    ActionKind, Anchor, ApplyAction, OpState, PatchMode, PatchOp, StructureSnapshot, TextRange,
    UnitId, UnitKind,
};

/// Turn untrusted ops into validated actions against the frozen snapshot.
///
/// Pure and deterministic. Every op ends in exactly one of: an action, or a
/// rejection. Nothing here reads the live document; anchors are resolved
/// against snapshot text so that earlier edits in the same batch cannot
/// move them.
pub fn reconcile(snapshot: &StructureSnapshot, ops: &[PatchOp]) -> Reconciliation {
    let mut out = Reconciliation {
        states: vec![OpState::Received; ops.len()],
        ..Reconciliation::default()
    };
    let mut claimed: HashMap<(UnitKind, UnitId), Vec<TextRange>> = HashMap::new();

    for (sequence, op) in ops.iter().enumerate() {
        let Some(unit) = snapshot.resolve(op.target_kind, &op.target_id) else {
            tracing::debug!(
                sequence,
                kind = %op.target_kind,
                id = %op.target_id,
                "Op rejected: target not in snapshot"
            );
            reject(&mut out, sequence, RejectionReason::UnknownTarget);
            continue;
        };

        if op.mode != PatchMode::Annotate && op.content.trim().is_empty() {
            tracing::debug!(sequence, "Op rejected: empty content");
            reject(&mut out, sequence, RejectionReason::EmptyContent);
            continue;
        }
        out.states[sequence] = OpState::Validated;

        let anchor = resolve_anchor(&unit.text, op.target_text.as_deref());
        out.states[sequence] = OpState::Anchored;

        let (mut kind, mut anchor, mut degraded) = match (op.mode, anchor) {
            (PatchMode::AppendAfter, anchor) => (ActionKind::InsertAfter, anchor, false),
            (PatchMode::ReplaceInPlace, Anchor::Range(range)) => {
                (ActionKind::ReplaceRange, Anchor::Range(range), false)
            }
            (PatchMode::ReplaceInPlace, Anchor::WholeUnit) => {
                (ActionKind::Comment { highlight: false }, Anchor::WholeUnit, true)
            }
            (PatchMode::Annotate, Anchor::Range(range)) => {
                (ActionKind::Comment { highlight: true }, Anchor::Range(range), false)
            }
            (PatchMode::Annotate, Anchor::WholeUnit) => {
                (ActionKind::Comment { highlight: false }, Anchor::WholeUnit, false)
            }
        };

        // Overlaps are judged against replace ranges only; insertions and
        // comments never move text. A range inside replaced text no longer
        // exists in the live unit, so it is widened to the whole unit.
        let unit_claims = claimed.entry((unit.kind, unit.id)).or_default();
        if let Some(range) = anchor.range() {
            let overlaps = unit_claims.iter().any(|c| c.overlaps(&range));
            match kind {
                ActionKind::ReplaceRange if overlaps => {
                    kind = ActionKind::Comment { highlight: false };
                    anchor = Anchor::WholeUnit;
                    degraded = true;
                }
                ActionKind::ReplaceRange => unit_claims.push(range),
                ActionKind::Comment { .. } if overlaps => {
                    kind = ActionKind::Comment { highlight: false };
                    anchor = Anchor::WholeUnit;
                    degraded = true;
                }
                ActionKind::InsertAfter if overlaps => {
                    anchor = Anchor::WholeUnit;
                    degraded = true;
                }
                _ => {}
            }
        }

        if degraded {
            out.degraded += 1;
            tracing::debug!(sequence, unit = %unit.id, "Action widened to the whole unit");
        }

        out.actions.push(ApplyAction {
            sequence,
            unit_id: unit.id,
            unit_kind: unit.kind,
            anchor,
            kind,
            content: op.content.clone(),
            explanation: op.explanation.clone(),
            degraded,
        });
    }

    tracing::debug!(
        ops = ops.len(),
        actions = out.actions.len(),
        rejected = out.rejected_count(),
        degraded = out.degraded,
        "Reconciliation complete"
    );
    out
}

fn reject(out: &mut Reconciliation, sequence: usize, reason: RejectionReason) {
    out.states[sequence] = OpState::Rejected;
    out.rejections.push(Rejection { sequence, reason });
}

/// First exact occurrence of `target` in `text`, else the whole unit.
fn resolve_anchor(text: &str, target: Option<&str>) -> Anchor {
    match target.filter(|t| !t.is_empty()) {
        Some(target) => match text.find(target) {
            Some(start) => Anchor::Range(TextRange::new(start, start + target.len())),
            None => Anchor::WholeUnit,
        },
        None => Anchor::WholeUnit,
    }
}
