use serde::Serialize;

use super::rebase::RangeRebaser;
use super::ApplyError;
use crate::models::{ActionKind, Anchor, ApplyAction};

/// Host-side mutation of the live document.
///
/// Actions arrive in oracle order with ranges already in live coordinates.
/// An implementation must either perform the whole action or leave the
/// document untouched and return an error.
pub trait ApplyExecutor {
    fn apply(&mut self, action: &ApplyAction) -> Result<(), ApplyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyFailure {
    pub sequence: usize,
    pub error: ApplyError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    /// Sequences of the actions the host accepted, in order.
    pub applied: Vec<usize>,
    pub failures: Vec<ApplyFailure>,
}

impl ApplySummary {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

/// Execute `actions` in order. A failed action is recorded and the loop
/// moves on; nothing is retried.
pub fn apply_actions(executor: &mut dyn ApplyExecutor, actions: &[ApplyAction]) -> ApplySummary {
    let mut rebaser = RangeRebaser::new();
    let mut summary = ApplySummary::default();

    for action in actions {
        let live = match live_action(&rebaser, action) {
            Some(live) => live,
            None => {
                let error = ApplyError::Host {
                    message: "range could not be mapped to the live document".into(),
                };
                record_failure(&mut summary, action.sequence, error);
                continue;
            }
        };

        match executor.apply(&live) {
            Ok(()) => {
                if let (ActionKind::ReplaceRange, Anchor::Range(range)) = (action.kind, action.anchor) {
                    rebaser.record_replacement(
                        action.unit_kind,
                        action.unit_id,
                        range,
                        action.content.len(),
                    );
                }
                summary.applied.push(action.sequence);
            }
            Err(error) => record_failure(&mut summary, action.sequence, error),
        }
    }

    tracing::debug!(
        applied = summary.applied_count(),
        failed = summary.failures.len(),
        "Apply complete"
    );
    summary
}

fn live_action(rebaser: &RangeRebaser, action: &ApplyAction) -> Option<ApplyAction> {
    match action.anchor {
        Anchor::WholeUnit => Some(action.clone()),
        Anchor::Range(range) => {
            let live = rebaser.rebase(action.unit_kind, action.unit_id, range)?;
            Some(ApplyAction {
                anchor: Anchor::Range(live),
                ..action.clone()
            })
        }
    }
}

fn record_failure(summary: &mut ApplySummary, sequence: usize, error: ApplyError) {
    tracing::warn!(sequence, error = %error, "Action failed to apply");
    summary.failures.push(ApplyFailure { sequence, error });
}
