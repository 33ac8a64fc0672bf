use serde::{Deserialize, Serialize};

use crate::models::{ApplyAction, OpState};

/// Why an op produced no action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// No unit of the claimed kind carries the claimed id.
    UnknownTarget,
    /// Append or replace with blank content.
    EmptyContent,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTarget => f.write_str("unknown target"),
            Self::EmptyContent => f.write_str("empty content"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Position of the op in the oracle's batch.
    pub sequence: usize,
    pub reason: RejectionReason,
}

/// Output of one reconciliation: actions in oracle order plus the
/// bookkeeping needed to report on every op received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub actions: Vec<ApplyAction>,
    pub rejections: Vec<Rejection>,
    /// One entry per op, indexed by sequence.
    pub states: Vec<OpState>,
    /// Actions whose scope was reduced instead of being dropped.
    pub degraded: usize,
}

impl Reconciliation {
    pub fn rejected_count(&self) -> usize {
        self.rejections.len()
    }

    pub fn ops_received(&self) -> usize {
        self.states.len()
    }
}
