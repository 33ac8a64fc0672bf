pub mod executor;
pub mod rebase;

pub use executor::*;
pub use rebase::*;

use serde::Serialize;
use thiserror::Error;

use crate::models::{TextRange, UnitId, UnitKind};

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ApplyError {
    #[error("{kind} {id} no longer exists in the document")]
    UnitNotFound { kind: UnitKind, id: UnitId },

    #[error("Range {}..{} is outside {kind} {id} (length {len})", .range.start, .range.end)]
    RangeOutOfBounds {
        kind: UnitKind,
        id: UnitId,
        range: TextRange,
        len: usize,
    },

    #[error("Host rejected the edit: {message}")]
    Host { message: String },
}
