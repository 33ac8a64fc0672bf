use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field} value: {value}")]
pub struct ParseEnumError {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ParseEnumError {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(UnitKind {
    Paragraph => "paragraph",
    TableCell => "table_cell",
    Section => "section",
});

str_enum!(PatchMode {
    AppendAfter => "append_after",
    ReplaceInPlace => "replace_in_place",
    Annotate => "annotate",
});

str_enum!(OpState {
    Received => "received",
    Validated => "validated",
    Anchored => "anchored",
    Applied => "applied",
    Rejected => "rejected",
    ApplyFailed => "apply_failed",
});

impl UnitKind {
    /// Paragraphs and sections are addressed by ordinal, table cells by coordinates.
    pub fn uses_cell_ids(&self) -> bool {
        matches!(self, Self::TableCell)
    }
}

impl OpState {
    /// True once the op can no longer change state within a pass.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Applied | Self::Rejected | Self::ApplyFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn unit_kind_round_trips_through_str() {
        for kind in [UnitKind::Paragraph, UnitKind::TableCell, UnitKind::Section] {
            assert_eq!(UnitKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_mode_is_an_error() {
        let err = PatchMode::from_str("rewrite").unwrap_err();
        assert_eq!(err.field, "PatchMode");
        assert_eq!(err.value, "rewrite");
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&UnitKind::TableCell).unwrap();
        assert_eq!(json, "\"table_cell\"");
        let mode: PatchMode = serde_json::from_str("\"replace_in_place\"").unwrap();
        assert_eq!(mode, PatchMode::ReplaceInPlace);
    }

    #[test]
    fn terminal_states() {
        assert!(OpState::Applied.is_terminal());
        assert!(OpState::Rejected.is_terminal());
        assert!(OpState::ApplyFailed.is_terminal());
        assert!(!OpState::Anchored.is_terminal());
        assert!(!OpState::Received.is_terminal());
    }

    #[test]
    fn only_table_cells_use_cell_ids() {
        assert!(UnitKind::TableCell.uses_cell_ids());
        assert!(!UnitKind::Paragraph.uses_cell_ids());
        assert!(!UnitKind::Section.uses_cell_ids());
    }
}
