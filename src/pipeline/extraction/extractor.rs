use std::collections::HashSet;

use base64::Engine;
use sha2::{Digest, Sha256};

use super::types::DocumentSource;
use super::ExtractionError;
use crate::models::{StructureSnapshot, StructureUnit, UnitId, UnitKind};

/// Snapshot the host document's units in document order.
///
/// Units are ordered by their host position (stable for ties), validated for
/// unique `(kind, id)` pairs and id/kind agreement, and fingerprinted so a
/// later re-extraction can prove the document was not touched mid-pass.
pub fn extract_structure(
    source: &dyn DocumentSource,
) -> Result<StructureSnapshot, ExtractionError> {
    let mut host_units = source.enumerate()?;
    host_units.sort_by_key(|u| u.position);

    let mut seen: HashSet<(UnitKind, UnitId)> = HashSet::with_capacity(host_units.len());
    let mut units = Vec::with_capacity(host_units.len());

    for host_unit in host_units {
        let cell_id = matches!(host_unit.id, UnitId::Cell { .. });
        if cell_id != host_unit.kind.uses_cell_ids() {
            return Err(ExtractionError::IdKindMismatch {
                kind: host_unit.kind,
                id: host_unit.id,
            });
        }
        if !seen.insert((host_unit.kind, host_unit.id)) {
            return Err(ExtractionError::DuplicateUnit {
                kind: host_unit.kind,
                id: host_unit.id,
            });
        }
        units.push(host_unit.into_unit());
    }

    let fingerprint = fingerprint_units(&units)?;
    tracing::debug!(units = units.len(), "Document structure extracted");

    Ok(StructureSnapshot { units, fingerprint })
}

/// SHA-256 over the JSON serialization of the units, base64-encoded.
pub fn fingerprint_units(units: &[StructureUnit]) -> Result<String, ExtractionError> {
    let serialized = serde_json::to_vec(units)?;
    let hash = Sha256::digest(&serialized);
    Ok(base64::engine::general_purpose::STANDARD.encode(hash))
}
