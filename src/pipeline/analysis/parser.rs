//! Reply parser. Turns the oracle's free-form reply into typed patch ops.
//!
//! The reply is untrusted. Parsing is strict about what matters (kind, id,
//! content, mode) and lenient about packaging (code fences, surrounding
//! prose, wrapper objects, camelCase vs snake_case keys, extra fields).

use serde_json::{Map, Value};

use super::AnalysisError;
use crate::models::{ClaimedId, PatchMode, PatchOp, UnitKind};

/// Object keys an oracle may wrap its op array in.
const WRAPPER_KEYS: &[&str] = &["patches", "suggestions", "items", "results"];

/// Parse a reply into patch ops, preserving reply order.
pub fn parse_patch_response(reply: &str) -> Result<Vec<PatchOp>, AnalysisError> {
    let block = extract_json_block(reply)?;
    let value: Value = serde_json::from_str(block)
        .map_err(|e| AnalysisError::MalformedResponse(format!("reply is not valid JSON: {e}")))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) => unwrap_object(map)?,
        _ => {
            return Err(AnalysisError::MalformedResponse(
                "reply is neither a JSON array nor an object".into(),
            ))
        }
    };

    items
        .iter()
        .enumerate()
        .map(|(position, item)| parse_item(position, item))
        .collect()
}

/// Locate the JSON payload in a reply that may carry fences or prose.
fn extract_json_block(reply: &str) -> Result<&str, AnalysisError> {
    let trimmed = reply.trim();

    if let Some(start) = trimmed.find("```") {
        let after_fence = &trimmed[start + 3..];
        let after_fence = after_fence
            .strip_prefix("json")
            .or_else(|| after_fence.strip_prefix("JSON"))
            .unwrap_or(after_fence);
        if let Some(end) = after_fence.find("```") {
            let block = after_fence[..end].trim();
            if block.starts_with('[') || block.starts_with('{') {
                return Ok(block);
            }
        }
    }

    // Outermost array or object, whichever opens first.
    let open = trimmed.find(['[', '{']).ok_or_else(|| {
        AnalysisError::MalformedResponse("no JSON found in reply".into())
    })?;
    let close_char = if trimmed[open..].starts_with('[') { ']' } else { '}' };
    match trimmed.rfind(close_char) {
        Some(close) if close > open => Ok(&trimmed[open..=close]),
        _ => Err(AnalysisError::MalformedResponse(
            "unterminated JSON in reply".into(),
        )),
    }
}

fn unwrap_object(mut map: Map<String, Value>) -> Result<Vec<Value>, AnalysisError> {
    for key in WRAPPER_KEYS {
        if let Some(inner) = map.remove(*key) {
            return match inner {
                Value::Array(items) => Ok(items),
                _ => Err(AnalysisError::MalformedResponse(format!(
                    "`{key}` is not an array"
                ))),
            };
        }
    }

    // A lone op object
    if ["content", "filledText", "filled_text", "suggested"]
        .iter()
        .any(|k| map.contains_key(*k))
    {
        return Ok(vec![Value::Object(map)]);
    }

    Err(AnalysisError::MalformedResponse(
        "reply object carries no patch list".into(),
    ))
}

fn malformed(position: usize, detail: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::MalformedResponse(format!("item {position}: {detail}"))
}

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| obj.get(*name))
        .filter(|v| !v.is_null())
}

fn required<'a>(
    position: usize,
    obj: &'a Map<String, Value>,
    names: &[&str],
) -> Result<&'a Value, AnalysisError> {
    field(obj, names).ok_or_else(|| malformed(position, format!("missing field `{}`", names[0])))
}

fn string_field(position: usize, value: &Value, name: &str) -> Result<String, AnalysisError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed(position, format!("`{name}` is not a string")))
}

fn optional_string(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    field(obj, names)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Anchor text is matched byte for byte, so it is kept exactly as sent.
fn verbatim_string(obj: &Map<String, Value>, names: &[&str]) -> Option<String> {
    field(obj, names)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

const KIND_KEYS: &[&str] = &["targetKind", "target_kind", "type", "kind"];
const ID_KEYS: &[&str] = &["targetId", "target_id", "index", "id"];

fn parse_item(position: usize, item: &Value) -> Result<PatchOp, AnalysisError> {
    let obj = item
        .as_object()
        .ok_or_else(|| malformed(position, "not a JSON object"))?;

    // Fill shape: {type, index, filledText}
    if let Some(filled) = field(obj, &["filledText", "filled_text"]) {
        let kind = parse_kind(position, required(position, obj, KIND_KEYS)?)?;
        let id = parse_id(position, required(position, obj, ID_KEYS)?)?;
        let content = normalize_content(&string_field(position, filled, "filledText")?);
        return Ok(PatchOp::append_after(kind, id, &content));
    }

    // Review shape: {type?, index, original, suggested, explanation}
    if let Some(suggested) = field(obj, &["suggested", "suggestion"]) {
        let kind = match field(obj, KIND_KEYS) {
            Some(value) => parse_kind(position, value)?,
            None => UnitKind::Paragraph,
        };
        let id = parse_id(position, required(position, obj, ID_KEYS)?)?;
        let content = normalize_content(&string_field(position, suggested, "suggested")?);
        return Ok(PatchOp {
            target_kind: kind,
            target_id: id,
            target_text: verbatim_string(obj, &["original", "targetText", "target_text"]),
            content,
            mode: PatchMode::ReplaceInPlace,
            explanation: optional_string(obj, &["explanation"]),
        });
    }

    // Canonical shape
    let kind = parse_kind(position, required(position, obj, KIND_KEYS)?)?;
    let id = parse_id(position, required(position, obj, ID_KEYS)?)?;
    let content = normalize_content(&string_field(
        position,
        required(position, obj, &["content"])?,
        "content",
    )?);
    let mode = parse_mode(position, required(position, obj, &["mode"])?)?;

    Ok(PatchOp {
        target_kind: kind,
        target_id: id,
        target_text: verbatim_string(obj, &["targetText", "target_text"]),
        content,
        mode,
        explanation: optional_string(obj, &["explanation"]),
    })
}

fn normalized_token(value: &str) -> String {
    value.trim().to_lowercase().replace(['-', ' '], "_")
}

fn parse_kind(position: usize, value: &Value) -> Result<UnitKind, AnalysisError> {
    let raw = value
        .as_str()
        .ok_or_else(|| malformed(position, "target kind is not a string"))?;
    match normalized_token(raw).as_str() {
        "paragraph" => Ok(UnitKind::Paragraph),
        "table_cell" | "tablecell" | "cell" => Ok(UnitKind::TableCell),
        "section" => Ok(UnitKind::Section),
        _ => Err(malformed(position, format!("unknown target kind '{raw}'"))),
    }
}

fn parse_mode(position: usize, value: &Value) -> Result<PatchMode, AnalysisError> {
    let raw = value
        .as_str()
        .ok_or_else(|| malformed(position, "mode is not a string"))?;
    match normalized_token(raw).as_str() {
        "append_after" | "appendafter" | "append" | "insert_after" => Ok(PatchMode::AppendAfter),
        "replace_in_place" | "replaceinplace" | "replace" => Ok(PatchMode::ReplaceInPlace),
        "annotate" | "comment" => Ok(PatchMode::Annotate),
        _ => Err(malformed(position, format!("unknown mode '{raw}'"))),
    }
}

fn parse_id(position: usize, value: &Value) -> Result<ClaimedId, AnalysisError> {
    match value {
        Value::Object(map) => {
            let coord = |name: &str| {
                map.get(name)
                    .and_then(integer)
                    .ok_or_else(|| malformed(position, format!("cell id has no integer `{name}`")))
            };
            Ok(ClaimedId::Cell {
                table: coord("table")?,
                row: coord("row")?,
                col: coord("col")?,
            })
        }
        Value::Array(parts) => match parts.iter().map(integer).collect::<Option<Vec<_>>>() {
            Some(coords) if coords.len() == 3 => Ok(ClaimedId::Cell {
                table: coords[0],
                row: coords[1],
                col: coords[2],
            }),
            _ => Err(malformed(position, "cell id must be three integers")),
        },
        other => integer(other)
            .map(ClaimedId::Index)
            .ok_or_else(|| malformed(position, format!("id {other} is not an integer"))),
    }
}

/// Integer from a JSON number or numeric string. Fractions are rejected.
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn normalize_content(raw: &str) -> String {
    raw.replace("\\n", "\n").trim().to_string()
}
