//! Update operator application.
//!
//! Supports the field operators `$set`, `$unset`, `$inc`, `$addToSet` and
//! `$push`. An update document is validated as a whole before any operator
//! runs, so a rejected update leaves the target document untouched.
//!
//! Both array operators take a `$sort: 1 | -1` modifier next to `$each`,
//! which orders the whole array after the new elements are in.

use std::cmp::Ordering;

use bigdecimal::BigDecimal;

use crate::error::{StoreError, StoreResult};
use crate::value::{Document, NativeValue};

const OPERATORS: [&str; 5] = ["$set", "$unset", "$inc", "$addToSet", "$push"];

/// Applies an update document to `doc` in place.
pub fn apply_update(doc: &mut Document, update: &Document) -> StoreResult<()> {
    validate_update(update)?;
    let mut working = doc.clone();
    for (operator, fields) in update {
        let NativeValue::Document(fields) = fields else {
            continue;
        };
        for (path, operand) in fields {
            let segments: Vec<&str> = path.split('.').collect();
            match operator.as_str() {
                "$set" => set_path(&mut working, &segments, operand.clone())?,
                "$unset" => unset_path(&mut working, &segments),
                "$inc" => increment(&mut working, path, &segments, operand)?,
                "$addToSet" => add_to_set(&mut working, path, &segments, operand)?,
                "$push" => push(&mut working, path, &segments, operand)?,
                other => {
                    return Err(StoreError::invalid_update(format!(
                        "unknown modifier: {other}"
                    )));
                }
            }
        }
    }
    *doc = working;
    Ok(())
}

/// Checks operator names, operand shapes and path conflicts.
pub fn validate_update(update: &Document) -> StoreResult<()> {
    if update.is_empty() {
        return Err(StoreError::invalid_update("update document must not be empty"));
    }
    let mut paths: Vec<&str> = Vec::new();
    for (operator, fields) in update {
        if !OPERATORS.contains(&operator.as_str()) {
            return Err(StoreError::invalid_update(format!(
                "unknown modifier: {operator}"
            )));
        }
        let NativeValue::Document(fields) = fields else {
            return Err(StoreError::invalid_update(format!(
                "modifiers operate on fields but we found type {} instead",
                fields.type_name()
            )));
        };
        for path in fields.keys() {
            if path.is_empty() || path.split('.').any(str::is_empty) {
                return Err(StoreError::invalid_update(format!(
                    "empty field name in path '{path}'"
                )));
            }
            if path == "_id" || path.starts_with("_id.") {
                return Err(StoreError::invalid_update(
                    "performing an update on the path '_id' would modify the immutable field '_id'",
                ));
            }
            paths.push(path);
        }
    }
    for (i, a) in paths.iter().enumerate() {
        for b in &paths[i + 1..] {
            if overlaps(a, b) {
                return Err(StoreError::ConflictingUpdatePaths {
                    path: (*a).to_owned(),
                    conflict: (*b).to_owned(),
                });
            }
        }
    }
    Ok(())
}

/// Two dotted paths overlap if one is a segment-wise prefix of the other.
fn overlaps(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    long == short || long.strip_prefix(short).is_some_and(|rest| rest.starts_with('.'))
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Exact lookup without array fan-out; numeric segments index arrays.
#[must_use]
pub fn get_path<'a>(doc: &'a Document, segments: &[&str]) -> Option<&'a NativeValue> {
    let (head, rest) = segments.split_first()?;
    let mut current = doc.get(*head)?;
    for segment in rest {
        current = match current {
            NativeValue::Document(d) => d.get(*segment)?,
            NativeValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Sets a value, creating intermediate documents. Positional assignment past
/// the end of an array pads the gap with nulls.
pub fn set_path(doc: &mut Document, segments: &[&str], value: NativeValue) -> StoreResult<()> {
    let Some((head, rest)) = segments.split_first() else {
        return Err(StoreError::invalid_update("empty path"));
    };
    if rest.is_empty() {
        doc.insert((*head).to_owned(), value);
        return Ok(());
    }
    let child = doc
        .entry((*head).to_owned())
        .or_insert_with(|| NativeValue::Document(Document::new()));
    set_in_value(child, rest, value)
}

fn set_in_value(target: &mut NativeValue, segments: &[&str], value: NativeValue) -> StoreResult<()> {
    match target {
        NativeValue::Document(d) => set_path(d, segments, value),
        NativeValue::Array(items) => {
            let (head, rest) = segments
                .split_first()
                .ok_or_else(|| StoreError::invalid_update("empty path"))?;
            let idx: usize = head.parse().map_err(|_| {
                StoreError::invalid_update(format!(
                    "cannot use the part ({head}) to traverse the element"
                ))
            })?;
            while items.len() <= idx {
                items.push(NativeValue::Null);
            }
            if rest.is_empty() {
                items[idx] = value;
                return Ok(());
            }
            if matches!(items[idx], NativeValue::Null) {
                items[idx] = NativeValue::Document(Document::new());
            }
            set_in_value(&mut items[idx], rest, value)
        }
        other => Err(StoreError::invalid_update(format!(
            "cannot create field '{}' in element of type {}",
            segments.first().copied().unwrap_or_default(),
            other.type_name()
        ))),
    }
}

/// Removes a field. Unsetting an array element replaces it with null.
pub fn unset_path(doc: &mut Document, segments: &[&str]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        doc.remove(*head);
        return;
    }
    if let Some(child) = doc.get_mut(*head) {
        unset_in_value(child, rest);
    }
}

fn unset_in_value(target: &mut NativeValue, segments: &[&str]) {
    match target {
        NativeValue::Document(d) => unset_path(d, segments),
        NativeValue::Array(items) => {
            let Some((head, rest)) = segments.split_first() else {
                return;
            };
            let Ok(idx) = head.parse::<usize>() else {
                return;
            };
            let Some(item) = items.get_mut(idx) else {
                return;
            };
            if rest.is_empty() {
                *item = NativeValue::Null;
            } else {
                unset_in_value(item, rest);
            }
        }
        _ => {}
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

fn increment(
    doc: &mut Document,
    path: &str,
    segments: &[&str],
    delta: &NativeValue,
) -> StoreResult<()> {
    if !delta.is_number() {
        return Err(StoreError::invalid_update(format!(
            "cannot increment with non-numeric argument: {{{path}: {delta}}}"
        )));
    }
    let next = match get_path(doc, segments) {
        None => delta.clone(),
        Some(current) if current.is_number() => add_numbers(current, delta)?,
        Some(current) => {
            return Err(StoreError::invalid_update(format!(
                "cannot apply $inc to a value of non-numeric type {} at '{path}'",
                current.type_name()
            )));
        }
    };
    set_path(doc, segments, next)
}

/// Adds two numbers, keeping integer representations while they fit.
pub fn add_numbers(a: &NativeValue, b: &NativeValue) -> StoreResult<NativeValue> {
    let as_i64 = |v: &NativeValue| match v {
        NativeValue::Int32(x) => Some(i64::from(*x)),
        NativeValue::Int64(x) => Some(*x),
        _ => None,
    };
    if let (Some(x), Some(y)) = (as_i64(a), as_i64(b)) {
        if let Some(sum) = x.checked_add(y) {
            return Ok(match (a, b) {
                (NativeValue::Int32(_), NativeValue::Int32(_)) => {
                    i32::try_from(sum).map_or(NativeValue::Int64(sum), NativeValue::Int32)
                }
                _ => NativeValue::Int64(sum),
            });
        }
        return Ok(NativeValue::Decimal(BigDecimal::from(x) + BigDecimal::from(y)));
    }
    if let (NativeValue::Double(x), NativeValue::Double(y)) = (a, b) {
        return Ok(NativeValue::Double(x + y));
    }
    match (a.to_decimal(), b.to_decimal()) {
        (Some(x), Some(y)) => Ok(NativeValue::Decimal(x + y)),
        _ => Err(StoreError::invalid_update(
            "cannot add non-finite numbers exactly",
        )),
    }
}

/// Splits an operand into its `$each` list, or a single-element list.
fn each_values(operand: &NativeValue) -> StoreResult<(Vec<NativeValue>, Option<&NativeValue>)> {
    if let NativeValue::Document(d) = operand {
        if let Some(each) = d.get("$each") {
            let NativeValue::Array(items) = each else {
                return Err(StoreError::invalid_update(format!(
                    "the argument to $each must be an array but it was {}",
                    each.type_name()
                )));
            };
            return Ok((items.clone(), d.get("$position")));
        }
    }
    Ok((vec![operand.clone()], None))
}

fn existing_array(doc: &Document, path: &str, segments: &[&str], op: &str) -> StoreResult<Vec<NativeValue>> {
    match get_path(doc, segments) {
        None => Ok(Vec::new()),
        Some(NativeValue::Array(items)) => Ok(items.clone()),
        Some(other) => Err(StoreError::invalid_update(format!(
            "cannot apply {op} to non-array field '{path}' of type {}",
            other.type_name()
        ))),
    }
}

fn add_to_set(
    doc: &mut Document,
    path: &str,
    segments: &[&str],
    operand: &NativeValue,
) -> StoreResult<()> {
    let (values, _) = each_values(operand)?;
    let mut items = existing_array(doc, path, segments, "$addToSet")?;
    for value in values {
        if !items.iter().any(|existing| existing.compare(&value) == Ordering::Equal) {
            items.push(value);
        }
    }
    sort_modifier(operand, &mut items)?;
    set_path(doc, segments, NativeValue::Array(items))
}

fn push(
    doc: &mut Document,
    path: &str,
    segments: &[&str],
    operand: &NativeValue,
) -> StoreResult<()> {
    let (values, position) = each_values(operand)?;
    let mut items = existing_array(doc, path, segments, "$push")?;
    let at = match position {
        None => items.len(),
        Some(NativeValue::Int32(p)) if *p >= 0 => usize::try_from(*p).unwrap_or(usize::MAX),
        Some(NativeValue::Int64(p)) if *p >= 0 => usize::try_from(*p).unwrap_or(usize::MAX),
        Some(other) => {
            return Err(StoreError::invalid_update(format!(
                "$position must be a non-negative integer, found {other}"
            )));
        }
    }
    .min(items.len());
    items.splice(at..at, values);
    sort_modifier(operand, &mut items)?;
    set_path(doc, segments, NativeValue::Array(items))
}

fn sort_modifier(operand: &NativeValue, items: &mut [NativeValue]) -> StoreResult<()> {
    let NativeValue::Document(d) = operand else {
        return Ok(());
    };
    match d.get("$sort") {
        None => {}
        Some(NativeValue::Int32(1) | NativeValue::Int64(1)) => items.sort_by(NativeValue::compare),
        Some(NativeValue::Int32(-1) | NativeValue::Int64(-1)) => items.sort_by(|a, b| b.compare(a)),
        Some(other) => {
            return Err(StoreError::invalid_update(format!(
                "$sort must be 1 or -1, found {other}"
            )));
        }
    }
    Ok(())
}
