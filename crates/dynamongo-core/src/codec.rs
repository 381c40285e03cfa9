//! Type codec between tagged attribute values and native document values.
//!
//! Numbers encode to `Int64` when the string is the canonical form of an
//! `i64` and to an exact `Decimal` otherwise, so no precision is lost in
//! either direction. A number carries at most 38 significant digits and its
//! magnitude lies between 1e-130 and 1e126.
//!
//! Sets encode to arrays with their members in canonical (sorted) order, so
//! set equality is array equality natively; [`decode_with`] restores the set
//! tag from the declared attribute kind. Native values with no attribute
//! counterpart decode to [`AttributeValue::Opaque`] and encode back
//! unchanged.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use bigdecimal::BigDecimal;
use dynamongo_docstore::{Document, NativeValue};
use dynamongo_model::{AttributeKind, AttributeSchema, AttributeValue, Item, ModelSchema};

use crate::error::{AdapterError, AdapterResult};
use crate::indexes::COMPOSITE_PREFIX;

/// Native field holding the engine's document id.
pub const ID_FIELD: &str = "_id";

const MAX_PRECISION: usize = 38;
/// Bounds on the decimal exponent of a number's leading digit.
const MIN_EXPONENT: i64 = -130;
const MAX_EXPONENT: i64 = 125;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encodes an attribute value as a native value.
pub fn encode(value: &AttributeValue) -> AdapterResult<NativeValue> {
    Ok(match value {
        AttributeValue::S(s) => NativeValue::String(s.clone()),
        AttributeValue::N(n) => encode_number(n)?,
        AttributeValue::B(b) => NativeValue::Binary(b.clone()),
        AttributeValue::Bool(b) => NativeValue::Bool(*b),
        AttributeValue::Null(true) => NativeValue::Null,
        AttributeValue::Null(false) => {
            return Err(AdapterError::codec("NULL must be true"));
        }
        AttributeValue::Ss(set) => {
            check_set("SS", set.iter())?;
            let mut members = set.clone();
            members.sort();
            NativeValue::Array(members.into_iter().map(NativeValue::String).collect())
        }
        AttributeValue::Ns(set) => {
            check_set("NS", set.iter())?;
            let mut members = set
                .iter()
                .map(|n| encode_number(n))
                .collect::<AdapterResult<Vec<_>>>()?;
            members.sort_by(NativeValue::compare);
            if members.windows(2).any(|w| w[0].loosely_equals(&w[1])) {
                return Err(AdapterError::codec("NS contains duplicate numbers"));
            }
            NativeValue::Array(members)
        }
        AttributeValue::Bs(set) => {
            check_set("BS", set.iter())?;
            let mut members = set.clone();
            members.sort();
            NativeValue::Array(members.into_iter().map(NativeValue::Binary).collect())
        }
        AttributeValue::L(list) => {
            NativeValue::Array(list.iter().map(encode).collect::<AdapterResult<Vec<_>>>()?)
        }
        AttributeValue::M(map) => NativeValue::Document(encode_map(map)?),
        AttributeValue::Opaque(native) => native.clone(),
    })
}

fn encode_map(map: &HashMap<String, AttributeValue>) -> AdapterResult<Document> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), encode(v)?)))
        .collect()
}

fn check_set<T: Ord>(tag: &str, members: impl Iterator<Item = T>) -> AdapterResult<()> {
    let mut seen = BTreeSet::new();
    let mut len = 0;
    for m in members {
        len += 1;
        if !seen.insert(m) {
            return Err(AdapterError::codec(format!("{tag} contains duplicate members")));
        }
    }
    if len == 0 {
        return Err(AdapterError::codec(format!("{tag} must not be empty")));
    }
    Ok(())
}

/// Encodes a number string.
pub fn encode_number(n: &str) -> AdapterResult<NativeValue> {
    if let Ok(v) = n.parse::<i64>() {
        if v.to_string() == n {
            return Ok(NativeValue::Int64(v));
        }
    }
    let trimmed = n.trim();
    if trimmed.is_empty() || trimmed != n || !n.bytes().any(|b| b.is_ascii_digit()) {
        return Err(AdapterError::codec(format!("'{n}' is not a valid number")));
    }
    let decimal = BigDecimal::from_str(n)
        .map_err(|_| AdapterError::codec(format!("'{n}' is not a valid number")))?;
    check_number_range(n, &decimal)?;
    Ok(NativeValue::Decimal(decimal))
}

fn check_number_range(n: &str, decimal: &BigDecimal) -> AdapterResult<()> {
    let (int, scale) = decimal.normalized().as_bigint_and_exponent();
    let digits = int.magnitude().to_string();
    if digits == "0" {
        return Ok(());
    }
    if digits.len() > MAX_PRECISION {
        return Err(AdapterError::codec(format!(
            "'{n}' has more than {MAX_PRECISION} significant digits"
        )));
    }
    let leading = i64::try_from(digits.len() - 1)
        .unwrap_or(i64::MAX)
        .saturating_sub(scale);
    if !(MIN_EXPONENT..=MAX_EXPONENT).contains(&leading) {
        return Err(AdapterError::codec(format!("'{n}' is out of the number range")));
    }
    Ok(())
}

/// Parses a number string into an exact decimal within the number range.
pub fn parse_decimal(n: &str) -> AdapterResult<BigDecimal> {
    let decimal = BigDecimal::from_str(n)
        .map_err(|_| AdapterError::codec(format!("'{n}' is not a valid number")))?;
    check_number_range(n, &decimal)?;
    Ok(decimal)
}

/// Formats a decimal without exponent notation.
#[must_use]
pub fn format_decimal(d: &BigDecimal) -> String {
    let (int, scale) = d.as_bigint_and_exponent();
    let rendered = int.to_string();
    let (negative, digits) = match rendered.strip_prefix('-') {
        Some(rest) => (true, rest.to_owned()),
        None => (false, rendered),
    };
    let mut out = String::with_capacity(digits.len() + 2);
    if negative {
        out.push('-');
    }
    if scale <= 0 {
        out.push_str(&digits);
        for _ in 0..scale.unsigned_abs() {
            out.push('0');
        }
        return out;
    }
    let scale = usize::try_from(scale).unwrap_or(usize::MAX);
    if digits.len() > scale {
        let (whole, frac) = digits.split_at(digits.len() - scale);
        out.push_str(whole);
        out.push('.');
        out.push_str(frac);
    } else {
        out.push_str("0.");
        for _ in 0..scale - digits.len() {
            out.push('0');
        }
        out.push_str(&digits);
    }
    out
}

/// Encodes an item into a native document. Engine bookkeeping fields are
/// not added here.
pub fn encode_item(item: &Item) -> AdapterResult<Document> {
    encode_map(item)
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decodes a native value. Total: every native value has a decoding.
#[must_use]
pub fn decode(value: &NativeValue) -> AttributeValue {
    match value {
        NativeValue::Null => AttributeValue::Null(true),
        NativeValue::Bool(b) => AttributeValue::Bool(*b),
        NativeValue::Int32(v) => AttributeValue::N(v.to_string()),
        NativeValue::Int64(v) => AttributeValue::N(v.to_string()),
        NativeValue::Double(v) if v.is_finite() => match value.to_decimal() {
            Some(d) => AttributeValue::N(format_decimal(&d)),
            None => AttributeValue::Opaque(value.clone()),
        },
        NativeValue::Decimal(d) => AttributeValue::N(format_decimal(d)),
        NativeValue::String(s) => AttributeValue::S(s.clone()),
        NativeValue::Binary(b) => AttributeValue::B(b.clone()),
        NativeValue::Array(items) => AttributeValue::L(items.iter().map(decode).collect()),
        NativeValue::Document(doc) => AttributeValue::M(
            doc.iter().map(|(k, v)| (k.clone(), decode(v))).collect(),
        ),
        NativeValue::Double(_) | NativeValue::ObjectId(_) | NativeValue::DateTime(_) => {
            AttributeValue::Opaque(value.clone())
        }
    }
}

/// Decodes a native value under a declared kind, restoring set tags.
#[must_use]
pub fn decode_with(value: &NativeValue, kind: AttributeKind) -> AttributeValue {
    match (kind, value) {
        (AttributeKind::Opaque, _) => AttributeValue::Opaque(value.clone()),
        (AttributeKind::StringSet, NativeValue::Array(items)) => {
            let members: Option<Vec<String>> =
                items.iter().map(|i| i.as_str().map(str::to_owned)).collect();
            members.map_or_else(|| decode(value), AttributeValue::Ss)
        }
        (AttributeKind::NumberSet, NativeValue::Array(items)) => {
            let members: Option<Vec<String>> = items
                .iter()
                .map(|i| match decode(i) {
                    AttributeValue::N(n) => Some(n),
                    _ => None,
                })
                .collect();
            members.map_or_else(|| decode(value), AttributeValue::Ns)
        }
        (AttributeKind::BinarySet, NativeValue::Array(items)) => {
            let members: Option<Vec<_>> = items
                .iter()
                .map(|i| match i {
                    NativeValue::Binary(b) => Some(b.clone()),
                    _ => None,
                })
                .collect();
            members.map_or_else(|| decode(value), AttributeValue::Bs)
        }
        _ => decode(value),
    }
}

/// Decodes a value under a declared attribute, descending into typed maps.
#[must_use]
pub fn decode_attribute(value: &NativeValue, schema: &AttributeSchema) -> AttributeValue {
    match value {
        NativeValue::Document(doc) if !schema.fields.is_empty() => AttributeValue::M(
            doc.iter()
                .map(|(k, v)| {
                    let decoded = match schema.field_by_storage(k) {
                        Some(field) => decode_attribute(v, field),
                        None => decode(v),
                    };
                    (k.clone(), decoded)
                })
                .collect(),
        ),
        _ => decode_with(value, schema.kind),
    }
}

/// Decodes a stored document into an item, dropping engine bookkeeping
/// fields (`_id` and composite index fields).
#[must_use]
pub fn decode_item(doc: &Document, schema: &ModelSchema) -> Item {
    doc.iter()
        .filter(|(k, _)| !is_bookkeeping_field(k))
        .map(|(k, v)| {
            let decoded = match schema.attribute_by_storage(k) {
                Some(attr) => decode_attribute(v, attr),
                None => decode(v),
            };
            (k.clone(), decoded)
        })
        .collect()
}

/// Whether a top-level native field is maintained by the adapter rather
/// than the caller.
#[must_use]
pub fn is_bookkeeping_field(name: &str) -> bool {
    name == ID_FIELD || name.starts_with(COMPOSITE_PREFIX)
}
