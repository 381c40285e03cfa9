//! Condition translation.
//!
//! Compiles a [`Condition`] tree into a native filter document. Each leaf
//! becomes one field predicate:
//!
//! | leaf                 | native form                                  |
//! |----------------------|----------------------------------------------|
//! | `=`                  | `{p: v}`; `$eq` for map/list literals         |
//! | `<>`                 | `{p: {$ne: v, $exists: true}}`               |
//! | `< <= > >=`          | `$lt $lte $gt $gte`                          |
//! | `BETWEEN`            | `{$gte: lo, $lte: hi}`                       |
//! | `begins_with` (S)    | `{$regex: "^" + escape(prefix)}`             |
//! | `begins_with` (B)    | `{$gte: prefix, $lt: successor(prefix)}`     |
//! | `contains`           | `$regex` on strings, `$elemMatch` otherwise  |
//! | `IN`                 | `$in`                                        |
//! | exists / not exists  | `$exists`                                    |
//! | AND / OR / NOT       | `$and` / `$or` / `$nor`                      |
//!
//! The engine matches a scalar operand against the elements of an array
//! field as well as the field itself. Paths whose kind can hold a list or
//! set therefore carry `$not: {$type: "array"}` next to scalar operands,
//! and array operands carry `$not: {$elemMatch: {$eq: v}}`, so that only
//! the attribute value itself is compared.

use std::cmp::Ordering;

use bytes::Bytes;
use dynamongo_docstore::{Document, NativeValue, doc};
use dynamongo_model::{
    AttributeKind, AttributePath, AttributeValue, CompareOp, Condition, MAX_IN_OPERANDS,
};

use crate::codec::{encode, parse_decimal};
use crate::error::{AdapterError, AdapterResult};
use crate::indexes::escape_hash;
use crate::path::PathResolver;

/// Compiles conditions against one schema.
#[derive(Debug, Clone, Copy)]
pub struct ConditionTranslator<'a> {
    resolver: PathResolver<'a>,
}

impl<'a> ConditionTranslator<'a> {
    /// A translator resolving paths with `resolver`.
    #[must_use]
    pub fn new(resolver: PathResolver<'a>) -> Self {
        Self { resolver }
    }

    /// Compiles `condition` into a filter document.
    pub fn translate(&self, condition: &Condition) -> AdapterResult<Document> {
        validate(condition)?;
        self.translate_node(condition)
    }

    fn translate_node(&self, condition: &Condition) -> AdapterResult<Document> {
        Ok(match condition {
            Condition::Compare { path, op, value } => {
                let (field, kind) = self.field(path)?;
                let guarded = may_hold_array(kind);
                let native = encode(value)?;
                match op {
                    CompareOp::Eq if disjoint(kind, value) => match_nothing(),
                    CompareOp::Ne if disjoint(kind, value) => {
                        doc! { field => doc! { "$exists" => true } }
                    }
                    CompareOp::Eq => match native {
                        NativeValue::Null | NativeValue::Document(_) | NativeValue::Array(_) => {
                            doc! { field => exact(native, guarded) }
                        }
                        scalar if guarded => doc! { field => exact(scalar, true) },
                        scalar => doc! { field => scalar },
                    },
                    CompareOp::Ne if guarded => {
                        doc! { field => doc! { "$exists" => true, "$not" => exact(native, true) } }
                    }
                    CompareOp::Ne => doc! { field => doc! { "$ne" => native, "$exists" => true } },
                    CompareOp::Lt => {
                        doc! { field => scalar_only(doc! { "$lt" => native }, guarded) }
                    }
                    CompareOp::Le => {
                        doc! { field => scalar_only(doc! { "$lte" => native }, guarded) }
                    }
                    CompareOp::Gt => {
                        doc! { field => scalar_only(doc! { "$gt" => native }, guarded) }
                    }
                    CompareOp::Ge => {
                        doc! { field => scalar_only(doc! { "$gte" => native }, guarded) }
                    }
                }
            }
            Condition::Between { path, low, high } => {
                let (field, kind) = self.field(path)?;
                let guarded = may_hold_array(kind);
                let range = doc! { "$gte" => encode(low)?, "$lte" => encode(high)? };
                doc! { field => scalar_only(range, guarded) }
            }
            Condition::BeginsWith { path, prefix } => {
                let (field, kind) = self.field(path)?;
                let guarded = may_hold_array(kind);
                let ops = match prefix {
                    AttributeValue::S(s) => doc! { "$regex" => format!("^{}", regex::escape(s)) },
                    AttributeValue::B(b) => match successor(b) {
                        Some(next) => doc! { "$gte" => b.clone(), "$lt" => next },
                        None => doc! { "$gte" => b.clone() },
                    },
                    other => return Err(wrong_literal("begins_with", "S or B", other)),
                };
                doc! { field => scalar_only(ops, guarded) }
            }
            Condition::Contains { path, value } => {
                let storage = self.resolver.resolve(path)?;
                let kind = self.resolver.kind_of(&storage);
                let field = storage.to_field();
                match (kind, value) {
                    (AttributeKind::String, AttributeValue::S(s)) => {
                        doc! { field => doc! { "$regex" => regex::escape(s) } }
                    }
                    // A string holds a substring; a list holds an equal element.
                    (AttributeKind::Dynamic | AttributeKind::Opaque, AttributeValue::S(s)) => {
                        let substring = scalar_only(doc! { "$regex" => regex::escape(s) }, true);
                        let element = doc! { "$elemMatch" => doc! { "$eq" => s.as_str() } };
                        doc! { "$or" => vec![
                            NativeValue::from(doc! { field.as_str() => substring }),
                            NativeValue::from(doc! { field => element }),
                        ] }
                    }
                    _ => {
                        let element = doc! { "$eq" => encode(value)? };
                        doc! { field => doc! { "$elemMatch" => element } }
                    }
                }
            }
            Condition::In { path, values } => {
                let (field, kind) = self.field(path)?;
                let guarded = may_hold_array(kind);
                let natives = values
                    .iter()
                    .filter(|v| !disjoint(kind, v))
                    .map(encode)
                    .collect::<AdapterResult<Vec<_>>>()?;
                if natives.is_empty() {
                    match_nothing()
                } else if guarded && natives.iter().any(|v| matches!(v, NativeValue::Array(_))) {
                    let alternatives = natives
                        .into_iter()
                        .map(|v| NativeValue::from(doc! { field.as_str() => exact(v, true) }))
                        .collect::<Vec<_>>();
                    doc! { "$or" => alternatives }
                } else {
                    let mut ops = doc! { "$in" => natives.clone() };
                    if natives.iter().any(|v| matches!(v, NativeValue::Null)) {
                        ops.insert("$exists".to_owned(), NativeValue::Bool(true));
                    }
                    doc! { field => scalar_only(ops, guarded) }
                }
            }
            Condition::Exists(path) => {
                doc! { self.resolver.resolve(path)?.to_field() => doc! { "$exists" => true } }
            }
            Condition::NotExists(path) => {
                doc! { self.resolver.resolve(path)?.to_field() => doc! { "$exists" => false } }
            }
            Condition::And(children) => match children.as_slice() {
                [] => Document::new(),
                [only] => self.translate_node(only)?,
                _ => doc! { "$and" => self.translate_all(children)? },
            },
            Condition::Or(children) => match children.as_slice() {
                [] => match_nothing(),
                [only] => self.translate_node(only)?,
                _ => doc! { "$or" => self.translate_all(children)? },
            },
            Condition::Not(inner) => {
                doc! { "$nor" => vec![NativeValue::Document(self.translate_node(inner)?)] }
            }
        })
    }

    /// The storage field of `path` and its declared kind.
    fn field(&self, path: &AttributePath) -> AdapterResult<(String, AttributeKind)> {
        let storage = self.resolver.resolve(path)?;
        let kind = self.resolver.kind_of(&storage);
        Ok((storage.to_field(), kind))
    }

    fn translate_all(&self, children: &[Condition]) -> AdapterResult<Vec<NativeValue>> {
        children
            .iter()
            .map(|c| self.translate_node(c).map(NativeValue::Document))
            .collect()
    }
}

/// `$nor` of the match-all filter selects nothing.
fn match_nothing() -> Document {
    doc! { "$nor" => vec![NativeValue::Document(Document::new())] }
}

/// Lists and sets share the array encoding, so a list literal never equals
/// a declared set and a set literal never equals a list. Undeclared
/// attributes read sets back as lists.
fn disjoint(kind: AttributeKind, literal: &AttributeValue) -> bool {
    match literal {
        AttributeValue::L(_) => matches!(
            kind,
            AttributeKind::StringSet | AttributeKind::NumberSet | AttributeKind::BinarySet
        ),
        AttributeValue::Ss(_) | AttributeValue::Ns(_) | AttributeValue::Bs(_) => {
            matches!(kind, AttributeKind::List | AttributeKind::Dynamic)
        }
        _ => false,
    }
}

fn may_hold_array(kind: AttributeKind) -> bool {
    !matches!(
        kind,
        AttributeKind::String
            | AttributeKind::Number
            | AttributeKind::Binary
            | AttributeKind::Boolean
            | AttributeKind::Null
    )
}

/// Operators matching a field equal to `value` and nothing else. When
/// `guarded`, an array field does not match through one of its elements.
fn exact(value: NativeValue, guarded: bool) -> Document {
    match value {
        NativeValue::Null => {
            scalar_only(doc! { "$eq" => NativeValue::Null, "$exists" => true }, guarded)
        }
        NativeValue::Array(_) if guarded => doc! {
            "$eq" => value.clone(),
            "$not" => doc! { "$elemMatch" => doc! { "$eq" => value } },
        },
        other => scalar_only(doc! { "$eq" => other }, guarded),
    }
}

/// Adds `$not: {$type: "array"}` to `ops` when `guarded`.
fn scalar_only(mut ops: Document, guarded: bool) -> Document {
    if guarded {
        ops.insert("$not".to_owned(), NativeValue::from(doc! { "$type" => "array" }));
    }
    ops
}

// ---------------------------------------------------------------------------
// Composite index fields
// ---------------------------------------------------------------------------

/// Predicate selecting every entry of `hash` in a composite index field.
#[must_use]
pub fn composite_hash_predicate(field: &str, hash: &str) -> Document {
    let escaped = escape_hash(hash);
    doc! { field => doc! { "$gte" => format!("{escaped}#"), "$lt" => format!("{escaped}$") } }
}

/// Compiles a range-key condition against a composite index field holding
/// `escape(hash) + "#" + range`.
pub fn translate_composite_range(
    field: &str,
    hash: &str,
    condition: &Condition,
) -> AdapterResult<Document> {
    validate_key_condition(condition)?;
    let escaped = escape_hash(hash);
    let prefix = format!("{escaped}#");
    let upper = format!("{escaped}$");
    let joined = |value: &AttributeValue| -> AdapterResult<String> {
        match value {
            AttributeValue::S(s) => Ok(format!("{prefix}{s}")),
            other => Err(wrong_literal("composite range", "S", other)),
        }
    };
    Ok(match condition {
        Condition::Compare { op, value, .. } => {
            let bound = joined(value)?;
            match op {
                CompareOp::Eq => doc! { field => bound },
                CompareOp::Lt => doc! { field => doc! { "$gte" => prefix.as_str(), "$lt" => bound } },
                CompareOp::Le => doc! { field => doc! { "$gte" => prefix.as_str(), "$lte" => bound } },
                CompareOp::Gt => doc! { field => doc! { "$gt" => bound, "$lt" => upper } },
                CompareOp::Ge => doc! { field => doc! { "$gte" => bound, "$lt" => upper } },
                CompareOp::Ne => return Err(AdapterError::unsupported("<>", "not a key condition")),
            }
        }
        Condition::Between { low, high, .. } => {
            doc! { field => doc! { "$gte" => joined(low)?, "$lte" => joined(high)? } }
        }
        Condition::BeginsWith { prefix: p, .. } => {
            doc! { field => doc! { "$regex" => format!("^{}", regex::escape(&joined(p)?)) } }
        }
        _ => return Err(AdapterError::unsupported("key condition", condition.to_string())),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Checks operator/literal compatibility for every leaf of `condition`.
pub fn validate(condition: &Condition) -> AdapterResult<()> {
    match condition {
        Condition::Compare { op, value, .. } if op.is_ordering() => {
            ensure_key_type(&op.to_string(), value)
        }
        Condition::Compare { .. }
        | Condition::Contains { .. }
        | Condition::Exists(_)
        | Condition::NotExists(_) => Ok(()),
        Condition::Between { low, high, .. } => {
            ensure_key_type("BETWEEN", low)?;
            ensure_key_type("BETWEEN", high)?;
            match compare_key_values(low, high) {
                Some(Ordering::Greater) => Err(AdapterError::validation(format!(
                    "BETWEEN bounds are reversed: {low} > {high}"
                ))),
                Some(_) => Ok(()),
                None => Err(AdapterError::unsupported(
                    "BETWEEN",
                    format!(
                        "bounds must have the same type, got {} and {}",
                        low.type_descriptor(),
                        high.type_descriptor()
                    ),
                )),
            }
        }
        Condition::BeginsWith { prefix, .. } => match prefix {
            AttributeValue::S(_) | AttributeValue::B(_) => Ok(()),
            other => Err(wrong_literal("begins_with", "S or B", other)),
        },
        Condition::In { values, .. } => {
            if values.is_empty() {
                Err(AdapterError::unsupported("IN", "the value list is empty"))
            } else if values.len() > MAX_IN_OPERANDS {
                Err(AdapterError::unsupported(
                    "IN",
                    format!("at most {MAX_IN_OPERANDS} values are allowed, got {}", values.len()),
                ))
            } else {
                Ok(())
            }
        }
        Condition::And(children) | Condition::Or(children) => {
            children.iter().try_for_each(validate)
        }
        Condition::Not(inner) => validate(inner),
    }
}

/// Checks that `condition` is a valid range-key condition: one comparison
/// other than `<>`, a `BETWEEN`, or a `begins_with`.
pub fn validate_key_condition(condition: &Condition) -> AdapterResult<()> {
    match condition {
        Condition::Compare { op: CompareOp::Ne, .. } => Err(AdapterError::unsupported(
            "<>",
            "not allowed in a key condition",
        )),
        Condition::Compare { value, .. } => ensure_key_type("key condition", value),
        Condition::Between { .. } | Condition::BeginsWith { .. } => validate(condition),
        other => Err(AdapterError::unsupported(
            "key condition",
            format!("{other} is not allowed in a key condition"),
        )),
    }
}

fn ensure_key_type(operator: &str, value: &AttributeValue) -> AdapterResult<()> {
    if value.is_scalar_key() {
        Ok(())
    } else {
        Err(wrong_literal(operator, "S, N or B", value))
    }
}

fn wrong_literal(operator: &str, expected: &str, actual: &AttributeValue) -> AdapterError {
    AdapterError::unsupported(
        operator,
        format!(
            "operand must be {expected}, got {}",
            actual.type_descriptor()
        ),
    )
}

/// Orders two S, N or B values of the same type; `None` across types.
#[must_use]
pub fn compare_key_values(a: &AttributeValue, b: &AttributeValue) -> Option<Ordering> {
    match (a, b) {
        (AttributeValue::S(x), AttributeValue::S(y)) => Some(x.as_bytes().cmp(y.as_bytes())),
        (AttributeValue::B(x), AttributeValue::B(y)) => Some(x.as_ref().cmp(y.as_ref())),
        (AttributeValue::N(x), AttributeValue::N(y)) => {
            let x = parse_decimal(x).ok()?;
            let y = parse_decimal(y).ok()?;
            Some(x.cmp(&y))
        }
        _ => None,
    }
}

/// The smallest byte string greater than every string starting with `prefix`.
fn successor(prefix: &Bytes) -> Option<Bytes> {
    let mut bytes = prefix.to_vec();
    while let Some(last) = bytes.pop() {
        if last < u8::MAX {
            bytes.push(last + 1);
            return Some(Bytes::from(bytes));
        }
    }
    None
}
