//! Query predicate compilation and matching.
//!
//! Filters use the MongoDB query document shape: top-level field keys hold
//! either a literal (implicit equality) or an operator document, and the
//! `$and` / `$or` / `$nor` keys combine nested filters. A filter is compiled
//! once into a [`Filter`] tree so that regular expressions are built a single
//! time per query rather than once per scanned document.

use regex::Regex;

use crate::error::{StoreError, StoreResult};
use crate::value::{Document, NativeValue};

/// A compiled filter document.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Every child must match. An empty conjunction matches everything.
    And(Vec<Filter>),
    /// At least one child must match.
    Or(Vec<Filter>),
    /// No child may match.
    Nor(Vec<Filter>),
    /// Operators applied to a dotted field path.
    Field {
        /// Path segments.
        path: Vec<String>,
        /// Conjunction of operators.
        ops: Vec<FieldOp>,
    },
}

/// A single field-level operator.
#[derive(Debug, Clone)]
pub enum FieldOp {
    /// `$eq`, also used for implicit equality.
    Eq(NativeValue),
    /// `$ne`.
    Ne(NativeValue),
    /// `$gt`.
    Gt(NativeValue),
    /// `$gte`.
    Gte(NativeValue),
    /// `$lt`.
    Lt(NativeValue),
    /// `$lte`.
    Lte(NativeValue),
    /// `$in`.
    In(Vec<NativeValue>),
    /// `$nin`.
    Nin(Vec<NativeValue>),
    /// `$exists`.
    Exists(bool),
    /// `$regex`.
    Regex(Regex),
    /// `$type`, by type alias or `"number"`.
    Type(String),
    /// `$elemMatch` with an operator document: some element of an array
    /// satisfies every operator, tested against the element itself.
    ElemMatch(Vec<FieldOp>),
    /// `$not`.
    Not(Vec<FieldOp>),
}

impl Filter {
    /// Compiles a filter document.
    pub fn compile(filter: &Document) -> StoreResult<Self> {
        let mut clauses = Vec::with_capacity(filter.len());
        for (key, value) in filter {
            match key.as_str() {
                "$and" => clauses.push(Self::And(compile_list(key, value)?)),
                "$or" => clauses.push(Self::Or(compile_list(key, value)?)),
                "$nor" => clauses.push(Self::Nor(compile_list(key, value)?)),
                k if k.starts_with('$') => {
                    return Err(StoreError::invalid_query(format!(
                        "unknown top level operator: {k}"
                    )));
                }
                field => clauses.push(Self::Field {
                    path: field.split('.').map(str::to_owned).collect(),
                    ops: compile_field_ops(value)?,
                }),
            }
        }
        if clauses.len() == 1 {
            return Ok(clauses.remove(0));
        }
        Ok(Self::And(clauses))
    }

    /// Returns `true` if the document satisfies this filter.
    #[must_use]
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Self::And(children) => children.iter().all(|c| c.matches(doc)),
            Self::Or(children) => children.iter().any(|c| c.matches(doc)),
            Self::Nor(children) => !children.iter().any(|c| c.matches(doc)),
            Self::Field { path, ops } => {
                let segments: Vec<&str> = path.iter().map(String::as_str).collect();
                let mut resolved = Vec::new();
                resolve_in_document(doc, &segments, &mut resolved);
                ops.iter().all(|op| op.matches(&resolved))
            }
        }
    }
}

fn compile_list(operator: &str, value: &NativeValue) -> StoreResult<Vec<Filter>> {
    let NativeValue::Array(items) = value else {
        return Err(StoreError::invalid_query(format!(
            "{operator} must be an array"
        )));
    };
    if items.is_empty() {
        return Err(StoreError::invalid_query(format!(
            "{operator} must be a nonempty array"
        )));
    }
    items
        .iter()
        .map(|item| match item {
            NativeValue::Document(d) => Filter::compile(d),
            other => Err(StoreError::invalid_query(format!(
                "{operator} entries must be documents, found {}",
                other.type_name()
            ))),
        })
        .collect()
}

/// Returns `true` if a document value is an operator document (`{$gt: ..}`).
fn is_operator_document(doc: &Document) -> StoreResult<bool> {
    let operators = doc.keys().filter(|k| k.starts_with('$')).count();
    if operators == 0 {
        return Ok(false);
    }
    if operators != doc.len() {
        return Err(StoreError::invalid_query(
            "cannot mix operators and literal fields in a field predicate",
        ));
    }
    Ok(true)
}

fn compile_field_ops(value: &NativeValue) -> StoreResult<Vec<FieldOp>> {
    let NativeValue::Document(doc) = value else {
        return Ok(vec![FieldOp::Eq(value.clone())]);
    };
    if !is_operator_document(doc)? {
        return Ok(vec![FieldOp::Eq(value.clone())]);
    }

    let options = match doc.get("$options") {
        Some(NativeValue::String(s)) => s.as_str(),
        Some(other) => {
            return Err(StoreError::invalid_query(format!(
                "$options must be a string, found {}",
                other.type_name()
            )));
        }
        None => "",
    };

    let mut ops = Vec::with_capacity(doc.len());
    for (op, operand) in doc {
        let compiled = match op.as_str() {
            "$eq" => FieldOp::Eq(operand.clone()),
            "$ne" => FieldOp::Ne(operand.clone()),
            "$gt" => FieldOp::Gt(operand.clone()),
            "$gte" => FieldOp::Gte(operand.clone()),
            "$lt" => FieldOp::Lt(operand.clone()),
            "$lte" => FieldOp::Lte(operand.clone()),
            "$in" => FieldOp::In(expect_array(op, operand)?),
            "$nin" => FieldOp::Nin(expect_array(op, operand)?),
            "$exists" => FieldOp::Exists(truthy(operand)),
            "$regex" => FieldOp::Regex(compile_regex(operand, options)?),
            "$options" => continue,
            "$type" => match operand {
                NativeValue::String(alias) => FieldOp::Type(alias.clone()),
                other => {
                    return Err(StoreError::invalid_query(format!(
                        "$type needs a type alias, found {}",
                        other.type_name()
                    )));
                }
            },
            "$elemMatch" => match operand {
                NativeValue::Document(inner) if is_operator_document(inner)? => {
                    FieldOp::ElemMatch(compile_field_ops(operand)?)
                }
                _ => {
                    return Err(StoreError::invalid_query(
                        "$elemMatch needs an operator document",
                    ));
                }
            },
            "$not" => match operand {
                NativeValue::Document(inner) if is_operator_document(inner)? => {
                    FieldOp::Not(compile_field_ops(operand)?)
                }
                _ => {
                    return Err(StoreError::invalid_query(
                        "$not needs an operator document",
                    ));
                }
            },
            other => {
                return Err(StoreError::invalid_query(format!(
                    "unknown operator: {other}"
                )));
            }
        };
        ops.push(compiled);
    }
    Ok(ops)
}

fn expect_array(op: &str, operand: &NativeValue) -> StoreResult<Vec<NativeValue>> {
    match operand {
        NativeValue::Array(items) => Ok(items.clone()),
        other => Err(StoreError::invalid_query(format!(
            "{op} needs an array, found {}",
            other.type_name()
        ))),
    }
}

fn compile_regex(pattern: &NativeValue, options: &str) -> StoreResult<Regex> {
    let NativeValue::String(pattern) = pattern else {
        return Err(StoreError::invalid_query("$regex has to be a string"));
    };
    let mut flags = String::new();
    for flag in options.chars() {
        match flag {
            'i' | 'm' | 's' | 'x' => flags.push(flag),
            other => {
                return Err(StoreError::invalid_query(format!(
                    "invalid flag in regex options: {other}"
                )));
            }
        }
    }
    let source = if flags.is_empty() {
        pattern.clone()
    } else {
        format!("(?{flags}){pattern}")
    };
    Regex::new(&source).map_err(|e| StoreError::invalid_query(format!("bad $regex: {e}")))
}

fn truthy(value: &NativeValue) -> bool {
    match value {
        NativeValue::Null => false,
        NativeValue::Bool(b) => *b,
        NativeValue::Int32(v) => *v != 0,
        NativeValue::Int64(v) => *v != 0,
        NativeValue::Double(v) => *v != 0.0,
        _ => true,
    }
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Collects every value reachable at `segments`.
///
/// A numeric segment indexes into an array; any other segment applied to an
/// array fans out over the array's embedded documents.
pub(crate) fn resolve_in_document<'a>(
    doc: &'a Document,
    segments: &[&str],
    out: &mut Vec<&'a NativeValue>,
) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if let Some(value) = doc.get(*head) {
        resolve_in_value(value, rest, out);
    }
}

fn resolve_in_value<'a>(value: &'a NativeValue, segments: &[&str], out: &mut Vec<&'a NativeValue>) {
    let Some(head) = segments.first() else {
        out.push(value);
        return;
    };
    match value {
        NativeValue::Document(d) => resolve_in_document(d, segments, out),
        NativeValue::Array(items) => {
            if let Ok(idx) = head.parse::<usize>() {
                if let Some(item) = items.get(idx) {
                    resolve_in_value(item, &segments[1..], out);
                }
            } else {
                for item in items {
                    if let NativeValue::Document(d) = item {
                        resolve_in_document(d, segments, out);
                    }
                }
            }
        }
        _ => {}
    }
}

/// The candidate values an operator is tested against: each resolved value,
/// plus the elements of resolved arrays.
fn candidates<'a>(resolved: &[&'a NativeValue]) -> Vec<&'a NativeValue> {
    let mut out = Vec::with_capacity(resolved.len());
    for value in resolved {
        out.push(*value);
        if let NativeValue::Array(items) = value {
            out.extend(items.iter());
        }
    }
    out
}

impl FieldOp {
    fn matches(&self, resolved: &[&NativeValue]) -> bool {
        match self {
            Self::Eq(expected) => equals_any(resolved, expected),
            Self::Ne(expected) => !equals_any(resolved, expected),
            Self::In(list) => list.iter().any(|e| equals_any(resolved, e)),
            Self::Nin(list) => !list.iter().any(|e| equals_any(resolved, e)),
            Self::Exists(expected) => !resolved.is_empty() == *expected,
            Self::Not(ops) => !ops.iter().all(|op| op.matches(resolved)),
            Self::ElemMatch(_) => resolved.iter().any(|v| self.matches_value(v)),
            Self::Gt(_)
            | Self::Gte(_)
            | Self::Lt(_)
            | Self::Lte(_)
            | Self::Regex(_)
            | Self::Type(_) => candidates(resolved)
                .into_iter()
                .any(|v| self.matches_value(v)),
        }
    }

    /// Tests one value without descending into arrays.
    fn matches_value(&self, value: &NativeValue) -> bool {
        match self {
            Self::Eq(expected) => value.loosely_equals(expected),
            Self::Ne(expected) => !value.loosely_equals(expected),
            Self::Gt(bound) => ordered(value, bound, std::cmp::Ordering::is_gt),
            Self::Gte(bound) => ordered(value, bound, std::cmp::Ordering::is_ge),
            Self::Lt(bound) => ordered(value, bound, std::cmp::Ordering::is_lt),
            Self::Lte(bound) => ordered(value, bound, std::cmp::Ordering::is_le),
            Self::In(list) => list.iter().any(|e| value.loosely_equals(e)),
            Self::Nin(list) => !list.iter().any(|e| value.loosely_equals(e)),
            Self::Exists(expected) => *expected,
            Self::Regex(re) => value.as_str().is_some_and(|s| re.is_match(s)),
            Self::Type(alias) => match alias.as_str() {
                "number" => value.is_number(),
                alias => value.type_name() == alias,
            },
            Self::ElemMatch(ops) => match value {
                NativeValue::Array(items) => items
                    .iter()
                    .any(|item| ops.iter().all(|op| op.matches_value(item))),
                _ => false,
            },
            Self::Not(ops) => !ops.iter().all(|op| op.matches_value(value)),
        }
    }
}

fn equals_any(resolved: &[&NativeValue], expected: &NativeValue) -> bool {
    if matches!(expected, NativeValue::Null) && resolved.is_empty() {
        return true;
    }
    candidates(resolved)
        .into_iter()
        .any(|v| v.loosely_equals(expected))
}

fn ordered(
    value: &NativeValue,
    bound: &NativeValue,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    value.same_bracket(bound) && accept(value.compare(bound))
}

/// Extracts the equality constraints of a filter as a seed document for
/// upserts: top-level literals, `$eq` operands and the same inside `$and`.
#[must_use]
pub fn equality_seed(filter: &Document) -> Vec<(String, NativeValue)> {
    let mut seed = Vec::new();
    collect_seed(filter, &mut seed);
    seed
}

fn collect_seed(filter: &Document, seed: &mut Vec<(String, NativeValue)>) {
    for (key, value) in filter {
        if key == "$and" {
            if let NativeValue::Array(items) = value {
                for item in items {
                    if let NativeValue::Document(d) = item {
                        collect_seed(d, seed);
                    }
                }
            }
            continue;
        }
        if key.starts_with('$') {
            continue;
        }
        match value {
            NativeValue::Document(d) if d.keys().any(|k| k.starts_with('$')) => {
                if let Some(eq) = d.get("$eq") {
                    seed.push((key.clone(), eq.clone()));
                }
            }
            literal => seed.push((key.clone(), literal.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    fn matches(filter: &Document, doc: &Document) -> bool {
        Filter::compile(filter).unwrap().matches(doc)
    }

    fn sample() -> Document {
        doc! {
            "name" => "alice",
            "age" => 30_i64,
            "tags" => vec![NativeValue::from("a"), NativeValue::from("b")],
            "address" => doc! { "city" => "berlin", "zip" => "10115" },
            "scores" => vec![
                NativeValue::from(doc! { "v" => 1_i64 }),
                NativeValue::from(doc! { "v" => 5_i64 }),
            ],
            "nothing" => NativeValue::Null,
        }
    }

    #[test]
    fn test_should_match_implicit_equality() {
        assert!(matches(&doc! { "name" => "alice" }, &sample()));
        assert!(!matches(&doc! { "name" => "bob" }, &sample()));
    }

    #[test]
    fn test_should_match_numbers_across_types() {
        assert!(matches(&doc! { "age" => 30.0 }, &sample()));
        assert!(matches(&doc! { "age" => doc! { "$gte" => 30_i32, "$lte" => 30_i32 } }, &sample()));
    }

    #[test]
    fn test_should_not_compare_across_type_brackets() {
        assert!(!matches(&doc! { "age" => doc! { "$gt" => "1" } }, &sample()));
        assert!(!matches(&doc! { "name" => doc! { "$lt" => 100_i64 } }, &sample()));
    }

    #[test]
    fn test_should_match_array_elements() {
        assert!(matches(&doc! { "tags" => "a" }, &sample()));
        assert!(!matches(&doc! { "tags" => "z" }, &sample()));
        assert!(matches(&doc! { "tags.1" => "b" }, &sample()));
    }

    #[test]
    fn test_should_fan_out_over_embedded_documents() {
        assert!(matches(&doc! { "scores.v" => doc! { "$gt" => 4_i64 } }, &sample()));
        assert!(matches(&doc! { "scores.0.v" => 1_i64 }, &sample()));
        assert!(!matches(&doc! { "scores.0.v" => 5_i64 }, &sample()));
    }

    #[test]
    fn test_should_resolve_nested_paths() {
        assert!(matches(&doc! { "address.city" => "berlin" }, &sample()));
        assert!(!matches(&doc! { "address.country" => doc! { "$exists" => true } }, &sample()));
    }

    #[test]
    fn test_should_treat_null_equality_as_missing_or_null() {
        assert!(matches(&doc! { "nothing" => NativeValue::Null }, &sample()));
        assert!(matches(&doc! { "ghost" => NativeValue::Null }, &sample()));
        assert!(!matches(
            &doc! { "ghost" => doc! { "$eq" => NativeValue::Null, "$exists" => true } },
            &sample()
        ));
    }

    #[test]
    fn test_should_match_ne_on_missing_field() {
        assert!(matches(&doc! { "ghost" => doc! { "$ne" => 1_i64 } }, &sample()));
        assert!(!matches(&doc! { "age" => doc! { "$ne" => 30_i64 } }, &sample()));
    }

    #[test]
    fn test_should_match_in_and_nin() {
        let values = vec![NativeValue::from("bob"), NativeValue::from("alice")];
        assert!(matches(&doc! { "name" => doc! { "$in" => values.clone() } }, &sample()));
        assert!(!matches(&doc! { "name" => doc! { "$nin" => values } }, &sample()));
    }

    #[test]
    fn test_should_match_regex_without_case_folding() {
        assert!(matches(&doc! { "name" => doc! { "$regex" => "^ali" } }, &sample()));
        assert!(!matches(&doc! { "name" => doc! { "$regex" => "^ALI" } }, &sample()));
        assert!(matches(
            &doc! { "name" => doc! { "$regex" => "^ALI", "$options" => "i" } },
            &sample()
        ));
    }

    #[test]
    fn test_should_combine_logical_operators() {
        let filter = doc! {
            "$or" => vec![
                NativeValue::from(doc! { "name" => "bob" }),
                NativeValue::from(doc! { "age" => doc! { "$lt" => 40_i64 } }),
            ],
        };
        assert!(matches(&filter, &sample()));

        let nor = doc! { "$nor" => vec![NativeValue::from(doc! { "name" => "alice" })] };
        assert!(!matches(&nor, &sample()));
    }

    #[test]
    fn test_should_negate_with_not() {
        let filter = doc! { "age" => doc! { "$not" => doc! { "$gt" => 40_i64 } } };
        assert!(matches(&filter, &sample()));
    }

    #[test]
    fn test_should_match_type_aliases() {
        let not_array = || doc! { "$not" => doc! { "$type" => "array" } };
        assert!(matches(&doc! { "tags" => doc! { "$type" => "array" } }, &sample()));
        assert!(matches(&doc! { "age" => doc! { "$type" => "number" } }, &sample()));
        assert!(!matches(&doc! { "name" => doc! { "$type" => "array" } }, &sample()));
        let mut scalar_a = not_array();
        scalar_a.insert("$eq".to_owned(), NativeValue::from("a"));
        assert!(!matches(&doc! { "tags" => scalar_a }, &sample()));
        assert!(matches(&doc! { "missing" => not_array() }, &sample()));
        assert!(Filter::compile(&doc! { "a" => doc! { "$type" => 2_i64 } }).is_err());
    }

    #[test]
    fn test_should_match_elements_without_nested_fan_out() {
        let row = NativeValue::from(vec![NativeValue::from(1_i64), NativeValue::from(2_i64)]);
        let nested = doc! { "grid" => vec![row.clone()] };
        let element = |v: NativeValue| {
            doc! { "grid" => doc! { "$elemMatch" => doc! { "$eq" => v } } }
        };
        assert!(matches(&element(row.clone()), &nested));
        assert!(!matches(&element(NativeValue::from(1_i64)), &nested));
        // Plain `$eq` also matches the whole array against an element.
        assert!(matches(&doc! { "grid" => doc! { "$eq" => row } }, &nested));
        let on_string = doc! { "name" => doc! { "$elemMatch" => doc! { "$eq" => "alice" } } };
        assert!(!matches(&on_string, &sample()));
        assert!(Filter::compile(&doc! { "a" => doc! { "$elemMatch" => 1_i64 } }).is_err());
    }

    #[test]
    fn test_should_match_empty_filter() {
        assert!(matches(&Document::new(), &sample()));
    }

    #[test]
    fn test_should_reject_unknown_operators() {
        assert!(Filter::compile(&doc! { "a" => doc! { "$near" => 1_i64 } }).is_err());
        assert!(Filter::compile(&doc! { "$where" => "1" }).is_err());
        assert!(Filter::compile(&doc! { "a" => doc! { "$gt" => 1_i64, "b" => 2_i64 } }).is_err());
        assert!(Filter::compile(&doc! { "a" => doc! { "$regex" => "(" } }).is_err());
    }

    #[test]
    fn test_should_extract_equality_seed() {
        let filter = doc! {
            "$and" => vec![NativeValue::from(doc! { "pk" => "p1" })],
            "sk" => doc! { "$eq" => "s1" },
            "age" => doc! { "$gt" => 1_i64 },
        };
        let seed = equality_seed(&filter);
        assert_eq!(
            seed,
            vec![
                ("pk".to_owned(), NativeValue::from("p1")),
                ("sk".to_owned(), NativeValue::from("s1")),
            ]
        );
    }
}
