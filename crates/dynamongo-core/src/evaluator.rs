//! Reference evaluator for conditions, update actions and projections.
//!
//! Works directly on decoded items with DynamoDB semantics. The executor uses
//! it where the engine cannot do the work: client-side filters during scans,
//! the read-modify-write update fallback, and precise projections.

use std::cmp::Ordering;
use std::collections::HashMap;

use dynamongo_model::{
    AttributePath, AttributeValue, CompareOp, Condition, Item, PathElement, UpdateAction,
};

use crate::codec::{format_decimal, parse_decimal};
use crate::condition::{compare_key_values, validate};
use crate::error::{AdapterError, AdapterResult};
use crate::path::{PathResolver, StoragePath};

// ---------------------------------------------------------------------------
// Evaluation context
// ---------------------------------------------------------------------------

/// Binds an item to the resolver used to address it.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    item: &'a Item,
    resolver: PathResolver<'a>,
}

impl<'a> EvalContext<'a> {
    /// A context evaluating against `item`.
    #[must_use]
    pub fn new(item: &'a Item, resolver: PathResolver<'a>) -> Self {
        Self { item, resolver }
    }

    /// Evaluates `condition` against the item.
    ///
    /// Comparisons on a missing attribute are false, `<>` included, and so
    /// are comparisons across types.
    pub fn evaluate(&self, condition: &Condition) -> AdapterResult<bool> {
        validate(condition)?;
        self.eval(condition)
    }

    fn eval(&self, condition: &Condition) -> AdapterResult<bool> {
        Ok(match condition {
            Condition::Compare { path, op, value } => match self.lookup(path)? {
                None => false,
                Some(attr) => match op {
                    CompareOp::Eq => values_equal(attr, value),
                    CompareOp::Ne => !values_equal(attr, value),
                    _ => compare_key_values(attr, value).is_some_and(|ord| ordering_holds(*op, ord)),
                },
            },
            Condition::Between { path, low, high } => self.lookup(path)?.is_some_and(|attr| {
                compare_key_values(attr, low).is_some_and(Ordering::is_ge)
                    && compare_key_values(attr, high).is_some_and(Ordering::is_le)
            }),
            Condition::BeginsWith { path, prefix } => {
                match (self.lookup(path)?, prefix) {
                    (Some(AttributeValue::S(s)), AttributeValue::S(p)) => s.starts_with(p.as_str()),
                    (Some(AttributeValue::B(b)), AttributeValue::B(p)) => b.starts_with(p),
                    _ => false,
                }
            }
            Condition::Contains { path, value } => {
                self.lookup(path)?.is_some_and(|attr| contains(attr, value))
            }
            Condition::In { path, values } => self
                .lookup(path)?
                .is_some_and(|attr| values.iter().any(|v| values_equal(attr, v))),
            Condition::Exists(path) => self.lookup(path)?.is_some(),
            Condition::NotExists(path) => self.lookup(path)?.is_none(),
            Condition::And(children) => {
                for child in children {
                    if !self.eval(child)? {
                        return Ok(false);
                    }
                }
                true
            }
            Condition::Or(children) => {
                for child in children {
                    if self.eval(child)? {
                        return Ok(true);
                    }
                }
                false
            }
            Condition::Not(inner) => !self.eval(inner)?,
        })
    }

    fn lookup(&self, path: &AttributePath) -> AdapterResult<Option<&'a AttributeValue>> {
        Ok(self.resolver.resolve(path)?.lookup(self.item))
    }
}

fn ordering_holds(op: CompareOp, ord: Ordering) -> bool {
    match op {
        CompareOp::Eq => ord.is_eq(),
        CompareOp::Ne => ord.is_ne(),
        CompareOp::Lt => ord.is_lt(),
        CompareOp::Le => ord.is_le(),
        CompareOp::Gt => ord.is_gt(),
        CompareOp::Ge => ord.is_ge(),
    }
}

fn contains(attr: &AttributeValue, value: &AttributeValue) -> bool {
    match (attr, value) {
        (AttributeValue::S(s), AttributeValue::S(sub)) => s.contains(sub.as_str()),
        (AttributeValue::Ss(set), AttributeValue::S(member)) => set.contains(member),
        (AttributeValue::Ns(set), AttributeValue::N(member)) => set
            .iter()
            .any(|n| numbers_equal(n, member)),
        (AttributeValue::Bs(set), AttributeValue::B(member)) => set.contains(member),
        (AttributeValue::L(list), _) => list.iter().any(|v| values_equal(v, value)),
        _ => false,
    }
}

/// Structural equality with numeric comparison for numbers and
/// order-insensitive comparison for sets.
#[must_use]
pub fn values_equal(a: &AttributeValue, b: &AttributeValue) -> bool {
    match (a, b) {
        (AttributeValue::N(x), AttributeValue::N(y)) => numbers_equal(x, y),
        (AttributeValue::Ss(x), AttributeValue::Ss(y)) => {
            x.len() == y.len() && x.iter().all(|m| y.contains(m))
        }
        (AttributeValue::Ns(x), AttributeValue::Ns(y)) => {
            x.len() == y.len() && x.iter().all(|m| y.iter().any(|n| numbers_equal(m, n)))
        }
        (AttributeValue::Bs(x), AttributeValue::Bs(y)) => {
            x.len() == y.len() && x.iter().all(|m| y.contains(m))
        }
        (AttributeValue::L(x), AttributeValue::L(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (AttributeValue::M(x), AttributeValue::M(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        (AttributeValue::Opaque(x), AttributeValue::Opaque(y)) => x.compare(y).is_eq(),
        _ => a == b,
    }
}

fn numbers_equal(a: &str, b: &str) -> bool {
    match (parse_decimal(a), parse_decimal(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

// ---------------------------------------------------------------------------
// Update application
// ---------------------------------------------------------------------------

/// Applies `actions` to `item` in order.
///
/// A list index past the end appends, REMOVE of a list element shifts the
/// later elements down, ADD on a missing path stores the delta and
/// `list_append` on a missing path starts from an empty list.
pub fn apply_actions(
    item: &mut Item,
    resolver: PathResolver<'_>,
    actions: &[UpdateAction],
) -> AdapterResult<()> {
    for action in actions {
        let path = resolver.resolve(action.path())?;
        match action {
            UpdateAction::Set { value, .. } => path.set(item, value.clone())?,
            UpdateAction::ListAppend {
                values, prepend, ..
            } => {
                let mut list = match path.get(item)? {
                    None => Vec::new(),
                    Some(AttributeValue::L(existing)) => existing.clone(),
                    Some(other) => {
                        return Err(AdapterError::validation(format!(
                            "list_append on {path} needs a list, found {}",
                            other.type_descriptor()
                        )));
                    }
                };
                if *prepend {
                    let mut front = values.clone();
                    front.append(&mut list);
                    list = front;
                } else {
                    list.extend(values.iter().cloned());
                }
                path.set(item, AttributeValue::L(list))?;
            }
            UpdateAction::Remove { .. } => {
                path.remove(item);
            }
            UpdateAction::Add { delta, .. } => {
                let next = match path.get(item)? {
                    None => delta.clone(),
                    Some(current) => add(&path, current, delta)?,
                };
                path.set(item, next)?;
            }
        }
    }
    Ok(())
}

fn add(
    path: &StoragePath,
    current: &AttributeValue,
    delta: &AttributeValue,
) -> AdapterResult<AttributeValue> {
    Ok(match (current, delta) {
        (AttributeValue::N(a), AttributeValue::N(b)) => {
            let sum = parse_decimal(a)? + parse_decimal(b)?;
            AttributeValue::N(format_decimal(&sum))
        }
        (AttributeValue::Ss(a), AttributeValue::Ss(b)) => AttributeValue::Ss(union(a, b, |x, y| x == y)),
        (AttributeValue::Ns(a), AttributeValue::Ns(b)) => {
            AttributeValue::Ns(union(a, b, |x, y| numbers_equal(x, y)))
        }
        (AttributeValue::Bs(a), AttributeValue::Bs(b)) => AttributeValue::Bs(union(a, b, |x, y| x == y)),
        _ => {
            return Err(AdapterError::validation(format!(
                "ADD of {} to {} at {path}",
                delta.type_descriptor(),
                current.type_descriptor()
            )));
        }
    })
}

fn union<T: Clone>(a: &[T], b: &[T], same: impl Fn(&T, &T) -> bool) -> Vec<T> {
    let mut merged = a.to_vec();
    for member in b {
        if !merged.iter().any(|m| same(m, member)) {
            merged.push(member.clone());
        }
    }
    merged
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// Keeps only the addressed parts of `item`. Nested paths keep their
/// enclosing structure; projected list elements are compacted in path order.
#[must_use]
pub fn project(item: &Item, paths: &[StoragePath]) -> Item {
    let mut out = Item::new();
    for path in paths {
        let Some(value) = path.lookup(item) else {
            continue;
        };
        let nested = path.path().elements[1..]
            .iter()
            .rev()
            .fold(value.clone(), |inner, element| match element {
                PathElement::Attribute(key) => AttributeValue::M(HashMap::from([(key.clone(), inner)])),
                PathElement::Index(_) => AttributeValue::L(vec![inner]),
            });
        match out.remove(path.root()) {
            Some(existing) => {
                out.insert(path.root().to_owned(), merge(existing, nested));
            }
            None => {
                out.insert(path.root().to_owned(), nested);
            }
        }
    }
    out
}

fn merge(existing: AttributeValue, incoming: AttributeValue) -> AttributeValue {
    match (existing, incoming) {
        (AttributeValue::M(mut a), AttributeValue::M(b)) => {
            for (k, v) in b {
                let merged = match a.remove(&k) {
                    Some(old) => merge(old, v),
                    None => v,
                };
                a.insert(k, merged);
            }
            AttributeValue::M(a)
        }
        (AttributeValue::L(mut a), AttributeValue::L(b)) => {
            a.extend(b);
            AttributeValue::L(a)
        }
        (_, incoming) => incoming,
    }
}

#[cfg(test)]
mod tests {
    use dynamongo_model::{AttributeKind, AttributeSchema, ModelSchema, Path};

    use super::*;

    fn schema() -> ModelSchema {
        ModelSchema::new("t", AttributeSchema::new("pk", AttributeKind::String)).allow_undeclared()
    }

    fn item() -> Item {
        Item::from([
            ("pk".to_owned(), AttributeValue::from("k")),
            ("name".to_owned(), AttributeValue::from("alice")),
            ("age".to_owned(), AttributeValue::n(30)),
            ("score".to_owned(), AttributeValue::N("1.50".to_owned())),
            ("tags".to_owned(), AttributeValue::Ss(vec!["b".into(), "a".into()])),
            (
                "list".to_owned(),
                AttributeValue::L(vec![AttributeValue::n(1), AttributeValue::from("x")]),
            ),
            (
                "m".to_owned(),
                AttributeValue::M(HashMap::from([("k".to_owned(), AttributeValue::from("v"))])),
            ),
        ])
    }

    fn eval(condition: &Condition) -> bool {
        let schema = schema();
        let item = item();
        EvalContext::new(&item, PathResolver::new(&schema, true))
            .evaluate(condition)
            .unwrap()
    }

    #[test]
    fn test_should_evaluate_comparisons() {
        assert!(eval(&Path::new("age").eq(AttributeValue::N("30.0".to_owned()))));
        assert!(eval(&Path::new("age").gt(AttributeValue::n(9))));
        assert!(eval(&Path::new("score").le(AttributeValue::N("1.5".to_owned()))));
        assert!(!eval(&Path::new("age").gt("9")));
        assert!(eval(&Path::new("name").ne("bob")));
    }

    #[test]
    fn test_should_treat_missing_attributes_as_non_matching() {
        assert!(!eval(&Path::new("nope").eq("x")));
        assert!(!eval(&Path::new("nope").ne("x")));
        assert!(!eval(&Path::new("nope").between("a", "z")));
        assert!(eval(&Path::new("nope").does_not_exist()));
        assert!(!eval(&Path::new("m").key("missing").exists()));
    }

    #[test]
    fn test_should_evaluate_between_inclusively() {
        assert!(eval(&Path::new("age").between(AttributeValue::n(30), AttributeValue::n(40))));
        assert!(eval(&Path::new("age").between(AttributeValue::n(20), AttributeValue::n(30))));
        assert!(!eval(&Path::new("age").between(AttributeValue::n(31), AttributeValue::n(40))));
    }

    #[test]
    fn test_should_evaluate_functions() {
        assert!(eval(&Path::new("name").begins_with("al")));
        assert!(eval(&Path::new("name").contains("lic")));
        assert!(eval(&Path::new("tags").contains("a")));
        assert!(eval(&Path::new("list").contains(AttributeValue::N("1.0".to_owned()))));
        assert!(eval(&Path::new("name").is_in(["bob", "alice"])));
        assert!(eval(&Path::new("tags").eq(AttributeValue::Ss(vec!["a".into(), "b".into()]))));
        assert!(eval(&Path::new("m").key("k").eq("v")));
    }

    #[test]
    fn test_should_evaluate_logical_nodes() {
        assert!(eval(&Condition::And(vec![])));
        assert!(!eval(&Condition::Or(vec![])));
        assert!(eval(&(Path::new("name").eq("alice") & !Path::new("age").lt(AttributeValue::n(18)))));
        assert!(eval(&(Path::new("name").eq("bob") | Path::new("age").exists())));
    }

    #[test]
    fn test_should_apply_actions_with_item_semantics() {
        let schema = schema();
        let resolver = PathResolver::new(&schema, true);
        let mut item = item();
        apply_actions(
            &mut item,
            resolver,
            &[
                Path::new("list").index(9).set("appended"),
                Path::new("list").index(0).remove(),
                Path::new("age").add(AttributeValue::n(12)),
                Path::new("visits").add(AttributeValue::n(1)),
                Path::new("tags").add(AttributeValue::Ss(vec!["c".into(), "a".into()])),
                Path::new("log").prepend(vec!["e1".into()]),
                Path::new("m").key("new").key("deep").set(true),
            ],
        )
        .unwrap();
        assert_eq!(
            item["list"],
            AttributeValue::L(vec![AttributeValue::from("x"), AttributeValue::from("appended")])
        );
        assert_eq!(item["age"], AttributeValue::n(42));
        assert_eq!(item["visits"], AttributeValue::n(1));
        assert!(values_equal(
            &item["tags"],
            &AttributeValue::Ss(vec!["a".into(), "b".into(), "c".into()])
        ));
        assert_eq!(item["log"], AttributeValue::L(vec!["e1".into()]));
        let m = item["m"].as_m().unwrap();
        assert_eq!(
            m["new"],
            AttributeValue::M(HashMap::from([("deep".to_owned(), AttributeValue::Bool(true))]))
        );
    }

    #[test]
    fn test_should_reject_mismatched_add() {
        let schema = schema();
        let mut item = item();
        let err = apply_actions(
            &mut item,
            PathResolver::new(&schema, true),
            &[Path::new("name").add(AttributeValue::n(1))],
        )
        .unwrap_err();
        assert!(matches!(err, AdapterError::Validation { .. }));
    }

    #[test]
    fn test_should_reject_out_of_range_add() {
        let schema = schema();
        let mut item = item();
        let err = apply_actions(
            &mut item,
            PathResolver::new(&schema, true),
            &[Path::new("age").add(AttributeValue::n("1e10000000"))],
        )
        .unwrap_err();
        assert!(matches!(err, AdapterError::Codec { .. }));
        assert_eq!(item["age"], AttributeValue::n(30));
    }

    #[test]
    fn test_should_project_nested_paths() {
        let item = item();
        let paths = [
            StoragePath::attribute("pk"),
            StoragePath::new("m.k".parse().unwrap()),
            StoragePath::new("list[1]".parse().unwrap()),
            StoragePath::attribute("absent"),
        ];
        let projected = project(&item, &paths);
        assert_eq!(projected.len(), 3);
        assert_eq!(projected["list"], AttributeValue::L(vec!["x".into()]));
        assert_eq!(projected["m"], item["m"]);
    }
}
