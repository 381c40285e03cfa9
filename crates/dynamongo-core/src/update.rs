//! Update translation.
//!
//! Compiles a list of [`UpdateAction`]s into one native update document when
//! the engine can apply it atomically, or reports
//! [`UpdatePlan::NeedsReadModifyWrite`] when it cannot. The mapping:
//!
//! | action                | path shape              | native form                      |
//! |-----------------------|-------------------------|----------------------------------|
//! | SET value             | no index                | `$set`                           |
//! | SET value             | one index, last segment | positional `$set` + length guard |
//! | SET list_append       | no index                | `$push {$each[, $position: 0]}`  |
//! | REMOVE                | no index                | `$unset`                         |
//! | ADD number            | no index                | `$inc`                           |
//! | ADD set               | no index                | `$addToSet {$each, $sort: 1}`    |
//!
//! Every other shape falls back, as do overlapping paths and a SET of only
//! one component of a composite index key.

use std::collections::HashSet;

use dynamongo_docstore::{Document, NativeValue, doc};
use dynamongo_model::{AttributeValue, ModelSchema, PathElement, UpdateAction};

use crate::codec::encode;
use crate::error::{AdapterError, AdapterResult};
use crate::indexes::{IndexLayout, composite_value, layout};
use crate::path::{PathResolver, StoragePath};

/// How an update is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdatePlan {
    /// One native update document, applied atomically.
    Atomic {
        /// Update operators.
        update: Document,
        /// Extra predicates the target document must satisfy for `update`
        /// to have the same effect as the actions, e.g. list length checks
        /// for positional writes.
        guards: Document,
    },
    /// The actions cannot be expressed natively; the reason is reported in
    /// the fallback warning.
    NeedsReadModifyWrite(String),
}

impl UpdatePlan {
    /// Whether the plan is the read-modify-write fallback.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::NeedsReadModifyWrite(_))
    }
}

/// Compiles update actions against one schema.
#[derive(Debug, Clone, Copy)]
pub struct UpdateTranslator<'a> {
    resolver: PathResolver<'a>,
}

#[derive(Default)]
struct Operators {
    set: Document,
    unset: Document,
    inc: Document,
    push: Document,
    add_to_set: Document,
    guards: Document,
}

impl Operators {
    fn into_update(self) -> Document {
        let mut update = Document::new();
        for (op, body) in [
            ("$set", self.set),
            ("$unset", self.unset),
            ("$inc", self.inc),
            ("$push", self.push),
            ("$addToSet", self.add_to_set),
        ] {
            if !body.is_empty() {
                update.insert(op.to_owned(), NativeValue::Document(body));
            }
        }
        update
    }
}

impl<'a> UpdateTranslator<'a> {
    /// A translator resolving paths with `resolver`.
    #[must_use]
    pub fn new(resolver: PathResolver<'a>) -> Self {
        Self { resolver }
    }

    /// Validates `actions` and resolves their paths, in order.
    pub fn resolve(&self, actions: &[UpdateAction]) -> AdapterResult<Vec<StoragePath>> {
        if actions.is_empty() {
            return Err(AdapterError::validation("an update needs at least one action"));
        }
        let schema = self.resolver.schema();
        actions
            .iter()
            .map(|action| {
                let path = self.resolver.resolve(action.path())?;
                if schema.key_attributes().contains(&path.root()) {
                    return Err(AdapterError::validation(format!(
                        "cannot update key attribute '{}'",
                        path.root()
                    )));
                }
                match action {
                    UpdateAction::Add { delta, .. } if !(delta.is_n() || delta.is_set()) => {
                        return Err(AdapterError::validation(format!(
                            "ADD needs a number or a set, got {}",
                            delta.type_descriptor()
                        )));
                    }
                    UpdateAction::Set { value, .. } if path.path().is_top_level() => {
                        if let Some(kind) = schema.kind_of(path.root()) {
                            if !kind.accepts(value) {
                                return Err(AdapterError::validation(format!(
                                    "attribute '{}' is declared {kind}, got {}",
                                    path.root(),
                                    value.type_descriptor()
                                )));
                            }
                        }
                    }
                    _ => {}
                }
                Ok(path)
            })
            .collect()
    }

    /// Compiles `actions` into an update plan.
    pub fn translate(&self, actions: &[UpdateAction]) -> AdapterResult<UpdatePlan> {
        let paths = self.resolve(actions)?;

        for (i, a) in paths.iter().enumerate() {
            if let Some(b) = paths[i + 1..].iter().find(|b| a.path().overlaps(b.path())) {
                return Ok(fallback(format!("paths {a} and {b} overlap")));
            }
        }

        let mut ops = Operators::default();
        for (action, path) in actions.iter().zip(&paths) {
            if let Some(reason) = self.translate_action(action, path, &mut ops)? {
                return Ok(fallback(reason));
            }
        }
        if let Some(reason) = self.composite_keys(actions, &paths, &mut ops) {
            return Ok(fallback(reason));
        }

        let guards = std::mem::take(&mut ops.guards);
        Ok(UpdatePlan::Atomic {
            update: ops.into_update(),
            guards,
        })
    }

    /// Adds one action to `ops`, or returns why it needs the fallback.
    fn translate_action(
        &self,
        action: &UpdateAction,
        path: &StoragePath,
        ops: &mut Operators,
    ) -> AdapterResult<Option<String>> {
        let field = path.to_field();
        match action {
            UpdateAction::Set { value, .. } if path.is_simple() => {
                ops.set.insert(field, encode(value)?);
            }
            UpdateAction::Set { value, .. } if path.is_tail_indexed() => {
                let (parent, idx) = match (path.parent(), path.path().elements.last()) {
                    (Some(parent), Some(PathElement::Index(idx))) => (parent, *idx),
                    _ => return Ok(Some(format!("SET on {path}"))),
                };
                // The engine pads past-the-end positional writes with nulls,
                // where the item model appends; require index - 1 to exist.
                let guard = if idx == 0 {
                    parent.to_field()
                } else {
                    format!("{}.{}", parent.to_field(), idx - 1)
                };
                ops.guards.insert(guard, NativeValue::from(doc! { "$exists" => true }));
                ops.set.insert(field, encode(value)?);
            }
            UpdateAction::ListAppend {
                values, prepend, ..
            } if path.is_simple() => {
                let each = values.iter().map(encode).collect::<AdapterResult<Vec<_>>>()?;
                let body = if *prepend {
                    doc! { "$each" => each, "$position" => 0_i64 }
                } else {
                    doc! { "$each" => each }
                };
                ops.push.insert(field, NativeValue::Document(body));
            }
            UpdateAction::Remove { .. } if path.is_simple() => {
                ops.unset.insert(field, NativeValue::from(""));
            }
            UpdateAction::Add { delta, .. } if path.is_simple() => match encode(delta)? {
                NativeValue::Array(members) => {
                    // Stored set members stay in ascending order.
                    let body = doc! { "$each" => members, "$sort" => 1_i64 };
                    ops.add_to_set.insert(field, NativeValue::from(body));
                }
                number => {
                    ops.inc.insert(field, number);
                }
            },
            UpdateAction::Set { .. } => return Ok(Some(format!("SET on nested list element {path}"))),
            UpdateAction::ListAppend { .. } => {
                return Ok(Some(format!("list_append on indexed path {path}")));
            }
            UpdateAction::Remove { .. } => return Ok(Some(format!("REMOVE on list element {path}"))),
            UpdateAction::Add { .. } => return Ok(Some(format!("ADD on indexed path {path}"))),
        }
        Ok(None)
    }

    /// Maintains composite index fields touched by the actions.
    fn composite_keys(
        &self,
        actions: &[UpdateAction],
        paths: &[StoragePath],
        ops: &mut Operators,
    ) -> Option<String> {
        let schema: &ModelSchema = self.resolver.schema();
        for index in &schema.indexes {
            let IndexLayout::Composite { field } = layout(schema, index) else {
                continue;
            };
            let range = index.range_key.as_deref()?;
            let components: HashSet<&str> = [index.hash_key.as_str(), range].into_iter().collect();
            let touched: Vec<(&UpdateAction, &StoragePath)> = actions
                .iter()
                .zip(paths)
                .filter(|(_, p)| components.contains(p.root()))
                .collect();
            if touched.is_empty() {
                continue;
            }
            if touched
                .iter()
                .any(|(a, p)| p.path().is_top_level() && matches!(a, UpdateAction::Remove { .. }))
            {
                ops.unset.insert(field, NativeValue::from(""));
                continue;
            }
            let literal = |name: &str| {
                touched.iter().find_map(|(a, p)| match a {
                    UpdateAction::Set {
                        value: AttributeValue::S(s),
                        ..
                    } if p.path().is_top_level() && p.root() == name => Some(s.as_str()),
                    _ => None,
                })
            };
            match (literal(&index.hash_key), literal(range)) {
                (Some(hash), Some(range)) => {
                    ops.set
                        .insert(field, NativeValue::from(composite_value(hash, range)));
                }
                _ => {
                    return Some(format!(
                        "update touches one component of composite index '{}'",
                        index.name
                    ));
                }
            }
        }
        None
    }
}

fn fallback(reason: String) -> UpdatePlan {
    UpdatePlan::NeedsReadModifyWrite(reason)
}
